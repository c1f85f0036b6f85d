#![no_std]

//! ESP32-C3 tag player board support
//!
//! Binds the hardware independent player from `tagplay-core` to the real
//! peripherals: the MFRC522 reader on SPI2, the WS2812 ring on RMT, the
//! microphone on ADC1 and the station interface of esp-wifi with an
//! embassy-net stack carrying both the HTTPS client and the status server.

extern crate alloc;

pub mod audio;
pub mod board;
pub mod http_transport;
pub mod led_strip;
pub mod rng;
pub mod tag_reader;
pub mod web_server;
pub mod wifi;

use core::fmt;

/// Project version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Board wiring and compile time configuration
pub mod config {
    /// Number of pixels on the ring
    pub const LED_COUNT: usize = 8;

    /// WS2812 data pin
    pub const LED_DATA_PIN: u8 = 4;

    /// Global ring brightness, 0..=255
    pub const LED_BRIGHTNESS: u8 = 50;

    /// Microphone ADC pin
    pub const MIC_PIN: u8 = 0;

    // MFRC522 on SPI2
    pub const RFID_SCK_PIN: u8 = 6;
    pub const RFID_MOSI_PIN: u8 = 7;
    pub const RFID_MISO_PIN: u8 = 5;
    pub const RFID_CS_PIN: u8 = 10;
    pub const RFID_RST_PIN: u8 = 3;

    /// RFID SPI clock in kHz
    pub const RFID_SPI_KHZ: u32 = 1_000;

    /// Status server port
    pub const HTTP_PORT: u16 = 80;

    /// Bound on every outgoing HTTPS request
    pub const HTTP_REQUEST_TIMEOUT_MS: u64 = 15_000;

    /// Idle timeout of a status server connection
    pub const HTTP_SERVER_TIMEOUT_MS: u64 = 10_000;

    /// WiFi configuration
    /// Read from environment variables at compile time
    pub const WIFI_SSID: &str = env!("WIFI_SSID");
    pub const WIFI_PASSWORD: &str = env!("WIFI_PASSWORD");

    pub const SPOTIFY_CLIENT_ID: &str = env!("SPOTIFY_CLIENT_ID");
    pub const SPOTIFY_CLIENT_SECRET: &str = env!("SPOTIFY_CLIENT_SECRET");
    pub const SPOTIFY_REFRESH_TOKEN: &str = env!("SPOTIFY_REFRESH_TOKEN");
    pub const SPOTIFY_DEVICE_NAME: &str = env!("SPOTIFY_DEVICE_NAME");
}

/// Board level failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardError {
    /// WiFi driver or controller error
    WiFiError,
    /// RMT transmission failed
    LedError,
}

impl fmt::Display for BoardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BoardError::WiFiError => "wifi error",
            BoardError::LedError => "led transmission failed",
        };
        f.write_str(text)
    }
}
