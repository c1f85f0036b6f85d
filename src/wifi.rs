//! WiFi module for ESP32-C3 board
//!
//! Station link on esp-wifi with embassy-net DHCP. Every call returns
//! immediately; the player polls [`NetworkLink::is_connected`] and owns the
//! timeouts.

use crate::{BoardError, config};
use embassy_net::Stack;
use esp_println::println;
use esp_wifi::wifi::{AuthMethod, ClientConfiguration, Configuration, WifiController};
use tagplay_core::app::{NetworkInfo, NetworkLink};

/// WiFi manager for handling network connectivity with real DHCP
pub struct WiFiManager<'a> {
    controller: WifiController<'a>,
    stack: Stack<'a>,
    started: bool,
    connected: bool,
}

impl<'a> WiFiManager<'a> {
    pub fn new(controller: WifiController<'a>, stack: Stack<'a>) -> Self {
        Self {
            controller,
            stack,
            started: false,
            connected: false,
        }
    }

    fn configure_and_start(&mut self, ssid: &str, password: &str) -> Result<(), BoardError> {
        let client_config = ClientConfiguration {
            ssid: ssid.try_into().map_err(|_| BoardError::WiFiError)?,
            password: password.try_into().map_err(|_| BoardError::WiFiError)?,
            auth_method: AuthMethod::WPA2Personal,
            ..Default::default()
        };

        self.controller
            .set_configuration(&Configuration::Client(client_config))
            .map_err(|_| BoardError::WiFiError)?;
        self.controller.start().map_err(|_| BoardError::WiFiError)?;
        self.started = true;
        Ok(())
    }

    fn start_connect(&mut self) -> Result<(), BoardError> {
        self.controller.connect().map_err(|_| BoardError::WiFiError)
    }

    /// DHCP assigned address, if any
    pub fn ip_address(&self) -> Option<[u8; 4]> {
        self.stack
            .config_v4()
            .map(|config| config.address.address().octets())
    }
}

impl NetworkLink for WiFiManager<'_> {
    fn begin_join(&mut self) {
        if config::WIFI_SSID.is_empty() {
            println!("[WIFI] No SSID configured, join will time out");
            return;
        }

        println!("[WIFI] Connecting to WiFi network: {}", config::WIFI_SSID);
        let result = if self.started {
            self.start_connect()
        } else {
            self.configure_and_start(config::WIFI_SSID, config::WIFI_PASSWORD)
                .and_then(|_| self.start_connect())
        };
        if let Err(e) = result {
            println!("[WIFI] Failed to start connection: {}", e);
        }
    }

    fn is_connected(&mut self) -> bool {
        let link_up = self.controller.is_connected().unwrap_or(false);
        // 需要同时有链路和 DHCP 地址
        let connected = link_up && self.ip_address().is_some();

        if connected != self.connected {
            match self.ip_address() {
                Some(ip) if connected => println!(
                    "[DHCP] IP address obtained: {}.{}.{}.{}",
                    ip[0], ip[1], ip[2], ip[3]
                ),
                _ => println!("[WIFI] Link down"),
            }
            self.connected = connected;
        }
        connected
    }

    fn reconnect(&mut self) {
        println!("[WIFI] Reconnecting...");
        let _ = self.controller.disconnect();
        self.begin_join();
    }

    fn info(&self) -> NetworkInfo {
        let mut ssid = heapless::String::new();
        // SSIDs are at most 32 bytes
        let _ = ssid.push_str(config::WIFI_SSID);
        NetworkInfo {
            ssid,
            ip: self.ip_address(),
            rssi: None,
        }
    }

    fn forget_credentials(&mut self) {
        // Credentials are compiled in; dropping the link is all there is to forget
        println!("[WIFI] Disconnecting from {}", config::WIFI_SSID);
        let _ = self.controller.disconnect();
        self.connected = false;
    }
}
