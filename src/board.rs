//! The ESP32-C3 board as seen by the player

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiDevice;
use esp_hal::rmt::TxChannel;
use esp_println::println;
use tagplay_core::app::Board;

use crate::audio::Microphone;
use crate::led_strip::LedStrip;
use crate::tag_reader::RfidReader;
use crate::web_server::SERVICES_STARTED;
use crate::wifi::WiFiManager;

pub struct EspBoard<TX, SPI, RST>
where
    TX: TxChannel,
    SPI: SpiDevice,
{
    reader: RfidReader<SPI, RST>,
    wifi: WiFiManager<'static>,
    strip: LedStrip<TX>,
    mic: Microphone,
    services_started: bool,
}

impl<TX, SPI, RST> EspBoard<TX, SPI, RST>
where
    TX: TxChannel,
    SPI: SpiDevice,
{
    pub fn new(
        reader: RfidReader<SPI, RST>,
        wifi: WiFiManager<'static>,
        strip: LedStrip<TX>,
        mic: Microphone,
    ) -> Self {
        Self {
            reader,
            wifi,
            strip,
            mic,
            services_started: false,
        }
    }
}

impl<TX, SPI, RST> Board for EspBoard<TX, SPI, RST>
where
    TX: TxChannel,
    SPI: SpiDevice,
    RST: OutputPin,
{
    type Tag = RfidReader<SPI, RST>;
    type Net = WiFiManager<'static>;
    type Strip = LedStrip<TX>;

    fn tag_reader(&mut self) -> &mut Self::Tag {
        &mut self.reader
    }

    fn network(&mut self) -> &mut Self::Net {
        &mut self.wifi
    }

    fn strip(&mut self) -> &mut Self::Strip {
        &mut self.strip
    }

    fn audio_level(&mut self) -> Option<u16> {
        self.mic.level()
    }

    fn start_services(&mut self) {
        if self.services_started {
            return;
        }
        self.services_started = true;
        println!("[MAIN] Starting web server");
        SERVICES_STARTED.signal(());
    }

    fn restart(&mut self) {
        println!("[MAIN] Software reset");
        esp_hal::system::software_reset();
    }
}
