//! Microphone level on ADC1

use esp_hal::Blocking;
use esp_hal::analog::adc::{Adc, AdcPin};
use esp_hal::peripherals::{ADC1, GPIO0};

pub type MicAdc = Adc<'static, ADC1<'static>, Blocking>;
pub type MicPin = AdcPin<GPIO0<'static>, ADC1<'static>>;

/// Polls before giving up on one conversion
const MAX_POLLS: u32 = 200;

pub struct Microphone {
    adc: MicAdc,
    pin: MicPin,
}

impl Microphone {
    pub fn new(adc: MicAdc, pin: MicPin) -> Self {
        Self { adc, pin }
    }

    /// One oneshot conversion scaled from 12 bits to 0..=1023
    pub fn level(&mut self) -> Option<u16> {
        for _ in 0..MAX_POLLS {
            if let Ok(raw) = self.adc.read_oneshot(&mut self.pin) {
                return Some((raw >> 2).min(1023));
            }
        }
        None
    }
}
