//! WS2812 ring driven through one RMT channel
//!
//! 帧数据按 GRB 顺序编码为 RMT 脉冲，最后附加复位脉冲。

use crate::BoardError;
use crate::config;
use alloc::vec::Vec;
use esp_hal::gpio::Level;
use esp_hal::rmt::{PulseCode, TxChannel};
use smart_leds::RGB8;
use tagplay_core::animation::PixelSink;

/// Bits per pixel on the wire
const BITS_PER_PIXEL: usize = 24;

/// RMT ticks at 10MHz: 1-bit = 800ns high + 400ns low, 0-bit = 400ns high + 800ns low
const T1H: u16 = 8;
const T1L: u16 = 4;
const T0H: u16 = 4;
const T0L: u16 = 8;

/// Latch low time (80us)
const RESET_TICKS: u16 = 800;

pub struct LedStrip<TX>
where
    TX: TxChannel,
{
    channel: Option<TX>,
    pulses: Vec<u32>,
    brightness: u8,
}

impl<TX> LedStrip<TX>
where
    TX: TxChannel,
{
    pub fn new(channel: TX) -> Self {
        Self {
            channel: Some(channel),
            pulses: Vec::with_capacity(config::LED_COUNT * BITS_PER_PIXEL + 1),
            brightness: config::LED_BRIGHTNESS,
        }
    }

    /// Encode and transmit one frame, blocking until the RMT is done
    pub fn write(&mut self, pixels: &[RGB8]) -> Result<(), BoardError> {
        self.pulses.clear();
        for pixel in smart_leds::brightness(pixels.iter().copied(), self.brightness) {
            for byte in [pixel.g, pixel.r, pixel.b] {
                self.pulses.extend_from_slice(&byte_to_pulses(byte));
            }
        }
        self.pulses
            .push(PulseCode::new(Level::Low, RESET_TICKS, Level::Low, 0));

        let channel = self.channel.take().ok_or(BoardError::LedError)?;
        match channel.transmit(&self.pulses) {
            Ok(transaction) => match transaction.wait() {
                Ok(channel) => {
                    self.channel = Some(channel);
                    Ok(())
                }
                Err((_, channel)) => {
                    // 传输警告不影响下一帧
                    self.channel = Some(channel);
                    Ok(())
                }
            },
            Err(_) => Err(BoardError::LedError),
        }
    }
}

impl<TX> PixelSink for LedStrip<TX>
where
    TX: TxChannel,
{
    type Error = BoardError;

    fn push_frame(&mut self, frame: &[RGB8]) -> Result<(), Self::Error> {
        self.write(frame)
    }
}

/// MSB first, one pulse code per bit
fn byte_to_pulses(byte: u8) -> [u32; 8] {
    let mut pulses = [0u32; 8];
    for (i, pulse) in pulses.iter_mut().enumerate() {
        *pulse = if (byte >> (7 - i)) & 1 == 1 {
            PulseCode::new(Level::High, T1H, Level::Low, T1L)
        } else {
            PulseCode::new(Level::High, T0H, Level::Low, T0L)
        };
    }
    pulses
}
