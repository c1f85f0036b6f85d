//! MFRC522 tag reader over SPI
//!
//! Presence is edge triggered: a tag answers REQA once, is selected, and
//! after [`TagReader::release`] sends it to HALT it stays silent until it
//! leaves and re-enters the field.

use core::mem;

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiDevice;
use esp_println::println;
use mfrc522::comm::blocking::spi::{DummyDelay, SpiInterface};
use mfrc522::{Initialized, Mfrc522, Uninitialized};
use tagplay_core::tag::{
    BYTES_PER_READ, FIRST_PAGE, PAGES_PER_READ, READS_PER_PAYLOAD, TagError, TagPayload, TagReader,
};

enum ReaderState<SPI: SpiDevice> {
    Pending(Mfrc522<SpiInterface<SPI, DummyDelay>, Uninitialized>),
    Ready(Mfrc522<SpiInterface<SPI, DummyDelay>, Initialized>),
    Failed,
}

pub struct RfidReader<SPI: SpiDevice, RST> {
    state: ReaderState<SPI>,
    reset: RST,
    selected: bool,
}

impl<SPI, RST> RfidReader<SPI, RST>
where
    SPI: SpiDevice,
    RST: OutputPin,
{
    pub fn new(spi: SPI, reset: RST) -> Self {
        Self {
            state: ReaderState::Pending(Mfrc522::new(SpiInterface::new(spi))),
            reset,
            selected: false,
        }
    }

    fn ready(&mut self) -> Option<&mut Mfrc522<SpiInterface<SPI, DummyDelay>, Initialized>> {
        match &mut self.state {
            ReaderState::Ready(reader) => Some(reader),
            _ => None,
        }
    }
}

impl<SPI, RST> TagReader for RfidReader<SPI, RST>
where
    SPI: SpiDevice,
    RST: OutputPin,
{
    fn init(&mut self) -> Result<(), TagError> {
        // 释放复位
        self.reset.set_high().map_err(|_| TagError::ReaderUnavailable)?;

        let pending = match mem::replace(&mut self.state, ReaderState::Failed) {
            ReaderState::Pending(reader) => reader,
            ReaderState::Ready(reader) => {
                self.state = ReaderState::Ready(reader);
                return Ok(());
            }
            ReaderState::Failed => return Err(TagError::ReaderUnavailable),
        };

        let mut reader = match pending.init() {
            Ok(reader) => reader,
            Err(_) => {
                println!("[TAG] MFRC522 init failed");
                return Err(TagError::ReaderUnavailable);
            }
        };

        match reader.version() {
            Ok(version) if version != 0x00 && version != 0xFF => {
                println!("[TAG] MFRC522 ready, version 0x{:02x}", version);
                self.state = ReaderState::Ready(reader);
                Ok(())
            }
            _ => {
                println!("[TAG] MFRC522 not responding");
                Err(TagError::ReaderUnavailable)
            }
        }
    }

    fn is_tag_present(&mut self) -> bool {
        let Some(reader) = self.ready() else {
            return false;
        };
        let Ok(atqa) = reader.reqa() else {
            return false;
        };
        match reader.select(&atqa) {
            Ok(uid) => {
                println!("[TAG] Tag selected, uid {:02x?}", uid.as_bytes());
                self.selected = true;
                true
            }
            Err(_) => false,
        }
    }

    fn read_payload(&mut self, payload: &mut TagPayload) -> Result<(), TagError> {
        if !self.selected {
            return Err(TagError::ReadFailed);
        }
        let reader = self.ready().ok_or(TagError::ReaderUnavailable)?;

        for (i, chunk) in payload.chunks_exact_mut(BYTES_PER_READ).enumerate() {
            debug_assert!(i < READS_PER_PAYLOAD);
            let page = FIRST_PAGE + i as u8 * PAGES_PER_READ;
            let block = reader.mf_read(page).map_err(|_| TagError::ReadFailed)?;
            chunk.copy_from_slice(&block);
        }
        Ok(())
    }

    fn release(&mut self) {
        self.selected = false;
        if let Some(reader) = self.ready() {
            let _ = reader.hlta();
        }
    }
}
