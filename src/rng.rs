//! Hardware RNG as a `rand_core` source

use esp_hal::rng::Rng;
use rand_core::{CryptoRng, RngCore};

/// Cloneable handle; every clone reads the same peripheral
#[derive(Clone)]
pub struct HwRng(Rng);

impl HwRng {
    pub fn new(rng: Rng) -> Self {
        Self(rng)
    }
}

impl RngCore for HwRng {
    fn next_u32(&mut self) -> u32 {
        self.0.random()
    }

    fn next_u64(&mut self) -> u64 {
        (u64::from(self.0.random()) << 32) | u64::from(self.0.random())
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.0.random().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

// The radio is running, so the RNG is seeded from RF noise
impl CryptoRng for HwRng {}
