#![no_std]

//! Hardware independent core of the tag player.
//!
//! Everything that decides *what* the device does lives here: the lifecycle
//! state machine, the remote playback client with its retry policy, the LED
//! animation engine and the tag payload translator. The board crate supplies
//! the peripherals through the traits in [`app`], [`remote::http`],
//! [`animation`] and [`tag`].

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod animation;
pub mod app;
pub mod remote;
pub mod retry;
pub mod state_machine;
pub mod tag;
pub mod web_api;

#[cfg(test)]
mod testing;

/// Default timing and endpoint constants
pub mod config {
    /// Period of the scheduler tick driving the player
    pub const TICK_INTERVAL_MS: u64 = 10;

    /// Duration of the startup sweep before joining the network
    pub const BOOT_ANIMATION_MS: u64 = 1_500;

    /// Bound on the initial network join
    pub const NETWORK_JOIN_TIMEOUT_MS: u64 = 30_000;

    /// Bound on remote session initialization before falling back to idle
    pub const REMOTE_INIT_TIMEOUT_MS: u64 = 30_000;

    /// Pause between two remote initialization attempts
    pub const REMOTE_INIT_RETRY_MS: u64 = 2_000;

    /// Minimum time between two tag detections
    pub const TAG_DEBOUNCE_MS: u64 = 500;

    /// How long success/failure feedback stays visible
    pub const FEEDBACK_DURATION_MS: u64 = 2_000;

    /// Interval of the coarse network health check
    pub const NETWORK_CHECK_INTERVAL_MS: u64 = 20_000;

    /// Bound on reconnecting after the network was lost
    pub const RECONNECT_TIMEOUT_MS: u64 = 30_000;

    /// Error indication time before the device restarts
    pub const ERROR_RESTART_DELAY_MS: u64 = 3_000;

    /// Microphone sampling interval while idle
    pub const AUDIO_SAMPLE_INTERVAL_MS: u64 = 35;

    /// Total attempts per remote command (first try included)
    pub const RETRY_MAX_ATTEMPTS: u8 = 4;
    pub const RETRY_INITIAL_DELAY_MS: u32 = 1_000;
    pub const RETRY_MAX_DELAY_MS: u32 = 10_000;
    pub const RETRY_BACKOFF_MULTIPLIER: f32 = 2.0;

    pub const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
    pub const API_BASE_URL: &str = "https://api.spotify.com/v1";
}
