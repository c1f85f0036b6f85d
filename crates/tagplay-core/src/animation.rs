//! LED ring animation engine
//!
//! The engine keeps one [`AnimationState`] record for the current mode and
//! advances it at the mode's own frame interval. Changing the mode resets the
//! record wholesale. Finite animations (flash, sweep, ring, chase) hand the
//! ring back to [`LedMode::Idle`] themselves when they complete.

use log::debug;
use rand_core::RngCore;
use smart_leds::RGB8;

use crate::config::AUDIO_SAMPLE_INTERVAL_MS;

/// Status colors
pub mod palette {
    use smart_leds::RGB8;

    const fn rgb(r: u8, g: u8, b: u8) -> RGB8 {
        RGB8 { r, g, b }
    }

    pub const OFF: RGB8 = rgb(0, 0, 0);
    pub const WIFI_CONNECTING: RGB8 = rgb(255, 200, 0);
    pub const WIFI_ERROR: RGB8 = rgb(255, 0, 0);
    pub const REMOTE_CONNECTING: RGB8 = rgb(0, 100, 255);
    pub const REMOTE_ERROR: RGB8 = rgb(255, 80, 0);
    pub const TAG_READING: RGB8 = rgb(0, 0, 255);
    pub const TAG_PROCESSING: RGB8 = rgb(138, 43, 226);
    pub const SUCCESS: RGB8 = rgb(0, 255, 0);
    pub const IDLE: RGB8 = rgb(0, 100, 0);
    pub const DEVICE_SELECTED: RGB8 = rgb(0, 255, 255);
    pub const PAUSED: RGB8 = rgb(30, 50, 100);
    pub const STANDBY: RGB8 = rgb(20, 20, 20);
    pub const TOKEN_REFRESH: RGB8 = rgb(150, 0, 200);
    pub const SEARCHING: RGB8 = rgb(200, 200, 200);
    pub const VOLUME: RGB8 = rgb(0, 200, 100);
    pub const SKIP: RGB8 = rgb(0, 200, 255);
}

/// Frame intervals in milliseconds
mod interval {
    pub const PULSE: u64 = 30;
    pub const BLINK_FAST: u64 = 150;
    pub const BLINK_SLOW: u64 = 500;
    pub const SPIN: u64 = 100;
    pub const FLASH: u64 = 150;
    pub const RAINBOW: u64 = 50;
    pub const SWEEP: u64 = 80;
    pub const BREATHING: u64 = 40;
    pub const SPARKLE: u64 = 80;
    pub const RING: u64 = 60;
    pub const CHASE: u64 = 60;
}

/// Visual feedback requested by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedMode {
    Idle,
    Startup,
    WifiConnecting,
    WifiError,
    RemoteConnecting,
    RemoteError,
    TagReading,
    TagProcessing,
    TagSuccess,
    TagFailure,
    DeviceSelected,
    MusicPlaying,
    MusicPaused,
    Standby,
    TokenRefresh,
    Searching,
    VolumeUp,
    VolumeDown,
    SkipTrack,
    PrevTrack,
}

/// Parametrized procedure behind a mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// Sound reactive idle, driven by audio samples instead of frames
    SoundReactive,
    Pulse {
        color: RGB8,
        floor: u8,
        ceiling: u8,
        step: u8,
        interval_ms: u64,
    },
    Blink {
        color: RGB8,
        interval_ms: u64,
    },
    Spin {
        color: RGB8,
    },
    DualSpin {
        forward: RGB8,
        backward: RGB8,
    },
    Flash {
        color: RGB8,
        count: u8,
    },
    RainbowWave,
    RainbowSweep {
        sweeps: u8,
    },
    Sparkle {
        color: RGB8,
    },
    ExpandRing {
        color: RGB8,
    },
    ContractRing {
        color: RGB8,
    },
    Chase {
        color: RGB8,
        clockwise: bool,
        laps: u8,
    },
}

impl Pattern {
    pub fn interval_ms(&self) -> Option<u64> {
        match *self {
            Pattern::SoundReactive => None,
            Pattern::Pulse { interval_ms, .. } | Pattern::Blink { interval_ms, .. } => {
                Some(interval_ms)
            }
            Pattern::Spin { .. } | Pattern::DualSpin { .. } => Some(interval::SPIN),
            Pattern::Flash { .. } => Some(interval::FLASH),
            Pattern::RainbowWave => Some(interval::RAINBOW),
            Pattern::RainbowSweep { .. } => Some(interval::SWEEP),
            Pattern::Sparkle { .. } => Some(interval::SPARKLE),
            Pattern::ExpandRing { .. } | Pattern::ContractRing { .. } => Some(interval::RING),
            Pattern::Chase { .. } => Some(interval::CHASE),
        }
    }
}

const fn pulse(color: RGB8) -> Pattern {
    Pattern::Pulse {
        color,
        floor: 20,
        ceiling: 255,
        step: 5,
        interval_ms: interval::PULSE,
    }
}

const fn breathing(color: RGB8) -> Pattern {
    Pattern::Pulse {
        color,
        floor: 10,
        ceiling: 150,
        step: 2,
        interval_ms: interval::BREATHING,
    }
}

impl LedMode {
    pub fn pattern(self) -> Pattern {
        use palette::*;
        match self {
            LedMode::Idle => Pattern::SoundReactive,
            LedMode::Startup => Pattern::RainbowSweep { sweeps: 3 },
            LedMode::WifiConnecting => pulse(WIFI_CONNECTING),
            LedMode::WifiError => Pattern::Blink {
                color: WIFI_ERROR,
                interval_ms: interval::BLINK_FAST,
            },
            LedMode::RemoteConnecting => pulse(REMOTE_CONNECTING),
            LedMode::RemoteError => Pattern::Blink {
                color: REMOTE_ERROR,
                interval_ms: interval::BLINK_SLOW,
            },
            LedMode::TagReading => Pattern::Spin { color: TAG_READING },
            LedMode::TagProcessing => Pattern::DualSpin {
                forward: TAG_READING,
                backward: TAG_PROCESSING,
            },
            LedMode::TagSuccess => Pattern::Flash {
                color: SUCCESS,
                count: 3,
            },
            LedMode::TagFailure => Pattern::Flash {
                color: WIFI_ERROR,
                count: 5,
            },
            LedMode::DeviceSelected => Pattern::Flash {
                color: DEVICE_SELECTED,
                count: 2,
            },
            LedMode::MusicPlaying => Pattern::RainbowWave,
            LedMode::MusicPaused => breathing(PAUSED),
            LedMode::Standby => breathing(STANDBY),
            LedMode::TokenRefresh => pulse(TOKEN_REFRESH),
            LedMode::Searching => Pattern::Sparkle { color: SEARCHING },
            LedMode::VolumeUp => Pattern::ExpandRing { color: VOLUME },
            LedMode::VolumeDown => Pattern::ContractRing { color: VOLUME },
            LedMode::SkipTrack => Pattern::Chase {
                color: SKIP,
                clockwise: true,
                laps: 2,
            },
            LedMode::PrevTrack => Pattern::Chase {
                color: SKIP,
                clockwise: false,
                laps: 2,
            },
        }
    }

    /// Modes that end on their own and fall back to idle
    pub fn returns_to_idle(self) -> bool {
        matches!(
            self.pattern(),
            Pattern::Flash { .. }
                | Pattern::RainbowSweep { .. }
                | Pattern::ExpandRing { .. }
                | Pattern::ContractRing { .. }
                | Pattern::Chase { .. }
        )
    }
}

/// Retained per-animation counters, reset on every mode change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationState {
    pub step: u32,
    pub brightness: u8,
    pub rising: bool,
    pub lit: bool,
    pub hue_offset: u8,
}

impl AnimationState {
    fn initial(mode: LedMode, leds: usize) -> Self {
        let brightness = match mode {
            LedMode::Standby => 10,
            _ => 50,
        };
        let step = match mode {
            LedMode::VolumeDown => leds as u32,
            _ => 0,
        };
        Self {
            step,
            brightness,
            rising: true,
            lit: false,
            hue_offset: 0,
        }
    }
}

/// Receives finished frames, implemented by the LED strip driver
pub trait PixelSink {
    type Error: core::fmt::Debug;

    fn push_frame(&mut self, frame: &[RGB8]) -> Result<(), Self::Error>;
}

pub struct AnimationEngine<R, const N: usize> {
    mode: LedMode,
    state: AnimationState,
    frame: [RGB8; N],
    audio: [u16; N],
    last_frame_ms: Option<u64>,
    last_sample_ms: Option<u64>,
    dirty: bool,
    rng: R,
}

impl<R: RngCore, const N: usize> AnimationEngine<R, N> {
    pub fn new(rng: R) -> Self {
        let mut engine = Self {
            mode: LedMode::Idle,
            state: AnimationState::initial(LedMode::Idle, N),
            frame: [palette::OFF; N],
            audio: [0; N],
            last_frame_ms: None,
            last_sample_ms: None,
            dirty: true,
            rng,
        };
        engine.fill(palette::IDLE);
        engine
    }

    pub fn mode(&self) -> LedMode {
        self.mode
    }

    pub fn state(&self) -> &AnimationState {
        &self.state
    }

    pub fn frame(&self) -> &[RGB8] {
        &self.frame
    }

    /// Request a mode. Always restarts the animation, even for the same mode.
    pub fn set_mode(&mut self, mode: LedMode) {
        if mode != self.mode {
            debug!("[LED] {:?} -> {:?}", self.mode, mode);
        }
        self.mode = mode;
        self.state = AnimationState::initial(mode, N);
        self.last_frame_ms = None;
        self.dirty = true;
        if mode == LedMode::Idle {
            self.audio = [0; N];
            self.fill(palette::IDLE);
        }
    }

    /// Advance the current animation if its interval elapsed.
    ///
    /// Returns true when the frame changed and should be pushed.
    pub fn render(&mut self, now_ms: u64) -> bool {
        let pattern = self.mode.pattern();
        let Some(interval) = pattern.interval_ms() else {
            return self.take_dirty();
        };
        if let Some(last) = self.last_frame_ms {
            if now_ms.saturating_sub(last) < interval {
                return self.take_dirty();
            }
        }
        self.last_frame_ms = Some(now_ms);

        match pattern {
            Pattern::SoundReactive => {}
            Pattern::Pulse {
                color,
                floor,
                ceiling,
                step,
                ..
            } => self.pulse(color, floor, ceiling, step),
            Pattern::Blink { color, .. } => {
                self.state.lit = !self.state.lit;
                self.fill(if self.state.lit { color } else { palette::OFF });
            }
            Pattern::Spin { color } => self.spin(color),
            Pattern::DualSpin { forward, backward } => self.dual_spin(forward, backward),
            Pattern::Flash { color, count } => self.flash(color, count),
            Pattern::RainbowWave => self.rainbow_wave(),
            Pattern::RainbowSweep { sweeps } => self.rainbow_sweep(sweeps),
            Pattern::Sparkle { color } => self.sparkle(color),
            Pattern::ExpandRing { color } => self.expand_ring(color),
            Pattern::ContractRing { color } => self.contract_ring(color),
            Pattern::Chase {
                color,
                clockwise,
                laps,
            } => self.chase(color, clockwise, laps),
        }
        self.dirty = false;
        true
    }

    /// True when the idle visualizer wants a new audio sample
    pub fn wants_audio(&self, now_ms: u64) -> bool {
        self.mode == LedMode::Idle
            && self
                .last_sample_ms
                .map_or(true, |last| now_ms.saturating_sub(last) >= AUDIO_SAMPLE_INTERVAL_MS)
    }

    /// Feed one microphone reading (0..=1023). Ignored outside idle.
    pub fn sample_audio(&mut self, level: u16, now_ms: u64) -> bool {
        if N < 2 || !self.wants_audio(now_ms) {
            return false;
        }
        self.last_sample_ms = Some(now_ms);

        let scaled = level / 4;
        let half = N / 2;
        // levels travel outward from the center
        for i in 0..half - 1 {
            self.audio[i] = self.audio[i + 1];
            self.audio[N - 1 - i] = self.audio[N - 2 - i];
        }
        self.audio[half - 1] = scaled;
        self.audio[half] = scaled;

        for (pixel, &level) in self.frame.iter_mut().zip(self.audio.iter()) {
            *pixel = RGB8 {
                r: 0,
                g: level.clamp(20, 255) as u8,
                b: 0,
            };
        }
        self.dirty = true;
        true
    }

    fn take_dirty(&mut self) -> bool {
        core::mem::replace(&mut self.dirty, false)
    }

    fn finish(&mut self) {
        self.set_mode(LedMode::Idle);
    }

    fn fill(&mut self, color: RGB8) {
        self.frame = [color; N];
    }

    fn clear(&mut self) {
        self.fill(palette::OFF);
    }

    fn set(&mut self, index: usize, color: RGB8) {
        if N > 0 {
            self.frame[index % N] = color;
        }
    }

    fn pulse(&mut self, color: RGB8, floor: u8, ceiling: u8, step: u8) {
        let s = &mut self.state;
        if s.rising {
            s.brightness = s.brightness.saturating_add(step);
            if s.brightness >= ceiling {
                s.brightness = ceiling;
                s.rising = false;
            }
        } else {
            s.brightness = s.brightness.saturating_sub(step);
            if s.brightness <= floor {
                s.brightness = floor;
                s.rising = true;
            }
        }
        let brightness = s.brightness;
        self.fill(scale(color, brightness));
    }

    fn spin(&mut self, color: RGB8) {
        if N == 0 {
            return;
        }
        self.clear();
        let pos = self.state.step as usize % N;
        self.set(pos, color);
        self.set(pos + N - 1, scale(color, 128));
        self.set(pos + N - 2, scale(color, 64));
        self.state.step = self.state.step.wrapping_add(1);
    }

    fn dual_spin(&mut self, forward: RGB8, backward: RGB8) {
        if N == 0 {
            return;
        }
        self.clear();
        let offset = self.state.step as usize % N;
        let head = offset;
        self.set(head, forward);
        self.set(head + N - 1, scale(forward, 128));
        self.set(head + N - 2, scale(forward, 64));

        let head = N - 1 - offset;
        self.set(head, backward);
        self.set(head + 1, scale(backward, 128));
        self.set(head + 2, scale(backward, 64));
        self.state.step = self.state.step.wrapping_add(1);
    }

    fn flash(&mut self, color: RGB8, count: u8) {
        let half_steps = count as u32 * 2;
        if self.state.step < half_steps {
            if self.state.step % 2 == 0 {
                self.fill(color);
            } else {
                self.clear();
            }
            self.state.step += 1;
        } else {
            self.finish();
        }
    }

    fn rainbow_wave(&mut self) {
        let offset = self.state.hue_offset;
        for i in 0..N {
            let hue = ((i * 256 / N) as u8).wrapping_add(offset);
            self.frame[i] = color_wheel(hue);
        }
        self.state.hue_offset = offset.wrapping_add(3);
    }

    fn rainbow_sweep(&mut self, sweeps: u8) {
        if self.state.step < (N * sweeps as usize) as u32 {
            self.clear();
            let pos = self.state.step as usize % N;
            for i in 0..=pos {
                self.frame[i] = color_wheel((i * 256 / N) as u8);
            }
            self.state.step += 1;
        } else {
            self.finish();
        }
    }

    fn sparkle(&mut self, color: RGB8) {
        if N == 0 {
            return;
        }
        for pixel in self.frame.iter_mut() {
            *pixel = decay(*pixel);
        }
        if self.rng.next_u32() % 100 > 50 {
            let pos = self.rng.next_u32() as usize % N;
            self.frame[pos] = decay(color);
        }
        let pos = self.rng.next_u32() as usize % N;
        self.frame[pos] = color;
    }

    fn expand_ring(&mut self, color: RGB8) {
        let lit = self.state.step as usize;
        if lit <= N {
            self.clear();
            let center = N / 2;
            for i in 0..lit {
                let c = scale(color, ring_intensity(lit - 1 - i));
                self.set(center + i, c);
                self.set(center + N - i, c);
            }
            self.state.step += 1;
        } else {
            self.finish();
        }
    }

    fn contract_ring(&mut self, color: RGB8) {
        let lit = self.state.step as usize;
        if lit > 0 {
            self.clear();
            for i in 0..lit {
                let c = scale(color, ring_intensity(lit - 1 - i));
                self.set(N - i, c);
                self.set(i, c);
            }
            self.state.step -= 1;
        } else {
            self.finish();
        }
    }

    fn chase(&mut self, color: RGB8, clockwise: bool, laps: u8) {
        if N == 0 {
            return;
        }
        let step = self.state.step as usize;
        if step < N * laps as usize {
            self.clear();
            let pos = if clockwise { step % N } else { N - 1 - step % N };
            for t in 0..4usize.min(step + 1) {
                let tail = if clockwise { pos + N - t } else { pos + t };
                let intensity = 255u32.saturating_sub(t as u32 * 60).max(30) as u8;
                self.set(tail, scale(color, intensity));
            }
            self.state.step += 1;
        } else {
            self.finish();
        }
    }
}

/// Intensity of a ring pixel `distance` positions behind the front
fn ring_intensity(distance: usize) -> u8 {
    255u32.saturating_sub(distance as u32 * 30).max(50) as u8
}

fn scale(color: RGB8, brightness: u8) -> RGB8 {
    let b = brightness as u16;
    RGB8 {
        r: (color.r as u16 * b / 255) as u8,
        g: (color.g as u16 * b / 255) as u8,
        b: (color.b as u16 * b / 255) as u8,
    }
}

fn decay(color: RGB8) -> RGB8 {
    RGB8 {
        r: (color.r as u16 * 7 / 10) as u8,
        g: (color.g as u16 * 7 / 10) as u8,
        b: (color.b as u16 * 7 / 10) as u8,
    }
}

/// Classic three segment color wheel
pub fn color_wheel(position: u8) -> RGB8 {
    let pos = 255 - position;
    if pos < 85 {
        RGB8 {
            r: 255 - pos * 3,
            g: 0,
            b: pos * 3,
        }
    } else if pos < 170 {
        let pos = pos - 85;
        RGB8 {
            r: 0,
            g: pos * 3,
            b: 255 - pos * 3,
        }
    } else {
        let pos = pos - 170;
        RGB8 {
            r: pos * 3,
            g: 255 - pos * 3,
            b: 0,
        }
    }
}
