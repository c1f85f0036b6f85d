//! The player: one owner for the state machine, the remote client and the
//! LED engine, advanced by a periodic [`Player::tick`].
//!
//! Each tick performs at most one state transition, runs the entry actions of
//! the new state, then renders one LED frame, so a mode change requested by a
//! transition is visible in the same tick.

use alloc::string::{String, ToString};

use embedded_hal_async::delay::DelayNs;
use log::{info, warn};
use rand_core::RngCore;

use crate::animation::{AnimationEngine, LedMode, PixelSink};
use crate::config;
use crate::remote::http::HttpTransport;
use crate::remote::{RemoteClient, RemoteError};
use crate::state_machine::{AppEvent, LifecycleState, StateMachine, StateTransition};
use crate::tag::{ContentId, PAYLOAD_LEN, TagReader, translate_payload};
use crate::web_api::{
    ApiRequest, DeviceSelected, HttpReply, STATUS_PAGE, StatusSnapshot, WifiStatus, format_ip,
};

/// Timing knobs of the player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerConfig {
    pub boot_animation_ms: u64,
    pub network_join_timeout_ms: u64,
    pub remote_init_timeout_ms: u64,
    pub remote_init_retry_ms: u64,
    pub tag_debounce_ms: u64,
    pub feedback_ms: u64,
    pub network_check_interval_ms: u64,
    pub reconnect_timeout_ms: u64,
    pub error_restart_delay_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            boot_animation_ms: config::BOOT_ANIMATION_MS,
            network_join_timeout_ms: config::NETWORK_JOIN_TIMEOUT_MS,
            remote_init_timeout_ms: config::REMOTE_INIT_TIMEOUT_MS,
            remote_init_retry_ms: config::REMOTE_INIT_RETRY_MS,
            tag_debounce_ms: config::TAG_DEBOUNCE_MS,
            feedback_ms: config::FEEDBACK_DURATION_MS,
            network_check_interval_ms: config::NETWORK_CHECK_INTERVAL_MS,
            reconnect_timeout_ms: config::RECONNECT_TIMEOUT_MS,
            error_restart_delay_ms: config::ERROR_RESTART_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkInfo {
    pub ssid: heapless::String<32>,
    pub ip: Option<[u8; 4]>,
    pub rssi: Option<i8>,
}

/// Station link, polled by the player. None of these calls may block.
pub trait NetworkLink {
    /// Start joining the configured network
    fn begin_join(&mut self);

    fn is_connected(&mut self) -> bool;

    /// Kick a new join attempt after the link dropped
    fn reconnect(&mut self);

    fn info(&self) -> NetworkInfo;

    /// Drop the stored station credentials
    fn forget_credentials(&mut self);
}

/// Peripherals of the board
pub trait Board {
    type Tag: TagReader;
    type Net: NetworkLink;
    type Strip: PixelSink;

    fn tag_reader(&mut self) -> &mut Self::Tag;
    fn network(&mut self) -> &mut Self::Net;
    fn strip(&mut self) -> &mut Self::Strip;

    /// Ambient sound level, 0..=1023
    fn audio_level(&mut self) -> Option<u16>;

    /// Bring up the web server once the network is up
    fn start_services(&mut self);

    fn restart(&mut self);
}

pub struct Player<B, H, D, R, const LEDS: usize> {
    board: B,
    remote: RemoteClient<H, D, R>,
    machine: StateMachine,
    leds: AnimationEngine<R, LEDS>,
    config: PlayerConfig,
    remote_ready: bool,
    last_remote_attempt_ms: Option<u64>,
    last_detection_ms: Option<u64>,
    last_network_check_ms: u64,
    pending_content: Option<ContentId>,
    last_played: Option<ContentId>,
    last_error: Option<String>,
    pending_restart: bool,
    restart_issued: bool,
}

impl<B, H, D, R, const LEDS: usize> Player<B, H, D, R, LEDS>
where
    B: Board,
    H: HttpTransport,
    D: DelayNs,
    R: RngCore,
{
    pub fn new(
        board: B,
        remote: RemoteClient<H, D, R>,
        led_rng: R,
        config: PlayerConfig,
        now_ms: u64,
    ) -> Self {
        let mut player = Self {
            board,
            remote,
            machine: StateMachine::new(now_ms),
            leds: AnimationEngine::new(led_rng),
            config,
            remote_ready: false,
            last_remote_attempt_ms: None,
            last_detection_ms: None,
            last_network_check_ms: now_ms,
            pending_content: None,
            last_played: None,
            last_error: None,
            pending_restart: false,
            restart_issued: false,
        };
        player.enter(now_ms);
        player
    }

    pub fn state(&self) -> LifecycleState {
        self.machine.current()
    }

    pub fn transitions(&self) -> u32 {
        self.machine.transitions()
    }

    pub fn led_mode(&self) -> LedMode {
        self.leds.mode()
    }

    pub fn frame(&self) -> &[smart_leds::RGB8] {
        self.leds.frame()
    }

    pub fn remote(&self) -> &RemoteClient<H, D, R> {
        &self.remote
    }

    pub fn remote_mut(&mut self) -> &mut RemoteClient<H, D, R> {
        &mut self.remote
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_played(&self) -> Option<&ContentId> {
        self.last_played.as_ref()
    }

    /// One scheduler step
    pub async fn tick(&mut self, now_ms: u64) {
        if self.pending_restart {
            self.pending_restart = false;
            info!("[STATE] Restart requested");
            self.board.restart();
            return;
        }

        let event = match self.check_network(now_ms) {
            Some(event) => Some(event),
            None => self.poll(now_ms).await,
        };

        if let Some(event) = event {
            if let StateTransition::Transition(_) = self.machine.handle_event(event, now_ms) {
                self.enter(now_ms);
            }
        }

        if self.leds.wants_audio(now_ms) {
            if let Some(level) = self.board.audio_level() {
                self.leds.sample_audio(level, now_ms);
            }
        }

        if self.leds.render(now_ms) {
            if let Err(e) = self.board.strip().push_frame(self.leds.frame()) {
                warn!("[LED] Frame push failed: {:?}", e);
            }
        }
    }

    fn check_network(&mut self, now_ms: u64) -> Option<AppEvent> {
        if !self.state().monitors_network()
            || now_ms.saturating_sub(self.last_network_check_ms)
                < self.config.network_check_interval_ms
        {
            return None;
        }
        self.last_network_check_ms = now_ms;
        if self.board.network().is_connected() {
            None
        } else {
            warn!("[STATE] Network lost");
            Some(AppEvent::NetworkLost)
        }
    }

    /// Handler of the current state, returns the event it produced
    async fn poll(&mut self, now_ms: u64) -> Option<AppEvent> {
        let elapsed = self.machine.elapsed_ms(now_ms);
        match self.state() {
            LifecycleState::Boot => {
                (elapsed >= self.config.boot_animation_ms).then_some(AppEvent::BootAnimationDone)
            }
            LifecycleState::NetworkConnecting => {
                if self.board.network().is_connected() {
                    Some(AppEvent::NetworkJoined)
                } else if elapsed >= self.config.network_join_timeout_ms {
                    warn!("[STATE] Network join timed out");
                    Some(AppEvent::NetworkJoinTimedOut)
                } else {
                    None
                }
            }
            LifecycleState::NetworkConnected => Some(AppEvent::ServicesStarted),
            LifecycleState::RemoteInitializing => self.poll_remote_init(now_ms, elapsed).await,
            LifecycleState::Idle => self.poll_tag(now_ms),
            LifecycleState::TagDetected => Some(AppEvent::ReadStarted),
            LifecycleState::TagReading => Some(self.read_tag()),
            LifecycleState::TagProcessing => Some(self.play_pending().await),
            LifecycleState::CommandSucceeded | LifecycleState::CommandFailed => {
                (elapsed >= self.config.feedback_ms).then_some(AppEvent::FeedbackElapsed)
            }
            LifecycleState::ErrorRecovery => {
                if !self.restart_issued && elapsed >= self.config.error_restart_delay_ms {
                    self.restart_issued = true;
                    warn!("[STATE] Restarting device");
                    self.board.restart();
                }
                None
            }
            LifecycleState::NetworkReconnecting => {
                if self.board.network().is_connected() {
                    info!("[STATE] Network restored");
                    Some(AppEvent::NetworkRestored)
                } else if elapsed >= self.config.reconnect_timeout_ms {
                    warn!("[STATE] Reconnect timed out");
                    Some(AppEvent::ReconnectTimedOut)
                } else {
                    None
                }
            }
        }
    }

    async fn poll_remote_init(&mut self, now_ms: u64, elapsed: u64) -> Option<AppEvent> {
        if !self.remote.has_credentials() {
            info!("[REMOTE] Not configured, waiting for setup");
            self.record_error(&RemoteError::NotConfigured);
            return Some(AppEvent::RemoteNotConfigured);
        }
        if elapsed >= self.config.remote_init_timeout_ms {
            warn!("[REMOTE] Initialization timed out");
            return Some(AppEvent::RemoteInitTimedOut);
        }
        if self
            .last_remote_attempt_ms
            .is_some_and(|last| now_ms.saturating_sub(last) < self.config.remote_init_retry_ms)
        {
            return None;
        }

        self.last_remote_attempt_ms = Some(now_ms);
        match self.remote.begin().await {
            Ok(()) => {
                self.remote_ready = true;
                self.last_error = None;
                Some(AppEvent::RemoteReady)
            }
            Err(RemoteError::NotConfigured) => Some(AppEvent::RemoteNotConfigured),
            Err(e) => {
                warn!("[REMOTE] Initialization failed: {}", e);
                self.record_error(&e);
                None
            }
        }
    }

    fn poll_tag(&mut self, now_ms: u64) -> Option<AppEvent> {
        if self
            .last_detection_ms
            .is_some_and(|last| now_ms.saturating_sub(last) < self.config.tag_debounce_ms)
        {
            return None;
        }
        if !self.board.tag_reader().is_tag_present() {
            return None;
        }
        info!("[TAG] Tag detected");
        self.last_detection_ms = Some(now_ms);
        Some(AppEvent::TagPresent)
    }

    fn read_tag(&mut self) -> AppEvent {
        let reader = self.board.tag_reader();
        let mut payload = [0u8; PAYLOAD_LEN];
        let result = reader
            .read_payload(&mut payload)
            .and_then(|()| translate_payload(&payload));
        reader.release();

        match result {
            Ok(content) => {
                info!("[TAG] Read {}", content);
                self.pending_content = Some(content);
                AppEvent::TagDecoded
            }
            Err(e) => {
                warn!("[TAG] Unusable tag: {}", e);
                self.record_error(&e);
                AppEvent::TagRejected
            }
        }
    }

    async fn play_pending(&mut self) -> AppEvent {
        let Some(content) = self.pending_content.take() else {
            return AppEvent::PlaybackFailed;
        };
        match self.remote.start_playback(&content).await {
            Ok(()) => {
                self.last_played = Some(content);
                self.last_error = None;
                AppEvent::PlaybackStarted
            }
            Err(e) => {
                warn!("[REMOTE] Could not play {}: {}", content, e);
                self.record_error(&e);
                AppEvent::PlaybackFailed
            }
        }
    }

    /// Entry actions of the state just entered
    fn enter(&mut self, now_ms: u64) {
        match self.state() {
            LifecycleState::Boot => self.leds.set_mode(LedMode::Startup),
            LifecycleState::NetworkConnecting => {
                self.leds.set_mode(LedMode::WifiConnecting);
                self.board.network().begin_join();
            }
            LifecycleState::NetworkConnected => {
                if let Err(e) = self.board.tag_reader().init() {
                    warn!("[TAG] Reader init failed: {}", e);
                }
                self.board.start_services();
                self.last_network_check_ms = now_ms;
            }
            LifecycleState::RemoteInitializing => {
                self.leds.set_mode(LedMode::RemoteConnecting);
                self.last_remote_attempt_ms = None;
            }
            LifecycleState::Idle => {
                let mode = if self.remote_ready {
                    LedMode::Idle
                } else {
                    LedMode::RemoteError
                };
                self.leds.set_mode(mode);
            }
            LifecycleState::TagDetected => self.leds.set_mode(LedMode::TagReading),
            LifecycleState::TagReading => {}
            LifecycleState::TagProcessing => self.leds.set_mode(LedMode::TagProcessing),
            LifecycleState::CommandSucceeded => self.leds.set_mode(LedMode::TagSuccess),
            LifecycleState::CommandFailed => self.leds.set_mode(LedMode::TagFailure),
            LifecycleState::ErrorRecovery => self.leds.set_mode(LedMode::WifiError),
            LifecycleState::NetworkReconnecting => {
                self.leds.set_mode(LedMode::WifiError);
                self.board.network().reconnect();
            }
        }
    }

    fn record_error(&mut self, error: &dyn core::fmt::Display) {
        self.last_error = Some(error.to_string());
    }

    pub fn status(&mut self) -> StatusSnapshot {
        let session = self.remote.session();
        StatusSnapshot {
            state: self.machine.current().name(),
            authenticated: self.remote.is_authenticated(),
            device_available: self.remote.has_target(),
            current_device_id: session.target_id.clone(),
            current_device_name: session.target_name.clone(),
            last_played: self.last_played.as_ref().map(|c| c.as_str().to_string()),
            last_error: self.last_error.clone(),
            ip_address: self.board.network().info().ip.map(format_ip),
        }
    }

    /// Answer one web request. Restarts happen on the next tick so the
    /// reply can go out first.
    pub async fn handle_api(&mut self, request: &ApiRequest) -> HttpReply {
        match request {
            ApiRequest::StatusPage => HttpReply::html(STATUS_PAGE),
            ApiRequest::Status => {
                let status = self.status();
                HttpReply::json_value(200, &status)
            }
            ApiRequest::Devices => match self.remote.list_targets().await {
                Ok(targets) => HttpReply::json_value(200, &targets),
                Err(e) => {
                    warn!("[WEB] Device list unavailable: {}", e);
                    HttpReply::json(200, "[]".to_string())
                }
            },
            ApiRequest::SelectDevice { device_id } => self.select_device(device_id).await,
            ApiRequest::Wifi => {
                let info = self.board.network().info();
                HttpReply::json_value(
                    200,
                    &WifiStatus {
                        ssid: info.ssid.as_str(),
                        ip: info.ip.map(format_ip),
                        rssi: info.rssi,
                    },
                )
            }
            ApiRequest::WifiReset => {
                info!("[WEB] WiFi reset requested");
                self.board.network().forget_credentials();
                self.pending_restart = true;
                HttpReply::success("WiFi settings will be reset")
            }
            ApiRequest::Restart => {
                info!("[WEB] Restart requested");
                self.pending_restart = true;
                HttpReply::success("Device restarting")
            }
            ApiRequest::NotFound => HttpReply::not_found(),
            ApiRequest::MethodNotAllowed => HttpReply::error(405, "Method not allowed"),
            ApiRequest::BadRequest(message) => HttpReply::error(400, message),
        }
    }

    async fn select_device(&mut self, device_id: &str) -> HttpReply {
        let reply = match self.remote.select_target_by_id(device_id).await {
            Ok(name) => HttpReply::json_value(
                200,
                &DeviceSelected {
                    success: true,
                    device_id,
                    device_name: name,
                },
            ),
            Err(e) => {
                warn!("[WEB] Device selection failed: {}", e);
                return HttpReply::error(404, "Device not found or unavailable");
            }
        };

        self.remote_ready = true;
        if self.state() == LifecycleState::Idle {
            self.leds.set_mode(LedMode::DeviceSelected);
        }
        reply
    }
}
