//! Remote playback control client
//!
//! Owns the access token lifecycle and the selected playback target. Every
//! call goes through [`RetryPolicy`]; transient failures (transport errors,
//! 429, 5xx) are retried with jittered backoff, other statuses are returned
//! to the command that issued them. A rejected access token is refreshed and a
//! vanished target rediscovered at most once per public call.

pub mod http;

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use embedded_hal_async::delay::DelayNs;
use log::{debug, info, warn};
use rand_core::RngCore;
use serde::{Deserialize, Serialize};

use crate::config::{API_BASE_URL, TOKEN_URL};
use crate::retry::RetryPolicy;
use crate::tag::ContentId;
use http::{CONTENT_TYPE_FORM, CONTENT_TYPE_JSON, HttpTransport, Method, Request, Response};

/// Out-of-band credentials and the name of the preferred target
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub target_name: String,
}

impl RemoteCredentials {
    pub fn is_complete(&self) -> bool {
        !self.client_id.is_empty()
            && !self.client_secret.is_empty()
            && !self.refresh_token.is_empty()
            && !self.target_name.is_empty()
    }
}

/// Mutable session state, only changed as the result of a client call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteSession {
    pub access_token: Option<String>,
    pub target_id: Option<String>,
    pub target_name: Option<String>,
}

/// Playback target as reported by the devices endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub is_active: bool,
    pub is_restricted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteError {
    /// Credentials or target name missing
    NotConfigured,
    /// Token exchange rejected
    Auth { status: u16 },
    /// No target with the configured name or id
    TargetNotFound,
    /// Command needs a target but none is selected
    NoTarget,
    /// Transport failed on every attempt
    Network,
    /// Response body did not decode
    Decode,
    /// Non playback command answered with an error status
    Rejected { status: u16 },
    /// Playback command failed after recovery
    Playback { status: u16 },
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::NotConfigured => f.write_str("credentials not configured"),
            RemoteError::Auth { status } => write!(f, "authentication failed ({})", status),
            RemoteError::TargetNotFound => f.write_str("device not found"),
            RemoteError::NoTarget => f.write_str("no device selected"),
            RemoteError::Network => f.write_str("network error"),
            RemoteError::Decode => f.write_str("unexpected response"),
            RemoteError::Rejected { status } => write!(f, "request rejected ({})", status),
            RemoteError::Playback { status } => write!(f, "playback failed ({})", status),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct DeviceList {
    #[serde(default)]
    devices: Vec<RawDevice>,
}

#[derive(Deserialize)]
struct RawDevice {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    is_active: bool,
    #[serde(default)]
    is_restricted: bool,
}

#[derive(Serialize)]
struct PlayBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    context_uri: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uris: Option<[&'a str; 1]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<PlayOffset>,
    position_ms: u32,
}

#[derive(Serialize)]
struct PlayOffset {
    position: u32,
}

/// Per call recovery budget
#[derive(Debug, Default)]
struct Recovery {
    refreshed: bool,
    rediscovered: bool,
}

pub struct RemoteClient<H, D, R> {
    transport: H,
    delay: D,
    rng: R,
    policy: RetryPolicy,
    credentials: RemoteCredentials,
    session: RemoteSession,
}

impl<H, D, R> RemoteClient<H, D, R>
where
    H: HttpTransport,
    D: DelayNs,
    R: RngCore,
{
    pub fn new(
        transport: H,
        delay: D,
        rng: R,
        policy: RetryPolicy,
        credentials: RemoteCredentials,
    ) -> Self {
        Self {
            transport,
            delay,
            rng,
            policy,
            credentials,
            session: RemoteSession::default(),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_complete()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.access_token.is_some()
    }

    pub fn has_target(&self) -> bool {
        self.session.target_id.is_some()
    }

    pub fn session(&self) -> &RemoteSession {
        &self.session
    }

    pub fn credentials(&self) -> &RemoteCredentials {
        &self.credentials
    }

    pub fn transport(&self) -> &H {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut H {
        &mut self.transport
    }

    /// Fetch an access token and resolve the configured target
    pub async fn begin(&mut self) -> Result<(), RemoteError> {
        if !self.has_credentials() {
            return Err(RemoteError::NotConfigured);
        }
        self.refresh_access_credential().await?;
        self.discover_target().await
    }

    /// Exchange the refresh token for a new access token
    pub async fn refresh_access_credential(&mut self) -> Result<(), RemoteError> {
        let creds = &self.credentials;
        if creds.client_id.is_empty()
            || creds.client_secret.is_empty()
            || creds.refresh_token.is_empty()
        {
            return Err(RemoteError::NotConfigured);
        }

        let mut form = String::from("grant_type=refresh_token&refresh_token=");
        http::push_encoded(&mut form, &creds.refresh_token);
        form.push_str("&client_id=");
        http::push_encoded(&mut form, &creds.client_id);
        form.push_str("&client_secret=");
        http::push_encoded(&mut form, &creds.client_secret);

        info!("[REMOTE] Refreshing access token");
        let response = self
            .execute(Method::Post, TOKEN_URL, Some(CONTENT_TYPE_FORM), form.as_bytes(), false)
            .await?;
        if !response.is_success() {
            warn!("[REMOTE] Token refresh rejected: {}", response.status);
            self.session.access_token = None;
            return Err(RemoteError::Auth {
                status: response.status,
            });
        }

        let token: TokenResponse =
            serde_json::from_slice(&response.body).map_err(|_| RemoteError::Decode)?;
        if token.access_token.is_empty() {
            return Err(RemoteError::Decode);
        }
        if let Some(rotated) = token.refresh_token.filter(|t| !t.is_empty()) {
            debug!("[REMOTE] Refresh token rotated");
            self.credentials.refresh_token = rotated;
        }
        self.session.access_token = Some(token.access_token);
        Ok(())
    }

    /// All targets currently visible to the account
    pub async fn list_targets(&mut self) -> Result<Vec<Target>, RemoteError> {
        let mut recovery = Recovery::default();
        self.fetch_targets(&mut recovery).await
    }

    /// Resolve the configured target name (exact, case sensitive)
    pub async fn discover_target(&mut self) -> Result<(), RemoteError> {
        let mut recovery = Recovery::default();
        self.resolve_target(&mut recovery).await
    }

    /// Select a target by id after checking it is still available
    pub async fn select_target_by_id(&mut self, id: &str) -> Result<&str, RemoteError> {
        if id.is_empty() {
            return Err(RemoteError::TargetNotFound);
        }
        let mut recovery = Recovery::default();
        let targets = self.fetch_targets(&mut recovery).await?;
        let Some(target) = targets.into_iter().find(|t| t.id == id) else {
            warn!("[REMOTE] Device id {} not available", id);
            return Err(RemoteError::TargetNotFound);
        };

        info!("[REMOTE] Device set to {}", target.name);
        self.credentials.target_name = target.name.clone();
        self.session.target_id = Some(target.id);
        self.session.target_name = Some(target.name);
        Ok(self.session.target_name.as_deref().unwrap_or_default())
    }

    /// Start `content` on the selected target, then turn shuffle on
    pub async fn start_playback(&mut self, content: &ContentId) -> Result<(), RemoteError> {
        if !self.has_credentials() {
            return Err(RemoteError::NotConfigured);
        }
        if !self.has_target() {
            return Err(RemoteError::NoTarget);
        }

        let body = play_body(content)?;
        info!("[REMOTE] Playing {}", content);

        let mut recovery = Recovery::default();
        let response = self
            .send_to_target(
                &mut recovery,
                Method::Put,
                "/me/player/play",
                None,
                Some(CONTENT_TYPE_JSON),
                &body,
            )
            .await?;
        if !response.is_success() {
            warn!("[REMOTE] Play failed with {}", response.status);
            return Err(RemoteError::Playback {
                status: response.status,
            });
        }

        if let Err(e) = self.set_shuffle(true).await {
            warn!("[REMOTE] Could not enable shuffle: {}", e);
        }
        Ok(())
    }

    pub async fn set_shuffle(&mut self, enabled: bool) -> Result<(), RemoteError> {
        let state = if enabled { "true" } else { "false" };
        let mut recovery = Recovery::default();
        let response = self
            .send_to_target(&mut recovery, Method::Put, "/me/player/shuffle", Some(state), None, &[])
            .await?;
        expect_success(&response)
    }

    pub async fn skip_to_next(&mut self) -> Result<(), RemoteError> {
        info!("[REMOTE] Skipping to next track");
        let mut recovery = Recovery::default();
        let response = self
            .send_to_target(&mut recovery, Method::Post, "/me/player/next", None, None, &[])
            .await?;
        expect_success(&response)
    }

    /// Target scoped command. A 404 drops the target; it is rediscovered
    /// and the command repeated at most once per call.
    async fn send_to_target(
        &mut self,
        recovery: &mut Recovery,
        method: Method,
        path: &str,
        state: Option<&str>,
        content_type: Option<&str>,
        body: &[u8],
    ) -> Result<Response, RemoteError> {
        loop {
            let target = self.session.target_id.as_deref().ok_or(RemoteError::NoTarget)?;
            let url = target_url(path, state, target);
            let response = self
                .send_authorized(recovery, method, &url, content_type, body)
                .await?;
            if !response.is_not_found() {
                return Ok(response);
            }

            self.session.target_id = None;
            if recovery.rediscovered {
                return Ok(response);
            }
            recovery.rediscovered = true;
            warn!("[REMOTE] Device not found, rediscovering");
            if let Err(e) = self.resolve_target(recovery).await {
                warn!("[REMOTE] Rediscovery failed: {}", e);
                return Ok(response);
            }
        }
    }

    async fn resolve_target(&mut self, recovery: &mut Recovery) -> Result<(), RemoteError> {
        if self.credentials.target_name.is_empty() {
            return Err(RemoteError::NotConfigured);
        }
        let targets = self.fetch_targets(recovery).await?;
        let wanted = self.credentials.target_name.as_str();
        let Some(target) = targets.into_iter().find(|t| t.name == wanted) else {
            warn!("[REMOTE] Device '{}' not found", wanted);
            return Err(RemoteError::TargetNotFound);
        };

        info!("[REMOTE] Found device {} ({})", target.name, target.id);
        self.session.target_id = Some(target.id);
        self.session.target_name = Some(target.name);
        Ok(())
    }

    async fn fetch_targets(&mut self, recovery: &mut Recovery) -> Result<Vec<Target>, RemoteError> {
        let url = format!("{}/me/player/devices", API_BASE_URL);
        let response = self
            .send_authorized(recovery, Method::Get, &url, None, &[])
            .await?;
        expect_success(&response)?;

        let list: DeviceList =
            serde_json::from_slice(&response.body).map_err(|_| RemoteError::Decode)?;
        Ok(list
            .devices
            .into_iter()
            .filter_map(|d| {
                let id = d.id.filter(|id| !id.is_empty())?;
                Some(Target {
                    id,
                    name: d.name,
                    kind: d.kind,
                    is_active: d.is_active,
                    is_restricted: d.is_restricted,
                })
            })
            .collect())
    }

    /// Bearer request with the single refresh allowed by `recovery`
    async fn send_authorized(
        &mut self,
        recovery: &mut Recovery,
        method: Method,
        url: &str,
        content_type: Option<&str>,
        body: &[u8],
    ) -> Result<Response, RemoteError> {
        if self.session.access_token.is_none() && !recovery.refreshed {
            recovery.refreshed = true;
            self.refresh_access_credential().await?;
        }

        loop {
            let response = self.execute(method, url, content_type, body, true).await?;
            if response.is_unauthorized() && !recovery.refreshed {
                recovery.refreshed = true;
                warn!("[REMOTE] Access token rejected, refreshing");
                self.session.access_token = None;
                self.refresh_access_credential().await?;
                continue;
            }
            if response.is_unauthorized() {
                // Refresh budget spent; the next call starts with a refresh
                self.session.access_token = None;
            }
            return Ok(response);
        }
    }

    /// One command under the retry policy.
    ///
    /// Returns the last response once attempts are exhausted on 429/5xx, or
    /// `Network` if the transport never answered.
    async fn execute(
        &mut self,
        method: Method,
        url: &str,
        content_type: Option<&str>,
        body: &[u8],
        with_bearer: bool,
    ) -> Result<Response, RemoteError> {
        let attempts = self.policy.max_attempts.max(1);
        let mut last = Err(RemoteError::Network);

        for attempt in 0..attempts {
            let request = Request {
                method,
                url,
                bearer: if with_bearer {
                    self.session.access_token.as_deref()
                } else {
                    None
                },
                content_type,
                body,
            };
            debug!("[REMOTE] {} {}", method.as_str(), url);

            match self.transport.send(&request).await {
                Ok(response) if !response.should_retry() => return Ok(response),
                Ok(response) => {
                    warn!("[REMOTE] {} answered {}", url, response.status);
                    last = Ok(response);
                }
                Err(e) => {
                    warn!("[REMOTE] {} failed: {}", url, e);
                    last = Err(RemoteError::Network);
                }
            }

            if attempt + 1 < attempts {
                let wait = self.policy.delay_ms(attempt, &mut self.rng);
                info!("[REMOTE] Retrying in {}ms", wait);
                self.delay.delay_ms(wait).await;
            }
        }

        warn!("[REMOTE] Giving up after {} attempts", attempts);
        last
    }
}

fn expect_success(response: &Response) -> Result<(), RemoteError> {
    if response.is_success() {
        Ok(())
    } else if response.is_unauthorized() {
        Err(RemoteError::Auth {
            status: response.status,
        })
    } else {
        Err(RemoteError::Rejected {
            status: response.status,
        })
    }
}

fn target_url(path: &str, state: Option<&str>, target: &str) -> String {
    let mut url = String::from(API_BASE_URL);
    url.push_str(path);
    url.push('?');
    if let Some(state) = state {
        url.push_str("state=");
        url.push_str(state);
        url.push('&');
    }
    url.push_str("device_id=");
    http::push_encoded(&mut url, target);
    url
}

fn play_body(content: &ContentId) -> Result<Vec<u8>, RemoteError> {
    let kind = content.kind();
    let body = if kind.is_single_item() {
        PlayBody {
            context_uri: None,
            uris: Some([content.as_str()]),
            offset: None,
            position_ms: 0,
        }
    } else {
        PlayBody {
            context_uri: Some(content.as_str()),
            uris: None,
            offset: kind.accepts_offset().then_some(PlayOffset { position: 0 }),
            position_ms: 0,
        }
    };
    serde_json::to_vec(&body).map_err(|_| RemoteError::Decode)
}

#[cfg(test)]
mod tests;
