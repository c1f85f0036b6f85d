//! Scripted collaborators shared by the unit tests

use std::collections::VecDeque;
use std::string::{String, ToString};
use std::vec::Vec;

use embedded_hal_async::delay::DelayNs;
use rand_core::RngCore;
use smart_leds::RGB8;

use crate::animation::PixelSink;
use crate::app::{Board, NetworkInfo, NetworkLink};
use crate::remote::http::{HttpTransport, Method, Request, Response, TransportError};
use crate::remote::{RemoteClient, RemoteCredentials};
use crate::retry::RetryPolicy;
use crate::tag::{PAYLOAD_LEN, TagError, TagPayload, TagReader, URI_START_OFFSET};

pub const TOKEN: &str = "/api/token";
pub const DEVICES: &str = "/me/player/devices";
pub const PLAY: &str = "/me/player/play";
pub const SHUFFLE: &str = "/me/player/shuffle";
pub const NEXT: &str = "/me/player/next";

pub const TOKEN_OK: &str = r#"{"access_token":"fresh-token","token_type":"Bearer","expires_in":3600}"#;
pub const TWO_DEVICES: &str = r#"{"devices":[
    {"id":"aa11","is_active":false,"is_private_session":false,"is_restricted":false,"name":"Kitchen","type":"Speaker","volume_percent":40},
    {"id":"bb22","is_active":true,"is_private_session":false,"is_restricted":false,"name":"Living Room","type":"Speaker","volume_percent":65}
]}"#;
pub const MOVED_DEVICE: &str = r#"{"devices":[
    {"id":"cc33","is_active":true,"is_restricted":false,"name":"Living Room","type":"Speaker"}
]}"#;

pub type Scripted = Result<(u16, &'static str), TransportError>;

#[derive(Debug, Clone)]
pub struct Call {
    pub method: Method,
    pub url: String,
    pub bearer: Option<String>,
    pub body: Vec<u8>,
}

struct Route {
    method: Method,
    fragment: &'static str,
    script: VecDeque<Scripted>,
}

/// Answers requests by URL fragment. The last scripted answer of a route
/// repeats forever.
#[derive(Default)]
pub struct FakeTransport {
    routes: Vec<Route>,
    pub calls: Vec<Call>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, method: Method, fragment: &'static str, script: &[Scripted]) -> Self {
        self.set(method, fragment, script);
        self
    }

    pub fn set(&mut self, method: Method, fragment: &'static str, script: &[Scripted]) {
        let script: VecDeque<Scripted> = script.iter().cloned().collect();
        match self
            .routes
            .iter_mut()
            .find(|r| r.method == method && r.fragment == fragment)
        {
            Some(route) => route.script = script,
            None => self.routes.push(Route {
                method,
                fragment,
                script,
            }),
        }
    }

    pub fn count(&self, fragment: &str) -> usize {
        self.calls.iter().filter(|c| c.url.contains(fragment)).count()
    }

    pub fn urls(&self, fragment: &str) -> Vec<&str> {
        self.calls
            .iter()
            .filter(|c| c.url.contains(fragment))
            .map(|c| c.url.as_str())
            .collect()
    }
}

impl HttpTransport for FakeTransport {
    async fn send(&mut self, request: &Request<'_>) -> Result<Response, TransportError> {
        self.calls.push(Call {
            method: request.method,
            url: request.url.to_string(),
            bearer: request.bearer.map(|b| b.to_string()),
            body: request.body.to_vec(),
        });

        let route = self
            .routes
            .iter_mut()
            .find(|r| r.method == request.method && request.url.contains(r.fragment))
            .ok_or(TransportError::Connect)?;
        let next = if route.script.len() > 1 {
            route.script.pop_front()
        } else {
            route.script.front().cloned()
        };
        match next {
            Some(Ok((status, body))) => Ok(Response::new(status, body.as_bytes().to_vec())),
            Some(Err(e)) => Err(e),
            None => Err(TransportError::Connect),
        }
    }
}

#[derive(Default)]
pub struct RecordingDelay {
    pub waits: Vec<u32>,
}

impl DelayNs for RecordingDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.waits.push(ns / 1_000_000);
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.waits.push(ms);
    }
}

/// xorshift32
#[derive(Debug, Clone)]
pub struct SeqRng(u32);

impl SeqRng {
    pub fn new(seed: u32) -> Self {
        Self(seed.max(1))
    }
}

impl RngCore for SeqRng {
    fn next_u32(&mut self) -> u32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        x
    }

    fn next_u64(&mut self) -> u64 {
        ((self.next_u32() as u64) << 32) | self.next_u32() as u64
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        rand_core::impls::fill_bytes_via_next(self, dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

pub fn credentials() -> RemoteCredentials {
    RemoteCredentials {
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        refresh_token: "refresh".to_string(),
        target_name: "Living Room".to_string(),
    }
}

pub type TestClient = RemoteClient<FakeTransport, RecordingDelay, SeqRng>;

pub fn client(transport: FakeTransport) -> TestClient {
    RemoteClient::new(
        transport,
        RecordingDelay::default(),
        SeqRng::new(11),
        RetryPolicy::default(),
        credentials(),
    )
}

/// Raw tag bytes holding `path` at the URL offset
pub fn tag_payload(path: &str) -> TagPayload {
    let mut payload = [0u8; PAYLOAD_LEN];
    payload[..URI_START_OFFSET].fill(0x03);
    let end = URI_START_OFFSET + path.len();
    payload[URI_START_OFFSET..end].copy_from_slice(path.as_bytes());
    payload[end] = 0xFE;
    payload
}

pub struct FakeTag {
    /// Reported by the next presence poll
    pub presented: bool,
    /// Report presence on every poll
    pub lingering: bool,
    pub payload: Result<TagPayload, TagError>,
    pub init_result: Result<(), TagError>,
    pub inits: u32,
    pub detections: u32,
    pub reads: u32,
    pub releases: u32,
}

impl Default for FakeTag {
    fn default() -> Self {
        Self {
            presented: false,
            lingering: false,
            payload: Err(TagError::ReadFailed),
            init_result: Ok(()),
            inits: 0,
            detections: 0,
            reads: 0,
            releases: 0,
        }
    }
}

impl TagReader for FakeTag {
    fn init(&mut self) -> Result<(), TagError> {
        self.inits += 1;
        self.init_result
    }

    fn is_tag_present(&mut self) -> bool {
        let present = self.presented || self.lingering;
        self.presented = false;
        if present {
            self.detections += 1;
        }
        present
    }

    fn read_payload(&mut self, payload: &mut TagPayload) -> Result<(), TagError> {
        self.reads += 1;
        *payload = self.payload?;
        Ok(())
    }

    fn release(&mut self) {
        self.releases += 1;
    }
}

#[derive(Default)]
pub struct FakeNet {
    pub connected: bool,
    pub connect_on_join: bool,
    pub joins: u32,
    pub reconnects: u32,
    pub forgets: u32,
}

impl NetworkLink for FakeNet {
    fn begin_join(&mut self) {
        self.joins += 1;
        if self.connect_on_join {
            self.connected = true;
        }
    }

    fn is_connected(&mut self) -> bool {
        self.connected
    }

    fn reconnect(&mut self) {
        self.reconnects += 1;
    }

    fn info(&self) -> NetworkInfo {
        let mut ssid = heapless::String::new();
        let _ = ssid.push_str("testnet");
        NetworkInfo {
            ssid,
            ip: self.connected.then_some([192, 168, 1, 42]),
            rssi: self.connected.then_some(-61),
        }
    }

    fn forget_credentials(&mut self) {
        self.forgets += 1;
    }
}

#[derive(Default)]
pub struct FakeStrip {
    pub pushes: u32,
    pub last: Vec<RGB8>,
}

impl PixelSink for FakeStrip {
    type Error = ();

    fn push_frame(&mut self, frame: &[RGB8]) -> Result<(), Self::Error> {
        self.pushes += 1;
        self.last = frame.to_vec();
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeBoard {
    pub tag: FakeTag,
    pub net: FakeNet,
    pub strip: FakeStrip,
    pub audio: Option<u16>,
    pub audio_reads: u32,
    pub services_started: u32,
    pub restarts: u32,
}

impl FakeBoard {
    pub fn online() -> Self {
        Self {
            net: FakeNet {
                connect_on_join: true,
                ..FakeNet::default()
            },
            ..Self::default()
        }
    }
}

impl Board for FakeBoard {
    type Tag = FakeTag;
    type Net = FakeNet;
    type Strip = FakeStrip;

    fn tag_reader(&mut self) -> &mut FakeTag {
        &mut self.tag
    }

    fn network(&mut self) -> &mut FakeNet {
        &mut self.net
    }

    fn strip(&mut self) -> &mut FakeStrip {
        &mut self.strip
    }

    fn audio_level(&mut self) -> Option<u16> {
        self.audio_reads += 1;
        self.audio
    }

    fn start_services(&mut self) {
        self.services_started += 1;
    }

    fn restart(&mut self) {
        self.restarts += 1;
    }
}
