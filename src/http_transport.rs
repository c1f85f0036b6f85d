//! HTTPS transport for the remote client
//!
//! One TLS connection per request through `reqwless` on the shared
//! embassy-net stack. Certificates are not verified; the device has no
//! trust store.

use alloc::string::String;
use alloc::vec::Vec;

use embassy_net::dns::DnsSocket;
use embassy_net::tcp::client::TcpClient;
use embassy_time::{Duration, with_timeout};
use esp_println::println;
use rand_core::RngCore;
use reqwless::client::{HttpClient, TlsConfig, TlsVerify};
use reqwless::request::RequestBuilder;
use tagplay_core::remote::http::{HttpTransport, Method, Request, Response, TransportError};

use crate::config;
use crate::rng::HwRng;

pub const TLS_READ_BUF_SIZE: usize = 16_640;
pub const TLS_WRITE_BUF_SIZE: usize = 4_096;
pub const RESPONSE_BUF_SIZE: usize = 8_192;

pub const TCP_BUF_SIZE: usize = 4_096;

pub type HttpsTcpClient = TcpClient<'static, 1, TCP_BUF_SIZE, TCP_BUF_SIZE>;

/// Scratch space for one exchange
pub struct TransportBuffers {
    pub tls_read: [u8; TLS_READ_BUF_SIZE],
    pub tls_write: [u8; TLS_WRITE_BUF_SIZE],
    pub response: [u8; RESPONSE_BUF_SIZE],
}

impl TransportBuffers {
    pub const fn new() -> Self {
        Self {
            tls_read: [0; TLS_READ_BUF_SIZE],
            tls_write: [0; TLS_WRITE_BUF_SIZE],
            response: [0; RESPONSE_BUF_SIZE],
        }
    }
}

impl Default for TransportBuffers {
    fn default() -> Self {
        Self::new()
    }
}

pub struct HttpsTransport {
    tcp: &'static HttpsTcpClient,
    dns: &'static DnsSocket<'static>,
    buffers: &'static mut TransportBuffers,
    rng: HwRng,
    timeout: Duration,
}

impl HttpsTransport {
    pub fn new(
        tcp: &'static HttpsTcpClient,
        dns: &'static DnsSocket<'static>,
        buffers: &'static mut TransportBuffers,
        rng: HwRng,
    ) -> Self {
        Self {
            tcp,
            dns,
            buffers,
            rng,
            timeout: Duration::from_millis(config::HTTP_REQUEST_TIMEOUT_MS),
        }
    }

    async fn exchange(&mut self, request: &Request<'_>) -> Result<Response, reqwless::Error> {
        let seed = self.rng.next_u64();
        let TransportBuffers {
            tls_read,
            tls_write,
            response: rx,
        } = &mut *self.buffers;
        let tls = TlsConfig::new(seed, tls_read, tls_write, TlsVerify::None);
        let mut client = HttpClient::new_with_tls(self.tcp, self.dns, tls);

        let bearer = request.bearer.map(|token| {
            let mut value = String::with_capacity(token.len() + 7);
            value.push_str("Bearer ");
            value.push_str(token);
            value
        });

        let mut headers: heapless::Vec<(&str, &str), 2> = heapless::Vec::new();
        if let Some(value) = bearer.as_deref() {
            let _ = headers.push(("Authorization", value));
        }
        if let Some(content_type) = request.content_type {
            let _ = headers.push(("Content-Type", content_type));
        }

        let mut handle = client
            .request(method(request.method), request.url)
            .await?
            .headers(&headers[..])
            .body(request.body);
        let response = handle.send(rx).await?;

        let status = response.status.0;
        let body = response.body().read_to_end().await?;
        Ok(Response::new(status, Vec::from(&body[..])))
    }
}

impl HttpTransport for HttpsTransport {
    async fn send(&mut self, request: &Request<'_>) -> Result<Response, TransportError> {
        let timeout = self.timeout;
        match with_timeout(timeout, self.exchange(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                println!(
                    "[HTTP] {} {} failed: {:?}",
                    request.method.as_str(),
                    request.url,
                    e
                );
                Err(map_error(e))
            }
            Err(_) => {
                println!("[HTTP] {} {} timed out", request.method.as_str(), request.url);
                Err(TransportError::Timeout)
            }
        }
    }
}

fn method(method: Method) -> reqwless::request::Method {
    match method {
        Method::Get => reqwless::request::Method::GET,
        Method::Post => reqwless::request::Method::POST,
        Method::Put => reqwless::request::Method::PUT,
    }
}

fn map_error(error: reqwless::Error) -> TransportError {
    match error {
        reqwless::Error::Dns => TransportError::Dns,
        reqwless::Error::Tls(_) => TransportError::Tls,
        reqwless::Error::BufferTooSmall => TransportError::ResponseTooLarge,
        reqwless::Error::Network(_) => TransportError::Connect,
        _ => TransportError::Io,
    }
}
