//! Minimal request/response contract between the remote client and the
//! board's HTTPS stack

use alloc::vec::Vec;
use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";

/// One outgoing request. An empty body is still sent with `Content-Length: 0`.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub method: Method,
    pub url: &'a str,
    pub bearer: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub body: &'a [u8],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    /// Transient answers worth another attempt
    pub fn should_retry(&self) -> bool {
        self.is_rate_limited() || self.is_server_error()
    }
}

/// Transport level failures. All of them are retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    Dns,
    Connect,
    Tls,
    Timeout,
    Io,
    ResponseTooLarge,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TransportError::Dns => "dns lookup failed",
            TransportError::Connect => "connection failed",
            TransportError::Tls => "tls handshake failed",
            TransportError::Timeout => "request timed out",
            TransportError::Io => "i/o error",
            TransportError::ResponseTooLarge => "response too large",
        };
        f.write_str(text)
    }
}

/// Perform one request and return status plus body.
///
/// Implementations bound every request with a timeout.
#[allow(async_fn_in_trait)]
pub trait HttpTransport {
    async fn send(&mut self, request: &Request<'_>) -> Result<Response, TransportError>;
}

/// Append `value` percent encoded for a query string or form body
pub fn push_encoded(out: &mut alloc::string::String, value: &str) {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    for &b in value.as_bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0F) as usize] as char);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;

    #[test]
    fn retry_classification() {
        assert!(Response::new(429, Vec::new()).should_retry());
        assert!(Response::new(503, Vec::new()).should_retry());
        assert!(!Response::new(401, Vec::new()).should_retry());
        assert!(!Response::new(404, Vec::new()).should_retry());
        assert!(!Response::new(400, Vec::new()).should_retry());
        assert!(Response::new(204, Vec::new()).is_success());
    }

    #[test]
    fn encoding_keeps_unreserved_bytes() {
        let mut out = String::new();
        push_encoded(&mut out, "AQB-x_y.z~ a/b+c");
        assert_eq!(out, "AQB-x_y.z~%20a%2Fb%2Bc");
    }
}
