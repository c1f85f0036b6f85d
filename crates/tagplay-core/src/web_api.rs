//! Routing and reply encoding for the device selection web surface
//!
//! The firmware's HTTP server collects raw request bytes, [`ApiRequest::parse`]
//! turns them into a route, the player answers with an [`HttpReply`].

use alloc::format;
use alloc::string::{String, ToString};
use serde::{Deserialize, Serialize};

/// Largest request the server accepts
pub const MAX_REQUEST_LEN: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiRequest {
    StatusPage,
    Status,
    Devices,
    SelectDevice { device_id: String },
    Wifi,
    WifiReset,
    Restart,
    NotFound,
    MethodNotAllowed,
    BadRequest(&'static str),
}

#[derive(Deserialize)]
struct SelectBody {
    device_id: Option<String>,
}

impl ApiRequest {
    pub fn parse(raw: &[u8]) -> Self {
        let Some(head_end) = find_head_end(raw) else {
            return ApiRequest::BadRequest("Malformed request");
        };
        let Ok(head) = core::str::from_utf8(&raw[..head_end]) else {
            return ApiRequest::BadRequest("Malformed request");
        };
        let body = &raw[head_end + 4..];

        let mut parts = head.lines().next().unwrap_or_default().split_whitespace();
        let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
            return ApiRequest::BadRequest("Malformed request");
        };
        let path = target.split('?').next().unwrap_or(target);

        match (method, path) {
            ("GET", "/") => ApiRequest::StatusPage,
            ("GET", "/api/status") => ApiRequest::Status,
            ("GET", "/api/devices") => ApiRequest::Devices,
            ("GET", "/api/wifi") => ApiRequest::Wifi,
            ("POST", "/api/device") => Self::select_device(body),
            ("POST", "/api/wifi/reset") => ApiRequest::WifiReset,
            ("POST", "/api/restart") => ApiRequest::Restart,
            (_, "/" | "/api/status" | "/api/devices" | "/api/wifi" | "/api/device")
            | (_, "/api/wifi/reset" | "/api/restart") => ApiRequest::MethodNotAllowed,
            _ => ApiRequest::NotFound,
        }
    }

    fn select_device(body: &[u8]) -> Self {
        if body.iter().all(u8::is_ascii_whitespace) {
            return ApiRequest::BadRequest("No body provided");
        }
        match serde_json::from_slice::<SelectBody>(body) {
            Ok(SelectBody {
                device_id: Some(device_id),
            }) => ApiRequest::SelectDevice { device_id },
            Ok(_) => ApiRequest::BadRequest("device_id not found"),
            Err(_) => ApiRequest::BadRequest("Invalid JSON"),
        }
    }
}

fn find_head_end(raw: &[u8]) -> Option<usize> {
    raw.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Total request length once the head and the announced body arrived
pub fn request_complete(raw: &[u8]) -> Option<usize> {
    let head_end = find_head_end(raw)?;
    let head = core::str::from_utf8(&raw[..head_end]).ok()?;
    let content_length = head
        .lines()
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    let total = head_end + 4 + content_length;
    (raw.len() >= total).then_some(total)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl HttpReply {
    pub fn json(status: u16, body: String) -> Self {
        Self {
            status,
            content_type: "application/json",
            body,
        }
    }

    pub fn json_value<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self::json(status, body),
            Err(_) => Self::error(500, "Encoding failed"),
        }
    }

    pub fn error(status: u16, message: &str) -> Self {
        Self::json_value(status, &ErrorBody { error: message })
    }

    pub fn success(message: &str) -> Self {
        Self::json_value(
            200,
            &SuccessBody {
                success: true,
                message,
            },
        )
    }

    pub fn html(body: &str) -> Self {
        Self {
            status: 200,
            content_type: "text/html",
            body: body.to_string(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: 404,
            content_type: "text/plain",
            body: "Not Found".to_string(),
        }
    }

    pub fn head(&self) -> String {
        format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nAccess-Control-Allow-Origin: *\r\nConnection: close\r\n\r\n",
            self.status,
            reason(self.status),
            self.content_type,
            self.body.len()
        )
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        503 => "Service Unavailable",
        _ => "Internal Server Error",
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

#[derive(Serialize)]
struct SuccessBody<'a> {
    success: bool,
    message: &'a str,
}

#[derive(Serialize)]
pub struct DeviceSelected<'a> {
    pub success: bool,
    pub device_id: &'a str,
    pub device_name: &'a str,
}

/// Body of `GET /api/status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub state: &'static str,
    pub authenticated: bool,
    pub device_available: bool,
    pub current_device_id: Option<String>,
    pub current_device_name: Option<String>,
    pub last_played: Option<String>,
    pub last_error: Option<String>,
    pub ip_address: Option<String>,
}

/// Body of `GET /api/wifi`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WifiStatus<'a> {
    pub ssid: &'a str,
    pub ip: Option<String>,
    pub rssi: Option<i8>,
}

pub fn format_ip(ip: [u8; 4]) -> String {
    format!("{}.{}.{}.{}", ip[0], ip[1], ip[2], ip[3])
}

pub const STATUS_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width,initial-scale=1">
<title>Tag Player</title>
<style>
body{font-family:sans-serif;background:#15192b;color:#eee;max-width:480px;margin:0 auto;padding:16px}
h1{color:#1db954}
section{background:#222a44;border-radius:8px;padding:12px;margin-bottom:12px}
select,button{width:100%;padding:10px;margin-top:8px;font-size:15px}
.row{display:flex;justify-content:space-between;padding:4px 0}
</style>
</head>
<body>
<h1>Tag Player</h1>
<section>
<div class="row"><span>State</span><span id="state">-</span></div>
<div class="row"><span>Device</span><span id="device">-</span></div>
<div class="row"><span>Last played</span><span id="played">-</span></div>
<div class="row"><span>Last error</span><span id="error">-</span></div>
</section>
<section>
<select id="devices"></select>
<button onclick="selectDevice()">Set Device</button>
<button onclick="loadDevices()">Refresh</button>
</section>
<section>
<div class="row"><span>SSID</span><span id="ssid">-</span></div>
<div class="row"><span>IP</span><span id="ip">-</span></div>
<div class="row"><span>Signal</span><span id="rssi">-</span></div>
<button onclick="post('/api/wifi/reset')">Reset WiFi</button>
<button onclick="post('/api/restart')">Restart</button>
</section>
<script>
const $=id=>document.getElementById(id);
async function loadStatus(){
const s=await (await fetch('/api/status')).json();
$('state').textContent=s.state;
$('device').textContent=s.current_device_name||'none';
$('played').textContent=s.last_played||'-';
$('error').textContent=s.last_error||'-';
const w=await (await fetch('/api/wifi')).json();
$('ssid').textContent=w.ssid;$('ip').textContent=w.ip||'-';$('rssi').textContent=w.rssi==null?'-':w.rssi+' dBm';
}
async function loadDevices(){
const list=await (await fetch('/api/devices')).json();
$('devices').innerHTML=list.map(d=>`<option value="${d.id}">${d.name}${d.is_active?' (Active)':''}</option>`).join('');
}
async function selectDevice(){
const r=await fetch('/api/device',{method:'POST',body:JSON.stringify({device_id:$('devices').value})});
alert((await r.json()).device_name||'Device not available');loadStatus();
}
async function post(url){await fetch(url,{method:'POST'});}
loadStatus();loadDevices();
</script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes() {
        let cases: [(&[u8], ApiRequest); 8] = [
            (b"GET / HTTP/1.1\r\n\r\n", ApiRequest::StatusPage),
            (b"GET /api/status?x=1 HTTP/1.1\r\nHost: a\r\n\r\n", ApiRequest::Status),
            (b"GET /api/devices HTTP/1.1\r\n\r\n", ApiRequest::Devices),
            (b"GET /api/wifi HTTP/1.1\r\n\r\n", ApiRequest::Wifi),
            (b"POST /api/wifi/reset HTTP/1.1\r\n\r\n", ApiRequest::WifiReset),
            (b"POST /api/restart HTTP/1.1\r\n\r\n", ApiRequest::Restart),
            (b"DELETE /api/restart HTTP/1.1\r\n\r\n", ApiRequest::MethodNotAllowed),
            (b"GET /favicon.ico HTTP/1.1\r\n\r\n", ApiRequest::NotFound),
        ];
        for (raw, expected) in cases {
            assert_eq!(ApiRequest::parse(raw), expected);
        }
    }

    #[test]
    fn device_selection_body() {
        let raw = b"POST /api/device HTTP/1.1\r\nContent-Length: 20\r\n\r\n{\"device_id\":\"aa11\"}";
        assert_eq!(
            ApiRequest::parse(raw),
            ApiRequest::SelectDevice {
                device_id: "aa11".into()
            }
        );
    }

    #[test]
    fn device_selection_errors_match_the_web_ui() {
        let empty = b"POST /api/device HTTP/1.1\r\n\r\n";
        let broken = b"POST /api/device HTTP/1.1\r\n\r\n{device";
        let missing = b"POST /api/device HTTP/1.1\r\n\r\n{\"id\":\"aa11\"}";
        assert_eq!(
            ApiRequest::parse(empty),
            ApiRequest::BadRequest("No body provided")
        );
        assert_eq!(ApiRequest::parse(broken), ApiRequest::BadRequest("Invalid JSON"));
        assert_eq!(
            ApiRequest::parse(missing),
            ApiRequest::BadRequest("device_id not found")
        );
    }

    #[test]
    fn incomplete_head_is_malformed() {
        assert!(matches!(
            ApiRequest::parse(b"GET / HTTP/1.1\r\n"),
            ApiRequest::BadRequest(_)
        ));
    }

    #[test]
    fn completeness_waits_for_the_body() {
        let head = b"POST /api/device HTTP/1.1\r\ncontent-length: 4\r\n\r\n";
        assert_eq!(request_complete(head), None);

        let mut full = head.to_vec();
        full.extend_from_slice(b"abcd");
        assert_eq!(request_complete(&full), Some(full.len()));

        assert_eq!(request_complete(b"GET / HTTP/1.1\r\n"), None);
        assert_eq!(request_complete(b"GET / HTTP/1.1\r\n\r\n"), Some(18));
    }

    #[test]
    fn reply_head_carries_length() {
        let reply = HttpReply::error(404, "Device not found or unavailable");
        assert_eq!(reply.body, r#"{"error":"Device not found or unavailable"}"#);
        let head = reply.head();
        assert!(head.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(head.contains(&format!("Content-Length: {}\r\n", reply.body.len())));
        assert!(head.ends_with("\r\n\r\n"));
    }

    #[test]
    fn success_body() {
        assert_eq!(
            HttpReply::success("Device restarting").body,
            r#"{"success":true,"message":"Device restarting"}"#
        );
        assert_eq!(format_ip([10, 0, 0, 7]), "10.0.0.7");
    }
}
