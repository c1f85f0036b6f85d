//! Status and device selection HTTP server
//!
//! The server task only moves bytes. Parsed requests go to the player task
//! through [`API_REQUESTS`], the answer comes back on [`API_REPLIES`] tagged
//! with the same sequence number, so a reply that arrives after the client
//! gave up is dropped instead of answering the next request.

use embassy_net::Stack;
use embassy_net::tcp::TcpSocket;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer, with_deadline};
use embedded_io_async::Write as _;
use esp_println::println;
use tagplay_core::web_api::{ApiRequest, HttpReply, MAX_REQUEST_LEN, request_complete};

use crate::config;

/// Player side bound on answering one request. Remote calls with retries can
/// take a while.
const REPLY_TIMEOUT: Duration = Duration::from_secs(60);

const SOCKET_BUF_SIZE: usize = 2048;

pub type Sequence = u32;

pub static API_REQUESTS: Channel<CriticalSectionRawMutex, (Sequence, ApiRequest), 1> =
    Channel::new();
pub static API_REPLIES: Channel<CriticalSectionRawMutex, (Sequence, HttpReply), 1> =
    Channel::new();

/// Raised by the board once the network is up
pub static SERVICES_STARTED: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Player side: take one pending request, if any
pub fn poll_request() -> Option<(Sequence, ApiRequest)> {
    API_REQUESTS.try_receive().ok()
}

/// Player side: hand back the answer for `sequence`
pub fn reply(sequence: Sequence, reply: HttpReply) {
    // A stale answer the server never collected is dropped
    API_REPLIES.clear();
    let _ = API_REPLIES.try_send((sequence, reply));
}

pub async fn serve(stack: Stack<'static>) -> ! {
    let mut rx_buf = [0u8; SOCKET_BUF_SIZE];
    let mut tx_buf = [0u8; SOCKET_BUF_SIZE];
    let mut sequence: Sequence = 0;

    SERVICES_STARTED.wait().await;
    println!("[WEB] Server listening on port {}", config::HTTP_PORT);

    loop {
        stack.wait_config_up().await;

        let mut socket = TcpSocket::new(stack, &mut rx_buf, &mut tx_buf);
        socket.set_timeout(Some(Duration::from_millis(config::HTTP_SERVER_TIMEOUT_MS)));

        match socket.accept(config::HTTP_PORT).await {
            Ok(()) => {
                sequence = sequence.wrapping_add(1);
                if let Err(e) = handle_connection(&mut socket, sequence).await {
                    println!("[WEB] Connection error: {:?}", e);
                }
            }
            Err(e) => {
                println!("[WEB] Accept error: {:?}", e);
                Timer::after(Duration::from_millis(200)).await;
            }
        }

        socket.abort();
    }
}

async fn handle_connection(
    socket: &mut TcpSocket<'_>,
    sequence: Sequence,
) -> Result<(), embassy_net::tcp::Error> {
    let mut buf = [0u8; MAX_REQUEST_LEN];
    let mut total = 0usize;

    // Head plus announced body, or until the buffer is full
    let reply = loop {
        if total >= MAX_REQUEST_LEN {
            break HttpReply::error(413, "Request too large");
        }
        let n = socket.read(&mut buf[total..]).await?;
        if n == 0 {
            if total == 0 {
                return Ok(());
            }
            break dispatch(sequence, ApiRequest::parse(&buf[..total])).await;
        }
        total += n;
        if let Some(len) = request_complete(&buf[..total]) {
            break dispatch(sequence, ApiRequest::parse(&buf[..len])).await;
        }
    };

    socket.write_all(reply.head().as_bytes()).await?;
    socket.write_all(reply.body.as_bytes()).await?;
    socket.flush().await?;
    Ok(())
}

async fn dispatch(sequence: Sequence, request: ApiRequest) -> HttpReply {
    println!("[WEB] #{} {:?}", sequence, request);
    let deadline = Instant::now() + REPLY_TIMEOUT;

    if with_deadline(deadline, API_REQUESTS.send((sequence, request)))
        .await
        .is_err()
    {
        return HttpReply::error(503, "Device busy");
    }

    loop {
        match with_deadline(deadline, API_REPLIES.receive()).await {
            Ok((id, reply)) if id == sequence => return reply,
            Ok(_) => continue,
            Err(_) => return HttpReply::error(503, "Device busy"),
        }
    }
}
