//! UDP request/response and broadcast helpers shared by the vendor adapters.

use std::net::SocketAddr;
use std::time::Duration;

use serde_json::Value;

use crate::errors::Error;
use crate::runtime::{self, AsyncUdpSocket, Instant, UdpSocket};

type Result<T> = std::result::Result<T, Error>;

const BUFFER_SIZE: usize = 4096;
const BROADCAST_RECV_TIMEOUT: Duration = Duration::from_millis(500);

/// Send one datagram to `addr` and wait up to `limit` for the reply.
pub(crate) async fn request(addr: SocketAddr, payload: &[u8], limit: Duration) -> Result<Vec<u8>> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .map_err(|e| Error::socket("bind", e))?;

    socket
        .connect(&addr.to_string())
        .await
        .map_err(|e| Error::socket("connect", e))?;

    socket
        .send(payload)
        .await
        .map_err(|e| Error::socket("send", e))?;

    let mut buffer = [0u8; BUFFER_SIZE];
    let bytes = runtime::timeout(limit, socket.recv(&mut buffer))
        .await
        .map_err(|_| {
            Error::socket(
                "receive",
                std::io::Error::new(std::io::ErrorKind::TimedOut, "receive timeout"),
            )
        })?
        .map_err(|e| Error::socket("receive", e))?;

    Ok(buffer[..bytes].to_vec())
}

/// Broadcast `payload` to `target` and collect every reply received within
/// `window`.
pub(crate) async fn broadcast(
    target: SocketAddr,
    payload: &[u8],
    window: Duration,
) -> Result<Vec<(SocketAddr, Vec<u8>)>> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .map_err(|e| Error::socket("bind", e))?;

    socket
        .set_broadcast(true)
        .map_err(|e| Error::socket("set_broadcast", e))?;

    socket
        .send_to(payload, &target.to_string())
        .await
        .map_err(|e| Error::socket("send_to", e))?;

    let mut replies = Vec::new();
    let start = Instant::now();
    let mut buffer = [0u8; BUFFER_SIZE];

    while start.elapsed() < window {
        let remaining = window.saturating_sub(start.elapsed());
        match runtime::timeout(
            remaining.min(BROADCAST_RECV_TIMEOUT),
            socket.recv_from(&mut buffer),
        )
        .await
        {
            Ok(Ok((size, addr))) => replies.push((addr, buffer[..size].to_vec())),
            // Timeout elapsed - continue loop to check overall window
            Ok(Err(_)) | Err(_) => continue,
        }
    }

    Ok(replies)
}

/// Decode a UTF-8 JSON document.
pub(crate) fn decode_json(bytes: Vec<u8>) -> Result<Value> {
    let text = String::from_utf8(bytes).map_err(Error::Utf8Decode)?;
    serde_json::from_str(&text).map_err(Error::JsonLoad)
}
