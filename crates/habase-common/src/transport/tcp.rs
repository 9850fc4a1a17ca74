use std::fmt;
use std::future::Future;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::protocol::error::{HabaseError, Result};
use crate::protocol::{Request, Response};
use crate::transport::codec::Codec;
use crate::transport::scanner::MessageScanner;

/// Maximum message size in either framing mode (100 MB)
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Spare capacity reserved before each socket read in buffered mode
const READ_CHUNK: usize = 8 * 1024;

/// How messages are delimited on the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportMode {
    /// Messages written back-to-back; the reader scans for value boundaries
    #[default]
    Buffered,
    /// Each message is preceded by its length as a big-endian u32
    Framed,
}

impl TransportMode {
    pub const ALL: [&'static str; 2] = ["buffered", "framed"];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMode::Buffered => "buffered",
            TransportMode::Framed => "framed",
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportMode {
    type Err = HabaseError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "buffered" => Ok(TransportMode::Buffered),
            "framed" => Ok(TransportMode::Framed),
            other => Err(HabaseError::Configuration(format!(
                "'transport' must be one of {} (got '{}')",
                Self::ALL.join(", "),
                other
            ))),
        }
    }
}

/// A TCP stream speaking one framing mode and one codec.
///
/// Every socket operation is bounded by the optional timeout. Any failure
/// reported by this type other than an encoding error leaves the stream in
/// an unknown state; callers drop it rather than reuse it.
///
/// # Wire Protocol
///
/// ```text
/// framed:   [4-byte length] [payload] [4-byte length] [payload] ...
/// buffered: [payload] [payload] ...
/// ```
pub struct MessageStream {
    stream: TcpStream,
    mode: TransportMode,
    codec: Codec,
    timeout: Option<Duration>,
    read_buf: Vec<u8>,
    scanner: MessageScanner,
}

impl MessageStream {
    /// Connects to a remote endpoint.
    ///
    /// The address may resolve to several socket addresses; each is tried in
    /// turn until one accepts. The timeout (if any) bounds each attempt.
    pub async fn connect(
        addr: &str,
        mode: TransportMode,
        codec: Codec,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let socket_addrs = tokio::net::lookup_host(addr)
            .await
            .map_err(|e| HabaseError::Connection(format!("Invalid address '{}': {}", addr, e)))?;

        let mut last_err = None;
        for socket_addr in socket_addrs {
            match timed(timeout, "connecting", TcpStream::connect(socket_addr)).await {
                Ok(stream) => {
                    // Small request/response pairs; don't wait on Nagle.
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("Failed to set TCP_NODELAY on {}: {}", socket_addr, e);
                    }
                    return Ok(Self::from_stream(stream, mode, codec, timeout));
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(HabaseError::Connection(format!(
            "Failed to connect to {}: {}",
            addr,
            last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no addresses resolved".to_string())
        )))
    }

    /// Wraps an already connected stream (used on the accepting side).
    pub fn from_stream(
        stream: TcpStream,
        mode: TransportMode,
        codec: Codec,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            stream,
            mode,
            codec,
            timeout,
            read_buf: Vec::new(),
            scanner: MessageScanner::new(MAX_MESSAGE_SIZE),
        }
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    /// Sends a request and waits for the matching response.
    pub async fn call(&mut self, request: &Request) -> Result<Response> {
        self.send(request).await?;
        self.receive().await
    }

    /// Encodes and writes one message.
    pub async fn send<T: Serialize>(&mut self, message: &T) -> Result<()> {
        let payload = self.codec.encode(message)?;

        let data = match self.mode {
            TransportMode::Framed => {
                if payload.len() > MAX_MESSAGE_SIZE {
                    return Err(HabaseError::InvalidRequest(format!(
                        "Message too large: {} bytes (max {} bytes)",
                        payload.len(),
                        MAX_MESSAGE_SIZE
                    )));
                }
                let mut frame = Vec::with_capacity(4 + payload.len());
                frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
                frame.extend_from_slice(&payload);
                frame
            }
            TransportMode::Buffered => payload,
        };

        timed(self.timeout, "writing message", self.stream.write_all(&data)).await?;
        timed(self.timeout, "flushing stream", self.stream.flush()).await?;
        Ok(())
    }

    /// Reads one message, failing if the peer closed the connection.
    pub async fn receive<T: DeserializeOwned>(&mut self) -> Result<T> {
        self.try_receive()
            .await?
            .ok_or_else(|| HabaseError::Connection("Connection closed by peer".to_string()))
    }

    /// Reads one message, or `None` if the peer closed the connection cleanly
    /// between messages.
    pub async fn try_receive<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        match self.mode {
            TransportMode::Framed => self.receive_framed().await,
            TransportMode::Buffered => self.receive_buffered().await,
        }
    }

    async fn receive_framed<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        let mut len_buf = [0u8; 4];
        let read = bounded(self.timeout, self.stream.read_exact(&mut len_buf)).await?;
        match read {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(map_io_error(e, "reading length prefix")),
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(HabaseError::Transport(format!(
                "Message too large: {} bytes (max {} bytes)",
                len, MAX_MESSAGE_SIZE
            )));
        }

        let mut buf = vec![0u8; len];
        timed(self.timeout, "reading data", self.stream.read_exact(&mut buf)).await?;

        self.codec.decode(&buf).map(Some)
    }

    async fn receive_buffered<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        loop {
            if let Some(len) = self.scanner.scan(&self.read_buf)? {
                let message = self.codec.decode(&self.read_buf[..len]);
                self.read_buf.drain(..len);
                return message.map(Some);
            }

            self.read_buf.reserve(READ_CHUNK);
            let n = timed(self.timeout, "reading data", self.stream.read_buf(&mut self.read_buf)).await?;
            if n == 0 {
                if self.read_buf.is_empty() {
                    return Ok(None);
                }
                return Err(HabaseError::Connection(format!(
                    "Connection closed with {} bytes of a partial message",
                    self.read_buf.len()
                )));
            }
        }
    }

    /// Shuts down the write half; errors are ignored since the stream is
    /// being discarded anyway.
    pub async fn shutdown(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}

/// Run an I/O future under the optional timeout, keeping the raw io result.
async fn bounded<F, T>(timeout: Option<Duration>, fut: F) -> Result<std::io::Result<T>>
where
    F: Future<Output = std::io::Result<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| HabaseError::Timeout(limit.as_millis() as u64)),
        None => Ok(fut.await),
    }
}

async fn timed<F, T>(timeout: Option<Duration>, context: &str, fut: F) -> Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    bounded(timeout, fut)
        .await?
        .map_err(|e| map_io_error(e, context))
}

/// Map IO errors to appropriate HabaseError variants
///
/// - Timeouts/would block -> `Transport`
/// - Connection errors -> `Connection`
/// - Other IO errors -> `Io`
fn map_io_error(err: std::io::Error, context: &str) -> HabaseError {
    match err.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => {
            HabaseError::Transport(format!("{}: timed out", context))
        }
        ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::NotConnected
        | ErrorKind::BrokenPipe
        | ErrorKind::UnexpectedEof => {
            HabaseError::Connection(format!("{}: Connection lost", context))
        }
        ErrorKind::ConnectionRefused => {
            HabaseError::Connection(format!("{}: Connection refused", context))
        }
        _ => HabaseError::Io(err),
    }
}
