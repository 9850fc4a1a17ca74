use std::time::Duration;

use async_trait::async_trait;
use habase_common::protocol::{HabaseError, Request, Result, SeqId, Value};
use habase_common::transport::{Codec, MessageStream, ProtocolKind, TransportMode};

use crate::endpoint::Endpoint;

/// One connection to one server plus the ability to call operations on it.
///
/// Errors returned by [`open`](Self::open) and [`invoke`](Self::invoke) must
/// be classified: network failures as transport errors
/// ([`HabaseError::is_transport`]), failures raised by the remote operation
/// as [`HabaseError::Application`]. The dispatcher fails over on the former
/// and returns the latter to the caller.
#[async_trait]
pub trait Session: Send + 'static {
    async fn open(&mut self) -> Result<()>;

    /// Closes the connection. Closing a closed session is a no-op.
    async fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Calls the named remote operation with positional arguments.
    async fn invoke(&mut self, operation: &str, args: &[Value]) -> Result<Value>;
}

/// Session over a TCP connection speaking the habase wire protocol.
///
/// Every socket operation is bounded by the socket timeout when one is set.
/// A transport failure during a call closes the session.
pub struct TcpSession {
    endpoint: Endpoint,
    mode: TransportMode,
    codec: Codec,
    timeout: Option<Duration>,
    stream: Option<MessageStream>,
    seq_id: SeqId,
}

impl TcpSession {
    pub fn new(
        endpoint: Endpoint,
        mode: TransportMode,
        protocol: ProtocolKind,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            endpoint,
            mode,
            codec: Codec::new(protocol),
            timeout,
            stream: None,
            seq_id: 0,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

#[async_trait]
impl Session for TcpSession {
    async fn open(&mut self) -> Result<()> {
        let stream = MessageStream::connect(&self.endpoint.addr(), self.mode, self.codec, self.timeout).await?;
        self.stream = Some(stream);
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await;
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    async fn invoke(&mut self, operation: &str, args: &[Value]) -> Result<Value> {
        self.seq_id = self.seq_id.wrapping_add(1);
        let request = Request::new(self.seq_id, operation, args.to_vec());

        let stream = self.stream.as_mut().ok_or_else(|| {
            HabaseError::Connection(format!("Session to {} is not open", self.endpoint))
        })?;

        let response = match stream.call(&request).await {
            Ok(response) => response,
            Err(e) => {
                if e.is_transport() {
                    self.stream = None;
                }
                return Err(e);
            }
        };

        if response.seq_id != request.seq_id {
            self.stream = None;
            return Err(HabaseError::Transport(format!(
                "Out of sequence response from {}: expected {}, got {}",
                self.endpoint, request.seq_id, response.seq_id
            )));
        }

        response.into_result()
    }
}
