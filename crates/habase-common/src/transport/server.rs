use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::protocol::error::{HabaseError, Result};
use crate::protocol::{RemoteError, Request, Response, Value};
use crate::transport::codec::{Codec, ProtocolKind};
use crate::transport::tcp::{MessageStream, TransportMode};

/// Async RPC server speaking the habase wire protocol.
///
/// Each accepted connection is served on its own task and may carry any
/// number of requests. Used as a loopback backend in tests and as a local
/// stand-in for a store server.
pub struct RpcServer {
    listener: TcpListener,
    mode: TransportMode,
    codec: Codec,
}

impl RpcServer {
    /// Creates a new server bound to the specified address.
    ///
    /// # Arguments
    /// * `bind_addr` - The address to bind to (e.g., "127.0.0.1:0")
    /// * `mode` - Framing expected from clients
    /// * `protocol` - Encoding used for responses
    pub async fn bind(bind_addr: &str, mode: TransportMode, protocol: ProtocolKind) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| HabaseError::Connection(format!("Failed to bind to {}: {}", bind_addr, e)))?;

        Ok(Self {
            listener,
            mode,
            codec: Codec::new(protocol),
        })
    }

    /// Gets the actual bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| HabaseError::Connection(format!("Failed to get local addr: {}", e)))
    }

    /// Serves requests until `shutdown` is cancelled.
    ///
    /// Cancellation stops accepting and drops every open connection, so
    /// clients observe the server going away.
    pub async fn run_with_handler<F, Fut>(self, handler: F, shutdown: CancellationToken) -> Result<()>
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, RemoteError>> + Send + 'static,
    {
        let handler = Arc::new(handler);

        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("RPC server shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => accepted
                    .map_err(|e| HabaseError::Connection(format!("Failed to accept connection: {}", e)))?,
            };

            debug!(peer = %peer_addr, "Connection established");

            let stream = MessageStream::from_stream(stream, self.mode, self.codec, None);
            let handler = handler.clone();
            let shutdown = shutdown.child_token();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, handler, shutdown).await {
                    warn!(peer = %peer_addr, "Connection error: {}", e);
                }
            });
        }
    }
}

/// Handle a single connection until the peer hangs up or the server stops.
async fn handle_connection<F, Fut>(
    mut stream: MessageStream,
    handler: Arc<F>,
    shutdown: CancellationToken,
) -> Result<()>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<Value, RemoteError>> + Send + 'static,
{
    loop {
        let request = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            received = stream.try_receive::<Request>() => match received? {
                Some(request) => request,
                None => {
                    debug!("Connection closed by peer");
                    return Ok(());
                }
            },
        };

        let seq_id = request.seq_id;
        let response = match handler(request).await {
            Ok(result) => Response::success(seq_id, result),
            Err(error) => Response::error(seq_id, error),
        };

        stream.send(&response).await?;
    }
}
