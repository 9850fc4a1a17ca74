//! habase Transport Layer
//!
//! This module provides the codecs and TCP plumbing for sending and receiving
//! RPC messages.
//!
//! # Architecture
//!
//! - **Codec**: MessagePack, `binary` (named fields) or `compact` (positional fields)
//! - **Framing**: `framed` (`[u32 big-endian length] + [payload]`) or `buffered`
//!   (payloads written back-to-back, split by [`MessageScanner`])
//!
//! # Components
//!
//! - **[`Codec`]** / **[`ProtocolKind`]**: Encode/decode protocol messages
//! - **[`MessageStream`]**: A TCP stream speaking one framing + codec pair
//! - **[`RpcServer`]**: A handler-driven server, used for loopback tests and stubs
//!
//! # Example
//!
//! ```no_run
//! use habase_common::transport::{Codec, MessageStream, ProtocolKind, TransportMode};
//! use habase_common::protocol::Request;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut stream = MessageStream::connect(
//!     "127.0.0.1:9090",
//!     TransportMode::Framed,
//!     Codec::new(ProtocolKind::Compact),
//!     None,
//! )
//! .await?;
//!
//! let response = stream.call(&Request::new(1, "getTableNames", vec![])).await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod scanner;
pub mod server;
pub mod tcp;

pub use codec::{Codec, ProtocolKind};
pub use scanner::MessageScanner;
pub use server::RpcServer;
pub use tcp::{MessageStream, TransportMode, MAX_MESSAGE_SIZE};

#[cfg(test)]
mod tests;
