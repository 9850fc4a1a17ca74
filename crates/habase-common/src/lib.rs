//! habase Common Types and Transport
//!
//! This crate provides the wire protocol definitions, the error taxonomy and
//! the TCP transport layer shared by the habase client and its tooling.
//!
//! # Overview
//!
//! habase is a high-availability client front for a multi-server data store
//! reachable over a binary RPC protocol. This crate contains the pieces that
//! know about bytes on the wire:
//!
//! - **Protocol Layer**: Request/Response types, remote errors, error handling
//! - **Transport Layer**: MessagePack codecs, framed and buffered message
//!   streams over TCP, and a small handler-driven server
//!
//! # Wire Format
//!
//! - **Encoding**: MessagePack, either with named fields (`binary`) or
//!   positional fields (`compact`)
//! - **Framing**: `[4-byte length prefix as u32 big-endian] + [payload]`
//!   (`framed`) or back-to-back self-delimiting messages (`buffered`)
//! - **Max Message Size**: 100 MB in framed mode
//!
//! # Example
//!
//! ```
//! use habase_common::{Request, Response};
//! use serde_json::json;
//!
//! let request = Request::new(7, "isTableEnabled", vec![json!("users")]);
//! let response = Response::success(request.seq_id, json!(true));
//! assert_eq!(response.into_result().unwrap(), json!(true));
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;
pub use transport::{Codec, MessageStream, ProtocolKind, RpcServer, TransportMode};
