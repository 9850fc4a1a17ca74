use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::protocol::error::{HabaseError, Result};
use crate::protocol::{Request, Response};

/// Encoding protocol spoken on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolKind {
    /// MessagePack with struct fields keyed by name
    #[default]
    Binary,
    /// MessagePack with struct fields encoded by position
    Compact,
}

impl ProtocolKind {
    pub const ALL: [&'static str; 2] = ["binary", "compact"];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolKind::Binary => "binary",
            ProtocolKind::Compact => "compact",
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolKind {
    type Err = HabaseError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "binary" => Ok(ProtocolKind::Binary),
            "compact" => Ok(ProtocolKind::Compact),
            other => Err(HabaseError::Configuration(format!(
                "'protocol' must be one of {} (got '{}')",
                Self::ALL.join(", "),
                other
            ))),
        }
    }
}

/// Codec for encoding/decoding RPC messages
///
/// Both protocols share one decoder: MessagePack structs are accepted either
/// as maps or as arrays.
///
/// # Example
///
/// ```
/// use habase_common::transport::{Codec, ProtocolKind};
/// use habase_common::protocol::Request;
/// use serde_json::json;
///
/// let codec = Codec::new(ProtocolKind::Compact);
/// let request = Request::new(1, "enableTable", vec![json!("users")]);
///
/// let encoded = codec.encode_request(&request).unwrap();
/// let decoded = codec.decode_request(&encoded).unwrap();
/// assert_eq!(request, decoded);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Codec {
    protocol: ProtocolKind,
}

impl Codec {
    pub fn new(protocol: ProtocolKind) -> Self {
        Self { protocol }
    }

    pub fn protocol(&self) -> ProtocolKind {
        self.protocol
    }

    /// Encode any serializable message
    pub fn encode<T: Serialize>(&self, message: &T) -> Result<Vec<u8>> {
        let bytes = match self.protocol {
            ProtocolKind::Binary => rmp_serde::to_vec_named(message)?,
            ProtocolKind::Compact => rmp_serde::to_vec(message)?,
        };
        Ok(bytes)
    }

    /// Decode a complete message
    pub fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(data)?)
    }

    pub fn encode_request(&self, request: &Request) -> Result<Vec<u8>> {
        self.encode(request)
    }

    pub fn decode_request(&self, data: &[u8]) -> Result<Request> {
        self.decode(data)
    }

    pub fn encode_response(&self, response: &Response) -> Result<Vec<u8>> {
        self.encode(response)
    }

    pub fn decode_response(&self, data: &[u8]) -> Result<Response> {
        self.decode(data)
    }
}
