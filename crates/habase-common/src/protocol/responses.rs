//! habase Response Types
//!
//! This module defines the RPC response structure and the error payload a
//! server returns when the operation itself fails.

use serde::{Deserialize, Serialize};

use super::error::{HabaseError, Result};
use super::{SeqId, Value};

/// An error raised by the remote operation itself (for example a table that
/// already exists). It travels inside a well-formed response, so the
/// connection that carried it is healthy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteError {
    /// Exception class reported by the store, e.g. `IOError` or `AlreadyExists`
    pub kind: String,
    /// Human readable message
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// An RPC response returned from a server to the client.
///
/// # Fields
///
/// - `seq_id`: The sequence number of the request this answers
/// - `result`: The result value (absent on failure, and absent for a `null` result)
/// - `error`: The remote error (present on failure)
///
/// # Example
///
/// ```
/// use habase_common::protocol::{RemoteError, Response};
/// use serde_json::json;
///
/// let ok = Response::success(1, json!(["users", "events"]));
/// assert!(ok.is_success());
///
/// let failed = Response::error(2, RemoteError::new("IOError", "table missing"));
/// assert!(!failed.is_success());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    /// Sequence number of the request this response corresponds to
    pub seq_id: SeqId,
    /// Result value (present on success unless the result is `null`)
    pub result: Option<Value>,
    /// Remote error (present on failure)
    pub error: Option<RemoteError>,
}

impl Response {
    /// Creates a successful response.
    pub fn success(seq_id: SeqId, result: Value) -> Self {
        Response {
            seq_id,
            result: Some(result),
            error: None,
        }
    }

    /// Creates an error response.
    pub fn error(seq_id: SeqId, error: RemoteError) -> Self {
        Response {
            seq_id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Converts the response into the call outcome.
    ///
    /// A remote error becomes [`HabaseError::Application`]; a missing result
    /// on success is `null` (MessagePack cannot tell `None` from `Some(null)`).
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(RemoteError { kind, message }) => Err(HabaseError::Application { kind, message }),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}
