use serde::{Deserialize, Serialize};

/// Per-session sequence number used to pair a response with its request.
pub type SeqId = u64;
pub type MethodName = String;

/// Generic argument and result value carried by remote calls.
pub type Value = serde_json::Value;

/// A single remote call: an operation name plus positional arguments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub seq_id: SeqId,
    pub method: MethodName,
    pub args: Vec<Value>,
}

impl Request {
    pub fn new(seq_id: SeqId, method: impl Into<String>, args: Vec<Value>) -> Self {
        Request {
            seq_id,
            method: method.into(),
            args,
        }
    }
}
