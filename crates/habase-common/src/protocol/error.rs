use thiserror::Error;

#[derive(Error, Debug)]
pub enum HabaseError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("Decoding error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("Remote error {kind}: {message}")]
    Application { kind: String, message: String },

    #[error("Send request [{0}] to any of the servers failed")]
    AllBackendsUnreachable(String),

    #[error("Failed to connect to any of the servers")]
    NoReachableBackend,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Pool acquisition timed out after {0}ms")]
    PoolTimeout(u64),
}

impl HabaseError {
    /// Returns `true` for failures of the connection itself.
    ///
    /// These mark the endpoint down and move the call on to the next server.
    /// A `Decode` failure means the byte stream can no longer be trusted, so
    /// it is classified the same way. Everything else, in particular
    /// [`HabaseError::Application`], is returned to the caller untouched.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            HabaseError::Transport(_)
                | HabaseError::Connection(_)
                | HabaseError::Timeout(_)
                | HabaseError::Io(_)
                | HabaseError::Decode(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, HabaseError>;
