use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use habase_common::protocol::{HabaseError, Result, Value};
use tokio::sync::Mutex;
use tracing::debug;

use crate::session::Session;

/// Address of one backend server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port`, suitable for address resolution
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = HabaseError;

    /// Parses `host:port`. The port is split at the last colon, so bracketed
    /// IPv6 literals such as `[::1]:9090` work.
    fn from_str(s: &str) -> Result<Self> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| HabaseError::Configuration(format!("Endpoint '{}' must be host:port", s)))?;

        if host.is_empty() {
            return Err(HabaseError::Configuration(format!("Endpoint '{}' has an empty host", s)));
        }

        let port = port
            .parse::<u16>()
            .map_err(|e| HabaseError::Configuration(format!("Endpoint '{}' has an invalid port: {}", s, e)))?;

        Ok(Self::new(host, port))
    }
}

/// Whether an endpoint takes part in rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Up,
    Down,
}

/// Point-in-time view of one endpoint, for status reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointStatus {
    pub endpoint: Endpoint,
    pub liveness: Liveness,
    /// Number of times a call has taken this endpoint down
    pub failures: u32,
}

/// A session plus the liveness flag the dispatcher routes on.
///
/// Liveness and the failure count are atomics, so the dispatcher and status
/// readers never wait on the session lock. The session lock is only taken to
/// call, open or close the session. `live` is set only by
/// [`open`](Self::open) and [`try_recover`](Self::try_recover), and cleared
/// only by a failed [`invoke`](Self::invoke) and [`close`](Self::close). It
/// is never derived from the session. Starts down with the session closed.
pub struct EndpointState<S> {
    endpoint: Endpoint,
    live: AtomicBool,
    failures: AtomicU32,
    session: Mutex<S>,
}

impl<S: Session> EndpointState<S> {
    pub fn new(endpoint: Endpoint, session: S) -> Self {
        Self {
            endpoint,
            live: AtomicBool::new(false),
            failures: AtomicU32::new(0),
            session: Mutex::new(session),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn liveness(&self) -> Liveness {
        if self.is_live() {
            Liveness::Up
        } else {
            Liveness::Down
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn session(&self) -> &Mutex<S> {
        &self.session
    }

    /// Opens the session if needed and marks the endpoint up.
    ///
    /// On failure the endpoint stays down and the error is returned for the
    /// caller to log or ignore.
    pub async fn open(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        self.open_locked(&mut session).await
    }

    /// Reopens a down endpoint unless someone else holds its session.
    ///
    /// Returns `None` when there was nothing to do: the endpoint is up, or
    /// its session is busy with a call or another reopen.
    pub async fn try_recover(&self) -> Option<Result<()>> {
        if self.is_live() {
            return None;
        }
        let mut session = self.session.try_lock().ok()?;
        if self.is_live() {
            return None;
        }
        Some(self.open_locked(&mut session).await)
    }

    /// Calls `operation` on the session if the endpoint is up.
    ///
    /// Returns `None` without touching the session when the endpoint is down,
    /// including when it went down while this call waited for the lock. A
    /// transport error closes the session and takes the endpoint out of
    /// rotation until recovery reopens it.
    pub async fn invoke(&self, operation: &str, args: &[Value]) -> Option<Result<Value>> {
        if !self.is_live() {
            return None;
        }
        let mut session = self.session.lock().await;
        if !self.is_live() {
            return None;
        }

        let result = session.invoke(operation, args).await;
        if matches!(&result, Err(e) if e.is_transport()) {
            self.live.store(false, Ordering::SeqCst);
            self.failures.fetch_add(1, Ordering::SeqCst);
            session.close().await;
        }
        Some(result)
    }

    /// Marks the endpoint down, then closes the session (if open).
    pub async fn close(&self) {
        self.live.store(false, Ordering::SeqCst);
        let mut session = self.session.lock().await;
        if session.is_open() {
            debug!("Closing transport to {}", self.endpoint);
            session.close().await;
        }
    }

    pub fn status(&self) -> EndpointStatus {
        EndpointStatus {
            endpoint: self.endpoint.clone(),
            liveness: self.liveness(),
            failures: self.failures(),
        }
    }

    async fn open_locked(&self, session: &mut S) -> Result<()> {
        if !session.is_open() {
            session.open().await?;
        }
        self.live.store(true, Ordering::SeqCst);
        Ok(())
    }
}
