use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use habase_common::protocol::{HabaseError, Result, Value};
use tracing::debug;

use crate::endpoint::{EndpointState, EndpointStatus};
use crate::session::Session;

/// Endpoint states shared between the dispatcher, the recovery loop and the
/// connection. Fixed in length and order once built.
pub type SharedEndpoints<S> = Arc<[EndpointState<S>]>;

/// Round-robin dispatcher with failover.
///
/// The cursor is shared across calls so that load keeps rotating over the
/// life of the connection instead of restarting at the first endpoint.
pub struct Dispatcher<S> {
    endpoints: SharedEndpoints<S>,
    cursor: AtomicUsize,
}

impl<S: Session> Dispatcher<S> {
    pub fn new(endpoints: SharedEndpoints<S>) -> Self {
        Self {
            endpoints,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn endpoints(&self) -> &SharedEndpoints<S> {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Index of the endpoint the next iteration will inspect
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }

    /// Takes the current index and moves the cursor on, as one step.
    fn advance(&self) -> usize {
        let len = self.endpoints.len();
        match self
            .cursor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| Some((c + 1) % len))
        {
            Ok(previous) | Err(previous) => previous,
        }
    }

    /// Runs `operation` on exactly one live endpoint and returns its result.
    ///
    /// Each iteration inspects the endpoint under the cursor and advances it:
    ///
    /// 1. **Up**: call it. Success returns immediately. A transport error
    ///    marks the endpoint down and counts as a failed iteration. Any other
    ///    error is returned as is, without trying another endpoint.
    /// 2. **Down**: counts as a failed iteration without a call, and without
    ///    waiting on the endpoint's session lock.
    ///
    /// After as many failed iterations as there are endpoints the call fails
    /// with [`HabaseError::AllBackendsUnreachable`]. Down endpoints are not
    /// reopened here; that is the recovery loop's job.
    pub async fn invoke(&self, operation: &str, args: &[Value]) -> Result<Value> {
        let total = self.endpoints.len();
        if total == 0 {
            return Err(HabaseError::AllBackendsUnreachable(operation.to_string()));
        }

        let mut fails = 0;
        loop {
            let index = self.advance();
            let state = &self.endpoints[index];

            match state.invoke(operation, args).await {
                Some(Ok(result)) => {
                    debug!("Send request [{}] to {} successfully", operation, state.endpoint());
                    return Ok(result);
                }
                Some(Err(e)) if e.is_transport() => {
                    debug!(
                        "Send request [{}] to {} failed, trying other servers: {}",
                        operation,
                        state.endpoint(),
                        e
                    );
                }
                Some(Err(e)) => return Err(e),
                None => {}
            }

            fails += 1;
            if fails == total {
                return Err(HabaseError::AllBackendsUnreachable(operation.to_string()));
            }
        }
    }

    /// Status of every endpoint, in configuration order
    pub fn statuses(&self) -> Vec<EndpointStatus> {
        self.endpoints.iter().map(EndpointState::status).collect()
    }

    /// Number of endpoints currently up
    pub fn live_count(&self) -> usize {
        self.endpoints.iter().filter(|state| state.is_live()).count()
    }
}
