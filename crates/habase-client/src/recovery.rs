use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::DEFAULT_RECOVERY_INTERVAL;
use crate::dispatcher::SharedEndpoints;
use crate::session::Session;

/// Recovery loop configuration.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    pub interval: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RECOVERY_INTERVAL,
        }
    }
}

/// Background reconnection of failed endpoints.
///
/// Every tick it tries to reopen each endpoint that is down. Failures are
/// logged and left for the next tick; the loop only stops when its
/// cancellation token fires.
pub struct RecoveryLoop<S> {
    endpoints: SharedEndpoints<S>,
    config: RecoveryConfig,
}

impl<S: Session> RecoveryLoop<S> {
    pub fn new(endpoints: SharedEndpoints<S>, config: RecoveryConfig) -> Self {
        Self { endpoints, config }
    }

    /// Starts the loop on the runtime. The first tick runs immediately.
    pub fn spawn(self, cancel: CancellationToken) -> RecoveryHandle {
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            self.run(token).await;
        });
        RecoveryHandle { cancel, task }
    }

    async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.tick() => {}
            }
        }

        debug!("Recovery loop stopped");
    }

    /// One pass over every down endpoint. Returns how many came back up.
    ///
    /// An endpoint whose session is locked is in the middle of a call and is
    /// left for the next pass. A reconnect only holds its own endpoint's
    /// session; the endpoint stays down, so callers skip it meanwhile.
    pub async fn tick(&self) -> usize {
        let mut recovered = 0;

        for state in self.endpoints.iter() {
            match state.try_recover().await {
                Some(Ok(())) => {
                    info!("Recovered connection to {}", state.endpoint());
                    recovered += 1;
                }
                Some(Err(e)) => {
                    debug!("Reconnecting to {} failed: {}", state.endpoint(), e);
                }
                None => {}
            }
        }

        recovered
    }
}

/// Handle to a spawned [`RecoveryLoop`].
pub struct RecoveryHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl RecoveryHandle {
    /// Asks the loop to stop without waiting for it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stops the loop and waits for the task to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}
