//! Scripted in-memory sessions for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use habase_common::protocol::{HabaseError, Result, Value};

use crate::config::ConnectionConfig;
use crate::endpoint::Endpoint;
use crate::session::Session;

/// Shared, test-controlled behaviour of one fake server.
pub(crate) struct MockBackend {
    name: String,
    reachable: AtomicBool,
    app_error: AtomicBool,
    delay_ms: AtomicU64,
    open_delay_ms: AtomicU64,
    attempts: AtomicUsize,
    opens: AtomicUsize,
    closes: AtomicUsize,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
    responses: Mutex<HashMap<String, Value>>,
}

impl MockBackend {
    pub(crate) fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            reachable: AtomicBool::new(true),
            app_error: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
            open_delay_ms: AtomicU64::new(0),
            attempts: AtomicUsize::new(0),
            opens: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            responses: Mutex::new(HashMap::new()),
        })
    }

    pub(crate) fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub(crate) fn set_app_error(&self, app_error: bool) {
        self.app_error.store(app_error, Ordering::SeqCst);
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Delay before each open attempt settles
    pub(crate) fn set_open_delay(&self, delay: Duration) {
        self.open_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub(crate) fn set_response(&self, method: &str, value: Value) {
        self.responses.lock().unwrap().insert(method.to_string(), value);
    }

    /// Open attempts, successful or not
    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Successful opens
    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Calls that reached this backend while its session was open
    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn methods(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }
}

pub(crate) struct MockSession {
    backend: Arc<MockBackend>,
    open: bool,
}

impl MockSession {
    pub(crate) fn new(backend: Arc<MockBackend>) -> Self {
        Self { backend, open: false }
    }
}

#[async_trait]
impl Session for MockSession {
    async fn open(&mut self) -> Result<()> {
        self.backend.attempts.fetch_add(1, Ordering::SeqCst);

        let delay = self.backend.open_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if !self.backend.reachable.load(Ordering::SeqCst) {
            return Err(HabaseError::Connection(format!("{}: Connection refused", self.backend.name)));
        }
        self.open = true;
        self.backend.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) {
        if self.open {
            self.backend.closes.fetch_add(1, Ordering::SeqCst);
        }
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn invoke(&mut self, operation: &str, args: &[Value]) -> Result<Value> {
        if !self.open {
            return Err(HabaseError::Connection(format!("session to {} is not open", self.backend.name)));
        }

        self.backend
            .calls
            .lock()
            .unwrap()
            .push((operation.to_string(), args.to_vec()));

        let delay = self.backend.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if !self.backend.reachable.load(Ordering::SeqCst) {
            self.open = false;
            return Err(HabaseError::Connection(format!("{}: Connection reset", self.backend.name)));
        }

        if self.backend.app_error.load(Ordering::SeqCst) {
            return Err(HabaseError::Application {
                kind: "IOError".to_string(),
                message: format!("{} rejected {}", self.backend.name, operation),
            });
        }

        let canned = self.backend.responses.lock().unwrap().get(operation).cloned();
        Ok(canned.unwrap_or_else(|| Value::String(self.backend.name.clone())))
    }
}

/// Backends named `b0`, `b1`, ... behind endpoints `mock:1`, `mock:2`, ...
pub(crate) fn backends(count: usize) -> Vec<Arc<MockBackend>> {
    (0..count).map(|i| MockBackend::new(&format!("b{}", i))).collect()
}

pub(crate) fn endpoints(count: usize) -> Vec<Endpoint> {
    (1..=count).map(|port| Endpoint::new("mock", port as u16)).collect()
}

/// Config over `count` mock endpoints, with autoconnect off.
pub(crate) fn mock_config(count: usize) -> ConnectionConfig {
    ConnectionConfig::with_servers(endpoints(count)).with_autoconnect(false)
}

/// Session factory mapping `mock:N` to `backends[N - 1]`.
pub(crate) fn factory(backends: &[Arc<MockBackend>]) -> impl FnMut(&Endpoint) -> MockSession {
    let backends = backends.to_vec();
    move |endpoint: &Endpoint| MockSession::new(backends[endpoint.port as usize - 1].clone())
}
