use std::collections::BTreeMap;
use std::sync::Arc;

use habase_common::protocol::{HabaseError, Result, Value};
use serde_json::Map;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{CompatMode, ConnectionConfig};
use crate::dispatcher::{Dispatcher, SharedEndpoints};
use crate::endpoint::{Endpoint, EndpointState, EndpointStatus};
use crate::recovery::{RecoveryConfig, RecoveryHandle, RecoveryLoop};
use crate::session::{Session, TcpSession};
use crate::table::{snake_to_camel_case, FamilyOptions, Table};

/// Client handle over a set of store servers.
///
/// A `Connection` owns one [`EndpointState`] per configured server, the
/// [`Dispatcher`] routing calls over them and, once opened, a background
/// [`RecoveryLoop`] that reopens servers taken down by failed calls.
///
/// # Lifecycle
///
/// 1. **Construction** validates the config before touching the network and,
///    with autoconnect on, opens every server it can.
/// 2. **open()** tolerates individual servers being unreachable and starts
///    the recovery loop the first time at least one server opens.
/// 3. **close()** stops the recovery loop and closes every session. It is
///    idempotent; a later `open()` starts over.
///
/// Dropping the connection cancels the recovery loop; sessions close when
/// their sockets drop.
///
/// # Example
///
/// ```no_run
/// # use habase_client::{Connection, ConnectionConfig, Endpoint};
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ConnectionConfig::with_servers(vec![
///     Endpoint::new("10.6.30.133", 9090),
///     Endpoint::new("10.6.30.134", 9090),
/// ])
/// .with_table_prefix("app");
///
/// let connection = Connection::new(config).await?;
/// for name in connection.tables().await? {
///     println!("{}", String::from_utf8_lossy(&name));
/// }
/// connection.close().await;
/// # Ok(())
/// # }
/// ```
pub struct Connection<S: Session = TcpSession> {
    config: ConnectionConfig,
    dispatcher: Dispatcher<S>,
    /// Running recovery loop, if any
    recovery: Mutex<Option<RecoveryHandle>>,
}

impl Connection<TcpSession> {
    /// Creates a connection speaking the configured transport and protocol
    /// over TCP.
    ///
    /// # Errors
    /// - `Configuration` if the config is invalid
    /// - `NoReachableBackend` if autoconnect is on and no server could be opened
    pub async fn new(config: ConnectionConfig) -> Result<Self> {
        let mode = config.transport;
        let protocol = config.protocol;
        let timeout = config.timeout;
        Self::with_session_factory(config, move |endpoint| {
            TcpSession::new(endpoint.clone(), mode, protocol, timeout)
        })
        .await
    }
}

impl<S: Session> Connection<S> {
    /// Creates a connection whose sessions are built by `factory`, one per
    /// endpoint in configuration order.
    pub async fn with_session_factory<F>(config: ConnectionConfig, mut factory: F) -> Result<Self>
    where
        F: FnMut(&Endpoint) -> S,
    {
        config.validate()?;

        let endpoints: SharedEndpoints<S> = config
            .endpoints
            .iter()
            .map(|endpoint| EndpointState::new(endpoint.clone(), factory(endpoint)))
            .collect::<Vec<_>>()
            .into();

        let connection = Self {
            dispatcher: Dispatcher::new(endpoints),
            recovery: Mutex::new(None),
            config,
        };

        if connection.config.autoconnect {
            connection.open().await?;
        }

        Ok(connection)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn compat(&self) -> CompatMode {
        self.config.compat
    }

    pub fn dispatcher(&self) -> &Dispatcher<S> {
        &self.dispatcher
    }

    /// Opens every server it can.
    ///
    /// Servers that fail to open stay down and are left to the recovery
    /// loop. Calling `open()` on an open connection reopens only servers
    /// that are down.
    ///
    /// # Errors
    /// `NoReachableBackend` if not a single server could be opened. The
    /// recovery loop is not started in that case; call `open()` again.
    pub async fn open(&self) -> Result<()> {
        let mut opened = 0;

        for state in self.dispatcher.endpoints().iter() {
            match state.open().await {
                Ok(()) => {
                    debug!("Opened transport to {}", state.endpoint());
                    opened += 1;
                }
                Err(e) => {
                    warn!("Failed to open transport to {}: {}", state.endpoint(), e);
                }
            }
        }

        if opened == 0 {
            return Err(HabaseError::NoReachableBackend);
        }

        info!(
            "Connected to {} of {} servers",
            opened,
            self.dispatcher.len()
        );
        self.start_recovery().await;
        Ok(())
    }

    /// Starts the recovery loop unless one is already running.
    async fn start_recovery(&self) {
        let mut slot = self.recovery.lock().await;
        if slot.as_ref().is_some_and(RecoveryHandle::is_running) {
            return;
        }

        let recovery = RecoveryLoop::new(
            Arc::clone(self.dispatcher.endpoints()),
            RecoveryConfig {
                interval: self.config.recovery_interval,
            },
        );
        *slot = Some(recovery.spawn(CancellationToken::new()));
        debug!(
            "Recovery loop started with interval {:?}",
            self.config.recovery_interval
        );
    }

    /// Whether the background recovery loop is running
    pub async fn is_recovering(&self) -> bool {
        self.recovery
            .lock()
            .await
            .as_ref()
            .is_some_and(RecoveryHandle::is_running)
    }

    /// Stops the recovery loop, then closes every session and marks every
    /// server down. Safe to call any number of times.
    pub async fn close(&self) {
        let recovery = self.recovery.lock().await.take();
        if let Some(handle) = recovery {
            handle.shutdown().await;
        }

        for state in self.dispatcher.endpoints().iter() {
            state.close().await;
        }
    }

    /// Runs a named remote operation on one live server.
    ///
    /// See [`Dispatcher::invoke`] for the failover rules.
    pub async fn dispatch(&self, operation: &str, args: &[Value]) -> Result<Value> {
        self.dispatcher.invoke(operation, args).await
    }

    /// `prefix + separator + name` when `use_prefix` is set and a prefix is
    /// configured, otherwise `name` unchanged.
    pub fn table_name(&self, name: impl AsRef<[u8]>, use_prefix: bool) -> Vec<u8> {
        let name = name.as_ref();
        match (&self.config.table_prefix, use_prefix) {
            (Some(prefix), true) => {
                let mut full =
                    Vec::with_capacity(prefix.len() + self.config.table_prefix_separator.len() + name.len());
                full.extend_from_slice(prefix);
                full.extend_from_slice(&self.config.table_prefix_separator);
                full.extend_from_slice(name);
                full
            }
            _ => name.to_vec(),
        }
    }

    /// Handle on a table. No round trip.
    pub fn table(&self, name: impl AsRef<[u8]>, use_prefix: bool) -> Table<'_, S> {
        Table::new(self.table_name(name, use_prefix), self)
    }

    pub fn statuses(&self) -> Vec<EndpointStatus> {
        self.dispatcher.statuses()
    }

    pub fn live_count(&self) -> usize {
        self.dispatcher.live_count()
    }

    /// Lists tables.
    ///
    /// With a prefix configured, only tables carrying it are returned, with
    /// the prefix and separator stripped.
    pub async fn tables(&self) -> Result<Vec<Vec<u8>>> {
        let result = self.dispatch("getTableNames", &[]).await?;
        let names = result
            .as_array()
            .ok_or_else(|| HabaseError::InvalidResponse(format!("getTableNames returned {}", result)))?;

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let name = name
                .as_str()
                .ok_or_else(|| HabaseError::InvalidResponse(format!("table name {} is not a string", name)))?;
            tables.push(name.as_bytes().to_vec());
        }

        if self.config.table_prefix.is_some() {
            let prefix = self.table_name(b"", true);
            tables = tables
                .into_iter()
                .filter_map(|name| name.strip_prefix(prefix.as_slice()).map(<[u8]>::to_vec))
                .collect();
        }

        Ok(tables)
    }

    /// Creates a table with the given column families.
    ///
    /// Option names are given in snake_case (`max_versions`) and sent in the
    /// wire's camelCase (`maxVersions`). A `:` is appended to family names
    /// that lack one.
    pub async fn create_table(
        &self,
        name: impl AsRef<[u8]>,
        families: &BTreeMap<String, FamilyOptions>,
    ) -> Result<()> {
        let name = self.table_name(name, true);

        if families.is_empty() {
            return Err(HabaseError::InvalidRequest(format!(
                "Cannot create table {} (no column families specified)",
                String::from_utf8_lossy(&name)
            )));
        }

        let mut descriptors = Vec::with_capacity(families.len());
        for (family, options) in families {
            let mut family_name = family.clone();
            if !family_name.ends_with(':') {
                family_name.push(':');
            }

            let mut descriptor = Map::new();
            descriptor.insert("name".to_string(), Value::String(family_name));
            for (key, value) in options {
                descriptor.insert(snake_to_camel_case(key), value.clone());
            }
            descriptors.push(Value::Object(descriptor));
        }

        self.dispatch("createTable", &[wire_name(&name)?, Value::Array(descriptors)])
            .await?;
        Ok(())
    }

    /// Deletes a table, disabling it first when `disable` is set and the
    /// table is enabled.
    pub async fn delete_table(&self, name: impl AsRef<[u8]>, disable: bool) -> Result<()> {
        let name = name.as_ref();
        if disable && self.is_table_enabled(name).await? {
            self.disable_table(name).await?;
        }

        let name = self.table_name(name, true);
        self.dispatch("deleteTable", &[wire_name(&name)?]).await?;
        Ok(())
    }

    pub async fn enable_table(&self, name: impl AsRef<[u8]>) -> Result<()> {
        let name = self.table_name(name, true);
        self.dispatch("enableTable", &[wire_name(&name)?]).await?;
        Ok(())
    }

    pub async fn disable_table(&self, name: impl AsRef<[u8]>) -> Result<()> {
        let name = self.table_name(name, true);
        self.dispatch("disableTable", &[wire_name(&name)?]).await?;
        Ok(())
    }

    pub async fn is_table_enabled(&self, name: impl AsRef<[u8]>) -> Result<bool> {
        let name = self.table_name(name, true);
        let result = self.dispatch("isTableEnabled", &[wire_name(&name)?]).await?;
        result
            .as_bool()
            .ok_or_else(|| HabaseError::InvalidResponse(format!("isTableEnabled returned {}", result)))
    }

    /// Requests a compaction, major if `major` is set.
    pub async fn compact_table(&self, name: impl AsRef<[u8]>, major: bool) -> Result<()> {
        let name = self.table_name(name, true);
        let operation = if major { "majorCompact" } else { "compact" };
        self.dispatch(operation, &[wire_name(&name)?]).await?;
        Ok(())
    }
}

impl<S: Session> Drop for Connection<S> {
    fn drop(&mut self) {
        if let Some(handle) = self.recovery.get_mut().take() {
            handle.cancel();
        }
    }
}

/// Table names travel as strings.
pub(crate) fn wire_name(name: &[u8]) -> Result<Value> {
    std::str::from_utf8(name)
        .map(|name| Value::String(name.to_string()))
        .map_err(|_| {
            HabaseError::InvalidRequest(format!(
                "table name {:?} is not valid UTF-8",
                String::from_utf8_lossy(name)
            ))
        })
}
