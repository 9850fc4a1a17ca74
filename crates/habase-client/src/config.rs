use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use habase_common::protocol::{HabaseError, Result};
use habase_common::transport::{ProtocolKind, TransportMode};

use crate::endpoint::Endpoint;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 9090;
pub const DEFAULT_RECOVERY_INTERVAL: Duration = Duration::from_secs(60);

/// Server version the client talks to.
///
/// Stored and exposed to higher layers; the dispatch core does not branch
/// on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompatMode {
    V0_90,
    V0_92,
    V0_94,
    V0_96,
    #[default]
    V0_98,
}

impl CompatMode {
    pub const ALL: [CompatMode; 5] = [
        CompatMode::V0_90,
        CompatMode::V0_92,
        CompatMode::V0_94,
        CompatMode::V0_96,
        CompatMode::V0_98,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CompatMode::V0_90 => "0.90",
            CompatMode::V0_92 => "0.92",
            CompatMode::V0_94 => "0.94",
            CompatMode::V0_96 => "0.96",
            CompatMode::V0_98 => "0.98",
        }
    }
}

impl fmt::Display for CompatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompatMode {
    type Err = HabaseError;

    fn from_str(s: &str) -> Result<Self> {
        CompatMode::ALL
            .iter()
            .copied()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| {
                let allowed: Vec<&str> = CompatMode::ALL.iter().map(|m| m.as_str()).collect();
                HabaseError::Configuration(format!(
                    "'compat' must be one of {} (got '{}')",
                    allowed.join(", "),
                    s
                ))
            })
    }
}

/// Everything a [`Connection`](crate::Connection) needs before it touches
/// the network.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Servers in rotation order. Fixed for the life of the connection.
    pub endpoints: Vec<Endpoint>,
    /// Socket timeout applied to every connect, read and write
    pub timeout: Option<Duration>,
    /// Open every endpoint during construction
    pub autoconnect: bool,
    pub table_prefix: Option<Vec<u8>>,
    pub table_prefix_separator: Vec<u8>,
    pub compat: CompatMode,
    pub transport: TransportMode,
    pub protocol: ProtocolKind,
    /// Time between recovery passes over failed endpoints
    pub recovery_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![Endpoint::new(DEFAULT_HOST, DEFAULT_PORT)],
            timeout: None,
            autoconnect: true,
            table_prefix: None,
            table_prefix_separator: b"_".to_vec(),
            compat: CompatMode::default(),
            transport: TransportMode::default(),
            protocol: ProtocolKind::default(),
            recovery_interval: DEFAULT_RECOVERY_INTERVAL,
        }
    }
}

impl ConnectionConfig {
    /// Config for a single server.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::with_servers(vec![Endpoint::new(host, port)])
    }

    /// Config for several servers, tried in the given order.
    pub fn with_servers(endpoints: Vec<Endpoint>) -> Self {
        Self {
            endpoints,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_autoconnect(mut self, autoconnect: bool) -> Self {
        self.autoconnect = autoconnect;
        self
    }

    pub fn with_table_prefix(mut self, prefix: impl Into<Vec<u8>>) -> Self {
        self.table_prefix = Some(prefix.into());
        self
    }

    pub fn with_table_prefix_separator(mut self, separator: impl Into<Vec<u8>>) -> Self {
        self.table_prefix_separator = separator.into();
        self
    }

    pub fn with_compat(mut self, compat: CompatMode) -> Self {
        self.compat = compat;
        self
    }

    pub fn with_transport(mut self, transport: TransportMode) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_protocol(mut self, protocol: ProtocolKind) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_recovery_interval(mut self, interval: Duration) -> Self {
        self.recovery_interval = interval;
        self
    }

    /// Checks the config without any network activity.
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(HabaseError::Configuration(
                "at least one server endpoint is required".to_string(),
            ));
        }

        if let Some(endpoint) = self.endpoints.iter().find(|e| e.port == 0) {
            return Err(HabaseError::Configuration(format!(
                "Endpoint '{}' has port 0",
                endpoint
            )));
        }

        if self.recovery_interval.is_zero() {
            return Err(HabaseError::Configuration(
                "'recovery_interval' must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
