//! habase client
//!
//! A single logical client handle over a set of store servers. Calls are
//! spread round-robin over the servers that are up; a server that fails at
//! the transport level is taken out of rotation and the call moves on to the
//! next one. A background task reopens failed servers.
//!
//! - [`Connection`]: the handle callers hold (lifecycle, names, admin ops)
//! - [`Dispatcher`]: round-robin-with-failover routing
//! - [`RecoveryLoop`]: background reconnection of failed endpoints
//! - [`Session`] / [`TcpSession`]: one connection to one server
//! - [`ConnectionPool`]: a bounded pool of whole connections

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod endpoint;
pub mod pool;
pub mod recovery;
pub mod session;
pub mod table;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{CompatMode, ConnectionConfig};
pub use connection::Connection;
pub use dispatcher::Dispatcher;
pub use endpoint::{Endpoint, EndpointState, EndpointStatus, Liveness};
pub use pool::{ConnectionPool, PoolConfig, PooledConnection};
pub use recovery::{RecoveryConfig, RecoveryHandle, RecoveryLoop};
pub use session::{Session, TcpSession};
pub use table::{FamilyOptions, Table};

pub use habase_common::protocol::{HabaseError, Result, Value};
