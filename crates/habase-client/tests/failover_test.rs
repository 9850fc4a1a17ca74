//! Failover integration tests
//!
//! Real TCP sessions against loopback store servers that can be stopped and
//! restarted on the same port.

use habase_client::{Connection, ConnectionConfig, Endpoint, HabaseError, Liveness};
use habase_common::protocol::{RemoteError, Request};
use habase_common::transport::{ProtocolKind, RpcServer, TransportMode};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Mock Store Server
// ============================================================================

/// Loopback server answering `whoami` with its name.
struct MockStoreServer {
    name: String,
    port: u16,
    mode: TransportMode,
    protocol: ProtocolKind,
    calls: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl MockStoreServer {
    async fn start(name: &str, mode: TransportMode, protocol: ProtocolKind) -> Self {
        let server = RpcServer::bind("127.0.0.1:0", mode, protocol).await.unwrap();
        let port = server.local_addr().unwrap().port();
        let mut mock = Self {
            name: name.to_string(),
            port,
            mode,
            protocol,
            calls: Arc::new(AtomicUsize::new(0)),
            shutdown: CancellationToken::new(),
        };
        mock.serve(server);
        mock
    }

    fn serve(&mut self, server: RpcServer) {
        let name = self.name.clone();
        let calls = self.calls.clone();
        self.shutdown = CancellationToken::new();

        tokio::spawn(server.run_with_handler(
            move |req: Request| {
                let name = name.clone();
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    match req.method.as_str() {
                        "whoami" => Ok(json!(name)),
                        "getTableNames" => Ok(json!(["app_users", "app_events", "other"])),
                        "isTableEnabled" => Ok(json!(true)),
                        _ => Err(RemoteError::new("IOError", format!("{} cannot {}", name, req.method))),
                    }
                }
            },
            self.shutdown.clone(),
        ));
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint::new("127.0.0.1", self.port)
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Stops accepting and drops every open connection.
    async fn stop(&self) {
        self.shutdown.cancel();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    /// Serves again on the same port.
    async fn restart(&mut self) {
        let addr = format!("127.0.0.1:{}", self.port);
        for _ in 0..50 {
            if let Ok(server) = RpcServer::bind(&addr, self.mode, self.protocol).await {
                self.serve(server);
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("could not rebind {}", addr);
    }
}

async fn start_servers(count: usize) -> Vec<MockStoreServer> {
    let mut servers = Vec::new();
    for i in 0..count {
        servers.push(MockStoreServer::start(&format!("s{}", i), TransportMode::Buffered, ProtocolKind::Binary).await);
    }
    servers
}

fn config_for(servers: &[MockStoreServer]) -> ConnectionConfig {
    ConnectionConfig::with_servers(servers.iter().map(MockStoreServer::endpoint).collect())
        .with_timeout(Duration::from_secs(2))
}

async fn whoami(connection: &Connection) -> String {
    let result = connection.dispatch("whoami", &[]).await.unwrap();
    result.as_str().unwrap().to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_calls_rotate_over_servers() {
    let servers = start_servers(3).await;
    let connection = Connection::new(config_for(&servers)).await.unwrap();

    let mut seen = Vec::new();
    for _ in 0..4 {
        seen.push(whoami(&connection).await);
    }

    assert_eq!(seen, vec!["s0", "s1", "s2", "s0"]);
    connection.close().await;
}

#[tokio::test]
async fn test_failover_after_server_stops() {
    let servers = start_servers(2).await;
    let connection = Connection::new(config_for(&servers)).await.unwrap();

    servers[0].stop().await;

    // Cursor is at s0: the call fails there and lands on s1.
    assert_eq!(whoami(&connection).await, "s1");
    assert_eq!(whoami(&connection).await, "s1");

    let statuses = connection.statuses();
    assert_eq!(statuses[0].liveness, Liveness::Down);
    assert_eq!(statuses[0].failures, 1);
    assert_eq!(statuses[1].liveness, Liveness::Up);
    connection.close().await;
}

#[tokio::test]
async fn test_recovery_after_server_restarts() {
    let mut servers = start_servers(2).await;
    let config = config_for(&servers).with_recovery_interval(Duration::from_millis(50));
    let connection = Connection::new(config).await.unwrap();

    servers[0].stop().await;
    assert_eq!(whoami(&connection).await, "s1");
    assert_eq!(connection.live_count(), 1);

    servers[0].restart().await;

    tokio::time::timeout(Duration::from_secs(3), async {
        while connection.live_count() < 2 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("stopped server should come back into rotation");

    let mut seen = Vec::new();
    for _ in 0..2 {
        seen.push(whoami(&connection).await);
    }
    seen.sort();
    assert_eq!(seen, vec!["s0", "s1"]);
    connection.close().await;
}

#[tokio::test]
async fn test_all_servers_down() {
    let servers = start_servers(2).await;
    let connection = Connection::new(config_for(&servers)).await.unwrap();

    for server in &servers {
        server.stop().await;
    }

    let err = connection.dispatch("whoami", &[]).await.unwrap_err();

    assert!(matches!(err, HabaseError::AllBackendsUnreachable(ref op) if op == "whoami"));
    assert_eq!(err.to_string(), "Send request [whoami] to any of the servers failed");
    assert_eq!(connection.live_count(), 0);
    connection.close().await;
}

#[tokio::test]
async fn test_application_error_is_not_retried() {
    let servers = start_servers(2).await;
    let connection = Connection::new(config_for(&servers)).await.unwrap();

    let err = connection.compact_table("users", true).await.unwrap_err();

    match err {
        HabaseError::Application { kind, message } => {
            assert_eq!(kind, "IOError");
            assert_eq!(message, "s0 cannot majorCompact");
        }
        other => panic!("expected application error, got {:?}", other),
    }
    assert_eq!(servers[1].calls(), 0);
    assert_eq!(connection.live_count(), 2);
    connection.close().await;
}

#[tokio::test]
async fn test_framed_compact_transport() {
    let mut servers = Vec::new();
    for i in 0..2 {
        servers.push(MockStoreServer::start(&format!("s{}", i), TransportMode::Framed, ProtocolKind::Compact).await);
    }
    let config = config_for(&servers)
        .with_transport(TransportMode::Framed)
        .with_protocol(ProtocolKind::Compact)
        .with_table_prefix("app");
    let connection = Connection::new(config).await.unwrap();

    let tables = connection.tables().await.unwrap();
    assert_eq!(tables, vec![b"users".to_vec(), b"events".to_vec()]);
    assert!(connection.is_table_enabled("users").await.unwrap());
    connection.close().await;
}

#[tokio::test]
async fn test_nothing_listening() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = ConnectionConfig::new("127.0.0.1", port).with_timeout(Duration::from_secs(1));
    let result = Connection::new(config).await;

    assert!(matches!(result, Err(HabaseError::NoReachableBackend)));
}

#[tokio::test]
async fn test_partial_startup() {
    let servers = start_servers(1).await;
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead = Endpoint::new("127.0.0.1", listener.local_addr().unwrap().port());
    drop(listener);

    let config = ConnectionConfig::with_servers(vec![dead, servers[0].endpoint()]);
    let connection = Connection::new(config).await.unwrap();

    assert_eq!(connection.live_count(), 1);
    assert!(connection.is_recovering().await);
    assert_eq!(whoami(&connection).await, "s0");
    assert_eq!(whoami(&connection).await, "s0");
    connection.close().await;
}
