//! # habase CLI Entry Point
//!
//! Talks to a cluster of store servers through one failover connection.
//!
//! ## Usage
//!
//! ```bash
//! # List tables on a two-server cluster
//! habase -s 10.6.30.133:9090 -s 10.6.30.134:9090 tables
//!
//! # Only tables under a prefix, with the prefix stripped
//! habase -s 10.6.30.133:9090 --prefix app tables
//!
//! # Dispatch a raw operation (outputs raw JSON)
//! habase -s 10.6.30.133:9090 call isTableEnabled -a '["users"]'
//!
//! # Watch failover while servers come and go
//! habase -s 10.6.30.133:9090 -s 10.6.30.134:9090 --recovery-interval 5 watch users
//! ```

use anyhow::Result;
use argh::FromArgs;
use habase_client::{CompatMode, Connection, ConnectionConfig, Endpoint, Value};
use habase_common::transport::{ProtocolKind, TransportMode};
use std::time::Duration;

/// Main CLI structure parsed from command-line arguments.
///
/// Connection flags come before the subcommand and apply to all of them.
#[derive(FromArgs)]
/// habase - high-availability store client
struct Cli {
    /// server address as host:port (repeat for failover; default localhost:9090)
    #[argh(option, short = 's', long = "server")]
    servers: Vec<String>,

    /// table name prefix
    #[argh(option)]
    prefix: Option<String>,

    /// separator between prefix and table name
    #[argh(option, default = "\"_\".into()")]
    separator: String,

    /// transport framing: buffered or framed
    #[argh(option, default = "\"buffered\".into()")]
    transport: String,

    /// encoding protocol: binary or compact
    #[argh(option, default = "\"binary\".into()")]
    protocol: String,

    /// server compatibility mode: 0.90, 0.92, 0.94, 0.96 or 0.98
    #[argh(option, default = "\"0.98\".into()")]
    compat: String,

    /// socket timeout in milliseconds (default: none)
    #[argh(option, long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// seconds between attempts to reconnect failed servers
    #[argh(option, long = "recovery-interval", default = "60")]
    recovery_interval_secs: u64,

    #[argh(subcommand)]
    command: Commands,
}

/// Available CLI subcommands.
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Tables(TablesArgs),
    Call(CallArgs),
    Watch(WatchArgs),
}

#[derive(FromArgs)]
#[argh(subcommand, name = "tables")]
/// list tables
struct TablesArgs {}

/// Arguments for dispatching one raw operation.
///
/// The result is printed as raw JSON on stdout; errors go to stderr with a
/// non-zero exit code.
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// dispatch an operation on one live server
struct CallArgs {
    /// name of the remote operation, e.g. getTableNames
    #[argh(positional)]
    operation: String,

    /// JSON array of positional arguments
    #[argh(option, short = 'a', long = "args", default = "\"[]\".into()")]
    args: String,
}

/// Arguments for watching a table while servers fail and recover.
#[derive(FromArgs)]
#[argh(subcommand, name = "watch")]
/// poll a table and log failover as it happens
struct WatchArgs {
    /// table to poll
    #[argh(positional)]
    table: String,

    /// poll interval in milliseconds
    #[argh(option, short = 'i', long = "interval", default = "1000")]
    interval_ms: u64,

    /// stop after this many polls (default: run until Ctrl-C)
    #[argh(option, short = 'n', long = "count")]
    count: Option<u64>,
}

/// Maps the connection flags onto a validated [`ConnectionConfig`].
fn connection_config(cli: &Cli) -> Result<ConnectionConfig> {
    let mut config = if cli.servers.is_empty() {
        ConnectionConfig::default()
    } else {
        let endpoints = cli
            .servers
            .iter()
            .map(|server| server.parse::<Endpoint>())
            .collect::<habase_client::Result<Vec<_>>>()?;
        ConnectionConfig::with_servers(endpoints)
    };

    config = config
        .with_table_prefix_separator(cli.separator.as_bytes())
        .with_transport(cli.transport.parse::<TransportMode>()?)
        .with_protocol(cli.protocol.parse::<ProtocolKind>()?)
        .with_compat(cli.compat.parse::<CompatMode>()?)
        .with_recovery_interval(Duration::from_secs(cli.recovery_interval_secs));

    if let Some(prefix) = &cli.prefix {
        config = config.with_table_prefix(prefix.as_bytes());
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config = config.with_timeout(Duration::from_millis(timeout_ms));
    }

    config.validate()?;
    Ok(config)
}

/// Parses `--args` into positional call arguments.
fn parse_call_args(args: &str) -> Result<Vec<Value>> {
    let value: Value =
        serde_json::from_str(args).map_err(|e| anyhow::anyhow!("Invalid JSON in args: {}", e))?;
    match value {
        Value::Array(args) => Ok(args),
        other => Err(anyhow::anyhow!("args must be a JSON array, got {}", other)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // call keeps stdout clean for piping into other tools
    if !matches!(cli.command, Commands::Call(_)) {
        // Set default log level to INFO, but allow RUST_LOG env var to override
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = connection_config(&cli)?;
    tracing::debug!("Servers: {:?}", config.endpoints);
    let connection = Connection::new(config).await?;

    let result = match cli.command {
        Commands::Tables(_) => run_tables(&connection).await,
        Commands::Call(args) => run_call(&connection, args).await,
        Commands::Watch(args) => {
            habase_cli::watch::run_watch(&connection, &args.table, args.interval_ms, args.count).await
        }
    };

    connection.close().await;
    result
}

async fn run_tables(connection: &Connection) -> Result<()> {
    let tables = connection.tables().await?;
    for name in &tables {
        println!("{}", String::from_utf8_lossy(name));
    }
    tracing::info!("{} tables", tables.len());
    Ok(())
}

/// Executes the `call` subcommand and prints the raw JSON result.
async fn run_call(connection: &Connection, args: CallArgs) -> Result<()> {
    let call_args = parse_call_args(&args.args)?;
    let result = connection.dispatch(&args.operation, &call_args).await?;
    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}
