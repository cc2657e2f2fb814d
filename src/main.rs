//! logstream server binary
//!
//! Listens for RFC 5424 syslog over UDP and serves each sending host's lines
//! to WebSocket observers at `ws://<listen>/logstream/<host>`.
//!
//! Run with: logstream [OPTIONS]
//!
//! Examples:
//!   logstream                                   # syslog on 127.0.0.1:514, ws on 0.0.0.0:8080
//!   logstream --syslog-listen 127.0.0.1:5514    # unprivileged syslog port
//!   logstream --key-policy uuid                 # observers follow task ids
//!
//! Send a line with logger(1):
//!   logger --rfc5424 -n 127.0.0.1 -P 5514 -d "hello"
//!
//! Watch it with websocat:
//!   websocat ws://localhost:8080/logstream/$(hostname)

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;

use logstream::hub::history::DEFAULT_MAX_LINES;
use logstream::hub::config::DEFAULT_QUEUE_CAPACITY;
use logstream::{
    BroadcastHub, HubConfig, KeyPolicy, LogstreamServer, ServerConfig, SyslogConfig,
    SyslogListener,
};

#[derive(Parser, Debug)]
#[command(name = "logstream")]
#[command(about = "Fan out syslog lines to WebSocket observers, keyed by host")]
#[command(version)]
struct Cli {
    /// Number of lines kept per key and replayed to new observers
    #[arg(long, default_value_t = DEFAULT_MAX_LINES)]
    buffer_max_lines: usize,

    /// Lines an observer may fall behind before it is disconnected
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// WebSocket listen address
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// Syslog UDP listen address
    #[arg(long, default_value = "127.0.0.1:514")]
    syslog_listen: SocketAddr,

    /// Accepted routing keys: hostname, uuid or any
    #[arg(long, default_value_t = KeyPolicy::Hostname)]
    key_policy: KeyPolicy,

    /// Maximum concurrent observers (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_connections: usize,
}

impl Cli {
    fn hub_config(&self) -> HubConfig {
        HubConfig::default()
            .buffer_max_lines(self.buffer_max_lines)
            .subscriber_queue_capacity(self.queue_capacity)
    }

    fn server_config(&self) -> ServerConfig {
        ServerConfig::with_addr(self.listen)
            .key_policy(self.key_policy)
            .max_connections(self.max_connections)
    }

    fn syslog_config(&self) -> SyslogConfig {
        SyslogConfig::with_addr(self.syslog_listen)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("logstream=info")),
        )
        .init();

    let hub = Arc::new(BroadcastHub::with_config(cli.hub_config()));

    let syslog = match SyslogListener::bind(cli.syslog_config(), Arc::clone(&hub)).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Error: cannot listen for syslog on {}: {}", cli.syslog_listen, e);
            std::process::exit(1);
        }
    };

    let server = match LogstreamServer::bind(cli.server_config(), Arc::clone(&hub)).await {
        Ok(server) => server,
        Err(e) => {
            eprintln!("Error: cannot listen for observers on {}: {}", cli.listen, e);
            std::process::exit(1);
        }
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = server.run_until(shutdown) => result?,
        result = syslog.run() => result?,
    }
    hub.shutdown();

    let stats = hub.stats();
    let ingest = syslog.stats();
    tracing::info!(
        keys = stats.keys,
        messages_ingested = stats.messages_ingested,
        messages_dropped = stats.messages_dropped,
        subscribers_evicted = stats.subscribers_evicted,
        datagrams_received = ingest.datagrams_received,
        messages_malformed = ingest.messages_malformed,
        uptime_secs = stats.uptime.as_secs(),
        "logstream stopped"
    );

    Ok(())
}
