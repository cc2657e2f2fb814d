//! Syslog UDP listener
//!
//! Receives one RFC 5424 message per datagram and feeds it to the hub, keyed
//! by the message's HOSTNAME. Malformed or unroutable datagrams are counted and
//! skipped; nothing received from the network stops the listener.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::net::UdpSocket;

use crate::error::Result;
use crate::hub::BroadcastHub;
use crate::stats::{IngestCounters, IngestStats};

use super::config::SyslogConfig;
use super::syslog;

/// Syslog ingestion adapter
pub struct SyslogListener {
    socket: UdpSocket,
    config: SyslogConfig,
    hub: Arc<BroadcastHub>,
    counters: Arc<IngestCounters>,
}

impl SyslogListener {
    /// Bind the UDP socket
    ///
    /// Failing to bind is a startup error the caller should treat as fatal.
    pub async fn bind(config: SyslogConfig, hub: Arc<BroadcastHub>) -> Result<Self> {
        let socket = UdpSocket::bind(config.bind_addr).await?;
        tracing::info!(addr = %socket.local_addr()?, "Syslog listener bound");

        Ok(Self {
            socket,
            config,
            hub,
            counters: Arc::new(IngestCounters::new()),
        })
    }

    /// Address the socket is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Shared handle to the ingestion counters
    pub fn counters(&self) -> Arc<IngestCounters> {
        Arc::clone(&self.counters)
    }

    /// Current ingestion statistics
    pub fn stats(&self) -> IngestStats {
        self.counters.snapshot()
    }

    /// Receive datagrams until the task is cancelled
    pub async fn run(&self) -> Result<()> {
        let mut buf = BytesMut::with_capacity(self.config.max_datagram_size);

        loop {
            buf.clear();
            match self.socket.recv_buf_from(&mut buf).await {
                Ok((len, peer)) => self.handle_datagram(&buf[..len], peer),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to receive syslog datagram");
                }
            }
        }
    }

    /// Receive datagrams until `shutdown` resolves
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => {
                tracing::info!("Syslog listener stopping");
                Ok(())
            }
            result = self.run() => result,
        }
    }

    fn handle_datagram(&self, datagram: &[u8], peer: SocketAddr) {
        self.counters.datagrams_received.fetch_add(1, Ordering::Relaxed);

        let message = match syslog::parse(datagram) {
            Ok(message) => message,
            Err(e) => {
                self.counters.messages_malformed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(peer = %peer, error = %e, "Malformed syslog datagram");
                return;
            }
        };

        match message.into_ingested() {
            Some(ingested) => {
                tracing::trace!(peer = %peer, key = %ingested.key, "Syslog message received");
                self.hub.ingest_message(ingested);
            }
            None => {
                self.counters.messages_unrouted.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(peer = %peer, "Syslog message without host name dropped");
            }
        }
    }
}
