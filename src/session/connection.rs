//! Observer connection lifecycle
//!
//! One `ObserverSession` drives one WebSocket observer: it registers with the
//! hub, replays the history snapshot as a single frame, then streams live
//! lines until the observer goes away or the hub drops it. Liveness is checked
//! with periodic pings; the observer must send something (normally the pong)
//! within `pong_wait`.
//!
//! Whatever ends the session, the subscription is dropped on the way out,
//! which unregisters it from the hub.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::error::{CapacityError, Error as WsError, ProtocolError};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::hub::{BroadcastHub, DetachReason, RoutingKey, Subscription};
use crate::server::config::{ServerConfig, MIN_PONG_WAIT};

use super::state::{DetachCause, ObserverPhase, ObserverState};

/// Shortest ping period a session will use
const MIN_PING_PERIOD: Duration = Duration::from_millis(1);

type WsSink<S> = SplitSink<WebSocketStream<S>, Message>;
type WsSource<S> = SplitStream<WebSocketStream<S>>;

/// Timing limits for one session
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    pub write_timeout: Duration,
    pub pong_wait: Duration,
    pub ping_period: Duration,
}

impl From<&ServerConfig> for SessionLimits {
    fn from(config: &ServerConfig) -> Self {
        let pong_wait = config.pong_wait.max(MIN_PONG_WAIT);
        Self {
            write_timeout: config.write_timeout,
            pong_wait,
            // `ping_period` is a public field and may be zero
            ping_period: config.ping_period.clamp(MIN_PING_PERIOD, pong_wait),
        }
    }
}

/// One attached observer
pub struct ObserverSession {
    state: ObserverState,
    limits: SessionLimits,
    hub: Arc<BroadcastHub>,
}

impl ObserverSession {
    /// Create a session for an observer that asked for `key`
    pub fn new(
        session_id: u64,
        peer_addr: SocketAddr,
        key: RoutingKey,
        limits: SessionLimits,
        hub: Arc<BroadcastHub>,
    ) -> Self {
        Self {
            state: ObserverState::new(session_id, peer_addr, key),
            limits,
            hub,
        }
    }

    /// Get the session state
    pub fn state(&self) -> &ObserverState {
        &self.state
    }

    /// Run the session to completion over an upgraded connection
    ///
    /// Returns why the session ended.
    pub async fn run<S>(mut self, ws: WebSocketStream<S>) -> DetachCause
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (mut sink, mut source) = ws.split();

        let mut subscription = match self.hub.snapshot_and_register(&self.state.key) {
            Ok(subscription) => subscription,
            Err(e) => {
                tracing::debug!(session_id = self.state.id, error = %e, "Attach refused");
                return self.finish(&mut sink, DetachCause::HubShutdown).await;
            }
        };

        let cause = match self.catch_up(&mut sink, &mut subscription).await {
            Err(cause) => cause,
            Ok(()) => {
                self.state.go_live();
                let limits = self.limits;
                let state = &mut self.state;
                tokio::select! {
                    cause = stream_live(&mut sink, &mut subscription, state, limits) => cause,
                    cause = watch_liveness(&mut source, limits.pong_wait) => cause,
                }
            }
        };

        subscription.detach();
        self.finish(&mut sink, cause).await
    }

    /// Replay the history snapshot as one frame
    async fn catch_up<S>(
        &mut self,
        sink: &mut WsSink<S>,
        subscription: &mut Subscription,
    ) -> Result<(), DetachCause>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let Some((frame, lines)) = subscription.take_catchup_frame() else {
            self.state.start_catchup(0);
            return Ok(());
        };

        self.state.start_catchup(lines);
        let bytes = frame.len();
        send(sink, Message::text(frame), self.limits.write_timeout).await?;
        self.state.on_sent(bytes);

        tracing::debug!(
            session_id = self.state.id,
            key = %self.state.key,
            lines = lines,
            "History replayed"
        );
        Ok(())
    }

    /// Enter `Detached`, say goodbye if the connection is still usable
    async fn finish<S>(&mut self, sink: &mut WsSink<S>, cause: DetachCause) -> DetachCause
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if self.state.phase == ObserverPhase::Detached {
            return self.state.cause.unwrap_or(cause);
        }
        self.state.detach(cause);

        if let Some(frame) = close_frame(cause) {
            let _ = send(sink, Message::Close(Some(frame)), self.limits.write_timeout).await;
        }
        let _ = tokio::time::timeout(self.limits.write_timeout, sink.close()).await;

        tracing::info!(
            session_id = self.state.id,
            peer = %self.state.peer_addr,
            key = %self.state.key,
            cause = %cause,
            lines_sent = self.state.lines_sent,
            duration_ms = self.state.duration().as_millis() as u64,
            "Observer detached"
        );
        cause
    }
}

/// Forward live lines and send periodic pings
async fn stream_live<S>(
    sink: &mut WsSink<S>,
    subscription: &mut Subscription,
    state: &mut ObserverState,
    limits: SessionLimits,
) -> DetachCause
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let period = limits.ping_period.max(MIN_PING_PERIOD);
    let mut ping = interval_at(Instant::now() + period, period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            line = subscription.recv() => {
                let Some(line) = line else {
                    return DetachCause::from_hub(subscription.detach_reason());
                };
                if let Err(cause) = send(sink, Message::text(line.to_string()), limits.write_timeout).await {
                    return hub_cause_or(subscription, cause);
                }
                state.on_sent(line.len());
            }
            _ = ping.tick() => {
                if let Err(cause) = send(sink, Message::Ping(Default::default()), limits.write_timeout).await {
                    return hub_cause_or(subscription, cause);
                }
            }
        }
    }
}

/// Prefer the hub's reason when it dropped the subscriber during a stalled write
fn hub_cause_or(subscription: &Subscription, cause: DetachCause) -> DetachCause {
    match subscription.detach_reason() {
        Some(reason @ (DetachReason::Overflow | DetachReason::Shutdown)) => {
            DetachCause::from_hub(Some(reason))
        }
        _ => cause,
    }
}

/// Read until the observer goes away or stays silent too long
///
/// Any inbound frame counts as a sign of life. Text the observer sends is
/// otherwise ignored.
async fn watch_liveness<S>(source: &mut WsSource<S>, pong_wait: Duration) -> DetachCause
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        match tokio::time::timeout(pong_wait, source.next()).await {
            Err(_) => return DetachCause::LivenessTimeout,
            Ok(None) => return DetachCause::PeerClosed,
            Ok(Some(Ok(Message::Close(_)))) => return DetachCause::PeerClosed,
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(e))) => return read_error_cause(&e),
        }
    }
}

fn read_error_cause(e: &WsError) -> DetachCause {
    match e {
        WsError::ConnectionClosed
        | WsError::AlreadyClosed
        | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => DetachCause::PeerClosed,
        WsError::Capacity(CapacityError::MessageTooLong { .. }) => DetachCause::ProtocolViolation,
        WsError::Protocol(_) => DetachCause::ProtocolViolation,
        _ => {
            tracing::debug!(error = %e, "Observer read failed");
            DetachCause::ReadFailed
        }
    }
}

async fn send<S>(sink: &mut WsSink<S>, message: Message, timeout: Duration) -> Result<(), DetachCause>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match tokio::time::timeout(timeout, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "Observer write failed");
            Err(DetachCause::WriteFailed)
        }
        Err(_) => {
            tracing::debug!(timeout_ms = timeout.as_millis() as u64, "Observer write timed out");
            Err(DetachCause::WriteFailed)
        }
    }
}

/// Close frame to send for causes where the connection is still writable
fn close_frame(cause: DetachCause) -> Option<CloseFrame<'static>> {
    let (code, reason) = match cause {
        DetachCause::Evicted => (CloseCode::Policy, "observer too slow"),
        DetachCause::HubShutdown => (CloseCode::Away, "server shutting down"),
        DetachCause::ProtocolViolation => (CloseCode::Size, "message too large"),
        DetachCause::LivenessTimeout => (CloseCode::Policy, "liveness timeout"),
        DetachCause::Unregistered => (CloseCode::Normal, "detached"),
        DetachCause::PeerClosed | DetachCause::ReadFailed | DetachCause::WriteFailed => {
            return None
        }
    };
    Some(CloseFrame {
        code,
        reason: reason.into(),
    })
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use tokio::io::{duplex, DuplexStream};
    use tokio_tungstenite::tungstenite::protocol::Role;

    use super::*;
    use crate::hub::HubConfig;

    fn limits() -> SessionLimits {
        SessionLimits {
            write_timeout: Duration::from_secs(5),
            pong_wait: Duration::from_secs(5),
            ping_period: Duration::from_secs(4),
        }
    }

    fn peer() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40000)
    }

    async fn ws_pair() -> (WebSocketStream<DuplexStream>, WebSocketStream<DuplexStream>) {
        ws_pair_with_buffer(64 * 1024).await
    }

    async fn ws_pair_with_buffer(
        size: usize,
    ) -> (WebSocketStream<DuplexStream>, WebSocketStream<DuplexStream>) {
        let (server, client) = duplex(size);
        let server = WebSocketStream::from_raw_socket(server, Role::Server, None).await;
        let client = WebSocketStream::from_raw_socket(client, Role::Client, None).await;
        (server, client)
    }

    async fn next_text(client: &mut WebSocketStream<DuplexStream>) -> String {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
                .await
                .expect("timed out waiting for frame")
                .expect("stream ended")
                .expect("read failed");
            match msg {
                Message::Text(text) => return text.to_string(),
                Message::Ping(_) | Message::Pong(_) => continue,
                other => panic!("unexpected message: {other:?}"),
            }
        }
    }

    async fn wait_for_subscribers(hub: &BroadcastHub, key: &str, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while hub.subscriber_count(key) != n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("subscriber count not reached");
    }

    #[tokio::test]
    async fn test_catchup_frame_then_live_lines() {
        let hub = Arc::new(BroadcastHub::with_config(
            HubConfig::default().buffer_max_lines(3),
        ));
        let key = RoutingKey::new("h1");
        for s in ["a", "b", "c", "d"] {
            hub.ingest(&key, s);
        }

        let (server, mut client) = ws_pair().await;
        let session = ObserverSession::new(1, peer(), key.clone(), limits(), Arc::clone(&hub));
        let task = tokio::spawn(session.run(server));

        assert_eq!(next_text(&mut client).await, "b\nc\nd");

        hub.ingest(&key, "e");
        assert_eq!(next_text(&mut client).await, "e");

        client.close(None).await.unwrap();
        let cause = task.await.unwrap();
        assert_eq!(cause, DetachCause::PeerClosed);
        assert_eq!(hub.subscriber_count("h1"), 0);
    }

    #[tokio::test]
    async fn test_no_catchup_frame_without_history() {
        let hub = Arc::new(BroadcastHub::new());
        let key = RoutingKey::new("quiet");

        let (server, mut client) = ws_pair().await;
        let session = ObserverSession::new(2, peer(), key.clone(), limits(), Arc::clone(&hub));
        let task = tokio::spawn(session.run(server));

        wait_for_subscribers(&hub, "quiet", 1).await;
        hub.ingest(&key, "first live line");
        assert_eq!(next_text(&mut client).await, "first live line");

        drop(client);
        let cause = task.await.unwrap();
        assert!(matches!(
            cause,
            DetachCause::PeerClosed | DetachCause::ReadFailed
        ));
        assert_eq!(hub.subscriber_count("quiet"), 0);
    }

    #[tokio::test]
    async fn test_slow_observer_evicted_fast_observer_unaffected() {
        let hub = Arc::new(BroadcastHub::with_config(
            HubConfig::default().subscriber_queue_capacity(4),
        ));
        let key = RoutingKey::new("h1");
        let limits = SessionLimits {
            write_timeout: Duration::from_millis(200),
            ..limits()
        };

        // The slow client never reads, so its tiny pipe fills and writes stall
        let (slow_server, _slow_client) = ws_pair_with_buffer(64).await;
        let (fast_server, mut fast_client) = ws_pair().await;

        let slow = ObserverSession::new(6, peer(), key.clone(), limits, Arc::clone(&hub));
        let fast = ObserverSession::new(7, peer(), key.clone(), limits, Arc::clone(&hub));
        let slow_task = tokio::spawn(slow.run(slow_server));
        let fast_task = tokio::spawn(fast.run(fast_server));
        wait_for_subscribers(&hub, "h1", 2).await;

        for i in 0..40 {
            hub.ingest(&key, format!("line-{i:02}"));
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        for i in 0..40 {
            assert_eq!(next_text(&mut fast_client).await, format!("line-{i:02}"));
        }

        assert_eq!(slow_task.await.unwrap(), DetachCause::Evicted);
        assert_eq!(hub.subscriber_count("h1"), 1);
        assert_eq!(hub.stats().subscribers_evicted, 1);

        fast_client.close(None).await.unwrap();
        assert_eq!(fast_task.await.unwrap(), DetachCause::PeerClosed);
    }

    #[tokio::test]
    async fn test_silent_observer_times_out() {
        let hub = Arc::new(BroadcastHub::new());
        let key = RoutingKey::new("h1");
        let limits = SessionLimits {
            write_timeout: Duration::from_secs(1),
            pong_wait: Duration::from_millis(100),
            ping_period: Duration::from_millis(90),
        };

        // Client never polls, so it never answers pings
        let (server, _client) = ws_pair().await;
        let session = ObserverSession::new(3, peer(), key, limits, Arc::clone(&hub));

        let cause = session.run(server).await;
        assert_eq!(cause, DetachCause::LivenessTimeout);
        assert_eq!(hub.subscriber_count("h1"), 0);
    }

    #[tokio::test]
    async fn test_hub_shutdown_closes_session() {
        let hub = Arc::new(BroadcastHub::new());
        let key = RoutingKey::new("h1");

        let (server, mut client) = ws_pair().await;
        let session = ObserverSession::new(4, peer(), key, limits(), Arc::clone(&hub));
        let task = tokio::spawn(session.run(server));

        wait_for_subscribers(&hub, "h1", 1).await;
        hub.shutdown();

        let cause = task.await.unwrap();
        assert_eq!(cause, DetachCause::HubShutdown);

        let msg = client.next().await.unwrap().unwrap();
        assert!(matches!(msg, Message::Close(Some(frame)) if frame.code == CloseCode::Away));
    }

    #[tokio::test]
    async fn test_attach_after_shutdown_is_refused() {
        let hub = Arc::new(BroadcastHub::new());
        hub.shutdown();

        let (server, _client) = ws_pair().await;
        let session = ObserverSession::new(5, peer(), RoutingKey::new("h1"), limits(), hub);

        assert_eq!(session.run(server).await, DetachCause::HubShutdown);
    }

    #[test]
    fn test_close_frames() {
        assert_eq!(
            close_frame(DetachCause::Evicted).map(|f| f.code),
            Some(CloseCode::Policy)
        );
        assert!(close_frame(DetachCause::WriteFailed).is_none());
        assert!(close_frame(DetachCause::PeerClosed).is_none());
    }
}
