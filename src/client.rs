//! The realtime connection client.
//!
//! One `RealtimeClient` owns one logical connection: it drives the lifecycle
//! state machine, schedules reconnects with exponential backoff, keeps the
//! connection alive with heartbeats and an inactivity watchdog, replays the
//! outbound queue on reconnect, and fans inbound messages out through the
//! dispatch registry. Collaborators (credentials, transport) are injected,
//! so multiple isolated clients can coexist in one process.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch, Notify};
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};

use crate::auth::TokenProvider;
use crate::backoff::BackoffPolicy;
use crate::config::RealtimeConfig;
use crate::dispatch::{BinaryHandler, DispatchRegistry, EventHandler, StatusHandler, Subscription};
use crate::error::{RealtimeError, RtResult};
use crate::message::{OutboundMessage, ServerEvent};
use crate::network::realtime_url;
use crate::queue::OutboundQueue;
use crate::transport::{
    TransportEvent, TransportFactory, TransportHandle, WebSocketTransport, CLOSE_NORMAL,
    CLOSE_POLICY_VIOLATION,
};

/// How often a session retries draining entries a full wire channel left
/// behind.
const DRAIN_RETRY_INTERVAL: Duration = Duration::from_millis(250);

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Reconnecting,
    Failed,
}

/// Status change delivered to status subscribers.
///
/// Transient network failures are only ever observable here; they are never
/// surfaced as errors to callers.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    /// A connection attempt is underway
    Connecting,
    /// The connection is open and the outbound queue has been drained
    Open,
    /// A retry is scheduled after `delay`
    Reconnecting { attempt: u32, delay: Duration },
    /// Terminal: the server rejected the session; no automatic retry
    AuthFailed { reason: String },
    /// Terminal: the configured retry budget is spent
    RetriesExhausted { attempts: u32 },
    /// Deliberate shutdown completed
    Closed,
}

/// Resilient realtime client.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use studio_realtime::prelude::*;
///
/// #[tokio::main]
/// async fn main() -> Result<(), RealtimeError> {
///     let tokens = Arc::new(StaticTokenProvider::new("session-token"));
///     let client = RealtimeClient::with_websocket_transport(RealtimeConfig::default(), tokens);
///
///     let _sub = client.subscribe("notification", Arc::new(|event| {
///         println!("notification: {:?}", event);
///     }));
///
///     client.connect().await?;
///     client.send(OutboundMessage::new("join_project").with_field("project_id", "p1"));
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<Inner>,
}

impl RealtimeClient {
    /// Create a client with injected collaborators.
    pub fn new(
        config: RealtimeConfig,
        tokens: Arc<dyn TokenProvider>,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        let queue = OutboundQueue::new(config.queue_capacity);
        let (epoch, _) = watch::channel(0u64);
        Self {
            inner: Arc::new(Inner {
                config,
                tokens,
                factory,
                dispatch: DispatchRegistry::new(),
                state: Mutex::new(ConnectionState::Idle),
                epoch,
                queue: Mutex::new(queue),
                drain_wake: Notify::new(),
                wire: Mutex::new(None),
                last_traffic: Mutex::new(Instant::now()),
            }),
        }
    }

    /// Create a client backed by the production WebSocket transport.
    pub fn with_websocket_transport(config: RealtimeConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        let buffer = config.wire_capacity;
        Self::new(config, tokens, Arc::new(WebSocketTransport::new(buffer)))
    }

    /// Open the connection.
    ///
    /// Resolves once the connection is open, after the outbound queue has
    /// started draining. Rejects only on non-retryable failures (missing
    /// token, authorization rejection, exhausted retry budget); transient
    /// failures are retried with backoff while this future stays pending.
    ///
    /// Calling `connect()` while a connection is pending or open supersedes
    /// the previous one.
    pub async fn connect(&self) -> RtResult<()> {
        Inner::start_connect(self.inner.clone()).await
    }

    /// Close the connection deliberately.
    ///
    /// Synchronous and idempotent. Sends a best-effort disconnect notice,
    /// tears the session down, and schedules no reconnect.
    pub fn disconnect(&self) {
        self.inner.shutdown();
    }

    /// Send a message, or queue it for replay if the connection is not
    /// ready.
    ///
    /// Stamps `timestamp` and `client_message_id` if absent. Returns `true`
    /// when the message was handed to the transport immediately, `false`
    /// when it was queued. Sending while idle triggers a connection attempt
    /// as a side effect.
    pub fn send(&self, message: OutboundMessage) -> bool {
        self.inner.send_message(message)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Whether the connection is open.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Number of messages waiting for replay.
    pub fn queued_messages(&self) -> usize {
        lock(&self.inner.queue).len()
    }

    /// Subscribe to a message type (or [`crate::dispatch::WILDCARD`]).
    /// Subscriptions are effective immediately, independent of connection
    /// state.
    pub fn subscribe(&self, message_type: &str, handler: EventHandler) -> Subscription {
        self.inner.dispatch.subscribe(message_type, handler)
    }

    /// Subscribe to every decoded message.
    pub fn subscribe_all(&self, handler: EventHandler) -> Subscription {
        self.inner.dispatch.subscribe_all(handler)
    }

    /// Subscribe to events carrying one correlation id (task, project or
    /// content id).
    pub fn subscribe_scoped(&self, correlation_id: &str, handler: EventHandler) -> Subscription {
        self.inner.dispatch.subscribe_scoped(correlation_id, handler)
    }

    /// Subscribe to connection status changes.
    pub fn subscribe_status(&self, handler: StatusHandler) -> Subscription {
        self.inner.dispatch.subscribe_status(handler)
    }

    /// Install the pass-through handler for binary frames.
    pub fn set_binary_handler(&self, handler: BinaryHandler) {
        self.inner.dispatch.set_binary_handler(handler)
    }

    /// Client configuration.
    pub fn config(&self) -> &RealtimeConfig {
        &self.inner.config
    }
}

struct Inner {
    config: RealtimeConfig,
    tokens: Arc<dyn TokenProvider>,
    factory: Arc<dyn TransportFactory>,
    dispatch: DispatchRegistry,
    state: Mutex<ConnectionState>,
    /// Connection epoch. Bumping it supersedes the running session task and
    /// invalidates every timer it scheduled.
    epoch: watch::Sender<u64>,
    queue: Mutex<OutboundQueue>,
    /// Wakes the session loop when a message is queued while open, so a
    /// partial drain resumes without waiting for a timer
    drain_wake: Notify,
    /// Writer for the live transport, present only while a session runs
    wire: Mutex<Option<mpsc::Sender<String>>>,
    /// Last observed inbound-or-outbound traffic
    last_traffic: Mutex<Instant>,
}

/// How a session ended, decided by the select loop.
enum SessionEnd {
    /// Peer closed with the normal close code; no reconnect
    NormalClose,
    /// Non-retryable closure (authorization class)
    Fatal(RealtimeError),
    /// Retryable; the reconnect loop takes over
    Retry(&'static str),
    /// A newer connect or a disconnect bumped the epoch
    Superseded,
}

impl Inner {
    fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    fn set_state(&self, state: ConnectionState) {
        *lock(&self.state) = state;
    }

    fn current_epoch(&self) -> u64 {
        *self.epoch.borrow()
    }

    fn bump_epoch(&self) -> u64 {
        let mut next = 0;
        self.epoch.send_modify(|epoch| {
            *epoch += 1;
            next = *epoch;
        });
        next
    }

    /// Bump the epoch only if it still matches `expected`.
    ///
    /// The send-triggered connect uses this so it yields to any `connect()`
    /// or `disconnect()` that raced it instead of superseding them.
    fn bump_epoch_if_current(&self, expected: u64) -> Option<u64> {
        let mut bumped = None;
        self.epoch.send_if_modified(|epoch| {
            if *epoch == expected {
                *epoch += 1;
                bumped = Some(*epoch);
                true
            } else {
                false
            }
        });
        bumped
    }

    fn touch_traffic(&self) {
        *lock(&self.last_traffic) = Instant::now();
    }

    fn send_message(self: &Arc<Self>, mut message: OutboundMessage) -> bool {
        message.stamp();
        if self.state() == ConnectionState::Open {
            // Direct transmit only when nothing is queued ahead; a message
            // sent while earlier entries await replay must join the queue
            // behind them, not overtake them.
            if lock(&self.queue).is_empty() && self.transmit(&message) {
                return true;
            }
            lock(&self.queue).push(message);
            self.drain_wake.notify_one();
            return false;
        }
        lock(&self.queue).push(message);
        // Sending while idle means the caller wants a connection; kick one
        // off. A Failed client must be reconnected explicitly after
        // re-authentication, so no attempt is made from there.
        if self.state() == ConnectionState::Idle {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let inner = self.clone();
                let observed = self.current_epoch();
                handle.spawn(async move {
                    let Some(epoch) = inner.bump_epoch_if_current(observed) else {
                        return;
                    };
                    inner.set_state(ConnectionState::Connecting);
                    run_connection(inner, epoch, None).await;
                });
            }
        }
        false
    }

    /// Hand a stamped message to the live transport. Does not queue.
    fn transmit(&self, message: &OutboundMessage) -> bool {
        let Some(wire) = lock(&self.wire).clone() else {
            return false;
        };
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(message_type = %message.message_type, "Failed to encode message: {}", e);
                return false;
            }
        };
        match wire.try_send(text) {
            Ok(()) => {
                self.touch_traffic();
                true
            }
            Err(_) => false,
        }
    }

    /// Replay queued messages in FIFO order.
    ///
    /// Snapshot-then-clear: messages enqueued by subscribers while the
    /// drain runs belong to the next drain and are never sent twice. After
    /// the first failed transmit the remainder is requeued wholesale so
    /// relative order is preserved; returns `false` so the session loop
    /// knows to retry once the wire has room again.
    fn drain_queue(&self) -> bool {
        let snapshot = lock(&self.queue).take_snapshot();
        if snapshot.is_empty() {
            return true;
        }
        tracing::info!(count = snapshot.len(), "Draining outbound queue");
        let mut failed = Vec::new();
        let mut wire_down = false;
        for message in snapshot {
            if wire_down || !self.transmit(&message) {
                wire_down = true;
                failed.push(message);
            }
        }
        if !failed.is_empty() {
            tracing::warn!(count = failed.len(), "Requeueing messages that failed mid-drain");
            lock(&self.queue).requeue_front(failed);
            return false;
        }
        true
    }

    /// Decode and dispatch one inbound text frame. A bad frame is logged
    /// and dropped; it must never tear down the connection.
    fn handle_frame(&self, text: &str) {
        let event = match ServerEvent::decode(text) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Dropping undecodable frame: {}", e);
                return;
            }
        };
        if matches!(event, ServerEvent::Pong) {
            // Heartbeat bookkeeping only; never surfaced to subscribers
            tracing::trace!("Heartbeat pong");
            return;
        }
        self.dispatch.dispatch(&event);
    }

    fn fail(&self, err: RealtimeError, ready: &mut Option<oneshot::Sender<RtResult<()>>>) {
        tracing::error!("Realtime connection failed: {}", err);
        self.set_state(ConnectionState::Failed);
        self.dispatch.dispatch_status(&ConnectionStatus::AuthFailed {
            reason: err.to_string(),
        });
        if let Some(tx) = ready.take() {
            let _ = tx.send(Err(err));
        }
    }

    fn shutdown(&self) {
        if matches!(
            self.state(),
            ConnectionState::Idle | ConnectionState::Failed
        ) {
            return;
        }
        self.set_state(ConnectionState::Closing);
        let mut notice = OutboundMessage::client_disconnect();
        notice.stamp();
        // Best-effort: not waiting for acknowledgment
        let _ = self.transmit(&notice);
        self.bump_epoch();
        *lock(&self.wire) = None;
        self.set_state(ConnectionState::Idle);
        self.dispatch.dispatch_status(&ConnectionStatus::Closed);
    }

    async fn start_connect(inner: Arc<Inner>) -> RtResult<()> {
        // Supersede any live session before starting a new one
        let epoch = inner.bump_epoch();
        if inner.tokens.token().is_none() {
            let mut ready = None;
            inner.fail(RealtimeError::MissingToken, &mut ready);
            return Err(RealtimeError::MissingToken);
        }
        inner.set_state(ConnectionState::Connecting);

        let (ready_tx, ready_rx) = oneshot::channel();
        tokio::spawn(run_connection(inner, epoch, Some(ready_tx)));
        match ready_rx.await {
            Ok(result) => result,
            // The task dropped the sender: a newer connect or a disconnect
            // superseded this attempt.
            Err(_) => Err(RealtimeError::ConnectionFailed(
                "superseded by a newer connect or disconnect".to_string(),
            )),
        }
    }
}

/// Connection task: one instance per epoch.
///
/// Owns the connect/retry loop. Every await is bounded by the epoch: when a
/// newer connect or a disconnect bumps it, this task exits without touching
/// shared state.
async fn run_connection(
    inner: Arc<Inner>,
    epoch: u64,
    mut ready: Option<oneshot::Sender<RtResult<()>>>,
) {
    let backoff = BackoffPolicy::new(
        inner.config.base_delay,
        inner.config.max_delay,
        inner.config.decay,
    );
    let mut epoch_rx = inner.epoch.subscribe();
    let mut attempts: u32 = 0;

    loop {
        if inner.current_epoch() != epoch {
            return;
        }

        // Token is read fresh per attempt so a rotation is picked up on the
        // next reconnect.
        let Some(token) = inner.tokens.token() else {
            inner.fail(RealtimeError::MissingToken, &mut ready);
            return;
        };
        let url = realtime_url(&inner.config.url, &token);

        inner.set_state(ConnectionState::Connecting);
        inner.dispatch.dispatch_status(&ConnectionStatus::Connecting);

        let attempt = timeout(inner.config.connect_timeout, inner.factory.connect(&url))
            .await
            .unwrap_or(Err(RealtimeError::Timeout));
        match attempt {
            Ok(transport) => {
                if inner.current_epoch() != epoch {
                    return;
                }
                attempts = 0;
                let wire = transport.outgoing.clone();
                *lock(&inner.wire) = Some(wire.clone());
                inner.touch_traffic();
                inner.set_state(ConnectionState::Open);
                tracing::info!("Realtime connection open");
                inner.dispatch.dispatch_status(&ConnectionStatus::Open);
                if let Some(tx) = ready.take() {
                    let _ = tx.send(Ok(()));
                }
                inner.drain_queue();

                let end = drive_session(&inner, transport, epoch, &mut epoch_rx).await;

                // Clear the wire only if it is still ours; a superseding
                // session may already have installed a new one.
                {
                    let mut current = lock(&inner.wire);
                    if current.as_ref().is_some_and(|w| w.same_channel(&wire)) {
                        *current = None;
                    }
                }

                match end {
                    SessionEnd::Superseded => return,
                    SessionEnd::NormalClose => {
                        inner.set_state(ConnectionState::Idle);
                        inner.dispatch.dispatch_status(&ConnectionStatus::Closed);
                        return;
                    }
                    SessionEnd::Fatal(err) => {
                        inner.fail(err, &mut ready);
                        return;
                    }
                    SessionEnd::Retry(reason) => {
                        tracing::info!(reason, "Connection lost, scheduling reconnect");
                    }
                }
            }
            Err(err) if err.is_fatal() => {
                inner.fail(err, &mut ready);
                return;
            }
            Err(err) => {
                tracing::warn!("Connect attempt failed: {}", err);
            }
        }

        if inner.current_epoch() != epoch {
            return;
        }
        if let Some(max) = inner.config.max_reconnect_attempts {
            if attempts >= max {
                tracing::error!(attempts, "Retry budget exhausted, giving up");
                inner.set_state(ConnectionState::Failed);
                inner
                    .dispatch
                    .dispatch_status(&ConnectionStatus::RetriesExhausted { attempts });
                if let Some(tx) = ready.take() {
                    let _ = tx.send(Err(RealtimeError::RetriesExhausted { attempts }));
                }
                return;
            }
        }

        let delay = backoff.delay(attempts);
        attempts += 1;
        inner.set_state(ConnectionState::Reconnecting);
        inner.dispatch.dispatch_status(&ConnectionStatus::Reconnecting {
            attempt: attempts,
            delay,
        });
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = epoch_rx.changed() => {}
        }
        // Stale-timer guard: the loop head re-checks the epoch before this
        // wakeup is allowed to act.
    }
}

/// Drive one open session until it ends.
///
/// The heartbeat and watchdog timers live inside this select loop, so they
/// are torn down with the session and can never fire across epochs.
async fn drive_session(
    inner: &Arc<Inner>,
    mut transport: TransportHandle,
    epoch: u64,
    epoch_rx: &mut watch::Receiver<u64>,
) -> SessionEnd {
    let config = &inner.config;
    let start = Instant::now();
    let mut ping = interval_at(start + config.ping_interval, config.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut watchdog = interval_at(start + config.watchdog_interval, config.watchdog_interval);
    watchdog.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut flush = interval_at(start + DRAIN_RETRY_INTERVAL, DRAIN_RETRY_INTERVAL);
    flush.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        if inner.current_epoch() != epoch {
            return SessionEnd::Superseded;
        }
        tokio::select! {
            event = transport.incoming.recv() => {
                match event {
                    Some(TransportEvent::Text(text)) => {
                        inner.touch_traffic();
                        inner.handle_frame(&text);
                    }
                    Some(TransportEvent::Binary(data)) => {
                        inner.touch_traffic();
                        inner.dispatch.dispatch_binary(&data);
                    }
                    Some(TransportEvent::Closed { code, reason }) => {
                        return match code {
                            CLOSE_NORMAL => SessionEnd::NormalClose,
                            CLOSE_POLICY_VIOLATION => SessionEnd::Fatal(
                                RealtimeError::AuthRejected(format!(
                                    "closed by server: {}",
                                    reason
                                )),
                            ),
                            _ => {
                                tracing::warn!(code, %reason, "Connection closed unexpectedly");
                                SessionEnd::Retry("unexpected close")
                            }
                        };
                    }
                    Some(TransportEvent::Error(e)) => {
                        tracing::warn!("Transport error: {}", e);
                        return SessionEnd::Retry("transport error");
                    }
                    None => return SessionEnd::Retry("transport channel closed"),
                }
            }
            _ = inner.drain_wake.notified() => {
                inner.drain_queue();
            }
            // Retry a drain the wire channel cut short. Disabled while the
            // queue is empty so the timer costs nothing in the common case.
            _ = flush.tick(), if !lock(&inner.queue).is_empty() => {
                inner.drain_queue();
            }
            _ = ping.tick() => {
                // Through the normal send path, so it refreshes the traffic
                // timestamp too.
                inner.send_message(OutboundMessage::ping());
            }
            _ = watchdog.tick() => {
                let idle = lock(&inner.last_traffic).elapsed();
                if idle > config.max_idle {
                    // The transport never reported a close, but nothing has
                    // moved for too long: a zombie socket. Force a reconnect.
                    tracing::warn!(idle_secs = idle.as_secs(), "No traffic within idle window");
                    return SessionEnd::Retry("inactivity watchdog");
                }
            }
            _ = epoch_rx.changed() => {
                return SessionEnd::Superseded;
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenProvider;

    struct RefusingFactory;

    #[async_trait::async_trait]
    impl TransportFactory for RefusingFactory {
        async fn connect(&self, _url: &str) -> RtResult<TransportHandle> {
            Err(RealtimeError::ConnectionFailed("refused".to_string()))
        }
    }

    struct StallingFactory;

    #[async_trait::async_trait]
    impl TransportFactory for StallingFactory {
        async fn connect(&self, _url: &str) -> RtResult<TransportHandle> {
            std::future::pending().await
        }
    }

    fn client() -> RealtimeClient {
        RealtimeClient::new(
            RealtimeConfig::default(),
            Arc::new(StaticTokenProvider::new("tok")),
            Arc::new(RefusingFactory),
        )
    }

    #[test]
    fn test_starts_idle() {
        let client = client();
        assert_eq!(client.state(), ConnectionState::Idle);
        assert!(!client.is_open());
    }

    #[test]
    fn test_send_while_idle_queues() {
        let client = client();
        let delivered = client.send(OutboundMessage::new("x"));
        assert!(!delivered);
        assert_eq!(client.queued_messages(), 1);
    }

    #[test]
    fn test_disconnect_when_idle_is_noop() {
        let client = client();
        client.disconnect();
        client.disconnect();
        assert_eq!(client.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_connect_without_token_fails_fatally() {
        let client = RealtimeClient::new(
            RealtimeConfig::default(),
            Arc::new(StaticTokenProvider::empty()),
            Arc::new(RefusingFactory),
        );
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, RealtimeError::MissingToken));
        assert_eq!(client.state(), ConnectionState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_is_retryable() {
        let config = RealtimeConfig {
            max_reconnect_attempts: Some(1),
            ..Default::default()
        };
        let client = RealtimeClient::new(
            config,
            Arc::new(StaticTokenProvider::new("tok")),
            Arc::new(StallingFactory),
        );
        let start = Instant::now();
        let err = client.connect().await.unwrap_err();
        // Timed out twice, not failed fatally: the retry budget was spent
        assert!(matches!(err, RealtimeError::RetriesExhausted { attempts: 1 }));
        // Two handshake windows of 10s plus the 1s backoff between them
        assert!(start.elapsed() >= Duration::from_secs(21));
        assert_eq!(client.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn test_retry_budget_rejects_connect() {
        let config = RealtimeConfig {
            max_reconnect_attempts: Some(0),
            ..Default::default()
        };
        let client = RealtimeClient::new(
            config,
            Arc::new(StaticTokenProvider::new("tok")),
            Arc::new(RefusingFactory),
        );
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, RealtimeError::RetriesExhausted { attempts: 0 }));
        assert_eq!(client.state(), ConnectionState::Failed);
    }
}
