use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vcm_types::{AgentId, MessageId, MessageIntent, VectorCommMessage};

use crate::broker::MessageBroker;
use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::handler::MessageHandler;
use crate::stats::{TransportStats, TransportStatsSnapshot};

#[derive(Debug, Clone)]
enum Route {
    Unicast(AgentId),
    Broadcast,
    Multicast(String),
}

struct RoutingJob {
    message: VectorCommMessage,
    route: Route,
}

type LoopHandles = (
    JoinHandle<mpsc::Receiver<VectorCommMessage>>,
    JoinHandle<mpsc::Receiver<RoutingJob>>,
);

/// Shared state of one agent's transport. Peers and the broker hold it by
/// `Weak` reference.
pub(crate) struct TransportInner {
    agent_id: AgentId,
    config: TransportConfig,
    running: AtomicBool,
    inbound_tx: mpsc::Sender<VectorCommMessage>,
    inbound_rx: Mutex<Option<mpsc::Receiver<VectorCommMessage>>>,
    outbound_tx: mpsc::Sender<RoutingJob>,
    outbound_rx: Mutex<Option<mpsc::Receiver<RoutingJob>>>,
    mailbox_tx: mpsc::Sender<VectorCommMessage>,
    mailbox_rx: Mutex<mpsc::Receiver<VectorCommMessage>>,
    peers: RwLock<HashMap<AgentId, Weak<TransportInner>>>,
    /// Peers that receive this agent's broadcasts
    broadcast_subscribers: RwLock<HashSet<AgentId>>,
    groups: RwLock<HashSet<String>>,
    handlers: RwLock<HashMap<MessageIntent, Vec<Arc<dyn MessageHandler>>>>,
    broker: RwLock<Option<MessageBroker>>,
    stats: TransportStats,
    tasks: Mutex<Option<LoopHandles>>,
}

impl TransportInner {
    pub(crate) fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) async fn in_group(&self, group: &str) -> bool {
        self.groups.read().await.contains(group)
    }

    /// Put a message into this agent's inbound queue without blocking.
    fn accept(&self, message: VectorCommMessage) -> bool {
        match self.inbound_tx.try_send(message) {
            Ok(()) => {
                self.stats.record_received();
                true
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => false,
        }
    }

    async fn broker(&self) -> Option<MessageBroker> {
        self.broker.read().await.clone()
    }

    /// Direct peer first, then the broker.
    async fn resolve(&self, id: &AgentId) -> (Option<Arc<TransportInner>>, bool) {
        if let Some(peer) = self.peers.read().await.get(id).and_then(Weak::upgrade) {
            return (Some(peer), false);
        }
        match self.broker().await {
            Some(broker) => (broker.lookup(id).await, true),
            None => (None, false),
        }
    }

    /// Sleep for `delay`, waking every poll interval to observe a stop.
    /// Returns `false` if the transport stopped meanwhile.
    async fn sleep_while_running(&self, delay: Duration) -> bool {
        let poll = self.config.poll_interval();
        let deadline = tokio::time::Instant::now() + delay;
        while tokio::time::Instant::now() < deadline {
            if !self.is_running() {
                return false;
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            tokio::time::sleep(remaining.min(poll)).await;
        }
        self.is_running()
    }

    async fn deliver_with_retry(&self, dest: &AgentId, message: &VectorCommMessage) -> bool {
        let mut attempt = 0;
        loop {
            let (target, via_broker) = self.resolve(dest).await;
            if let Some(peer) = &target {
                if peer.accept(message.clone()) {
                    self.stats.record_delivered();
                    if via_broker {
                        if let Some(broker) = self.broker().await {
                            broker.record_routed();
                        }
                    }
                    debug!(
                        agent_id = %self.agent_id,
                        destination = %dest,
                        message_id = %message.message_id(),
                        attempt,
                        "Message delivered"
                    );
                    return true;
                }
            }

            if attempt >= self.config.max_retries {
                warn!(
                    agent_id = %self.agent_id,
                    destination = %dest,
                    message_id = %message.message_id(),
                    attempts = attempt + 1,
                    reachable = target.is_some(),
                    "Delivery failed, dropping message"
                );
                if target.is_none() {
                    if let Some(broker) = self.broker().await {
                        broker.record_unroutable();
                    }
                }
                self.stats.record_dropped();
                return false;
            }

            attempt += 1;
            self.stats.record_retry();
            if !self.sleep_while_running(self.config.retry_delay(attempt)).await {
                debug!(
                    agent_id = %self.agent_id,
                    destination = %dest,
                    message_id = %message.message_id(),
                    "Transport stopped, abandoning retry"
                );
                self.stats.record_dropped();
                return false;
            }
        }
    }

    async fn broadcast_recipients(&self) -> Vec<AgentId> {
        let mut recipients = Vec::new();
        let mut seen = HashSet::new();
        seen.insert(self.agent_id.clone());

        {
            let subscribers = self.broadcast_subscribers.read().await;
            let peers = self.peers.read().await;
            for id in subscribers.iter() {
                let connected = peers.get(id).and_then(Weak::upgrade).is_some();
                if connected && seen.insert(id.clone()) {
                    recipients.push(id.clone());
                }
            }
        }

        if let Some(broker) = self.broker().await {
            for id in broker.broadcast_subscribers().await {
                if seen.insert(id.clone()) {
                    recipients.push(id);
                }
            }
        }
        recipients
    }

    async fn group_recipients(&self, group: &str) -> Vec<AgentId> {
        let mut recipients = Vec::new();
        let mut seen = HashSet::new();
        seen.insert(self.agent_id.clone());

        let peers: Vec<_> = self
            .peers
            .read()
            .await
            .iter()
            .filter_map(|(id, weak)| weak.upgrade().map(|p| (id.clone(), p)))
            .collect();
        for (id, peer) in peers {
            if peer.in_group(group).await && seen.insert(id.clone()) {
                recipients.push(id);
            }
        }

        if let Some(broker) = self.broker().await {
            for id in broker.group_members(group).await {
                if seen.insert(id.clone()) {
                    recipients.push(id);
                }
            }
        }
        recipients
    }

    async fn route(&self, job: RoutingJob) {
        let RoutingJob { message, route } = job;
        let recipients = match &route {
            Route::Unicast(dest) => vec![dest.clone()],
            Route::Broadcast => self.broadcast_recipients().await,
            Route::Multicast(group) => self.group_recipients(group).await,
        };

        if recipients.is_empty() {
            debug!(
                agent_id = %self.agent_id,
                message_id = %message.message_id(),
                route = ?route,
                "No recipients for message"
            );
            return;
        }
        for dest in &recipients {
            if !self.is_running() {
                self.stats.record_dropped();
                continue;
            }
            self.deliver_with_retry(dest, &message).await;
        }
    }

    async fn dispatch(&self, message: VectorCommMessage) {
        if message.is_expired() {
            debug!(
                agent_id = %self.agent_id,
                message_id = %message.message_id(),
                "Dropping expired message"
            );
            self.stats.record_dropped();
            return;
        }

        let handlers = self
            .handlers
            .read()
            .await
            .get(&message.metadata.intent)
            .cloned()
            .unwrap_or_default();

        if handlers.is_empty() {
            if let Err(e) = self.mailbox_tx.try_send(message) {
                warn!(agent_id = %self.agent_id, error = %e, "Mailbox full, dropping message");
                self.stats.record_dropped();
            }
            return;
        }

        for handler in handlers {
            if let Err(e) = handler.handle(&message).await {
                warn!(
                    agent_id = %self.agent_id,
                    message_id = %message.message_id(),
                    error = %e,
                    "Message handler failed"
                );
                self.stats.record_handler_error();
            }
        }
    }
}

async fn inbound_loop(
    inner: Arc<TransportInner>,
    mut rx: mpsc::Receiver<VectorCommMessage>,
) -> mpsc::Receiver<VectorCommMessage> {
    let poll = inner.config.poll_interval();
    while inner.is_running() {
        match tokio::time::timeout(poll, rx.recv()).await {
            Ok(Some(message)) => inner.dispatch(message).await,
            Ok(None) => break,
            Err(_) => continue,
        }
    }
    rx
}

async fn outbound_loop(
    inner: Arc<TransportInner>,
    mut rx: mpsc::Receiver<RoutingJob>,
) -> mpsc::Receiver<RoutingJob> {
    let poll = inner.config.poll_interval();
    while inner.is_running() {
        match tokio::time::timeout(poll, rx.recv()).await {
            Ok(Some(job)) => inner.route(job).await,
            Ok(None) => break,
            Err(_) => continue,
        }
    }
    rx
}

/// One agent's endpoint: bounded inbound/outbound queues, peer links,
/// broadcast subscribers, group membership and intent handlers.
///
/// Cloning is cheap and yields a handle to the same transport. Two background
/// tasks run between [`start`](Self::start) and [`stop`](Self::stop): one
/// routes outbound messages (with retry), the other dispatches inbound
/// messages to handlers or the receive mailbox.
#[derive(Clone)]
pub struct AgentTransport {
    inner: Arc<TransportInner>,
}

impl AgentTransport {
    pub fn new(agent_id: impl Into<AgentId>, config: TransportConfig) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_capacity.max(1));
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));
        let (mailbox_tx, mailbox_rx) = mpsc::channel(config.mailbox_capacity.max(1));

        Self {
            inner: Arc::new(TransportInner {
                agent_id: agent_id.into(),
                config,
                running: AtomicBool::new(false),
                inbound_tx,
                inbound_rx: Mutex::new(Some(inbound_rx)),
                outbound_tx,
                outbound_rx: Mutex::new(Some(outbound_rx)),
                mailbox_tx,
                mailbox_rx: Mutex::new(mailbox_rx),
                peers: RwLock::new(HashMap::new()),
                broadcast_subscribers: RwLock::new(HashSet::new()),
                groups: RwLock::new(HashSet::new()),
                handlers: RwLock::new(HashMap::new()),
                broker: RwLock::new(None),
                stats: TransportStats::default(),
                tasks: Mutex::new(None),
            }),
        }
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.inner.agent_id
    }

    pub fn config(&self) -> &TransportConfig {
        &self.inner.config
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    pub fn stats(&self) -> TransportStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Spawn the routing and dispatch loops.
    pub async fn start(&self) -> Result<(), TransportError> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(TransportError::AlreadyRunning(self.agent_id().clone()));
        }

        let inbound_rx = self.inner.inbound_rx.lock().await.take();
        let outbound_rx = self.inner.outbound_rx.lock().await.take();
        let (Some(inbound_rx), Some(outbound_rx)) = (inbound_rx, outbound_rx) else {
            self.inner.running.store(false, Ordering::SeqCst);
            return Err(TransportError::Task("queue receivers unavailable".into()));
        };

        let inbound = tokio::spawn(inbound_loop(self.inner.clone(), inbound_rx));
        let outbound = tokio::spawn(outbound_loop(self.inner.clone(), outbound_rx));
        *self.inner.tasks.lock().await = Some((inbound, outbound));

        info!(agent_id = %self.agent_id(), "Transport started");
        Ok(())
    }

    /// Stop both loops. Queued messages stay queued for a later `start`;
    /// retries in flight are abandoned.
    pub async fn stop(&self) -> Result<(), TransportError> {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let tasks = self.inner.tasks.lock().await.take();
        if let Some((inbound, outbound)) = tasks {
            let inbound_rx = inbound
                .await
                .map_err(|e| TransportError::Task(e.to_string()))?;
            let outbound_rx = outbound
                .await
                .map_err(|e| TransportError::Task(e.to_string()))?;
            *self.inner.inbound_rx.lock().await = Some(inbound_rx);
            *self.inner.outbound_rx.lock().await = Some(outbound_rx);
        }

        info!(agent_id = %self.agent_id(), stats = ?self.stats(), "Transport stopped");
        Ok(())
    }

    fn prepare(&self, message: &mut VectorCommMessage) -> Result<(), TransportError> {
        if !self.is_running() {
            return Err(TransportError::NotRunning(self.agent_id().clone()));
        }
        let errors = vcm_types::validation_errors(message);
        if !errors.is_empty() {
            return Err(TransportError::InvalidMessage(errors));
        }
        if message.checksum.is_none() {
            let key = self.inner.config.checksum_key.as_deref().map(str::as_bytes);
            vcm_verifier::attach_checksum(message, key)?;
        }
        Ok(())
    }

    fn enqueue(&self, message: VectorCommMessage, route: Route) -> Result<MessageId, TransportError> {
        let message_id = message.message_id();
        match self.inner.outbound_tx.try_send(RoutingJob { message, route }) {
            Ok(()) => {
                self.inner.stats.record_sent();
                debug!(agent_id = %self.agent_id(), message_id = %message_id, "Message queued");
                Ok(message_id)
            }
            Err(_) => {
                self.inner.stats.record_dropped();
                warn!(agent_id = %self.agent_id(), message_id = %message_id, "Outbound queue full");
                Err(TransportError::QueueFull(self.agent_id().clone()))
            }
        }
    }

    /// Validate, checksum if needed, and queue for delivery: unicast when the
    /// message has a destination, broadcast otherwise.
    pub async fn send(&self, mut message: VectorCommMessage) -> Result<MessageId, TransportError> {
        self.prepare(&mut message)?;
        let route = match message.destination() {
            Some(dest) => Route::Unicast(dest.clone()),
            None => Route::Broadcast,
        };
        self.enqueue(message, route)
    }

    /// Deliver to every member of `group` reachable directly or via the broker.
    pub async fn send_multicast(
        &self,
        mut message: VectorCommMessage,
        group: &str,
    ) -> Result<MessageId, TransportError> {
        self.prepare(&mut message)?;
        if self.inner.group_recipients(group).await.is_empty() {
            return Err(TransportError::EmptyGroup(group.to_string()));
        }
        self.enqueue(message, Route::Multicast(group.to_string()))
    }

    /// Next message not consumed by a handler. Waits up to `timeout`, or
    /// indefinitely when `None`. The limit includes time spent queued behind
    /// other receivers.
    pub async fn receive(&self, timeout: Option<Duration>) -> Option<VectorCommMessage> {
        let next = async { self.inner.mailbox_rx.lock().await.recv().await };
        match timeout {
            Some(limit) => tokio::time::timeout(limit, next).await.ok().flatten(),
            None => next.await,
        }
    }

    /// Invoke `handler` for every inbound message with `intent`. Handled
    /// messages do not reach the receive mailbox.
    pub async fn register_handler(&self, intent: MessageIntent, handler: impl MessageHandler + 'static) {
        self.inner
            .handlers
            .write()
            .await
            .entry(intent)
            .or_default()
            .push(Arc::new(handler));
        debug!(agent_id = %self.agent_id(), intent = %intent, "Handler registered");
    }

    /// Link two transports in both directions. With auto-subscription each
    /// side also receives the other's broadcasts.
    pub async fn connect(&self, peer: &AgentTransport) {
        if peer.agent_id() == self.agent_id() {
            return;
        }
        self.inner
            .peers
            .write()
            .await
            .insert(peer.agent_id().clone(), Arc::downgrade(&peer.inner));
        peer.inner
            .peers
            .write()
            .await
            .insert(self.agent_id().clone(), Arc::downgrade(&self.inner));

        if self.inner.config.auto_subscribe_broadcast {
            self.subscribe_broadcast(peer.agent_id().clone()).await;
        }
        if peer.inner.config.auto_subscribe_broadcast {
            peer.subscribe_broadcast(self.agent_id().clone()).await;
        }
        debug!(agent_id = %self.agent_id(), peer = %peer.agent_id(), "Peers connected");
    }

    pub async fn disconnect(&self, peer_id: &AgentId) {
        let removed = self.inner.peers.write().await.remove(peer_id);
        self.inner.broadcast_subscribers.write().await.remove(peer_id);
        if let Some(peer) = removed.and_then(|w| w.upgrade()) {
            peer.peers.write().await.remove(self.agent_id());
            peer.broadcast_subscribers.write().await.remove(self.agent_id());
        }
        debug!(agent_id = %self.agent_id(), peer = %peer_id, "Peer disconnected");
    }

    pub async fn connected_peers(&self) -> Vec<AgentId> {
        self.inner
            .peers
            .read()
            .await
            .iter()
            .filter(|(_, w)| w.strong_count() > 0)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Deliver this agent's broadcasts to `peer_id` (must be connected).
    pub async fn subscribe_broadcast(&self, peer_id: impl Into<AgentId>) {
        self.inner
            .broadcast_subscribers
            .write()
            .await
            .insert(peer_id.into());
    }

    pub async fn unsubscribe_broadcast(&self, peer_id: &AgentId) {
        self.inner.broadcast_subscribers.write().await.remove(peer_id);
    }

    pub async fn join_group(&self, group: impl Into<String>) {
        let group = group.into();
        self.inner.groups.write().await.insert(group.clone());
        if let Some(broker) = self.inner.broker().await {
            broker.join_group(&group, self.agent_id().clone()).await;
        }
    }

    pub async fn leave_group(&self, group: &str) {
        self.inner.groups.write().await.remove(group);
        if let Some(broker) = self.inner.broker().await {
            broker.leave_group(group, self.agent_id()).await;
        }
    }

    pub async fn groups(&self) -> Vec<String> {
        self.inner.groups.read().await.iter().cloned().collect()
    }

    /// Register with a broker for indirect routing. Groups already joined are
    /// announced to it.
    pub async fn attach_broker(&self, broker: &MessageBroker) {
        broker.register(&self.inner).await;
        let groups: Vec<String> = self.inner.groups.read().await.iter().cloned().collect();
        for group in groups {
            broker.join_group(&group, self.agent_id().clone()).await;
        }
        *self.inner.broker.write().await = Some(broker.clone());
        debug!(agent_id = %self.agent_id(), "Broker attached");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use std::sync::atomic::AtomicUsize;
    use vcm_types::{Dimension, MessageBuilder};

    fn config() -> TransportConfig {
        TransportConfig {
            retry_base_delay_ms: 5,
            poll_interval_ms: 5,
            ..TransportConfig::default()
        }
    }

    fn message(from: &str, to: Option<&str>, intent: MessageIntent) -> VectorCommMessage {
        let mut builder = MessageBuilder::new(from, Dimension::D384)
            .primary_vector((0..384).map(|i| i as f32 / 384.0).collect())
            .intent(intent);
        if let Some(to) = to {
            builder = builder.destination(to);
        }
        builder.build().unwrap()
    }

    const WAIT: Option<Duration> = Some(Duration::from_secs(2));

    #[tokio::test]
    async fn unicast_reaches_destination() {
        let a = AgentTransport::new("a", config());
        let b = AgentTransport::new("b", config());
        a.connect(&b).await;
        a.start().await.unwrap();
        b.start().await.unwrap();

        let msg = message("a", Some("b"), MessageIntent::Query);
        let id = a.send(msg.clone()).await.unwrap();

        let received = b.receive(WAIT).await.unwrap();
        assert_eq!(received.message_id(), id);
        assert_eq!(received.payload.primary_vector, msg.payload.primary_vector);
        assert!(received.checksum.is_some());
        assert!(vcm_verifier::verify_checksum(&received, None));

        a.stop().await.unwrap();
        b.stop().await.unwrap();
        assert_eq!(a.stats().sent, 1);
        assert_eq!(a.stats().delivered, 1);
        assert_eq!(b.stats().received, 1);
    }

    #[tokio::test]
    async fn send_requires_running_and_valid_message() {
        let a = AgentTransport::new("a", config());
        let msg = message("a", Some("b"), MessageIntent::Query);
        assert!(matches!(a.send(msg.clone()).await, Err(TransportError::NotRunning(_))));

        a.start().await.unwrap();
        assert!(matches!(a.start().await, Err(TransportError::AlreadyRunning(_))));
        let mut bad = msg;
        bad.payload.primary_vector.pop();
        assert!(matches!(a.send(bad).await, Err(TransportError::InvalidMessage(_))));
        a.stop().await.unwrap();
    }

    #[tokio::test]
    async fn handlers_consume_their_intent() {
        let a = AgentTransport::new("a", config());
        let b = AgentTransport::new("b", config());
        a.connect(&b).await;

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        b.register_handler(
            MessageIntent::Command,
            handler_fn(move |_msg| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        )
        .await;

        a.start().await.unwrap();
        b.start().await.unwrap();
        a.send(message("a", Some("b"), MessageIntent::Command)).await.unwrap();
        a.send(message("a", Some("b"), MessageIntent::Query)).await.unwrap();

        // the query has no handler, so it lands in the mailbox
        let got = b.receive(WAIT).await.unwrap();
        assert_eq!(got.metadata.intent, MessageIntent::Query);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(b.receive(Some(Duration::from_millis(50))).await.is_none());

        a.stop().await.unwrap();
        b.stop().await.unwrap();
    }

    #[tokio::test]
    async fn handler_errors_are_counted() {
        let a = AgentTransport::new("a", config());
        let b = AgentTransport::new("b", config());
        a.connect(&b).await;
        b.register_handler(
            MessageIntent::Update,
            handler_fn(|_msg| async { Err(TransportError::Handler("boom".into())) }),
        )
        .await;
        a.start().await.unwrap();
        b.start().await.unwrap();
        a.send(message("a", Some("b"), MessageIntent::Update)).await.unwrap();

        for _ in 0..200 {
            if b.stats().handler_errors == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(b.stats().handler_errors, 1);
        a.stop().await.unwrap();
        b.stop().await.unwrap();
    }

    #[tokio::test]
    async fn broadcast_reaches_subscribed_peers_only() {
        let a = AgentTransport::new("a", config());
        let b = AgentTransport::new("b", config());
        let c = AgentTransport::new("c", config());
        let d = AgentTransport::new("d", config());
        for peer in [&b, &c, &d] {
            a.connect(peer).await;
        }
        a.unsubscribe_broadcast(d.agent_id()).await;
        for t in [&a, &b, &c, &d] {
            t.start().await.unwrap();
        }

        let id = a.send(message("a", None, MessageIntent::Notification)).await.unwrap();
        assert_eq!(b.receive(WAIT).await.unwrap().message_id(), id);
        assert_eq!(c.receive(WAIT).await.unwrap().message_id(), id);
        assert!(d.receive(Some(Duration::from_millis(100))).await.is_none());

        for t in [&a, &b, &c, &d] {
            t.stop().await.unwrap();
        }
    }

    #[tokio::test]
    async fn unreachable_destination_is_retried_then_dropped() {
        let a = AgentTransport::new("a", config());
        a.start().await.unwrap();
        a.send(message("a", Some("ghost"), MessageIntent::Query)).await.unwrap();

        for _ in 0..400 {
            if a.stats().dropped == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let stats = a.stats();
        assert_eq!(stats.retries, 3);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.delivered, 0);
        a.stop().await.unwrap();
    }

    #[tokio::test]
    async fn full_inbound_queue_drops_after_retries() {
        let a = AgentTransport::new("a", config());
        let b = AgentTransport::new(
            "b",
            TransportConfig {
                inbound_capacity: 1,
                ..config()
            },
        );
        a.connect(&b).await;
        // b is not running, so its inbound queue never drains
        a.start().await.unwrap();
        a.send(message("a", Some("b"), MessageIntent::Query)).await.unwrap();
        a.send(message("a", Some("b"), MessageIntent::Query)).await.unwrap();

        for _ in 0..400 {
            if a.stats().dropped == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(a.stats().delivered, 1);
        assert_eq!(a.stats().dropped, 1);
        a.stop().await.unwrap();

        // once b runs, the queued message is dispatched
        b.start().await.unwrap();
        assert!(b.receive(WAIT).await.is_some());
        b.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_abandons_pending_retries() {
        let a = AgentTransport::new(
            "a",
            TransportConfig {
                retry_base_delay_ms: 10_000,
                ..config()
            },
        );
        a.start().await.unwrap();
        a.send(message("a", Some("ghost"), MessageIntent::Query)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        tokio::time::timeout(Duration::from_secs(2), a.stop())
            .await
            .expect("stop should not wait for the retry delay")
            .unwrap();
        assert_eq!(a.stats().retries, 1);
        assert_eq!(a.stats().dropped, 1);
    }

    #[tokio::test]
    async fn restart_keeps_queues() {
        let a = AgentTransport::new("a", config());
        let b = AgentTransport::new("b", config());
        a.connect(&b).await;
        a.start().await.unwrap();
        b.start().await.unwrap();
        b.stop().await.unwrap();
        b.start().await.unwrap();

        a.send(message("a", Some("b"), MessageIntent::Query)).await.unwrap();
        assert!(b.receive(WAIT).await.is_some());
        a.stop().await.unwrap();
        b.stop().await.unwrap();
    }

    #[tokio::test]
    async fn dropped_peer_is_not_kept_alive() {
        let a = AgentTransport::new("a", config());
        {
            let b = AgentTransport::new("b", config());
            a.connect(&b).await;
            assert_eq!(a.connected_peers().await.len(), 1);
        }
        assert!(a.connected_peers().await.is_empty());
    }

    #[tokio::test]
    async fn receive_timeout_holds_with_a_concurrent_receiver() {
        let b = AgentTransport::new("b", config());
        let waiter = {
            let b = b.clone();
            tokio::spawn(async move { b.receive(None).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let bounded = tokio::time::timeout(
            Duration::from_secs(1),
            b.receive(Some(Duration::from_millis(50))),
        )
        .await;
        assert!(matches!(bounded, Ok(None)));

        waiter.abort();
    }

    #[tokio::test]
    async fn disconnect_unlinks_both_sides() {
        let a = AgentTransport::new("a", config());
        let b = AgentTransport::new("b", config());
        a.connect(&b).await;
        a.disconnect(b.agent_id()).await;
        assert!(a.connected_peers().await.is_empty());
        assert!(b.connected_peers().await.is_empty());
    }
}
