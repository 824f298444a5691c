use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;
use vcm_types::AgentId;

use crate::agent::TransportInner;

/// Broker routing counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerStats {
    /// Deliveries that went through the broker's registry
    pub routed: u64,
    /// Unicast deliveries dropped because no registered agent matched
    pub unroutable: u64,
}

#[derive(Default)]
struct BrokerInner {
    agents: RwLock<HashMap<AgentId, Weak<TransportInner>>>,
    broadcast_subscribers: RwLock<HashSet<AgentId>>,
    groups: RwLock<HashMap<String, HashSet<AgentId>>>,
    routed: AtomicU64,
    unroutable: AtomicU64,
}

/// Registry that lets transports reach agents they are not directly
/// connected to.
///
/// Agents register through [`AgentTransport::attach_broker`](crate::AgentTransport::attach_broker).
/// The broker never keeps a transport alive; entries for dropped transports
/// resolve to nothing.
#[derive(Clone, Default)]
pub struct MessageBroker {
    inner: Arc<BrokerInner>,
}

impl MessageBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn register(&self, transport: &Arc<TransportInner>) {
        let id = transport.agent_id().clone();
        self.inner
            .agents
            .write()
            .await
            .insert(id.clone(), Arc::downgrade(transport));
        debug!(agent_id = %id, "Agent registered with broker");
    }

    /// Remove an agent together with its subscriptions and group memberships.
    pub async fn unregister(&self, agent_id: &AgentId) {
        self.inner.agents.write().await.remove(agent_id);
        self.inner.broadcast_subscribers.write().await.remove(agent_id);
        let mut groups = self.inner.groups.write().await;
        for members in groups.values_mut() {
            members.remove(agent_id);
        }
        groups.retain(|_, members| !members.is_empty());
        debug!(agent_id = %agent_id, "Agent unregistered from broker");
    }

    pub(crate) async fn lookup(&self, agent_id: &AgentId) -> Option<Arc<TransportInner>> {
        self.inner
            .agents
            .read()
            .await
            .get(agent_id)
            .and_then(Weak::upgrade)
    }

    /// Live registered agents.
    pub async fn registered_agents(&self) -> Vec<AgentId> {
        let mut agents: Vec<AgentId> = self
            .inner
            .agents
            .read()
            .await
            .iter()
            .filter(|(_, w)| w.strong_count() > 0)
            .map(|(id, _)| id.clone())
            .collect();
        agents.sort();
        agents
    }

    /// Receive broadcasts from every agent attached to this broker.
    pub async fn subscribe_broadcast(&self, agent_id: impl Into<AgentId>) {
        self.inner
            .broadcast_subscribers
            .write()
            .await
            .insert(agent_id.into());
    }

    pub async fn unsubscribe_broadcast(&self, agent_id: &AgentId) {
        self.inner.broadcast_subscribers.write().await.remove(agent_id);
    }

    /// Broadcast subscribers whose transport is still alive.
    pub async fn broadcast_subscribers(&self) -> Vec<AgentId> {
        let agents = self.inner.agents.read().await;
        let mut subscribers: Vec<AgentId> = self
            .inner
            .broadcast_subscribers
            .read()
            .await
            .iter()
            .filter(|id| agents.get(*id).is_some_and(|w| w.strong_count() > 0))
            .cloned()
            .collect();
        subscribers.sort();
        subscribers
    }

    pub async fn join_group(&self, group: &str, agent_id: AgentId) {
        self.inner
            .groups
            .write()
            .await
            .entry(group.to_string())
            .or_default()
            .insert(agent_id);
    }

    pub async fn leave_group(&self, group: &str, agent_id: &AgentId) {
        let mut groups = self.inner.groups.write().await;
        if let Some(members) = groups.get_mut(group) {
            members.remove(agent_id);
            if members.is_empty() {
                groups.remove(group);
            }
        }
    }

    pub async fn group_members(&self, group: &str) -> Vec<AgentId> {
        let mut members: Vec<AgentId> = self
            .inner
            .groups
            .read()
            .await
            .get(group)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    pub(crate) fn record_routed(&self) {
        self.inner.routed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unroutable(&self) {
        self.inner.unroutable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            routed: self.inner.routed.load(Ordering::Relaxed),
            unroutable: self.inner.unroutable.load(Ordering::Relaxed),
        }
    }
}
