use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use vcm_types::AgentId;

/// A resource claim submitted for a policy decision.
///
/// Usage values are written the same way as policy limits (`"95%"`, `"2GB"`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceAction {
    pub agent_id: AgentId,
    pub action_type: String,
    #[serde(default)]
    pub cpu_usage: Option<String>,
    #[serde(default)]
    pub memory_usage: Option<String>,
    #[serde(default)]
    pub network_usage: Option<String>,
    #[serde(default)]
    pub disk_usage: Option<String>,
    /// Emergency actions may bypass limits when the policy allows overrides
    #[serde(default)]
    pub emergency: bool,
    /// A human has signed off on this action
    #[serde(default)]
    pub human_oversight: bool,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ResourceAction {
    pub fn new(agent_id: impl Into<AgentId>, action_type: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            action_type: action_type.into(),
            cpu_usage: None,
            memory_usage: None,
            network_usage: None,
            disk_usage: None,
            emergency: false,
            human_oversight: false,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_cpu(mut self, usage: impl Into<String>) -> Self {
        self.cpu_usage = Some(usage.into());
        self
    }

    pub fn with_memory(mut self, usage: impl Into<String>) -> Self {
        self.memory_usage = Some(usage.into());
        self
    }

    pub fn with_network(mut self, usage: impl Into<String>) -> Self {
        self.network_usage = Some(usage.into());
        self
    }

    pub fn with_disk(mut self, usage: impl Into<String>) -> Self {
        self.disk_usage = Some(usage.into());
        self
    }

    pub fn emergency(mut self) -> Self {
        self.emergency = true;
        self
    }

    pub fn with_human_oversight(mut self) -> Self {
        self.human_oversight = true;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
