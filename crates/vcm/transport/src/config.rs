use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-agent transport settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub inbound_capacity: usize,
    pub outbound_capacity: usize,
    /// Messages with no handler wait here for `receive()`
    pub mailbox_capacity: usize,
    /// Additional delivery attempts after the first
    pub max_retries: u32,
    /// Delay before retry `n` is `retry_base_delay_ms × n`
    pub retry_base_delay_ms: u64,
    /// How often the loops wake to observe a stop request
    pub poll_interval_ms: u64,
    /// `connect` also subscribes each side to the other's broadcasts
    pub auto_subscribe_broadcast: bool,
    /// Key for HMAC checksums attached on send
    pub checksum_key: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: 1024,
            outbound_capacity: 1024,
            mailbox_capacity: 1024,
            max_retries: 3,
            retry_base_delay_ms: 100,
            poll_interval_ms: 50,
            auto_subscribe_broadcast: true,
            checksum_key: None,
        }
    }
}

impl TransportConfig {
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms.saturating_mul(u64::from(attempt)))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_is_linear() {
        let config = TransportConfig::default();
        assert_eq!(config.retry_delay(1), Duration::from_millis(100));
        assert_eq!(config.retry_delay(3), Duration::from_millis(300));
    }
}
