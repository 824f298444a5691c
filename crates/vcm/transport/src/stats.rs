use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Live transport counters.
#[derive(Debug, Default)]
pub struct TransportStats {
    sent: AtomicU64,
    delivered: AtomicU64,
    received: AtomicU64,
    dropped: AtomicU64,
    retries: AtomicU64,
    handler_errors: AtomicU64,
}

/// Point-in-time copy of [`TransportStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportStatsSnapshot {
    /// Messages accepted by `send`
    pub sent: u64,
    /// Copies placed in a recipient's inbound queue
    pub delivered: u64,
    /// Messages accepted into this agent's inbound queue
    pub received: u64,
    /// Messages lost to full queues or exhausted retries
    pub dropped: u64,
    pub retries: u64,
    pub handler_errors: u64,
}

impl TransportStats {
    pub(crate) fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_handler_error(&self) {
        self.handler_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TransportStatsSnapshot {
        TransportStatsSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let stats = TransportStats::default();
        stats.record_sent();
        stats.record_sent();
        stats.record_delivered();
        stats.record_dropped();

        let snap = stats.snapshot();
        assert_eq!(snap.sent, 2);
        assert_eq!(snap.delivered, 1);
        assert_eq!(snap.dropped, 1);
        assert_eq!(snap.retries, 0);

        let json = serde_json::to_value(snap).unwrap();
        assert_eq!(json["sent"], 2);
    }
}
