//! # vcm-audit
//!
//! Tamper-evident record of every enforcement decision. Each entry hashes its
//! own content together with the previous entry's hash, so altering any
//! historical entry breaks verification from that point on. Breaks are
//! reported, never repaired.

#![deny(unsafe_code)]

pub mod entry;
pub mod error;
pub mod export;
pub mod integrity;
pub mod metrics;
pub mod trail;

pub use entry::{AuditEntry, GENESIS_HASH};
pub use error::{AuditError, Result};
pub use export::AuditExport;
pub use integrity::{verify_entries, BreakKind, ChainBreak, ChainReport};
pub use metrics::{export_prometheus, AuditMetrics, AuditMetricsCollector, DEFAULT_METRICS_PREFIX};
pub use trail::AuditTrail;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub metrics_prefix: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            metrics_prefix: DEFAULT_METRICS_PREFIX.to_string(),
        }
    }
}
