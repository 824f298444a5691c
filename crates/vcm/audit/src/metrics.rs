//! Audit metrics with stable names

use prometheus::{Encoder, Gauge, IntGauge, Opts, Registry, TextEncoder};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const DEFAULT_METRICS_PREFIX: &str = "vcm_audit";

/// Snapshot of the audit counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditMetrics {
    pub actions_total: u64,
    pub actions_compliant: u64,
    pub actions_non_compliant: u64,
    /// compliant / total, 1.0 for an empty trail
    pub compliance_rate: f64,
    pub chain_length: u64,
}

impl AuditMetrics {
    pub(crate) fn from_counts(compliant: u64, non_compliant: u64, chain_length: usize) -> Self {
        let total = compliant + non_compliant;
        let compliance_rate = if total == 0 {
            1.0
        } else {
            compliant as f64 / total as f64
        };
        Self {
            actions_total: total,
            actions_compliant: compliant,
            actions_non_compliant: non_compliant,
            compliance_rate,
            chain_length: chain_length as u64,
        }
    }
}

/// Prometheus mirror of [`AuditMetrics`].
///
/// Names are `<prefix>_actions_total`, `<prefix>_actions_compliant_total`,
/// `<prefix>_actions_non_compliant_total`, `<prefix>_compliance_rate` and
/// `<prefix>_chain_length`. Values are set from snapshots, so they are gauges.
pub struct AuditMetricsCollector {
    pub actions_total: IntGauge,
    pub actions_compliant: IntGauge,
    pub actions_non_compliant: IntGauge,
    pub compliance_rate: Gauge,
    pub chain_length: IntGauge,
}

impl AuditMetricsCollector {
    /// Create and register the audit metrics.
    pub fn new(registry: &Registry, prefix: &str) -> Result<Self> {
        let actions_total = IntGauge::with_opts(Opts::new(
            format!("{prefix}_actions_total"),
            "Audited actions",
        ))?;
        registry.register(Box::new(actions_total.clone()))?;

        let actions_compliant = IntGauge::with_opts(Opts::new(
            format!("{prefix}_actions_compliant_total"),
            "Audited actions that complied with policy",
        ))?;
        registry.register(Box::new(actions_compliant.clone()))?;

        let actions_non_compliant = IntGauge::with_opts(Opts::new(
            format!("{prefix}_actions_non_compliant_total"),
            "Audited actions that violated policy",
        ))?;
        registry.register(Box::new(actions_non_compliant.clone()))?;

        let compliance_rate = Gauge::with_opts(Opts::new(
            format!("{prefix}_compliance_rate"),
            "Fraction of audited actions that complied",
        ))?;
        registry.register(Box::new(compliance_rate.clone()))?;

        let chain_length = IntGauge::with_opts(Opts::new(
            format!("{prefix}_chain_length"),
            "Entries in the audit hash chain",
        ))?;
        registry.register(Box::new(chain_length.clone()))?;

        Ok(Self {
            actions_total,
            actions_compliant,
            actions_non_compliant,
            compliance_rate,
            chain_length,
        })
    }

    pub fn update(&self, metrics: &AuditMetrics) {
        self.actions_total.set(metrics.actions_total as i64);
        self.actions_compliant.set(metrics.actions_compliant as i64);
        self.actions_non_compliant
            .set(metrics.actions_non_compliant as i64);
        self.compliance_rate.set(metrics.compliance_rate);
        self.chain_length.set(metrics.chain_length as i64);
    }
}

/// Render a registry in the Prometheus text format.
pub fn export_prometheus(registry: &Registry) -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
