//! Prometheus registry for the runtime

use prometheus::{IntGauge, Opts, Registry};
use vcm_audit::{export_prometheus, AuditMetrics, AuditMetricsCollector};
use vcm_transport::TransportStatsSnapshot;

use crate::error::Result;

pub const TRANSPORT_METRICS_PREFIX: &str = "vcm_transport";

/// Transport statistics as gauges named `vcm_transport_<counter>`.
pub struct TransportMetricsCollector {
    sent: IntGauge,
    delivered: IntGauge,
    received: IntGauge,
    dropped: IntGauge,
    retries: IntGauge,
    handler_errors: IntGauge,
}

impl TransportMetricsCollector {
    pub fn new(registry: &Registry, prefix: &str) -> Result<Self> {
        let gauge = |name: &str, help: &str| -> Result<IntGauge> {
            let g = IntGauge::with_opts(Opts::new(format!("{prefix}_{name}"), help))?;
            registry.register(Box::new(g.clone()))?;
            Ok(g)
        };

        Ok(Self {
            sent: gauge("sent", "Messages accepted for sending")?,
            delivered: gauge("delivered", "Message copies delivered to recipients")?,
            received: gauge("received", "Messages accepted into inbound queues")?,
            dropped: gauge("dropped", "Messages dropped by full queues or exhausted retries")?,
            retries: gauge("retries", "Delivery retries")?,
            handler_errors: gauge("handler_errors", "Failed handler invocations")?,
        })
    }

    pub fn update(&self, stats: &TransportStatsSnapshot) {
        self.sent.set(stats.sent as i64);
        self.delivered.set(stats.delivered as i64);
        self.received.set(stats.received as i64);
        self.dropped.set(stats.dropped as i64);
        self.retries.set(stats.retries as i64);
        self.handler_errors.set(stats.handler_errors as i64);
    }
}

/// One registry holding the audit and transport collectors.
pub struct MetricsRegistry {
    registry: Registry,
    audit: AuditMetricsCollector,
    transport: TransportMetricsCollector,
}

impl MetricsRegistry {
    pub fn new(audit_prefix: &str) -> Result<Self> {
        let registry = Registry::new();
        let audit = AuditMetricsCollector::new(&registry, audit_prefix)?;
        let transport = TransportMetricsCollector::new(&registry, TRANSPORT_METRICS_PREFIX)?;
        Ok(Self {
            registry,
            audit,
            transport,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn update_audit(&self, metrics: &AuditMetrics) {
        self.audit.update(metrics);
    }

    pub fn update_transport(&self, stats: &TransportStatsSnapshot) {
        self.transport.update(stats);
    }

    /// Prometheus text exposition of every registered metric.
    pub fn export(&self) -> Result<String> {
        Ok(export_prometheus(&self.registry)?)
    }
}
