//! Two agents exchanging vector messages in process

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use serde::Serialize;
use tracing::info;
use vcm_audit::AuditMetrics;
use vcm_policy::{PolicyEnforcer, ResourceAction};
use vcm_runtime::{
    EmbeddingTier, HashingEmbedder, MetricsRegistry, PipelineOutcome, VcmConfig,
    VectorCommPipeline,
};
use vcm_safety::{sphere_approximation, SafetyFilter};
use vcm_transport::{AgentTransport, TransportStatsSnapshot};
use vcm_types::{AgentId, MessageIntent};

use crate::error::CliResult;
use crate::output::{print_single, OutputFormat};

const DEMO_POLICY: &str = r#"
policy_id: demo-fair-share
limits:
  cpu_max: "80%"
  memory_max: "4GB"
  enforce: true
prosocialConstraints:
  fairUse: { enabled: true, mechanism: "token-bucket" }
  emergencyOverride: true
"#;

#[derive(Args, Debug, Clone, Default)]
pub struct DemoArgs {
    /// Write the audit chain export to this file
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Also print the Prometheus metrics
    #[arg(long)]
    pub metrics: bool,
}

#[derive(Debug, Serialize)]
pub struct DemoReport {
    pub outcomes: Vec<PipelineOutcome>,
    pub received: usize,
    pub chain_valid: bool,
    pub audit: AuditMetrics,
    pub sender: TransportStatsSnapshot,
    pub receiver: TransportStatsSnapshot,
    #[serde(skip)]
    pub metrics_text: String,
}

pub async fn run(config: &VcmConfig, args: &DemoArgs) -> CliResult<DemoReport> {
    let planner = AgentTransport::new("planner", config.transport.clone());
    let executor = AgentTransport::new("executor", config.transport.clone());
    planner.connect(&executor).await;
    planner.start().await?;
    executor.start().await?;

    let tier = EmbeddingTier::Small;
    let dim = tier.dimension().as_usize();
    let region = sphere_approximation(dim, 64, &vec![0.0; dim], 1.0, 0.0, 7)?;

    let enforcer = Arc::new(PolicyEnforcer::new());
    enforcer.load_policy(DEMO_POLICY)?;

    let metrics = Arc::new(MetricsRegistry::new(&config.audit.metrics_prefix)?);
    let pipeline = VectorCommPipeline::new(
        planner.clone(),
        SafetyFilter::new(region, config.safety.clone()),
        enforcer,
        config,
    )
    .with_embedder(Arc::new(HashingEmbedder::new()))
    .with_metrics(metrics.clone());

    let executor_id = AgentId::from("executor");
    let steps = [
        (
            "index the shipping manifests",
            ResourceAction::new("planner", "index").with_cpu("40%").with_memory("1GB"),
        ),
        (
            "re-embed the full archive",
            ResourceAction::new("planner", "reembed").with_cpu("95%").with_memory("6GB"),
        ),
        (
            "restore the failed replica",
            ResourceAction::new("planner", "restore")
                .with_cpu("90%")
                .with_memory("2GB")
                .emergency(),
        ),
    ];

    let mut outcomes = Vec::with_capacity(steps.len());
    for (text, action) in &steps {
        let outcome = pipeline
            .send_text(text, tier, Some(executor_id.clone()), MessageIntent::Command, action)
            .await?;
        outcomes.push(outcome);
    }

    let expected = outcomes.iter().filter(|o| o.is_delivered()).count();
    let mut received = 0;
    while received < expected {
        match executor.receive(Some(Duration::from_secs(2))).await {
            Some(message) => {
                info!(message_id = %message.message_id(), "Executor received message");
                received += 1;
            }
            None => break,
        }
    }

    planner.stop().await?;
    executor.stop().await?;

    let trail = pipeline.audit_trail();
    let trail = trail.lock().await;
    if let Some(path) = &args.export {
        trail.export_chain().write_to(path)?;
        info!(path = %path.display(), "Audit chain exported");
    }

    let audit = trail.export_metrics();
    metrics.update_audit(&audit);
    metrics.update_transport(&planner.stats());

    Ok(DemoReport {
        outcomes,
        received,
        chain_valid: trail.verify_chain_integrity(),
        audit,
        sender: planner.stats(),
        receiver: executor.stats(),
        metrics_text: metrics.export()?,
    })
}

pub async fn execute(config: &VcmConfig, args: DemoArgs, format: OutputFormat) -> CliResult<()> {
    let report = run(config, &args).await?;
    print_single(&report, format)?;
    if args.metrics {
        println!("{}", report.metrics_text);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcm_transport::TransportConfig;

    #[tokio::test]
    async fn demo_delivers_allowed_messages_and_audits_all() {
        let config = VcmConfig {
            transport: TransportConfig {
                poll_interval_ms: 5,
                ..TransportConfig::default()
            },
            ..VcmConfig::default()
        };
        let export = tempfile::NamedTempFile::new().unwrap();
        let args = DemoArgs {
            export: Some(export.path().to_path_buf()),
            metrics: true,
        };

        let report = run(&config, &args).await.unwrap();
        assert_eq!(report.outcomes.len(), 3);
        assert!(report.outcomes[0].is_delivered());
        assert!(!report.outcomes[1].is_delivered());
        assert!(report.outcomes[2].is_delivered());
        assert_eq!(report.received, 2);
        assert!(report.chain_valid);
        assert_eq!(report.audit.actions_total, 3);
        assert_eq!(report.audit.actions_non_compliant, 1);
        assert!(report.metrics_text.contains("vcm_audit_chain_length 3"));

        let verified = crate::commands::audit::verify(export.path()).unwrap();
        assert!(verified.report.valid);
    }
}
