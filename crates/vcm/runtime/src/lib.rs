//! # vcm-runtime
//!
//! Wires the substrate together for one process:
//!
//! - [`config`]: [`VcmConfig`], one YAML document for every component
//! - [`telemetry`]: `tracing-subscriber` setup
//! - [`metrics`]: Prometheus registry with audit and transport gauges
//! - [`embedding`]: the text-to-vector boundary and tier definitions
//! - [`pipeline`]: [`VectorCommPipeline`], which takes a message through
//!   validation, encoding, the safety region, the policy enforcer and the
//!   transport, and records the result in the audit trail
//!
//! ```no_run
//! use std::sync::Arc;
//! use vcm_policy::{PolicyEnforcer, ResourceAction};
//! use vcm_runtime::{EmbeddingTier, HashingEmbedder, VcmConfig, VectorCommPipeline};
//! use vcm_safety::{SafetyFilter, SafetyPolytope};
//! use vcm_transport::AgentTransport;
//! use vcm_types::MessageIntent;
//!
//! # async fn run() -> vcm_runtime::Result<()> {
//! let config = VcmConfig::default();
//! let transport = AgentTransport::new("planner", config.transport.clone());
//! transport.start().await?;
//!
//! let enforcer = Arc::new(PolicyEnforcer::new());
//! enforcer.load_policy("limits: { cpu_max: '80%', memory_max: 4GB }")?;
//!
//! let pipeline = VectorCommPipeline::new(
//!     transport,
//!     SafetyFilter::new(SafetyPolytope::unconstrained(384), config.safety.clone()),
//!     enforcer,
//!     &config,
//! )
//! .with_embedder(Arc::new(HashingEmbedder::new()));
//!
//! let action = ResourceAction::new("planner", "plan").with_cpu("20%");
//! let outcome = pipeline
//!     .send_text("check inventory", EmbeddingTier::Small, Some("executor".into()), MessageIntent::Command, &action)
//!     .await?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod embedding;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod telemetry;

pub use config::VcmConfig;
pub use embedding::{EmbeddingProvider, EmbeddingTier, HashingEmbedder};
pub use error::{Result, RuntimeError};
pub use metrics::{MetricsRegistry, TransportMetricsCollector, TRANSPORT_METRICS_PREFIX};
pub use pipeline::{PipelineOutcome, RejectionStage, VectorCommPipeline};
pub use telemetry::{init_tracing, TracingConfig};
