//! compose → encode → safety → policy → transport → audit

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use vcm_audit::AuditTrail;
use vcm_codec::FrameCodec;
use vcm_policy::{EnforcementDecision, PolicyEnforcer, PolicyError, ResourceAction};
use vcm_safety::{SafetyFilter, SafetyVerdict};
use vcm_transport::AgentTransport;
use vcm_types::{AgentId, MessageBuilder, MessageId, MessageIntent, VectorCommMessage};
use vcm_verifier::{Anomaly, MessageVerifier, VerifierError};

use crate::config::VcmConfig;
use crate::embedding::{EmbeddingProvider, EmbeddingTier};
use crate::error::{Result, RuntimeError};
use crate::metrics::MetricsRegistry;

/// Pipeline step that turned a message away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionStage {
    Validation,
    Encoding,
    Safety,
    Policy,
    Transport,
}

impl fmt::Display for RejectionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectionStage::Validation => "validation",
            RejectionStage::Encoding => "encoding",
            RejectionStage::Safety => "safety",
            RejectionStage::Policy => "policy",
            RejectionStage::Transport => "transport",
        };
        f.write_str(s)
    }
}

/// What happened to one dispatched message. Every outcome has exactly one
/// audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Delivered {
        message_id: MessageId,
        /// The primary vector was corrected into the safety region
        steered: bool,
        frame_bytes: usize,
        anomalies: Vec<Anomaly>,
        decision: EnforcementDecision,
        audit_entry: u64,
    },
    Rejected {
        message_id: MessageId,
        stage: RejectionStage,
        reason: String,
        audit_entry: u64,
    },
}

impl PipelineOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, PipelineOutcome::Delivered { .. })
    }

    pub fn message_id(&self) -> MessageId {
        match self {
            PipelineOutcome::Delivered { message_id, .. }
            | PipelineOutcome::Rejected { message_id, .. } => *message_id,
        }
    }

    pub fn audit_entry(&self) -> u64 {
        match self {
            PipelineOutcome::Delivered { audit_entry, .. }
            | PipelineOutcome::Rejected { audit_entry, .. } => *audit_entry,
        }
    }
}

/// Per-message state accumulated through the stages.
#[derive(Default)]
struct Progress {
    steered: bool,
    frame_bytes: usize,
    anomalies: Vec<Anomaly>,
    decision: Option<EnforcementDecision>,
}

/// One agent's sending pipeline.
///
/// Every collaborator is passed in; the audit trail and policy enforcer can
/// be shared between pipelines. The trail sits behind a mutex because
/// appends must be serialized.
pub struct VectorCommPipeline {
    agent_id: AgentId,
    transport: AgentTransport,
    safety: SafetyFilter,
    enforcer: Arc<PolicyEnforcer>,
    audit: Arc<Mutex<AuditTrail>>,
    verifier: MessageVerifier,
    codec: FrameCodec,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl VectorCommPipeline {
    pub fn new(
        transport: AgentTransport,
        safety: SafetyFilter,
        enforcer: Arc<PolicyEnforcer>,
        config: &VcmConfig,
    ) -> Self {
        Self {
            agent_id: transport.agent_id().clone(),
            transport,
            safety,
            enforcer,
            audit: Arc::new(Mutex::new(AuditTrail::new())),
            verifier: MessageVerifier::new(config.verification.clone()),
            codec: FrameCodec::new(config.codec.clone()),
            embedder: None,
            metrics: None,
        }
    }

    /// Append to a shared trail instead of a private one.
    pub fn with_audit_trail(mut self, audit: Arc<Mutex<AuditTrail>>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn transport(&self) -> &AgentTransport {
        &self.transport
    }

    pub fn enforcer(&self) -> &Arc<PolicyEnforcer> {
        &self.enforcer
    }

    pub fn audit_trail(&self) -> Arc<Mutex<AuditTrail>> {
        self.audit.clone()
    }

    pub fn verifier(&self) -> &MessageVerifier {
        &self.verifier
    }

    /// Embed `text` at `tier` and wrap it in a message from this agent.
    /// `None` destination means broadcast.
    pub async fn compose(
        &self,
        text: &str,
        tier: EmbeddingTier,
        destination: Option<AgentId>,
        intent: MessageIntent,
    ) -> Result<VectorCommMessage> {
        let embedder = self
            .embedder
            .as_ref()
            .ok_or_else(|| RuntimeError::Embedding("no embedding provider configured".into()))?;

        let vector = embedder.encode(text, tier).await?;
        let expected = tier.dimension().as_usize();
        if vector.len() != expected {
            return Err(RuntimeError::Embedding(format!(
                "provider returned {} values for {} tier, expected {}",
                vector.len(),
                tier,
                expected
            )));
        }

        let mut builder = MessageBuilder::new(self.agent_id.clone(), tier.dimension())
            .primary_vector(vector)
            .semantic_space(embedder.model_name(tier))
            .intent(intent)
            .payload_metadata("tier", tier);
        if let Some(dest) = destination {
            builder = builder.destination(dest);
        }
        Ok(builder.build()?)
    }

    /// [`compose`](Self::compose) then [`dispatch`](Self::dispatch).
    pub async fn send_text(
        &self,
        text: &str,
        tier: EmbeddingTier,
        destination: Option<AgentId>,
        intent: MessageIntent,
        action: &ResourceAction,
    ) -> Result<PipelineOutcome> {
        let message = self.compose(text, tier, destination, intent).await?;
        self.dispatch(message, action).await
    }

    /// Run a message through every stage and audit the result.
    ///
    /// Rejections are returned as [`PipelineOutcome::Rejected`], including a
    /// vector the safety region cannot evaluate and an action with unparseable
    /// usage. `Err` is reserved for misconfiguration, such as no loaded policy,
    /// and leaves no audit entry.
    pub async fn dispatch(
        &self,
        mut message: VectorCommMessage,
        action: &ResourceAction,
    ) -> Result<PipelineOutcome> {
        let message_id = message.message_id();
        let mut progress = Progress::default();

        let result = self.run_stages(&mut message, action, &mut progress).await?;
        let outcome = match result {
            Ok(decision) => {
                let entry = self
                    .audit(&message, action, true, &progress, None)
                    .await;
                info!(
                    agent_id = %self.agent_id,
                    message_id = %message_id,
                    steered = progress.steered,
                    "Message dispatched"
                );
                PipelineOutcome::Delivered {
                    message_id,
                    steered: progress.steered,
                    frame_bytes: progress.frame_bytes,
                    anomalies: progress.anomalies,
                    decision,
                    audit_entry: entry,
                }
            }
            Err((stage, reason)) => {
                let entry = self
                    .audit(&message, action, false, &progress, Some((stage, &reason)))
                    .await;
                warn!(
                    agent_id = %self.agent_id,
                    message_id = %message_id,
                    stage = %stage,
                    reason = %reason,
                    "Message rejected"
                );
                PipelineOutcome::Rejected {
                    message_id,
                    stage,
                    reason,
                    audit_entry: entry,
                }
            }
        };

        self.refresh_metrics().await;
        Ok(outcome)
    }

    /// Outer `Err` aborts the dispatch; inner `Err` is a rejection.
    async fn run_stages(
        &self,
        message: &mut VectorCommMessage,
        action: &ResourceAction,
        progress: &mut Progress,
    ) -> Result<std::result::Result<EnforcementDecision, (RejectionStage, String)>> {
        // validate
        match self.verifier.ensure_valid(message) {
            Ok(_) => {}
            Err(VerifierError::Invalid(errors)) => {
                return Ok(Err((RejectionStage::Validation, errors.join("; "))));
            }
            Err(e) => return Err(e.into()),
        }

        // encode
        let frame = match self.codec.encode(message) {
            Ok(frame) => frame,
            Err(e) => return Ok(Err((RejectionStage::Encoding, e.to_string()))),
        };
        progress.frame_bytes = frame.len();
        progress.anomalies = self.verifier.anomalies(message, Some(frame.len()));
        if !progress.anomalies.is_empty() {
            warn!(
                message_id = %message.message_id(),
                anomalies = ?progress.anomalies,
                "Anomalous message"
            );
        }

        // safety
        let verdict = match self.safety.evaluate(&message.payload.primary_vector) {
            Ok(verdict) => verdict,
            Err(e) => return Ok(Err((RejectionStage::Safety, e.to_string()))),
        };
        match verdict {
            SafetyVerdict::Safe => {}
            SafetyVerdict::Steered { vector, iterations } => {
                debug!(message_id = %message.message_id(), iterations, "Primary vector steered");
                message.replace_primary_vector(vector);
                progress.steered = true;
            }
            SafetyVerdict::Unsafe { violations } => {
                let labels: Vec<&str> = violations.iter().map(|v| v.label.as_str()).collect();
                return Ok(Err((
                    RejectionStage::Safety,
                    format!(
                        "{} safety constraint(s) violated: {}",
                        violations.len(),
                        labels.join(", ")
                    ),
                )));
            }
        }

        // policy
        let decision = match self.enforcer.enforce_limits(action) {
            Ok(decision) => decision,
            Err(e @ PolicyError::InvalidQuantity { .. }) => {
                return Ok(Err((RejectionStage::Policy, e.to_string())));
            }
            Err(e) => return Err(e.into()),
        };
        progress.decision = Some(decision.clone());
        if !decision.allowed {
            return Ok(Err((RejectionStage::Policy, decision.reason)));
        }

        // transport
        self.verifier.seal(message)?;
        if let Err(e) = self.transport.send(message.clone()).await {
            return Ok(Err((RejectionStage::Transport, e.to_string())));
        }
        Ok(Ok(decision))
    }

    async fn audit(
        &self,
        message: &VectorCommMessage,
        action: &ResourceAction,
        delivered: bool,
        progress: &Progress,
        rejection: Option<(RejectionStage, &str)>,
    ) -> u64 {
        let mut metadata = json!({
            "message_id": message.message_id().to_string(),
            "intent": message.metadata.intent.as_str(),
            "destination": message.destination().map(|d| d.to_string()),
            "action_type": action.action_type,
            "steered": progress.steered,
            "frame_bytes": progress.frame_bytes,
            "anomalies": progress.anomalies.len(),
        });
        if let Some(decision) = &progress.decision {
            metadata["policy_reason"] = json!(decision.reason);
        }
        if let Some((stage, reason)) = rejection {
            metadata["rejected_at"] = json!(stage.to_string());
            metadata["reason"] = json!(reason);
        }

        let mut trail = self.audit.lock().await;
        trail
            .log_action(
                message.source().as_str(),
                format!("send:{}", action.action_type),
                delivered,
                Some(metadata),
            )
            .entry_id
    }

    async fn refresh_metrics(&self) {
        if let Some(metrics) = &self.metrics {
            let audit = self.audit.lock().await.export_metrics();
            metrics.update_audit(&audit);
            metrics.update_transport(&self.transport.stats());
        }
    }
}
