use std::sync::Arc;
use std::time::Duration;

use vcm_policy::{PolicyEnforcer, ResourceAction};
use vcm_runtime::{
    EmbeddingTier, HashingEmbedder, MetricsRegistry, PipelineOutcome, RejectionStage,
    RuntimeError, VcmConfig, VectorCommPipeline,
};
use vcm_safety::{axis_aligned_box, SafetyConfig, SafetyFilter, SafetyPolytope};
use vcm_transport::{AgentTransport, TransportConfig};
use vcm_types::{AgentId, Dimension, MessageBuilder, MessageIntent, VectorCommMessage};

const WAIT: Option<Duration> = Some(Duration::from_secs(2));

const ENFORCED: &str = r#"
policy_id: fair-share-v1
limits:
  cpu_max: "80%"
  memory_max: "4GB"
  enforce: true
"#;

const ADVISORY: &str = r#"
policy_id: advisory
limits:
  cpu_max: "80%"
  memory_max: "4GB"
  enforce: false
"#;

fn config() -> VcmConfig {
    VcmConfig {
        transport: TransportConfig {
            poll_interval_ms: 5,
            retry_base_delay_ms: 5,
            ..TransportConfig::default()
        },
        ..VcmConfig::default()
    }
}

fn enforcer(document: &str) -> Arc<PolicyEnforcer> {
    let enforcer = PolicyEnforcer::new();
    enforcer.load_policy(document).unwrap();
    Arc::new(enforcer)
}

fn open_region(config: &VcmConfig) -> SafetyFilter {
    SafetyFilter::new(SafetyPolytope::unconstrained(384), config.safety.clone())
}

/// Sender pipeline plus a started receiver it is connected to.
async fn pair(
    config: &VcmConfig,
    safety: SafetyFilter,
    enforcer: Arc<PolicyEnforcer>,
) -> (VectorCommPipeline, AgentTransport) {
    let sender = AgentTransport::new("planner", config.transport.clone());
    let receiver = AgentTransport::new("executor", config.transport.clone());
    sender.connect(&receiver).await;
    sender.start().await.unwrap();
    receiver.start().await.unwrap();

    let pipeline = VectorCommPipeline::new(sender, safety, enforcer, config)
        .with_embedder(Arc::new(HashingEmbedder::new()));
    (pipeline, receiver)
}

fn spike_message() -> VectorCommMessage {
    let mut vector = vec![0.0f32; 384];
    vector[0] = 2.0;
    MessageBuilder::new("planner", Dimension::D384)
        .primary_vector(vector)
        .destination("executor")
        .intent(MessageIntent::Command)
        .build()
        .unwrap()
}

fn action(cpu: &str) -> ResourceAction {
    ResourceAction::new("planner", "plan")
        .with_cpu(cpu)
        .with_memory("1GB")
}

#[tokio::test]
async fn composed_message_is_delivered_and_audited() {
    let config = config();
    let (pipeline, receiver) = pair(&config, open_region(&config), enforcer(ENFORCED)).await;

    let outcome = pipeline
        .send_text(
            "reserve two workers",
            EmbeddingTier::Small,
            Some(AgentId::from("executor")),
            MessageIntent::Command,
            &action("50%"),
        )
        .await
        .unwrap();

    let PipelineOutcome::Delivered {
        message_id,
        steered,
        frame_bytes,
        decision,
        audit_entry,
        ..
    } = outcome
    else {
        panic!("expected delivery, got {outcome:?}");
    };
    assert!(!steered);
    assert!(frame_bytes > 384 * 4);
    assert!(decision.allowed);
    assert_eq!(audit_entry, 0);

    let received = receiver.receive(WAIT).await.unwrap();
    assert_eq!(received.message_id(), message_id);
    assert_eq!(received.header.semantic_space, "hashing-384");
    assert!(pipeline.verifier().verify(&received));

    let trail = pipeline.audit_trail();
    let trail = trail.lock().await;
    assert_eq!(trail.len(), 1);
    assert!(trail.entries()[0].compliant);
    assert_eq!(trail.entries()[0].agent_id, "planner");
    assert!(trail.verify_chain_integrity());
}

#[tokio::test]
async fn policy_violation_is_rejected_unless_advisory() {
    let config = config();
    let (pipeline, receiver) = pair(&config, open_region(&config), enforcer(ENFORCED)).await;

    let outcome = pipeline.dispatch(spike_message(), &action("95%")).await.unwrap();
    match &outcome {
        PipelineOutcome::Rejected { stage, reason, .. } => {
            assert_eq!(*stage, RejectionStage::Policy);
            assert!(reason.contains("CPU"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(receiver.receive(Some(Duration::from_millis(50))).await.is_none());

    pipeline.enforcer().load_policy(ADVISORY).unwrap();
    let outcome = pipeline.dispatch(spike_message(), &action("95%")).await.unwrap();
    let PipelineOutcome::Delivered { decision, .. } = outcome else {
        panic!("advisory policy should let the action through");
    };
    assert!(decision.allowed);
    assert!(decision.modifications.is_some());
    assert!(receiver.receive(WAIT).await.is_some());

    let trail = pipeline.audit_trail();
    let trail = trail.lock().await;
    assert_eq!(trail.len(), 2);
    assert_eq!(trail.get_non_compliant_actions().len(), 1);
}

#[tokio::test]
async fn unsafe_vector_is_steered_or_rejected() {
    let mut config = config();
    config.safety = SafetyConfig {
        step_size: 1.0,
        max_iterations: 10,
        ..SafetyConfig::default()
    };
    let region = axis_aligned_box(&vec![-1.0; 384], &vec![1.0; 384], 0.0).unwrap();

    let (steering, receiver) = pair(
        &config,
        SafetyFilter::new(region.clone(), config.safety.clone()),
        enforcer(ENFORCED),
    )
    .await;
    let outcome = steering.dispatch(spike_message(), &action("10%")).await.unwrap();
    assert!(matches!(outcome, PipelineOutcome::Delivered { steered: true, .. }));
    let received = receiver.receive(WAIT).await.unwrap();
    assert_eq!(received.payload.primary_vector[0], 1.0);
    assert!(steering.verifier().verify(&received));

    let strict = SafetyConfig {
        steering_enabled: false,
        ..config.safety.clone()
    };
    let (rejecting, receiver) =
        pair(&config, SafetyFilter::new(region, strict), enforcer(ENFORCED)).await;
    let outcome = rejecting.dispatch(spike_message(), &action("10%")).await.unwrap();
    match outcome {
        PipelineOutcome::Rejected { stage, reason, .. } => {
            assert_eq!(stage, RejectionStage::Safety);
            assert!(reason.contains("x0_max"));
        }
        other => panic!("expected safety rejection, got {other:?}"),
    }
    assert!(receiver.receive(Some(Duration::from_millis(50))).await.is_none());
}

#[tokio::test]
async fn strict_verification_fails_closed() {
    let strict = config();
    let mut lenient = config();
    lenient.verification.strict = false;

    // attention weights that do not sum to one
    let message = || {
        MessageBuilder::new("planner", Dimension::D384)
            .primary_vector(vec![0.05; 384])
            .context_vector(vec![0.01; 384])
            .attention_weights(vec![0.5])
            .destination("executor")
            .build()
            .unwrap()
    };

    let (pipeline, _rx) = pair(&strict, open_region(&strict), enforcer(ENFORCED)).await;
    let outcome = pipeline.dispatch(message(), &action("10%")).await.unwrap();
    assert!(matches!(
        outcome,
        PipelineOutcome::Rejected { stage: RejectionStage::Validation, .. }
    ));

    let (pipeline, receiver) = pair(&lenient, open_region(&lenient), enforcer(ENFORCED)).await;
    let outcome = pipeline.dispatch(message(), &action("10%")).await.unwrap();
    assert!(outcome.is_delivered());
    assert!(receiver.receive(WAIT).await.is_some());
}

#[tokio::test]
async fn stopped_transport_is_a_transport_rejection() {
    let config = config();
    let transport = AgentTransport::new("planner", config.transport.clone());
    let pipeline =
        VectorCommPipeline::new(transport, open_region(&config), enforcer(ENFORCED), &config);

    let outcome = pipeline.dispatch(spike_message(), &action("10%")).await.unwrap();
    assert!(matches!(
        outcome,
        PipelineOutcome::Rejected { stage: RejectionStage::Transport, .. }
    ));
    assert_eq!(outcome.audit_entry(), 0);
}

#[tokio::test]
async fn misconfiguration_is_an_error() {
    let config = config();
    let transport = AgentTransport::new("planner", config.transport.clone());
    transport.start().await.unwrap();

    // no policy loaded
    let pipeline = VectorCommPipeline::new(
        transport.clone(),
        open_region(&config),
        Arc::new(PolicyEnforcer::new()),
        &config,
    );
    let err = pipeline.dispatch(spike_message(), &action("10%")).await.unwrap_err();
    assert!(matches!(err, RuntimeError::Policy(_)));
    assert!(pipeline.audit_trail().lock().await.is_empty());

    // no embedder
    let err = pipeline
        .compose("hello", EmbeddingTier::Small, None, MessageIntent::Query)
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Embedding(_)));

    transport.stop().await.unwrap();
}

#[tokio::test]
async fn unevaluable_inputs_are_audited_rejections() {
    let config = config();
    let transport = AgentTransport::new("planner", config.transport.clone());
    transport.start().await.unwrap();

    // unparseable usage
    let pipeline = VectorCommPipeline::new(
        transport.clone(),
        open_region(&config),
        enforcer(ENFORCED),
        &config,
    );
    let outcome = pipeline.dispatch(spike_message(), &action("lots")).await.unwrap();
    match &outcome {
        PipelineOutcome::Rejected { stage, reason, .. } => {
            assert_eq!(*stage, RejectionStage::Policy);
            assert!(reason.contains("lots"));
        }
        other => panic!("expected policy rejection, got {other:?}"),
    }
    let trail = pipeline.audit_trail();
    {
        let trail = trail.lock().await;
        assert_eq!(trail.len(), 1);
        assert!(!trail.entries()[0].compliant);
    }

    // region of the wrong dimension
    let pipeline = VectorCommPipeline::new(
        transport.clone(),
        SafetyFilter::new(
            axis_aligned_box(&[0.0; 3], &[1.0; 3], 0.0).unwrap(),
            config.safety.clone(),
        ),
        enforcer(ENFORCED),
        &config,
    );
    let outcome = pipeline.dispatch(spike_message(), &action("10%")).await.unwrap();
    assert!(matches!(
        outcome,
        PipelineOutcome::Rejected { stage: RejectionStage::Safety, .. }
    ));
    assert_eq!(pipeline.audit_trail().lock().await.len(), 1);

    transport.stop().await.unwrap();
}

#[tokio::test]
async fn shared_trail_and_metrics_track_every_dispatch() {
    let config = config();
    let metrics = Arc::new(MetricsRegistry::new(&config.audit.metrics_prefix).unwrap());
    let (pipeline, receiver) = pair(&config, open_region(&config), enforcer(ENFORCED)).await;
    let pipeline = pipeline.with_metrics(metrics.clone());

    for cpu in ["10%", "95%", "20%"] {
        pipeline.dispatch(spike_message(), &action(cpu)).await.unwrap();
    }
    assert!(receiver.receive(WAIT).await.is_some());
    assert!(receiver.receive(WAIT).await.is_some());

    let trail = pipeline.audit_trail();
    {
        let trail = trail.lock().await;
        assert_eq!(trail.len(), 3);
        let ids: Vec<u64> = trail.entries().iter().map(|e| e.entry_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(trail.verify_chain_integrity());
    }

    let text = metrics.export().unwrap();
    assert!(text.contains("vcm_audit_actions_total 3"));
    assert!(text.contains("vcm_audit_actions_non_compliant_total 1"));
    assert!(text.contains("vcm_transport_sent 2"));

    // tampering with a past entry is detected
    let mut trail = trail.lock().await;
    let mut export = trail.export_chain();
    export.entries[1].action = "send:nothing-to-see".into();
    assert!(!export.verify().valid);
    assert!(vcm_audit::AuditTrail::from_export(export).is_err());
    assert!(trail.verify_chain_integrity());
    trail.log_action("planner", "manual", true, None);
    assert!(trail.verify_chain_integrity());
}

#[tokio::test]
async fn broadcast_compose_reaches_subscribers() {
    let config = config();
    let sender = AgentTransport::new("planner", config.transport.clone());
    let b = AgentTransport::new("b", config.transport.clone());
    let c = AgentTransport::new("c", config.transport.clone());
    sender.connect(&b).await;
    sender.connect(&c).await;
    for t in [&sender, &b, &c] {
        t.start().await.unwrap();
    }

    let pipeline = VectorCommPipeline::new(sender, open_region(&config), enforcer(ENFORCED), &config)
        .with_embedder(Arc::new(HashingEmbedder::new()));
    let message = pipeline
        .compose("status: idle", EmbeddingTier::Small, None, MessageIntent::Notification)
        .await
        .unwrap();
    assert!(message.is_broadcast());

    let outcome = pipeline.dispatch(message, &action("5%")).await.unwrap();
    assert!(outcome.is_delivered());
    assert_eq!(b.receive(WAIT).await.unwrap().message_id(), outcome.message_id());
    assert_eq!(c.receive(WAIT).await.unwrap().message_id(), outcome.message_id());
}
