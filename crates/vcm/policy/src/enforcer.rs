use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::action::ResourceAction;
use crate::attestation::{
    ComplianceAttestation, ComplianceProver, ComplianceStatement, HashCommitmentProver,
};
use crate::document::ResourcePolicy;
use crate::error::PolicyError;
use crate::quantity::{format_bytes, format_percent, parse_bytes, parse_percent};

/// Enforcer lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyState {
    Unloaded,
    Loaded,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplianceResult {
    pub compliant: bool,
    /// One entry per exceeded limit
    pub violations: Vec<String>,
    pub warnings: Vec<String>,
    /// Suggested clamped values for each exceeded resource
    #[serde(skip)]
    pub(crate) clamps: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnforcementDecision {
    pub allowed: bool,
    pub reason: String,
    /// Present when an action is let through despite violations
    pub modifications: Option<BTreeMap<String, String>>,
    pub warnings: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnforcementRecord {
    pub timestamp: DateTime<Utc>,
    pub agent_id: String,
    pub action_type: String,
    pub decision: EnforcementDecision,
}

/// Declarative resource-policy enforcer.
///
/// Starts [`PolicyState::Unloaded`]; every check before a successful
/// [`load_policy`](Self::load_policy) fails with [`PolicyError::NotLoaded`].
/// The loaded policy is shared read-only; the enforcement history and the
/// prover's key registry are the only interior state.
pub struct PolicyEnforcer {
    policy: RwLock<Option<Arc<ResourcePolicy>>>,
    history: RwLock<Vec<EnforcementRecord>>,
    prover: Box<dyn ComplianceProver>,
}

impl PolicyEnforcer {
    pub fn new() -> Self {
        Self::with_prover(Box::new(HashCommitmentProver::new()))
    }

    pub fn with_prover(prover: Box<dyn ComplianceProver>) -> Self {
        Self {
            policy: RwLock::new(None),
            history: RwLock::new(Vec::new()),
            prover,
        }
    }

    /// Construct already loaded.
    pub fn with_policy(policy: ResourcePolicy) -> Self {
        let enforcer = Self::new();
        if let Ok(mut slot) = enforcer.policy.write() {
            *slot = Some(Arc::new(policy));
        }
        enforcer
    }

    pub fn state(&self) -> PolicyState {
        match self.policy.read() {
            Ok(p) if p.is_some() => PolicyState::Loaded,
            _ => PolicyState::Unloaded,
        }
    }

    /// Parse and install a policy document.
    pub fn load_policy(&self, document: &str) -> Result<Arc<ResourcePolicy>, PolicyError> {
        let policy = Arc::new(ResourcePolicy::from_document(document)?);
        let mut slot = self.policy.write().map_err(|_| PolicyError::LockPoisoned)?;
        if let Some(previous) = slot.as_ref() {
            info!(
                previous = %previous.policy_id,
                policy_id = %policy.policy_id,
                "Replacing loaded policy"
            );
        }
        *slot = Some(policy.clone());
        info!(policy_id = %policy.policy_id, "Policy loaded");
        Ok(policy)
    }

    pub fn load_policy_file(&self, path: impl AsRef<Path>) -> Result<Arc<ResourcePolicy>, PolicyError> {
        let document = std::fs::read_to_string(path)?;
        self.load_policy(&document)
    }

    pub fn policy(&self) -> Result<Arc<ResourcePolicy>, PolicyError> {
        self.policy
            .read()
            .map_err(|_| PolicyError::LockPoisoned)?
            .clone()
            .ok_or(PolicyError::NotLoaded)
    }

    /// Compare the action's declared usage against the loaded limits.
    pub fn check_compliance(&self, action: &ResourceAction) -> Result<ComplianceResult, PolicyError> {
        let policy = self.policy()?;
        let limits = &policy.limits;
        let mut result = ComplianceResult::default();

        if let Some(raw) = &action.cpu_usage {
            let usage = parse_percent("cpu_usage", raw)?;
            if usage > limits.cpu_max {
                result.violations.push(format!(
                    "CPU usage {} exceeds limit {}",
                    format_percent(usage),
                    format_percent(limits.cpu_max)
                ));
                result
                    .clamps
                    .insert("cpu_usage".into(), format_percent(limits.cpu_max));
            }
        }

        let sized = [
            ("MEMORY", "memory_usage", &action.memory_usage, Some(limits.memory_max)),
            ("NETWORK", "network_usage", &action.network_usage, limits.network_max),
            ("DISK", "disk_usage", &action.disk_usage, limits.disk_max),
        ];
        for (resource, field, usage, limit) in sized {
            let (Some(raw), Some(limit)) = (usage, limit) else {
                continue;
            };
            let usage = parse_bytes(field, raw)?;
            if usage > limit {
                result.violations.push(format!(
                    "{resource} usage {} exceeds limit {}",
                    format_bytes(usage),
                    format_bytes(limit)
                ));
                result.clamps.insert(field.into(), format_bytes(limit));
            }
        }

        if policy.prosocial.human_oversight_required && !action.human_oversight {
            result
                .warnings
                .push("human oversight is required by policy but not marked on the action".into());
        }

        result.compliant = result.violations.is_empty();
        debug!(
            agent_id = %action.agent_id,
            action_type = %action.action_type,
            compliant = result.compliant,
            violations = result.violations.len(),
            "Compliance checked"
        );
        Ok(result)
    }

    /// Decide allow / allow-with-warning / deny and record the decision.
    pub fn enforce_limits(&self, action: &ResourceAction) -> Result<EnforcementDecision, PolicyError> {
        let policy = self.policy()?;
        let compliance = self.check_compliance(action)?;
        let mut warnings = compliance.warnings.clone();

        let decision = if compliance.compliant {
            EnforcementDecision {
                allowed: true,
                reason: "action complies with policy".into(),
                modifications: None,
                warnings,
            }
        } else if !policy.limits.enforce {
            warnings.extend(compliance.violations.iter().cloned());
            EnforcementDecision {
                allowed: true,
                reason: format!(
                    "policy not enforced, allowed with warnings: {}",
                    compliance.violations.join("; ")
                ),
                modifications: Some(compliance.clamps.clone()),
                warnings,
            }
        } else if action.emergency && policy.prosocial.emergency_override {
            warnings.extend(compliance.violations.iter().cloned());
            EnforcementDecision {
                allowed: true,
                reason: format!(
                    "emergency override: {}",
                    compliance.violations.join("; ")
                ),
                modifications: None,
                warnings,
            }
        } else {
            EnforcementDecision {
                allowed: false,
                reason: format!("policy violations: {}", compliance.violations.join("; ")),
                modifications: None,
                warnings,
            }
        };

        if decision.allowed {
            debug!(agent_id = %action.agent_id, reason = %decision.reason, "Action allowed");
        } else {
            warn!(agent_id = %action.agent_id, reason = %decision.reason, "Action denied");
        }

        self.history
            .write()
            .map_err(|_| PolicyError::LockPoisoned)?
            .push(EnforcementRecord {
                timestamp: Utc::now(),
                agent_id: action.agent_id.to_string(),
                action_type: action.action_type.clone(),
                decision: decision.clone(),
            });

        Ok(decision)
    }

    pub fn enforcement_history(&self) -> Result<Vec<EnforcementRecord>, PolicyError> {
        Ok(self
            .history
            .read()
            .map_err(|_| PolicyError::LockPoisoned)?
            .clone())
    }

    /// Attest to the compliance outcome of `action`. See
    /// [`crate::attestation`] for what this does and does not guarantee.
    pub fn generate_proof(&self, action: &ResourceAction) -> Result<ComplianceAttestation, PolicyError> {
        let policy = self.policy()?;
        let compliance = self.check_compliance(action)?;
        let statement = ComplianceStatement {
            policy_id: policy.policy_id.clone(),
            policy_version: policy.version.clone(),
            agent_id: action.agent_id.to_string(),
            action_type: action.action_type.clone(),
            compliant: compliance.compliant,
            violation_count: compliance.violations.len(),
        };
        let witness =
            serde_json::to_vec(action).map_err(|e| PolicyError::Attestation(e.to_string()))?;
        self.prover.prove(statement, &witness)
    }

    pub fn verify_proof(&self, attestation: &ComplianceAttestation) -> Result<bool, PolicyError> {
        self.prover.verify(attestation)
    }
}

impl Default for PolicyEnforcer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(enforce: bool) -> String {
        format!(
            r#"
policy_id: test
limits:
  cpu_max: "80%"
  memory_max: "4GB"
  network_max: "100MB/s"
  enforce: {enforce}
prosocialConstraints:
  fairUse: {{ enabled: true, mechanism: token-bucket }}
  emergencyOverride: true
  humanOversightRequired: true
"#
        )
    }

    fn loaded(enforce: bool) -> PolicyEnforcer {
        let enforcer = PolicyEnforcer::new();
        enforcer.load_policy(&policy(enforce)).unwrap();
        enforcer
    }

    #[test]
    fn unloaded_enforcer_refuses() {
        let enforcer = PolicyEnforcer::new();
        assert_eq!(enforcer.state(), PolicyState::Unloaded);
        let action = ResourceAction::new("a", "compute").with_cpu("10%");
        assert!(matches!(enforcer.check_compliance(&action), Err(PolicyError::NotLoaded)));
        assert!(matches!(enforcer.enforce_limits(&action), Err(PolicyError::NotLoaded)));

        enforcer.load_policy(&policy(true)).unwrap();
        assert_eq!(enforcer.state(), PolicyState::Loaded);
    }

    #[test]
    fn cpu_within_limit_is_allowed() {
        let enforcer = loaded(true);
        let action = ResourceAction::new("a", "compute").with_cpu("50%").with_human_oversight();
        let decision = enforcer.enforce_limits(&action).unwrap();
        assert!(decision.allowed);
        assert!(decision.warnings.is_empty());
    }

    #[test]
    fn cpu_over_limit_is_denied() {
        let enforcer = loaded(true);
        let action = ResourceAction::new("a", "compute").with_cpu("95%");
        let decision = enforcer.enforce_limits(&action).unwrap();
        assert!(!decision.allowed);
        assert!(decision.reason.contains("CPU"));
        assert!(decision.reason.contains("CPU usage 95% exceeds limit 80%"));
    }

    #[test]
    fn unenforced_policy_allows_with_warning() {
        let enforcer = loaded(false);
        let action = ResourceAction::new("a", "compute").with_cpu("95%");
        let decision = enforcer.enforce_limits(&action).unwrap();
        assert!(decision.allowed);
        assert!(decision.warnings.iter().any(|w| w.contains("CPU")));
        let mods = decision.modifications.unwrap();
        assert_eq!(mods["cpu_usage"], "80%");
    }

    #[test]
    fn emergency_override() {
        let enforcer = loaded(true);
        let action = ResourceAction::new("a", "evacuate")
            .with_cpu("99%")
            .emergency();
        let decision = enforcer.enforce_limits(&action).unwrap();
        assert!(decision.allowed);
        assert!(decision.reason.starts_with("emergency override"));
    }

    #[test]
    fn one_violation_per_exceeded_limit() {
        let enforcer = loaded(true);
        let action = ResourceAction::new("a", "train")
            .with_cpu("90%")
            .with_memory("8GB")
            .with_network("1GB/s")
            .with_disk("1TB");
        let result = enforcer.check_compliance(&action).unwrap();
        assert!(!result.compliant);
        // no disk limit in this policy
        assert_eq!(result.violations.len(), 3);
        assert_eq!(result.violations[1], "MEMORY usage 8GB exceeds limit 4GB");
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn unparseable_usage_is_an_error() {
        let enforcer = loaded(true);
        let action = ResourceAction::new("a", "compute").with_memory("a lot");
        assert!(matches!(
            enforcer.check_compliance(&action),
            Err(PolicyError::InvalidQuantity { .. })
        ));
    }

    #[test]
    fn history_records_every_decision() {
        let enforcer = loaded(true);
        enforcer
            .enforce_limits(&ResourceAction::new("a", "x").with_cpu("10%"))
            .unwrap();
        enforcer
            .enforce_limits(&ResourceAction::new("b", "y").with_cpu("90%"))
            .unwrap();
        let history = enforcer.enforcement_history().unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].decision.allowed);
        assert!(!history[1].decision.allowed);
        assert_eq!(history[1].agent_id, "b");
    }

    #[test]
    fn proofs_verify() {
        let enforcer = loaded(true);
        let action = ResourceAction::new("a", "compute").with_cpu("50%");
        let att = enforcer.generate_proof(&action).unwrap();
        assert!(att.statement.compliant);
        assert_eq!(att.statement.policy_id, "test");
        assert!(enforcer.verify_proof(&att).unwrap());

        let mut forged = att.clone();
        forged.binding = "ff".repeat(32);
        assert!(!enforcer.verify_proof(&forged).unwrap());
    }

    #[test]
    fn rewritten_verdict_does_not_verify() {
        let enforcer = loaded(true);
        let action = ResourceAction::new("a", "compute").with_cpu("95%");
        let att = enforcer.generate_proof(&action).unwrap();
        assert!(!att.statement.compliant);
        assert!(enforcer.verify_proof(&att).unwrap());

        let mut forged = att;
        forged.statement.compliant = true;
        forged.statement.violation_count = 0;
        assert!(!enforcer.verify_proof(&forged).unwrap());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.yaml");
        std::fs::write(&path, policy(true)).unwrap();
        let enforcer = PolicyEnforcer::new();
        let loaded = enforcer.load_policy_file(&path).unwrap();
        assert_eq!(loaded.policy_id, "test");
    }
}
