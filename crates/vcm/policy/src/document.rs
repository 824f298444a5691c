//! Policy documents.
//!
//! ```yaml
//! policy_id: fair-share-v1
//! version: "1.0"
//! limits:
//!   cpu_max: "80%"
//!   memory_max: "4GB"
//!   network_max: "100MB/s"
//!   enforce: true
//! prosocialConstraints:
//!   fairUse: { enabled: true, mechanism: token-bucket }
//!   emergencyOverride: true
//!   humanOversightRequired: false
//! ```
//!
//! JSON documents parse through the same path.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::info;

use crate::error::PolicyError;
use crate::quantity::{parse_bytes, parse_percent};

const DEFAULT_POLICY_ID: &str = "default";
const DEFAULT_VERSION: &str = "1.0";

/// Parsed, normalized resource limits. Sizes are in bytes, CPU in percent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpu_max: f64,
    pub memory_max: u64,
    pub network_max: Option<u64>,
    pub disk_max: Option<u64>,
    pub enforce: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProsocialConstraints {
    pub fair_use_enabled: bool,
    pub enforcement_mechanism: Option<String>,
    pub emergency_override: bool,
    pub human_oversight_required: bool,
}

/// A loaded policy. Read-only once handed to the enforcer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourcePolicy {
    pub policy_id: String,
    pub version: String,
    pub limits: ResourceLimits,
    pub prosocial: ProsocialConstraints,
}

#[derive(Deserialize)]
struct RawPolicy {
    policy_id: Option<String>,
    version: Option<Value>,
    limits: Option<RawLimits>,
    #[serde(rename = "prosocialConstraints", alias = "prosocial_constraints", default)]
    prosocial: RawProsocial,
}

#[derive(Deserialize)]
struct RawLimits {
    cpu_max: Option<Value>,
    memory_max: Option<Value>,
    network_max: Option<Value>,
    disk_max: Option<Value>,
    enforce: Option<bool>,
}

#[derive(Deserialize, Default)]
struct RawProsocial {
    #[serde(rename = "fairUse", alias = "fair_use", default)]
    fair_use: RawFairUse,
    #[serde(rename = "emergencyOverride", alias = "emergency_override", default)]
    emergency_override: bool,
    #[serde(
        rename = "humanOversightRequired",
        alias = "human_oversight_required",
        default
    )]
    human_oversight_required: bool,
}

#[derive(Deserialize, Default)]
struct RawFairUse {
    #[serde(default)]
    enabled: bool,
    mechanism: Option<String>,
}

/// Scalars may be written as strings or numbers.
fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn percent(field: &'static str, value: &Value) -> Result<f64, PolicyError> {
    let raw = scalar(value).ok_or_else(|| PolicyError::InvalidQuantity {
        field: field.into(),
        value: format!("{value:?}"),
    })?;
    parse_percent(field, &raw)
}

fn bytes(field: &'static str, value: &Value) -> Result<u64, PolicyError> {
    let raw = scalar(value).ok_or_else(|| PolicyError::InvalidQuantity {
        field: field.into(),
        value: format!("{value:?}"),
    })?;
    parse_bytes(field, &raw)
}

impl ResourcePolicy {
    /// Parse a YAML (or JSON) policy document.
    pub fn from_document(document: &str) -> Result<Self, PolicyError> {
        let raw: RawPolicy = serde_yaml::from_str(document)?;
        let limits = raw.limits.ok_or(PolicyError::MissingLimit("limits"))?;

        let cpu_max = limits
            .cpu_max
            .as_ref()
            .ok_or(PolicyError::MissingLimit("cpu_max"))
            .and_then(|v| percent("cpu_max", v))?;
        let memory_max = limits
            .memory_max
            .as_ref()
            .ok_or(PolicyError::MissingLimit("memory_max"))
            .and_then(|v| bytes("memory_max", v))?;
        let network_max = limits
            .network_max
            .as_ref()
            .map(|v| bytes("network_max", v))
            .transpose()?;
        let disk_max = limits
            .disk_max
            .as_ref()
            .map(|v| bytes("disk_max", v))
            .transpose()?;

        let policy = ResourcePolicy {
            policy_id: raw.policy_id.unwrap_or_else(|| DEFAULT_POLICY_ID.to_string()),
            version: raw
                .version
                .as_ref()
                .and_then(scalar)
                .unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            limits: ResourceLimits {
                cpu_max,
                memory_max,
                network_max,
                disk_max,
                enforce: limits.enforce.unwrap_or(true),
            },
            prosocial: ProsocialConstraints {
                fair_use_enabled: raw.prosocial.fair_use.enabled,
                enforcement_mechanism: raw.prosocial.fair_use.mechanism,
                emergency_override: raw.prosocial.emergency_override,
                human_oversight_required: raw.prosocial.human_oversight_required,
            },
        };

        info!(
            policy_id = %policy.policy_id,
            version = %policy.version,
            enforce = policy.limits.enforce,
            "Parsed resource policy"
        );
        Ok(policy)
    }
}
