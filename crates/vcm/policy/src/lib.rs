//! # vcm-policy
//!
//! Declarative resource-policy enforcement for agent actions.
//!
//! A [`PolicyEnforcer`] loads a YAML/JSON policy document, checks declared
//! CPU/memory/network/disk usage against its limits, and decides whether an
//! action is allowed, allowed with warnings (unenforced policy or emergency
//! override) or denied. Rejections are ordinary values, not errors.

#![deny(unsafe_code)]

pub mod action;
pub mod attestation;
pub mod document;
pub mod enforcer;
pub mod error;
pub mod quantity;

pub use action::ResourceAction;
pub use attestation::{
    ComplianceAttestation, ComplianceProver, ComplianceStatement, HashCommitmentProver,
};
pub use document::{ProsocialConstraints, ResourceLimits, ResourcePolicy};
pub use enforcer::{
    ComplianceResult, EnforcementDecision, EnforcementRecord, PolicyEnforcer, PolicyState,
};
pub use error::PolicyError;
