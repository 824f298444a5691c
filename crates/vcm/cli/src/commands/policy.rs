//! Policy commands

use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use serde::Serialize;
use vcm_policy::{ComplianceResult, EnforcementDecision, PolicyEnforcer, ResourceAction};

use crate::error::CliResult;
use crate::output::{print_single, OutputFormat};

#[derive(Subcommand)]
pub enum PolicyCommands {
    /// Check a resource claim against a policy document
    Check(CheckArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// Policy document (YAML or JSON)
    pub policy: PathBuf,

    /// Agent making the claim
    #[arg(long, default_value = "cli")]
    pub agent: String,

    /// Action type recorded with the decision
    #[arg(long, default_value = "check")]
    pub action: String,

    /// CPU usage, e.g. 95%
    #[arg(long)]
    pub cpu: Option<String>,

    /// Memory usage, e.g. 1GB
    #[arg(long)]
    pub memory: Option<String>,

    /// Network usage, e.g. 100MB/s
    #[arg(long)]
    pub network: Option<String>,

    /// Disk usage, e.g. 20GB
    #[arg(long)]
    pub disk: Option<String>,

    /// Flag the action as an emergency
    #[arg(long)]
    pub emergency: bool,

    /// Mark the action as human-supervised
    #[arg(long)]
    pub oversight: bool,
}

#[derive(Debug, Serialize)]
pub struct PolicyReport {
    pub policy_id: String,
    pub compliance: ComplianceResult,
    pub decision: EnforcementDecision,
}

impl CheckArgs {
    fn action(&self) -> ResourceAction {
        let mut action = ResourceAction::new(self.agent.as_str(), self.action.as_str());
        action.cpu_usage = self.cpu.clone();
        action.memory_usage = self.memory.clone();
        action.network_usage = self.network.clone();
        action.disk_usage = self.disk.clone();
        action.emergency = self.emergency;
        action.human_oversight = self.oversight;
        action
    }
}

pub fn check(args: &CheckArgs) -> CliResult<PolicyReport> {
    check_with(&args.policy, &args.action())
}

fn check_with(policy: &Path, action: &ResourceAction) -> CliResult<PolicyReport> {
    let enforcer = PolicyEnforcer::new();
    let loaded = enforcer.load_policy_file(policy)?;
    let compliance = enforcer.check_compliance(action)?;
    let decision = enforcer.enforce_limits(action)?;
    Ok(PolicyReport {
        policy_id: loaded.policy_id.clone(),
        compliance,
        decision,
    })
}

pub fn execute(command: PolicyCommands, format: OutputFormat) -> CliResult<()> {
    match command {
        PolicyCommands::Check(args) => print_single(&check(&args)?, format),
    }
}
