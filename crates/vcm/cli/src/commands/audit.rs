//! Audit export commands

use std::path::{Path, PathBuf};

use clap::Subcommand;
use serde::Serialize;
use vcm_audit::{AuditExport, ChainReport};

use crate::error::{CliError, CliResult};
use crate::output::{print_single, OutputFormat};

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Replay hash-chain integrity over an exported trail
    Verify {
        /// JSON export written by `AuditTrail::export_chain`
        export: PathBuf,
    },
}

#[derive(Debug, Serialize)]
pub struct VerifyReport {
    pub genesis_hash: String,
    pub exported_at: String,
    pub report: ChainReport,
}

pub fn verify(path: &Path) -> CliResult<VerifyReport> {
    let export = AuditExport::read_from(path)?;
    Ok(VerifyReport {
        genesis_hash: export.genesis_hash.clone(),
        exported_at: export.exported_at.to_rfc3339(),
        report: export.verify(),
    })
}

pub fn execute(command: AuditCommands, format: OutputFormat) -> CliResult<()> {
    match command {
        AuditCommands::Verify { export } => {
            let result = verify(&export)?;
            print_single(&result, format)?;
            if !result.report.valid {
                return Err(CliError::ChainBroken(format!(
                    "{} broken entr{} in {} total",
                    result.report.breaks.len(),
                    if result.report.breaks.len() == 1 { "y" } else { "ies" },
                    result.report.total_entries
                )));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcm_audit::AuditTrail;

    fn trail() -> AuditTrail {
        let mut trail = AuditTrail::new();
        trail.log_action("a", "send", true, None);
        trail.log_action("b", "send", false, Some(serde_json::json!({ "cpu": "95%" })));
        trail.log_action("a", "send", true, None);
        trail
    }

    #[test]
    fn intact_export_verifies() {
        let file = tempfile::NamedTempFile::new().unwrap();
        trail().export_chain().write_to(file.path()).unwrap();

        let result = verify(file.path()).unwrap();
        assert!(result.report.valid);
        assert_eq!(result.report.total_entries, 3);
    }

    #[test]
    fn tampered_export_reports_breaks() {
        let mut export = trail().export_chain();
        export.entries[1].compliant = true;
        let file = tempfile::NamedTempFile::new().unwrap();
        export.write_to(file.path()).unwrap();

        let result = verify(file.path()).unwrap();
        assert!(!result.report.valid);
        assert_eq!(result.report.first_break().map(|b| b.entry_id), Some(1));

        let err = execute(
            AuditCommands::Verify {
                export: file.path().to_path_buf(),
            },
            OutputFormat::Json,
        )
        .unwrap_err();
        assert!(matches!(err, CliError::ChainBroken(_)));
    }
}
