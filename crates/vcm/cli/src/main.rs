//! VCM CLI
//!
//! Offline tools for the vector communication substrate:
//! - Inspect encoded frames and batches
//! - Check resource claims against a policy document
//! - Verify exported audit chains
//! - Run an in-process two-agent demo

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vcm_runtime::VcmConfig;

mod commands;
mod error;
mod output;

use commands::{audit, demo, inspect, policy};
use error::{CliError, CliResult};

#[derive(Parser)]
#[command(name = "vcm")]
#[command(about = "VCM - vector communication substrate tools", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "VCM_CONFIG")]
    config: Option<PathBuf>,

    /// Output format (json, yaml)
    #[arg(short, long, value_enum, default_value = "json")]
    output: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a frame file and print its header and metadata
    Inspect {
        /// Encoded frame (or batch with --batch)
        frame: PathBuf,

        /// The file holds a batch of frames
        #[arg(long)]
        batch: bool,

        /// Key for verifying HMAC checksums
        #[arg(long, env = "VCM_CHECKSUM_KEY")]
        key: Option<String>,
    },

    /// Resource policy tools
    Policy {
        #[command(subcommand)]
        command: policy::PolicyCommands,
    },

    /// Audit trail tools
    Audit {
        #[command(subcommand)]
        command: audit::AuditCommands,
    },

    /// Run the two-agent pipeline demo
    Demo(demo::DemoArgs),
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => VcmConfig::load(path)?,
        None => VcmConfig::default(),
    };

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.tracing.log_level.clone()
    };
    install_subscriber(&level)?;

    match cli.command {
        Commands::Inspect { frame, batch, key } => {
            inspect::execute(&frame, batch, key.as_deref(), cli.output)
        }
        Commands::Policy { command } => policy::execute(command, cli.output),
        Commands::Audit { command } => audit::execute(command, cli.output),
        Commands::Demo(args) => demo::execute(&config, args, cli.output).await,
    }
}

/// Log to stderr; `RUST_LOG` overrides `level`.
fn install_subscriber(level: &str) -> CliResult<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .try_init()
        .map_err(|e| CliError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_subscriber_is_an_error() {
        let _ = install_subscriber("info");
        assert!(matches!(install_subscriber("debug"), Err(CliError::Logging(_))));
    }
}
