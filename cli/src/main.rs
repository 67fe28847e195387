use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use std::process::Command;
use tracing::warn;
use wakeguard_core::Inhibitor;

/// Keep the system and screensaver awake while a command runs.
#[derive(Debug, Parser)]
#[command(name = "wakeguard", version)]
struct Args {
    /// Reason reported to the power-management service.
    #[arg(long, default_value = "wakeguard: command in progress")]
    reason: String,

    /// Command to run while sleep is inhibited.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    command: Vec<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let (program, program_args) = args
        .command
        .split_first()
        .context("no command to run was given")?;

    let mut inhibitor = Inhibitor::new(args.reason.clone());
    if !inhibitor.set_active(true) {
        warn!("Sleep inhibition could not be activated; running the command anyway");
    }

    let status = Command::new(program)
        .args(program_args)
        .status()
        .with_context(|| format!("failed to run {program}"))?;

    inhibitor.set_active(false);
    drop(inhibitor);

    std::process::exit(status.code().unwrap_or(1));
}
