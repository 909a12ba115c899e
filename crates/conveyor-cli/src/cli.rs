use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "conveyor")]
#[command(version, about = "Conveyor - background task workers and scheduler")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a TOML config file (defaults apply when omitted)
    #[arg(long, global = true, env = "CONVEYOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of workers, overrides `worker.concurrency`
    #[arg(long, global = true, env = "CONVEYOR_WORKERS")]
    pub workers: Option<usize>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the worker pool (and beat, if enabled) until Ctrl-C
    Run,

    /// Enqueue one task on an in-process runtime
    Submit(SubmitArgs),
}

#[derive(Args)]
pub struct SubmitArgs {
    /// Registered task name, e.g. `long_running_task`
    pub task: String,

    /// Positional arguments; parsed as JSON when possible, strings otherwise
    pub args: Vec<String>,

    /// Wait for the task to finish and print its execution record
    #[arg(long)]
    pub wait: bool,
}
