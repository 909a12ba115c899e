mod cli;
mod telemetry;

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde_json::Value;
use tracing::info;

use conveyor_core::app::{AppBuilder, Backends, Runtime, RuntimeOptions};
use conveyor_core::demo;
use conveyor_core::{App, Settings};

use crate::cli::{Cli, Commands, SubmitArgs};

const STATUS_POLL: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.log_json);

    let mut settings = Settings::load_or_default(cli.config.as_deref())
        .context("failed to load configuration")?;
    if let Some(workers) = cli.workers {
        settings.worker.concurrency = workers;
    }
    settings.validate()?;

    match cli.command {
        Commands::Run => run(&settings).await,
        Commands::Submit(args) => submit(&settings, args).await,
    }
}

fn build_app(settings: &Settings, backends: &Backends) -> anyhow::Result<App> {
    let guard = backends.idempotency_guard(settings.claim_ttl());
    let (builder, _charges) = demo::register_all(AppBuilder::new(), &settings.demo, guard)?;
    Ok(builder.expect_tasks(demo::EXPECTED_TASKS).build()?)
}

async fn run(settings: &Settings) -> anyhow::Result<()> {
    let backends = Backends::in_memory(settings.result_ttl());
    let app = build_app(settings, &backends)?;
    let runtime = Runtime::start(&app, &backends, RuntimeOptions::from_settings(settings));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("shutdown requested");
    runtime.shutdown().await;
    Ok(())
}

async fn submit(settings: &Settings, args: SubmitArgs) -> anyhow::Result<()> {
    let backends = Backends::in_memory(settings.result_ttl());
    let app = build_app(settings, &backends)?;
    let options = RuntimeOptions {
        queue: settings.broker.queue.clone(),
        default_ack: settings.worker.ack_policy,
        sweep_every: None,
        ..RuntimeOptions::in_process()
    };
    let runtime = Runtime::start(&app, &backends, options);

    let arguments = args.args.iter().map(|arg| parse_argument(arg)).collect();
    let receipt = runtime
        .producer()
        .submit(args.task.as_str(), arguments, "Task received")
        .await?;
    println!("{}", serde_json::to_string_pretty(&receipt)?);

    if args.wait {
        let record = runtime
            .status()
            .wait_for_terminal(receipt.task_id, STATUS_POLL)
            .await?;
        println!("{}", serde_json::to_string_pretty(&record)?);
    }
    // The broker lives in this process; stopping before it is empty drops work.
    runtime.drain().await?;
    runtime.shutdown().await;
    Ok(())
}

/// `42` and `{"a": 1}` are JSON, `demo` is the string "demo".
fn parse_argument(arg: &str) -> Value {
    serde_json::from_str(arg).unwrap_or_else(|_| Value::String(arg.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn arguments_prefer_json() {
        assert_eq!(parse_argument("42"), json!(42));
        assert_eq!(parse_argument("\"quoted\""), json!("quoted"));
        assert_eq!(parse_argument("[1, 2]"), json!([1, 2]));
        assert_eq!(parse_argument("demo"), json!("demo"));
        assert_eq!(parse_argument("A1"), json!("A1"));
    }

    #[test]
    fn cli_parses_submit() {
        let cli = Cli::try_parse_from([
            "conveyor",
            "--workers",
            "2",
            "submit",
            "process_order",
            "A1",
            "--wait",
        ])
        .unwrap();
        assert_eq!(cli.workers, Some(2));
        match cli.command {
            Commands::Submit(args) => {
                assert_eq!(args.task, "process_order");
                assert_eq!(args.args, vec!["A1".to_string()]);
                assert!(args.wait);
            }
            Commands::Run => panic!("expected submit"),
        }
    }
}
