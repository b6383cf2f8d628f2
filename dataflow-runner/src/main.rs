use anyhow::{Context as _, Result};
use clap::Parser;
use dataflow_workflow::{BatchReport, TaskSelection};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

mod app;
mod config;
mod logging;

/// Run the configured ETL tasks, then the saved warehouse queries
#[derive(Parser, Debug)]
#[command(name = "dataflow")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Only run these tasks (comma-separated task names)
    #[arg(short, long, value_delimiter = ',')]
    tasks: Vec<String>,

    /// Skip the source tasks pass
    #[arg(long)]
    skip_sources: bool,

    /// Skip the saved queries pass
    #[arg(long)]
    skip_queries: bool,

    /// Configuration file layered over config/default and config/local
    #[arg(short, long, env = "DATAFLOW_CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Load into an in-memory warehouse and only log notifications
    #[arg(long)]
    dry_run: bool,
}

fn log_report(report: &BatchReport) {
    for outcome in report.failed() {
        tracing::warn!(
            "{} failed: {}",
            outcome.name,
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
    tracing::info!("{:?} pass: {}", report.pass, report.summary());
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = config::Config::load(cli.config.as_deref())?;
    let log_file = logging::init(&config.log_path, &config.log_level)?;
    tracing::info!("Starting dataflow batch, logging to {}", log_file.display());

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling batch");
            signal_token.cancel();
        }
    });

    let options = app::BuildOptions {
        dry_run: cli.dry_run,
    };
    let orchestrator = app::build(&config, options, cancel.clone())
        .await
        .context("Failed to initialize")?;

    let selection = TaskSelection::from_names(Some(&cli.tasks));
    let mut clean = true;

    if cli.skip_sources {
        tracing::info!("Skipping source tasks");
    } else {
        let report = orchestrator.run_sources(&selection).await?;
        log_report(&report);
        clean &= report.all_succeeded();
    }

    if cli.skip_queries {
        tracing::info!("Skipping saved queries");
    } else if cancel.is_cancelled() {
        tracing::warn!("Batch cancelled, saved queries not run");
    } else {
        let report = orchestrator.run_queries(&selection).await?;
        log_report(&report);
        clean &= report.all_succeeded();
    }

    if cancel.is_cancelled() {
        clean = false;
    }

    tracing::info!("Dataflow batch finished");
    Ok(if clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
