use clap::Parser;
use message_pipeline::{Pipeline, SystemConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

/// Staged message pipeline benchmark
#[derive(Parser, Debug)]
#[command(name = "message-pipeline", version)]
struct Cli {
    /// Path to the scenario configuration (JSON)
    config: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_target(false).init();

    let cli = Cli::parse();

    // Interrupt and terminate raise the cooperative shutdown flag; in-flight
    // messages are always drained, never aborted.
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || flag.store(false, Ordering::Release)).ok();

    match run(&cli, running) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            error!("run finished with validation failures");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, running: Arc<AtomicBool>) -> message_pipeline::Result<bool> {
    info!(config = %cli.config.display(), "loading configuration");
    let config = SystemConfig::load_from_file(&cli.config)?;
    info!(scenario = %config.scenario, "configuration loaded");

    let pipeline = Pipeline::new(config)?;
    let summary = pipeline.run(running)?;
    Ok(summary.passed)
}
