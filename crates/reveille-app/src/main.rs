//! Reveille application binary - composition root.
//!
//! 1. Parse CLI flags, bring up tracing, load configuration from TOML
//! 2. Start the alarm service on the tokio runtime
//! 3. Spawn the console presenter on the event channel
//! 4. Serve method calls from stdin until EOF or Ctrl-C

mod cli;
mod logging;
mod presenter;
mod stdio;

use clap::Parser;
use reveille_core::config::ReveilleConfig;
use reveille_engine::AlarmService;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cli::CliArgs;
use crate::presenter::ConsolePresenter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Tracing first so config load warnings are visible.
    let logs = logging::init(args.log_level.as_deref().unwrap_or("info"));

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = ReveilleConfig::load_or_default(&config_file);
    args.apply(&mut config);
    logs.apply_level(&args.resolve_log_level(&config));

    tracing::info!("Starting Reveille v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    // Service and presenter.
    let (service, events) = AlarmService::start(&config.scheduling);
    let presenter = ConsolePresenter::new(std::io::stdout(), config.presentation.clone());
    let presenter_task = tokio::spawn(presenter.run(events));

    // === Request loop ===

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted");
                break;
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to read stdin");
                        break;
                    }
                };
                if let Some(result) = stdio::dispatch_line(&service, &line) {
                    stdio::write_result(&mut std::io::stdout().lock(), &result)?;
                }
            }
        }
    }

    service.shutdown();
    presenter_task.abort();
    Ok(())
}
