mod cli;
mod config;
mod dispatch;
mod errors;
mod logging;
mod models;
mod render;
mod update;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use crate::cli::{normalize_args, Args};
use crate::config::Config;
use crate::dispatch::{Dispatcher, EXIT_STARTUP};
use crate::render::{DocumentBackend, BACKEND_VERSION};
use crate::update::{UpdateStatus, Updater};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is fine; flags and real env vars still apply.
    let _ = dotenvy::dotenv();

    let args = Args::parse_from(normalize_args(std::env::args_os()));

    if args.version {
        println!("json2pdf {}", BACKEND_VERSION);
        return ExitCode::SUCCESS;
    }

    logging::init(args.debug);
    info!("Initialized logger");

    match run(args).await {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(EXIT_STARTUP)
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let config = Arc::new(Config::from_args(args).context("invalid command-line options")?);

    let mut dispatcher = Dispatcher::new(Arc::new(DocumentBackend::new()));
    let shutdown = dispatcher.cancellation_token();
    let listener = config.interrupt.then(|| dispatcher.cancel_on_ctrl_c());

    if config.update {
        let updater = Updater::from_config(&config).context("update check failed")?;
        let status = updater
            .update_until(BACKEND_VERSION, &shutdown)
            .await
            .context("update check failed")?;
        match status {
            UpdateStatus::UpToDate { version } => info!("json2pdf backend {version} is current"),
            UpdateStatus::Installed { version, path } => {
                info!("installed json2pdf backend {version} at {}", path.display())
            }
        }
    }

    dispatcher.dispatch(&config);
    let result = dispatcher.join().await;
    for report in result.iter() {
        info!("{}", report.summary());
    }
    let code = result.exit_code();

    if let Some(listener) = listener {
        dispatcher.cancel();
        let _ = listener.await;
    }

    Ok(ExitCode::from(code))
}
