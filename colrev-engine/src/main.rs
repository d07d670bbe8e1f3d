//! colrev - main entry point

use anyhow::{Context, Result};
use clap::Parser;
use colrev_engine::cli::{self, Cli};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "colrev=info,colrev_engine=info,colrev_common=info";
const DEBUG_FILTER: &str = "colrev=debug,colrev_engine=debug,colrev_common=debug";

/// Exit status for an error chain: the engine's own code when there is one
fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<colrev_common::Error>())
        .map_or(1, colrev_common::Error::exit_code)
}

async fn run(cli: Cli, cancel: CancellationToken) -> Result<String> {
    let cwd = std::env::current_dir().context("Failed to read the working directory")?;
    debug!(cwd = %cwd.display(), command = ?cli.command, "Running");
    Ok(cli::execute(&cli, &cwd, cancel).await?)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| if cli.debug { DEBUG_FILTER } else { DEFAULT_FILTER }.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing the current record");
            on_signal.cancel();
        }
    });

    match run(cli, cancel).await {
        Ok(output) => print!("{}", output),
        Err(err) => {
            error!("{:#}", err);
            std::process::exit(exit_code(&err));
        }
    }
}
