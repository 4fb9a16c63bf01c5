//! secret-probe
//!
//! Prints one CSV row per observation of the Secret value inside the Pod
//! until interrupted. Exit status is zero after Ctrl-C and non-zero when
//! setup fails or the watch or the writer stops.

mod cli;
mod settings;

use anyhow::Context;
use probe_core::observability::init_logging;
use probe_core::ProbeSession;
use probe_kube::{KubectlController, KubectlObservationChannel};
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli::command().get_matches();
    init_logging(cli::log_format(&matches));

    match run(&matches).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!("{error:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(matches: &clap::ArgMatches) -> anyhow::Result<()> {
    let settings = cli::load_settings(matches)?;

    if matches.get_flag("print-config") {
        print!("{}", settings.to_toml()?);
        return Ok(());
    }
    settings.validate()?;

    let controller = Arc::new(KubectlController::new(settings.kubectl.clone()));
    let channel = Arc::new(KubectlObservationChannel::new(
        settings.kubectl.clone(),
        &settings.probe.target,
        &settings.probe.watch,
    ));
    let session = ProbeSession::new(settings.probe, controller, channel);

    let cancel = session.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            cancel.cancel();
        }
    });

    let summary = session
        .run(std::io::stdout())
        .await
        .context("secret probe stopped")?;

    tracing::info!(
        cycles = summary.stats.cycles_completed,
        rows = summary.rows,
        "done"
    );
    Ok(())
}
