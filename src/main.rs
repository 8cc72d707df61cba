mod cli;
mod core;
mod driver;
mod prompt;

use crate::core::engine::Engine;
use crate::core::events::EngineEvent;
use crate::core::model::TransferState;
use crate::driver::http::HttpDriver;
use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli::build_cli().get_matches();

    match matches.subcommand() {
        Some(("download", m)) => {
            let args = cli::DownloadArgs::from_matches(m)?;
            init_tracing(args.verbose);

            let mut stdin = BufReader::new(tokio::io::stdin());
            let mut stdout = tokio::io::stdout();
            let request = prompt::complete_request(&mut stdin, &mut stdout, &args).await?;

            tokio::fs::create_dir_all(&args.temp_dir)
                .await
                .with_context(|| format!("create temp dir {}", args.temp_dir.display()))?;

            let driver = HttpDriver::new().context("build http client")?;
            let engine = Engine::new(Arc::new(driver), args.driver_ctx.clone(), args.temp_dir.clone());

            let cancel = engine.cancel_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupt received, aborting transfer");
                    cancel.cancel();
                }
            });

            let ui_task = tokio::spawn(render_progress(engine.subscribe()));

            let result = engine.start(&request).await;
            let _ = ui_task.await;

            let report = result.context("download failed")?;
            tracing::debug!(id = %report.id, "transfer report ready");
            println!(
                "Download completed in {:.2} seconds: {} ({} bytes, {} segments)",
                report.elapsed.as_secs_f64(),
                report.target.display(),
                report.total_size,
                report.segments,
            );
        }
        _ => {}
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "segfetch=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Spinner while probing, byte bar once the size is known.
async fn render_progress(mut rx: tokio::sync::broadcast::Receiver<EngineEvent>) {
    let pb = ProgressBar::new_spinner();
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb.set_message("Starting download...");
    let sty_bar = ProgressStyle::with_template(
        "{bar:40.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, eta {eta}) {wide_msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());

    loop {
        let evt = match rx.recv().await {
            Ok(e) => e,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        };

        match evt {
            EngineEvent::Probed { total_size, .. } => {
                pb.set_style(sty_bar.clone());
                pb.set_length(total_size);
            }
            EngineEvent::Planned { ranges, .. } => {
                pb.set_message(format!("{} segments", ranges.len()));
            }
            EngineEvent::Progress { downloaded, .. } => pb.set_position(downloaded),
            EngineEvent::SegmentDone { completed, total, .. } => {
                pb.set_message(format!("segments {}/{}", completed, total));
            }
            EngineEvent::SegmentFailed { index, message, .. } => {
                pb.println(format!("segment {} failed: {}", index, message));
            }
            EngineEvent::Merged { target, .. } => {
                pb.set_message(format!("merged into {}", target.display()));
            }
            EngineEvent::StateChanged { state: TransferState::Merging, .. } => {
                pb.set_message("merging...");
            }
            EngineEvent::StateChanged { state: TransferState::Done, .. } => {
                pb.finish_and_clear();
                break;
            }
            EngineEvent::StateChanged { state: TransferState::Failed, .. } => {
                pb.abandon();
                break;
            }
            EngineEvent::StateChanged { .. } => {}
        }
    }
}
