#![doc = include_str!("../README.md")]

mod config;
mod telemetry;

use anyhow::Context;
use clap::Parser;
use config::{AppConfig, CliArgs};
use core::time::Duration;
use keysweep::{Coordinator, Counts, HttpProbeFactory, Progress, ScanReport};
use std::path::Path;
use telemetry::{init_telemetry, record_counts, record_scan_duration};
use tokio::{
    fs::OpenOptions,
    io::AsyncWriteExt,
    signal,
    sync::watch,
    time::{self, MissedTickBehavior},
};

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = AppConfig::try_from(args)?;

    let providers = init_telemetry(config.hide_timestamps)?;
    log_startup_info(&config);

    let result = run(config).await;
    providers.shutdown();
    result
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    let coordinator = Coordinator::new(
        config.scan.clone(),
        HttpProbeFactory::new(config.probe.clone()),
    );
    let progress = coordinator.subscribe();
    let reporter = tokio::spawn(report_progress(
        progress.clone(),
        config.scan.report_interval(),
    ));

    let report = tokio::select! {
        report = coordinator.run() => report?,
        () = shutdown_signal() => {
            reporter.abort();
            let _last = progress.borrow().clone();
            #[cfg(feature = "tracing")]
            tracing::warn!(
                "Scan interrupted at {}/{} candidates ({:.1}%): {} failed, {} found",
                _last.completed(),
                _last.candidates,
                _last.percent(),
                _last.totals.failed,
                _last.totals.found
            );
            anyhow::bail!("scan interrupted before completion");
        }
    };

    // The reporter exits on its own once the coordinator is gone.
    if let Err(_e) = reporter.await {
        #[cfg(feature = "tracing")]
        tracing::debug!("Progress reporter stopped abnormally: {_e}");
    }

    record_scan_duration(report.elapsed.as_secs_f64() * 1000.0);
    log_summary(&report);
    for candidate in &report.matches {
        println!("{candidate}");
    }
    if let Some(path) = &config.found_file {
        append_matches(path, &report.matches).await?;
    }

    Ok(())
}

/// Logs progress once per report interval until the scan is over, feeding
/// the probe counters with what happened since the previous tick.
async fn report_progress(mut progress: watch::Receiver<Progress>, interval: Duration) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    let mut recorded = Counts::default();
    loop {
        ticker.tick().await;
        let snapshot = progress.borrow_and_update().clone();
        record_counts(snapshot.totals.saturating_sub(&recorded));
        recorded = snapshot.totals;

        #[cfg(feature = "tracing")]
        tracing::info!(
            "{}/{} ({:.1}%) | Failed requests: {} | {} codes found | {:.0} req/s | {} workers running",
            snapshot.completed(),
            snapshot.candidates,
            snapshot.percent(),
            snapshot.totals.failed,
            snapshot.totals.found,
            snapshot.requests_per_second,
            snapshot.running_workers
        );

        // A dropped sender means the coordinator returned, and its last
        // snapshot has just been recorded.
        if snapshot.is_complete() || progress.has_changed().is_err() {
            break;
        }
    }
}

fn log_summary(_report: &ScanReport) {
    #[cfg(feature = "tracing")]
    {
        tracing::info!(
            "Scanned {} candidates in {:?}: {} succeeded, {} failed, {} malformed, {} found",
            _report.candidates,
            _report.elapsed,
            _report.totals.succeeded,
            _report.totals.failed,
            _report.totals.malformed,
            _report.totals.found
        );
        for worker in &_report.workers {
            tracing::debug!(
                "{} covered [{}, {}) in {:?}: {:?}",
                worker.assignment.worker,
                worker.assignment.offset,
                worker.assignment.end(),
                worker.elapsed,
                worker.totals
            );
        }
    }
}

async fn append_matches(path: &Path, matches: &[String]) -> anyhow::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut lines = String::new();
    for candidate in matches {
        lines.push_str(candidate);
        lines.push('\n');
    }
    file.write_all(lines.as_bytes())
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    file.flush().await?;

    #[cfg(feature = "tracing")]
    tracing::info!("Appended {} matches to {}", matches.len(), path.display());
    Ok(())
}

fn log_startup_info(_config: &AppConfig) {
    if cfg!(debug_assertions) {
        #[cfg(feature = "tracing")]
        tracing::info!("Starting keysweep with full config: {:#?}", _config);
    } else {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting keysweep against {} with {} workers x {} lanes",
            _config.probe.target,
            _config.scan.workers(),
            _config.scan.lanes_per_worker()
        );
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Failed to install SIGTERM handler: {_e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(_e) = signal::ctrl_c().await {
            #[cfg(feature = "tracing")]
            tracing::warn!("Failed to install Ctrl+C handler: {_e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received SIGTERM signal");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn matches_are_appended_one_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("found.txt");

        append_matches(&path, &["0a1b".to_string()]).await.unwrap();
        append_matches(&path, &["zz99".to_string(), "0000".to_string()])
            .await
            .unwrap();

        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(written, "0a1b\nzz99\n0000\n");
    }

    #[tokio::test(start_paused = true)]
    async fn reporter_stops_once_the_coordinator_is_gone() {
        let (tx, rx) = watch::channel(Progress::default());
        let reporter = tokio::spawn(report_progress(rx, Duration::from_secs(1)));
        drop(tx);
        time::timeout(Duration::from_secs(5), reporter)
            .await
            .unwrap()
            .unwrap();
    }
}
