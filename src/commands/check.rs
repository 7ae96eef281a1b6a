//! `check` command: run one batch and print new links as sites complete.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use sitewatch_core::check::{BatchStats, CheckEngine, CheckReport, EngineOptions, Fetcher};
use sitewatch_core::store::Store;
use tracing::{info, warn};

use super::links::link_lines;
use crate::app::config::CheckSettings;

/// Checks the selected sites and persists every successful outcome.
///
/// Per-site failures are printed and counted, never returned as an error.
pub async fn run_check_command(
    store: &Store,
    site_id: Option<i64>,
    settings: &CheckSettings,
    show_progress: bool,
) -> Result<BatchStats> {
    let inputs = store.load_check_inputs(site_id).await?;
    if inputs.is_empty() {
        info!("no sites registered");
        return Ok(BatchStats::default());
    }

    let fetcher = Fetcher::with_options(settings.fetcher).context("Failed to build HTTP client")?;
    let engine = CheckEngine::new(
        EngineOptions {
            concurrency: settings.concurrency,
            wait: settings.wait,
            check_timeout: settings.check_timeout,
        },
        fetcher,
    )?;

    let progress = progress_bar(show_progress, u64::try_from(inputs.len()).unwrap_or(u64::MAX));
    let mut batch = engine.spawn_batch(inputs);

    while let Some(report) = batch.join_next().await {
        progress.inc(1);
        progress.set_message(report.site_name.clone());
        let lines = handle_report(store, report).await;
        progress.suspend(|| {
            for line in &lines.stdout {
                println!("{line}");
            }
            for line in &lines.stderr {
                eprintln!("{line}");
            }
        });
    }
    progress.finish_and_clear();

    let stats = batch.stats();
    if stats.failed() > 0 {
        warn!(
            failed = stats.failed(),
            total = stats.total(),
            "some checks failed"
        );
    }
    Ok(stats)
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ReportLines {
    stdout: Vec<String>,
    stderr: Vec<String>,
}

async fn handle_report(store: &Store, report: CheckReport) -> ReportLines {
    match report.result {
        Ok(outcome) => match store.record_outcome(&outcome).await {
            Ok(_) => ReportLines {
                stdout: new_link_lines(&report.site_name, report.site_id, &outcome.new_links),
                stderr: Vec::new(),
            },
            Err(error) => ReportLines {
                stdout: Vec::new(),
                stderr: failure_lines(report.site_id, &report.site_name, &error.to_string()),
            },
        },
        Err(failure) => ReportLines {
            stdout: Vec::new(),
            stderr: failure_lines(report.site_id, &report.site_name, failure.message()),
        },
    }
}

fn new_link_lines(
    site_name: &str,
    site_id: i64,
    links: &[sitewatch_core::model::LinkEntry],
) -> Vec<String> {
    if links.is_empty() {
        return Vec::new();
    }
    let mut lines = vec![format!("{site_id}: {site_name}")];
    lines.extend(links.iter().flat_map(link_lines));
    lines
}

fn failure_lines(site_id: i64, site_name: &str, message: &str) -> Vec<String> {
    vec![format!("error on {site_id}: {site_name}"), message.to_string()]
}

fn progress_bar(enabled: bool, total: u64) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{pos}/{len}] checked {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}
