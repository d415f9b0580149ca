//! Run command implementation.
//!
//! Benchmarks every configured binary: one session per binary, `runs` trials
//! each, reduced to one aggregate per configuration.

use anyhow::{Context, Result};
use std::fs;
use std::sync::Arc;
use tracing::{info, warn};

use crate::aggregate::{aggregate, ConfigurationKey, RunSet};
use crate::config::Config;
use crate::invoker::Invoker;
use crate::process::{ProcessBackend, ProcessHandle};
use crate::report::{Report, ReportEntry, RunMetadata};
use crate::system::default_backend;

/// Runs the benchmark and writes the report to stdout or the output file.
pub async fn command_run(config: &Config) -> Result<()> {
    let report = run_benchmarks(config, default_backend()).await?;

    let content = report
        .render(config.output_format())
        .map_err(|e| anyhow::anyhow!("Failed to render report: {}", e))?;

    match &config.output_file {
        Some(path) => {
            fs::write(path, content)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            info!("Report written to {}", path.display());
        }
        None => print!("{}", content),
    }
    Ok(())
}

/// Runs all trials for every configured binary using `backend`.
pub async fn run_benchmarks(config: &Config, backend: Arc<dyn ProcessBackend>) -> Result<Report> {
    let command = config.command();
    let args = config.args();
    let runs = config.runs();
    let warmup = config.warmup_runs();
    let metadata = RunMetadata::collect(command, args);

    let mut report = Report::default();

    for binary in config.binaries() {
        let key = ConfigurationKey {
            binary: binary.clone(),
            revision: config.project_revision.clone(),
            command: command.to_string(),
        };

        // A fresh handle per binary: the server process changes with the binary.
        let handle = ProcessHandle::new(backend.clone(), config.server_lookup(&binary));
        let mut invoker = Invoker::new(binary.clone(), handle).with_sample_interval(config.sample_interval());
        if let Some(path) = &config.output_log {
            invoker = invoker.with_output_log(path.clone());
        }

        invoker
            .identity()
            .await
            .with_context(|| format!("Cannot measure {}", key))?;

        let mut run_set = RunSet::new(key.clone());
        for run in 1..=runs {
            info!("Starting run {}/{} of {}", run, runs, key);
            let measurement = invoker
                .command(command, args)
                .await
                .with_context(|| format!("Run {} of {} failed", run, key))?;
            run_set.push(measurement);
        }

        let raw = run_set.runs().to_vec();
        let summary = match aggregate(run_set, warmup) {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!("No aggregate for {}: {}", key, e);
                None
            }
        };

        report
            .results
            .push(ReportEntry::new(&key, metadata.clone(), warmup, &raw, summary));
    }

    Ok(report)
}
