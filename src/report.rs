//! Result records and their rendering.
//!
//! A `Report` holds one entry per configuration: the aggregate, the raw
//! per-run rows and the metadata describing where the runs happened.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as FmtWrite;
use std::fs;

use crate::aggregate::{AggregatedResult, ConfigurationKey};
use crate::cli::OutputFormat;
use crate::invoker::Measurement;

/// One raw trial in export shape. `cpu` is user plus system time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub run: usize,
    pub wall: f64,
    pub cpu: f64,
    pub cpu_user: f64,
    pub cpu_system: f64,
    pub memory: u64,
    pub exit_status: i32,
    pub started_at: DateTime<Utc>,
}

impl ResultRow {
    /// Builds the row for trial number `run` (1-based).
    pub fn new(run: usize, m: &Measurement) -> Self {
        Self {
            run,
            wall: m.wall,
            cpu: m.cpu + m.system,
            cpu_user: m.cpu,
            cpu_system: m.system,
            memory: m.memory,
            exit_status: m.exit_status,
            started_at: m.started_at,
        }
    }
}

/// Context merged into every exported result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub hostname: String,
    pub username: String,
    pub command: String,
    pub options: String,
}

impl RunMetadata {
    pub fn collect(command: &str, args: &[String]) -> Self {
        Self {
            hostname: hostname(),
            username: std::env::var("USER")
                .or_else(|_| std::env::var("LOGNAME"))
                .unwrap_or_else(|_| "unknown".to_string()),
            command: command.to_string(),
            options: args.join(" "),
        }
    }
}

fn hostname() -> String {
    fs::read_to_string("/proc/sys/kernel/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "unknown".to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub binary: String,
    pub revision: Option<String>,
    pub warmup_runs: usize,
    pub metadata: RunMetadata,
    /// `None` when aggregation failed for this configuration.
    pub aggregate: Option<AggregatedResult>,
    pub runs: Vec<ResultRow>,
}

impl ReportEntry {
    pub fn new(
        key: &ConfigurationKey,
        metadata: RunMetadata,
        warmup_runs: usize,
        runs: &[Measurement],
        aggregate: Option<AggregatedResult>,
    ) -> Self {
        Self {
            binary: key.binary.clone(),
            revision: key.revision.clone(),
            warmup_runs,
            metadata,
            aggregate,
            runs: runs
                .iter()
                .enumerate()
                .map(|(idx, m)| ResultRow::new(idx + 1, m))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub results: Vec<ReportEntry>,
}

impl Report {
    pub fn render(&self, format: OutputFormat) -> Result<String, Box<dyn std::error::Error>> {
        Ok(match format {
            OutputFormat::Table => self.render_table(),
            OutputFormat::Json => serde_json::to_string_pretty(self)?,
            OutputFormat::Yaml => serde_yaml::to_string(self)?,
            OutputFormat::Toml => toml::to_string_pretty(self)?,
        })
    }

    /// Plain-text summary, one line per configuration.
    pub fn render_table(&self) -> String {
        let left_col = 32usize;
        let col_w = 10usize;
        let mut out = String::new();

        writeln!(
            out,
            "{:left$} | {:>col$} | {:>col$} | {:>col$} | {:>col$} | {:>col$} | {:>col$}",
            "binary",
            "runs",
            "wall (s)",
            "cpu (s)",
            "system (s)",
            "memory MB",
            "exit",
            left = left_col,
            col = col_w
        )
        .ok();
        writeln!(out, "{}", "-".repeat(left_col + (col_w + 3) * 6)).ok();

        for entry in &self.results {
            let line = match &entry.aggregate {
                Some(agg) => format!(
                    "{:left$} | {:>col$} | {:>col$} | {:>col$} | {:>col$} | {:>col$} | {:>col$}",
                    entry.binary,
                    agg.runs,
                    format!("{:.2}", agg.wall),
                    format!("{:.2}", agg.cpu),
                    format!("{:.2}", agg.system),
                    agg.memory,
                    agg.exit_status,
                    left = left_col,
                    col = col_w
                ),
                None => format!(
                    "{:left$} | {:>col$} | insufficient data",
                    entry.binary,
                    entry.runs.len(),
                    left = left_col,
                    col = col_w
                ),
            };
            writeln!(out, "{}", line).ok();
        }

        if let Some(first) = self.results.first() {
            writeln!(out).ok();
            writeln!(
                out,
                "command: {} {}  host: {}",
                first.metadata.command, first.metadata.options, first.metadata.hostname
            )
            .ok();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn measurement(wall: f64, cpu: f64, system: f64) -> Measurement {
        Measurement {
            wall,
            cpu,
            system,
            memory: 512,
            exit_status: 0,
            started_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    fn report() -> Report {
        let key = ConfigurationKey {
            binary: "/opt/bazel-7".into(),
            revision: Some("deadbeef".into()),
            command: "build".into(),
        };
        let metadata = RunMetadata {
            hostname: "builder-1".into(),
            username: "ci".into(),
            command: "build".into(),
            options: "//pkg:target".into(),
        };
        let runs = vec![measurement(30.0, 20.0, 5.0), measurement(20.0, 15.0, 4.0)];
        let agg = AggregatedResult {
            wall: 20.0,
            cpu: 15.0,
            system: 4.0,
            memory: 512,
            exit_status: 0,
            started_at: runs[1].started_at,
            runs: 1,
        };
        Report {
            results: vec![ReportEntry::new(&key, metadata, 1, &runs, Some(agg))],
        }
    }

    #[test]
    fn test_result_row_splits_cpu() {
        let row = ResultRow::new(2, &measurement(41.5, 26.3, 13.3));
        assert_eq!(row.run, 2);
        assert!((row.cpu - 39.6).abs() < 1e-9);
        assert_eq!(row.cpu_user, 26.3);
        assert_eq!(row.cpu_system, 13.3);
    }

    #[test]
    fn test_entry_numbers_runs_from_one() {
        let r = report();
        let runs: Vec<usize> = r.results[0].runs.iter().map(|row| row.run).collect();
        assert_eq!(runs, vec![1, 2]);
    }

    #[test]
    fn test_render_table() {
        let table = report().render_table();
        assert!(table.contains("/opt/bazel-7"));
        assert!(table.contains("20.00"));
        assert!(table.contains("512"));
        assert!(table.contains("command: build //pkg:target"));
    }

    #[test]
    fn test_render_table_without_aggregate() {
        let mut r = report();
        r.results[0].aggregate = None;

        let table = r.render_table();
        let row = table.lines().nth(2).unwrap();
        assert!(row.starts_with("/opt/bazel-7"));
        assert!(row.ends_with("| insufficient data"));
    }

    #[test]
    fn test_render_structured_formats() {
        let r = report();

        let json = r.render(OutputFormat::Json).unwrap();
        let back: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);

        let yaml = r.render(OutputFormat::Yaml).unwrap();
        assert!(yaml.contains("cpu_user"));

        let toml = r.render(OutputFormat::Toml).unwrap();
        assert!(toml.contains("[[results]]"));
    }

    #[test]
    fn test_metadata_collect() {
        let meta = RunMetadata::collect("build", &["//a:b".to_string(), "-c".to_string()]);
        assert_eq!(meta.options, "//a:b -c");
        assert!(!meta.hostname.is_empty());
        assert!(!meta.username.is_empty());
    }
}
