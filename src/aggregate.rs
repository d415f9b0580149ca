//! Reduction of repeated trials into one representative result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{BenchError, Result};
use crate::invoker::Measurement;

/// Default number of leading trials discarded as warm-up.
pub const DEFAULT_WARMUP_RUNS: usize = 1;

/// What a run set compares: binary × project revision × command.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigurationKey {
    pub binary: String,
    pub revision: Option<String>,
    pub command: String,
}

impl fmt::Display for ConfigurationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.revision {
            Some(rev) => write!(f, "{} @ {} ({})", self.binary, rev, self.command),
            None => write!(f, "{} ({})", self.binary, self.command),
        }
    }
}

/// Trials sharing one configuration key, in execution order.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSet {
    key: ConfigurationKey,
    runs: Vec<Measurement>,
}

impl RunSet {
    pub fn new(key: ConfigurationKey) -> Self {
        Self {
            key,
            runs: Vec::new(),
        }
    }

    pub fn push(&mut self, measurement: Measurement) {
        self.runs.push(measurement);
    }

    pub fn key(&self) -> &ConfigurationKey {
        &self.key
    }

    pub fn runs(&self) -> &[Measurement] {
        &self.runs
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

/// Statistically reduced measurement of a run set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub wall: f64,
    pub cpu: f64,
    pub system: f64,
    pub memory: u64,
    pub exit_status: i32,
    pub started_at: DateTime<Utc>,
    /// Number of post-warm-up trials that contributed.
    pub runs: usize,
}

/// Reduces `run_set` to one result.
///
/// The first `warmup_count` trials are dropped. Wall, CPU and system time are
/// the means of the rest; memory is that of the fastest remaining trial (the
/// earliest one on ties); exit status and start time come from the first
/// remaining trial.
pub fn aggregate(run_set: RunSet, warmup_count: usize) -> Result<AggregatedResult> {
    let runs = run_set.runs;
    if runs.len() <= warmup_count {
        return Err(BenchError::InsufficientData {
            len: runs.len(),
            warmup: warmup_count,
        });
    }

    let kept = &runs[warmup_count..];

    let fastest = kept
        .iter()
        .reduce(|best, m| if m.wall < best.wall { m } else { best })
        .ok_or(BenchError::InsufficientData {
            len: runs.len(),
            warmup: warmup_count,
        })?;
    let canonical = &kept[0];

    Ok(AggregatedResult {
        wall: mean(kept, |m| m.wall),
        cpu: mean(kept, |m| m.cpu),
        system: mean(kept, |m| m.system),
        memory: fastest.memory,
        exit_status: canonical.exit_status,
        started_at: canonical.started_at,
        runs: kept.len(),
    })
}

fn mean(runs: &[Measurement], field: impl Fn(&Measurement) -> f64) -> f64 {
    runs.iter().map(field).sum::<f64>() / runs.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn key() -> ConfigurationKey {
        ConfigurationKey {
            binary: "bazel".into(),
            revision: Some("abc123".into()),
            command: "build".into(),
        }
    }

    fn m(secs: i64, wall: f64, cpu: f64, system: f64, memory: u64, exit_status: i32) -> Measurement {
        Measurement {
            wall,
            cpu,
            system,
            memory,
            exit_status,
            started_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        }
    }

    fn run_set(runs: Vec<Measurement>) -> RunSet {
        let mut set = RunSet::new(key());
        for r in runs {
            set.push(r);
        }
        set
    }

    fn sample_runs() -> Vec<Measurement> {
        vec![
            m(0, 100.0, 90.0, 30.0, 2000, 0),
            m(1, 12.0, 10.0, 2.0, 500, 1),
            m(2, 10.0, 8.0, 4.0, 450, 0),
            m(3, 14.0, 12.0, 6.0, 400, 0),
            m(4, 12.0, 10.0, 8.0, 480, 0),
        ]
    }

    #[test]
    fn test_warmup_excluded_from_means() {
        let result = aggregate(run_set(sample_runs()), 1).unwrap();

        assert!((result.wall - 12.0).abs() < 1e-9);
        assert!((result.cpu - 10.0).abs() < 1e-9);
        assert!((result.system - 5.0).abs() < 1e-9);
        assert_eq!(result.runs, 4);
    }

    #[test]
    fn test_memory_from_fastest_run() {
        let result = aggregate(run_set(sample_runs()), 1).unwrap();
        assert_eq!(result.memory, 450);
    }

    #[test]
    fn test_fastest_tie_keeps_earliest() {
        let runs = vec![m(0, 5.0, 1.0, 1.0, 10, 0), m(1, 5.0, 1.0, 1.0, 20, 0)];
        assert_eq!(aggregate(run_set(runs), 0).unwrap().memory, 10);
    }

    #[test]
    fn test_canonical_run_is_first_after_warmup() {
        let result = aggregate(run_set(sample_runs()), 1).unwrap();
        assert_eq!(result.exit_status, 1);
        assert_eq!(result.started_at, Utc.timestamp_opt(1_700_000_001, 0).unwrap());
    }

    #[test]
    fn test_aggregation_is_deterministic() {
        let first = aggregate(run_set(sample_runs()), 1).unwrap();
        for _ in 0..5 {
            assert_eq!(aggregate(run_set(sample_runs()), 1).unwrap(), first);
        }
    }

    #[test]
    fn test_single_remaining_run() {
        let runs = vec![m(0, 50.0, 1.0, 1.0, 900, 0), m(1, 20.0, 3.0, 2.0, 300, 2)];
        let result = aggregate(run_set(runs), 1).unwrap();

        assert_eq!(result.wall, 20.0);
        assert_eq!(result.cpu, 3.0);
        assert_eq!(result.system, 2.0);
        assert_eq!(result.memory, 300);
        assert_eq!(result.exit_status, 2);
        assert_eq!(result.runs, 1);
    }

    #[test]
    fn test_insufficient_data() {
        for (len, warmup) in [(0, 0), (0, 1), (1, 1), (3, 3), (2, 5)] {
            let runs = sample_runs().into_iter().take(len).collect();
            let err = aggregate(run_set(runs), warmup).unwrap_err();
            assert!(
                matches!(err, BenchError::InsufficientData { len: l, warmup: w } if l == len && w == warmup)
            );
        }
    }

    #[test]
    fn test_key_display() {
        assert_eq!(key().to_string(), "bazel @ abc123 (build)");
    }
}
