//! Running and measuring a single build-tool command.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::error::{BenchError, Result};
use crate::process::{ProcessHandle, ProcessIdentity, TimingSample};
use crate::sampler::MemorySampler;

/// Result of one command invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Wall-clock seconds.
    pub wall: f64,
    /// User CPU seconds of the server process.
    pub cpu: f64,
    /// System CPU seconds of the server process.
    pub system: f64,
    /// Peak resident memory in MB.
    pub memory: u64,
    pub exit_status: i32,
    pub started_at: DateTime<Utc>,
}

impl Measurement {
    /// Derives a measurement from the samples taken around one command.
    pub fn from_samples(
        before: &TimingSample,
        after: &TimingSample,
        memory: u64,
        exit_status: i32,
        started_at: DateTime<Utc>,
    ) -> Self {
        let (wall, cpu, system) = after.since(before);
        Self {
            wall,
            cpu,
            system,
            memory,
            exit_status,
            started_at,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_status == 0
    }
}

/// Launches the build tool and measures its server process.
///
/// One `Invoker` is one session: the server identity is resolved on the first
/// command and reused for every later one. Create a new `Invoker` when the
/// server may have changed, e.g. after switching binaries.
pub struct Invoker {
    binary: String,
    handle: Arc<ProcessHandle>,
    sampler: MemorySampler,
    output_log: Option<PathBuf>,
    epoch: Instant,
}

impl Invoker {
    pub fn new(binary: impl Into<String>, handle: ProcessHandle) -> Self {
        Self {
            binary: binary.into(),
            handle: Arc::new(handle),
            sampler: MemorySampler::default(),
            output_log: None,
            epoch: Instant::now(),
        }
    }

    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sampler = MemorySampler::new(interval);
        self
    }

    /// Appends the child's stdout and stderr to `path` instead of discarding them.
    pub fn with_output_log(mut self, path: PathBuf) -> Self {
        self.output_log = Some(path);
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Resolves the server process (first call only).
    ///
    /// The lookup may run the build tool itself, so it is moved off the async
    /// workers.
    pub async fn identity(&self) -> Result<ProcessIdentity> {
        let handle = self.handle.clone();
        tokio::task::spawn_blocking(move || handle.resolve_identity())
            .await
            .map_err(|e| BenchError::Resolution(format!("lookup task failed: {}", e)))?
    }

    /// Timing sample that survives the server exiting: the wall clock is
    /// always read, and the CPU counters of `carried` are reused.
    fn timing_sample_or_carry(
        &self,
        identity: ProcessIdentity,
        carried: Option<&TimingSample>,
    ) -> Result<TimingSample> {
        match self.handle.timing_sample(identity, self.epoch) {
            Ok(sample) => Ok(sample),
            Err(e) if e.is_process_gone() => {
                warn!(
                    "Server pid {} is gone, reusing last CPU counters for {}",
                    identity.pid, self.binary
                );
                let carried = carried.copied().unwrap_or_default();
                Ok(TimingSample {
                    wall_clock: self.epoch.elapsed().as_secs_f64(),
                    ..carried
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Runs `binary name args...` once and measures it.
    ///
    /// A non-zero exit is recorded in `exit_status`; only a failure to resolve
    /// the server or to spawn the child is returned as an error. If the server
    /// exits during the command, its CPU time stops at the last reading.
    #[instrument(skip(self, args), fields(binary = %self.binary))]
    pub async fn command(&mut self, name: &str, args: &[String]) -> Result<Measurement> {
        let started_at = Utc::now();
        let identity = self.identity().await?;

        let before = self.timing_sample_or_carry(identity, None)?;
        let sampling = self.sampler.start(self.handle.clone(), identity);

        let status = match self.run_child(name, args).await {
            Ok(status) => status,
            Err(e) => {
                sampling.stop().await;
                return Err(e);
            }
        };

        let memory = sampling.stop().await;
        let after = self.timing_sample_or_carry(identity, Some(&before))?;

        let exit_status = exit_code(status);
        let measurement = Measurement::from_samples(&before, &after, memory, exit_status, started_at);
        if measurement.succeeded() {
            info!(
                "{} {} finished in {:.2}s (cpu {:.2}s, system {:.2}s, {} MB)",
                self.binary, name, measurement.wall, measurement.cpu, measurement.system, memory
            );
        } else {
            warn!(
                "{} {} exited with status {} after {:.2}s",
                self.binary, name, exit_status, measurement.wall
            );
        }
        Ok(measurement)
    }

    async fn run_child(&self, name: &str, args: &[String]) -> Result<ExitStatus> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg(name).args(args).stdin(Stdio::null());

        match &self.output_log {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| BenchError::Io {
                        path: path.clone(),
                        source: e,
                    })?;
                let stderr = file.try_clone().map_err(|e| BenchError::Io {
                    path: path.clone(),
                    source: e,
                })?;
                cmd.stdout(Stdio::from(file)).stderr(Stdio::from(stderr));
            }
            None => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        debug!("Spawning {} {} {}", self.binary, name, args.join(" "));
        let mut child = cmd.spawn().map_err(|e| BenchError::Spawn {
            program: self.binary.clone(),
            source: e,
        })?;

        child.wait().await.map_err(|e| BenchError::Spawn {
            program: self.binary.clone(),
            source: e,
        })
    }
}

/// Exit code of the child; signal deaths map to 128 + signal number.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}
