//! Process identity and per-process counter access.
//!
//! `ProcessHandle` owns the identity of the build tool's long-running server
//! process. The identity is resolved lazily on first use and then cached for
//! the lifetime of the handle, so one handle corresponds to one session of the
//! tool. Reading the counters is delegated to a `ProcessBackend`, which hides
//! the OS-specific introspection (see `system.rs` for the /proc backend).

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::error::Result;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Identity of one running OS process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessIdentity {
    pub pid: u32,
}

/// Accumulated CPU seconds of a process.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CpuTimes {
    pub user: f64,
    pub system: f64,
}

/// How to find the server process backing the build tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerLookup {
    /// First process whose command name equals this value.
    Name(String),
    /// Run a program and read the PID from its stdout (e.g. `bazel info server_pid`).
    Query { program: String, args: Vec<String> },
    /// A fixed PID.
    Pid(u32),
}

impl ServerLookup {
    /// The `<binary> info server_pid` query used by Bazel.
    pub fn bazel_server_pid(binary: impl Into<String>) -> Self {
        ServerLookup::Query {
            program: binary.into(),
            args: vec!["info".to_string(), "server_pid".to_string()],
        }
    }
}

impl fmt::Display for ServerLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerLookup::Name(name) => write!(f, "process named '{}'", name),
            ServerLookup::Query { program, args } => {
                write!(f, "pid reported by '{} {}'", program, args.join(" "))
            }
            ServerLookup::Pid(pid) => write!(f, "pid {}", pid),
        }
    }
}

/// OS-specific access to process accounting.
///
/// `cpu_times` and `resident_memory_bytes` must fail with
/// `BenchError::ProcessGone` once the process has exited.
pub trait ProcessBackend: Send + Sync {
    /// Finds the PID described by `label`. Fails with `BenchError::Resolution`.
    fn lookup(&self, label: &ServerLookup) -> Result<u32>;

    fn cpu_times(&self, pid: u32) -> Result<CpuTimes>;

    fn resident_memory_bytes(&self, pid: u32) -> Result<u64>;
}

/// Instantaneous wall-clock and CPU-time reading for one process.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimingSample {
    /// Seconds elapsed on a monotonic clock since the session epoch.
    pub wall_clock: f64,
    pub cpu_user: f64,
    pub cpu_system: f64,
}

impl TimingSample {
    /// Returns `(wall, cpu_user, cpu_system)` elapsed between `before` and `self`.
    /// Each delta is clamped at zero.
    pub fn since(&self, before: &TimingSample) -> (f64, f64, f64) {
        (
            (self.wall_clock - before.wall_clock).max(0.0),
            (self.cpu_user - before.cpu_user).max(0.0),
            (self.cpu_system - before.cpu_system).max(0.0),
        )
    }
}

/// Handle to the build tool's server process with a cached identity.
pub struct ProcessHandle {
    backend: Arc<dyn ProcessBackend>,
    label: ServerLookup,
    identity: OnceCell<ProcessIdentity>,
}

impl ProcessHandle {
    pub fn new(backend: Arc<dyn ProcessBackend>, label: ServerLookup) -> Self {
        Self {
            backend,
            label,
            identity: OnceCell::new(),
        }
    }

    pub fn label(&self) -> &ServerLookup {
        &self.label
    }

    /// Resolves the server process once and returns the cached identity afterwards.
    /// The first call blocks while the backend looks the process up.
    pub fn resolve_identity(&self) -> Result<ProcessIdentity> {
        self.identity
            .get_or_try_init(|| {
                let pid = self.backend.lookup(&self.label)?;
                info!("Resolved {} to pid {}", self.label, pid);
                Ok(ProcessIdentity { pid })
            })
            .copied()
    }

    pub fn read_cpu_times(&self, identity: ProcessIdentity) -> Result<CpuTimes> {
        self.backend.cpu_times(identity.pid)
    }

    /// Current resident memory, rounded down to whole megabytes.
    pub fn read_memory(&self, identity: ProcessIdentity) -> Result<u64> {
        let bytes = self.backend.resident_memory_bytes(identity.pid)?;
        Ok(bytes / BYTES_PER_MB)
    }

    /// Reads CPU counters and the wall clock back to back.
    pub fn timing_sample(&self, identity: ProcessIdentity, epoch: Instant) -> Result<TimingSample> {
        let cpu = self.read_cpu_times(identity)?;
        let wall_clock = epoch.elapsed().as_secs_f64();
        debug!(
            "Timing sample for pid {}: wall={:.3}s user={:.2}s system={:.2}s",
            identity.pid, wall_clock, cpu.user, cpu.system
        );
        Ok(TimingSample {
            wall_clock,
            cpu_user: cpu.user,
            cpu_system: cpu.system,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeBackend;
    use super::*;
    use crate::error::BenchError;

    #[test]
    fn test_identity_resolved_once() {
        let backend = Arc::new(FakeBackend::with_pid(123));
        let handle = ProcessHandle::new(backend.clone(), ServerLookup::Name("java".into()));

        for _ in 0..10 {
            assert_eq!(handle.resolve_identity().unwrap(), ProcessIdentity { pid: 123 });
        }
        assert_eq!(backend.lookup_count(), 1);
    }

    #[test]
    fn test_resolution_failure_is_reported() {
        let backend = Arc::new(FakeBackend::default());
        let handle = ProcessHandle::new(backend, ServerLookup::Pid(42));

        let err = handle.resolve_identity().unwrap_err();
        assert!(matches!(err, BenchError::Resolution(_)));
    }

    #[test]
    fn test_read_memory_rounds_down_to_megabytes() {
        struct Fixed;
        impl ProcessBackend for Fixed {
            fn lookup(&self, _: &ServerLookup) -> Result<u32> {
                Ok(1)
            }
            fn cpu_times(&self, _: u32) -> Result<CpuTimes> {
                Ok(CpuTimes::default())
            }
            fn resident_memory_bytes(&self, _: u32) -> Result<u64> {
                Ok(280 * BYTES_PER_MB + BYTES_PER_MB - 1)
            }
        }

        let handle = ProcessHandle::new(Arc::new(Fixed), ServerLookup::Pid(1));
        let id = handle.resolve_identity().unwrap();
        assert_eq!(handle.read_memory(id).unwrap(), 280);
    }

    #[test]
    fn test_timing_sample_reads_cpu_counters() {
        let backend = Arc::new(FakeBackend::with_pid(123));
        backend.push_cpu(47.11, 23.42);
        let handle = ProcessHandle::new(backend, ServerLookup::Pid(123));
        let id = handle.resolve_identity().unwrap();

        let epoch = Instant::now();
        let sample = handle.timing_sample(id, epoch).unwrap();
        assert_eq!(sample.cpu_user, 47.11);
        assert_eq!(sample.cpu_system, 23.42);
        assert!(sample.wall_clock >= 0.0);

        let later = handle.timing_sample(id, epoch).unwrap();
        assert!(later.wall_clock >= sample.wall_clock);
    }

    #[test]
    fn test_deltas_never_negative() {
        let before = TimingSample {
            wall_clock: 10.0,
            cpu_user: 5.0,
            cpu_system: 2.0,
        };
        let after = TimingSample {
            wall_clock: 10.0,
            cpu_user: 4.9,
            cpu_system: 2.5,
        };
        let (wall, user, system) = after.since(&before);
        assert_eq!(wall, 0.0);
        assert_eq!(user, 0.0);
        assert!((system - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_server_lookup_display() {
        assert_eq!(
            ServerLookup::bazel_server_pid("bazel").to_string(),
            "pid reported by 'bazel info server_pid'"
        );
        assert_eq!(ServerLookup::Pid(7).to_string(), "pid 7");
    }
}
