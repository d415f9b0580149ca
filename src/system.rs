//! Process accounting from the /proc filesystem.
//!
//! This module provides the Linux `ProcessBackend`: CPU times come from
//! `/proc/<pid>/stat`, resident memory from `/proc/<pid>/status` and name
//! lookups scan `/proc/*/comm`.

use once_cell::sync::Lazy;
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use tracing::debug;

use crate::error::{BenchError, Result};
use crate::process::{CpuTimes, ProcessBackend, ServerLookup};

/// Clock ticks per second used by the kernel for utime/stime.
static CLOCK_TICKS: Lazy<f64> = Lazy::new(|| {
    // SAFETY: sysconf has no preconditions.
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks > 0 {
        ticks as f64
    } else {
        100.0
    }
});

/// Returns the backend for the current platform.
pub fn default_backend() -> Arc<dyn ProcessBackend> {
    if cfg!(target_os = "linux") {
        Arc::new(ProcFs::new())
    } else {
        Arc::new(Unsupported)
    }
}

/// `ProcessBackend` reading a procfs mount.
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcFs {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Uses a different procfs root, e.g. a fixture directory.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn pid_file(&self, pid: u32, name: &str) -> PathBuf {
        self.root.join(pid.to_string()).join(name)
    }

    fn read_pid_file(&self, pid: u32, name: &str) -> Result<String> {
        let path = self.pid_file(pid, name);
        fs::read_to_string(&path).map_err(|e| {
            if is_gone(&e) {
                BenchError::ProcessGone(pid)
            } else {
                BenchError::Io { path, source: e }
            }
        })
    }

    fn find_by_name(&self, name: &str) -> Result<u32> {
        let entries = fs::read_dir(&self.root).map_err(|e| BenchError::Io {
            path: self.root.clone(),
            source: e,
        })?;

        let mut pids: Vec<(u32, PathBuf)> = entries
            .flatten()
            .filter_map(|entry| {
                let p = entry.path();
                let pid = p.file_name()?.to_str()?.parse::<u32>().ok()?;
                Some((pid, p))
            })
            .collect();
        pids.sort_unstable_by_key(|(pid, _)| *pid);
        debug!("Scanning {} process entries for '{}'", pids.len(), name);

        pids.par_iter()
            .find_map_first(|(pid, path)| {
                (read_process_name(path).as_deref() == Some(name)).then_some(*pid)
            })
            .ok_or_else(|| BenchError::Resolution(format!("no running process named '{}'", name)))
    }

    fn query_pid(&self, program: &str, args: &[String]) -> Result<u32> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|e| {
                BenchError::Resolution(format!("failed to run '{} {}': {}", program, args.join(" "), e))
            })?;

        if !output.status.success() {
            return Err(BenchError::Resolution(format!(
                "'{} {}' exited with {}",
                program,
                args.join(" "),
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let pid = parse_pid_output(&stdout).ok_or_else(|| {
            BenchError::Resolution(format!("unexpected pid output '{}'", stdout.trim()))
        })?;
        self.ensure_running(pid)
    }

    fn ensure_running(&self, pid: u32) -> Result<u32> {
        if self.root.join(pid.to_string()).is_dir() {
            Ok(pid)
        } else {
            Err(BenchError::Resolution(format!("process {} is not running", pid)))
        }
    }
}

impl ProcessBackend for ProcFs {
    fn lookup(&self, label: &ServerLookup) -> Result<u32> {
        match label {
            ServerLookup::Name(name) => self.find_by_name(name),
            ServerLookup::Query { program, args } => self.query_pid(program, args),
            ServerLookup::Pid(pid) => self.ensure_running(*pid),
        }
    }

    fn cpu_times(&self, pid: u32) -> Result<CpuTimes> {
        let content = self.read_pid_file(pid, "stat")?;
        let (utime, stime) = parse_stat_cpu_ticks(&content).ok_or_else(|| BenchError::Parse {
            path: self.pid_file(pid, "stat"),
            reason: "missing utime/stime fields".to_string(),
        })?;

        Ok(CpuTimes {
            user: utime as f64 / *CLOCK_TICKS,
            system: stime as f64 / *CLOCK_TICKS,
        })
    }

    fn resident_memory_bytes(&self, pid: u32) -> Result<u64> {
        let content = self.read_pid_file(pid, "status")?;
        // Zombies keep their status file but drop the VmRSS line.
        parse_status_rss_kb(&content)
            .map(|kb| kb * 1024)
            .ok_or(BenchError::ProcessGone(pid))
    }
}

/// Backend for platforms without a process accounting implementation.
#[derive(Debug, Clone, Copy)]
pub struct Unsupported;

impl ProcessBackend for Unsupported {
    fn lookup(&self, label: &ServerLookup) -> Result<u32> {
        Err(BenchError::Resolution(format!(
            "cannot resolve {}: process accounting is not supported on {}",
            label,
            std::env::consts::OS
        )))
    }

    fn cpu_times(&self, pid: u32) -> Result<CpuTimes> {
        Err(BenchError::ProcessGone(pid))
    }

    fn resident_memory_bytes(&self, pid: u32) -> Result<u64> {
        Err(BenchError::ProcessGone(pid))
    }
}

fn is_gone(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::NotFound || e.raw_os_error() == Some(libc::ESRCH)
}

/// Reads process name from comm file or extracts from cmdline
fn read_process_name(proc_path: &Path) -> Option<String> {
    if let Ok(s) = fs::read_to_string(proc_path.join("comm")) {
        let t = s.trim();
        if !t.is_empty() {
            return Some(t.into());
        }
    }

    let content = fs::read(proc_path.join("cmdline")).ok()?;
    let first = content.split(|&b| b == 0u8).next()?;
    let first = std::str::from_utf8(first).ok()?;
    Path::new(first)
        .file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.to_string())
}

/// Extracts (utime, stime) in clock ticks from /proc/<pid>/stat content.
///
/// The command name in field 2 may contain spaces and parentheses, so fields
/// are counted from the last ')'.
fn parse_stat_cpu_ticks(content: &str) -> Option<(u64, u64)> {
    let rest = &content[content.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    // fields[0] is the state (field 3); utime and stime are fields 14 and 15.
    let utime = fields.get(11)?.parse().ok()?;
    let stime = fields.get(12)?.parse().ok()?;
    Some((utime, stime))
}

/// Extracts VmRSS in KB from /proc/<pid>/status content.
fn parse_status_rss_kb(content: &str) -> Option<u64> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|v| v.split_whitespace().next())
        .and_then(|v| v.parse().ok())
}

fn parse_pid_output(stdout: &str) -> Option<u32> {
    stdout.lines().rev().map(str::trim).find(|l| !l.is_empty())?.parse().ok()
}
