//! bench-rt: measure wall time, CPU time and peak memory of build-tool commands.
//!
//! The measurement core is `Invoker` (one trial), `MemorySampler` (peak
//! memory while the trial runs), `ProcessHandle` (cached server identity and
//! counter access) and `aggregate` (reduction of repeated trials).

pub mod aggregate;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod invoker;
pub mod process;
pub mod report;
pub mod sampler;
pub mod system;

pub use aggregate::{aggregate, AggregatedResult, ConfigurationKey, RunSet};
pub use error::{BenchError, Result};
pub use invoker::{Invoker, Measurement};
pub use process::{CpuTimes, ProcessBackend, ProcessHandle, ProcessIdentity, ServerLookup, TimingSample};
pub use sampler::MemorySampler;
pub use system::{default_backend, ProcFs};
