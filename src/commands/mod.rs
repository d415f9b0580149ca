//! CLI command implementations for bench-rt.
//!
//! This module provides implementations for all CLI subcommands:
//! - `run`: Benchmark the configured binaries
//! - `check`: System and server resolution validation
//! - `config`: Configuration file generation

pub mod check;
pub mod config;
pub mod run;

// Re-export command functions
pub use check::command_check;
pub use config::command_config;
pub use run::{command_run, run_benchmarks};
