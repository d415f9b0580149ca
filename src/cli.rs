//! CLI arguments and subcommands for bench-rt.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Log level options for CLI parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as ValueEnum>::from_str(s, true)
    }
}

/// Configuration format options for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Result output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Table,
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "bench-rt",
    about = "Benchmark wall time, CPU time and peak memory of build-tool commands",
    long_about = "Benchmark wall time, CPU time and peak memory of build-tool commands.\n\n\
                  Runs a build-tool command repeatedly, samples the memory of the tool's \
                  server process while it runs, and reports the averaged timings per binary.",
    version,
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Build-tool binary to benchmark (repeat to compare several)
    #[arg(short = 'b', long)]
    pub binary: Vec<String>,

    /// Build-tool command to run, e.g. build or test
    #[arg(long)]
    pub bench_command: Option<String>,

    /// Argument passed after the command (repeatable), e.g. //pkg:target
    #[arg(short = 'a', long = "arg", allow_hyphen_values = true)]
    pub targets: Vec<String>,

    /// Revision of the benchmarked project recorded with the results
    #[arg(long)]
    pub project_revision: Option<String>,

    /// Number of trials per binary
    #[arg(short = 'n', long)]
    pub runs: Option<usize>,

    /// Number of leading trials discarded from the aggregate
    #[arg(long)]
    pub warmup: Option<usize>,

    /// Memory sampling interval in milliseconds
    #[arg(long)]
    pub sample_interval_ms: Option<u64>,

    /// PID of the server process to measure
    #[arg(long)]
    pub server_pid: Option<u32>,

    /// Name of the server process to measure
    #[arg(long)]
    pub server_name: Option<String>,

    /// Append the build tool's stdout/stderr to this file
    #[arg(long)]
    pub output_log: Option<PathBuf>,

    /// Result output format
    #[arg(short = 'f', long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Write results to this file instead of stdout
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Log level
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the benchmark (default)
    Run,

    /// Validate system requirements and server process resolution
    Check {
        /// Check /proc filesystem access
        #[arg(long)]
        proc: bool,

        /// Check that the server process can be resolved
        #[arg(long)]
        server: bool,

        /// Check all requirements
        #[arg(long)]
        all: bool,
    },

    /// Generate configuration files
    Config {
        /// Output file path
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },
}
