//! Configuration loading, precedence and validation.
//!
//! Configuration is read from a YAML, JSON or TOML file and then overridden
//! by command-line flags. Every field is optional so that a partial file only
//! changes what it names.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::aggregate::DEFAULT_WARMUP_RUNS;
use crate::cli::{Args, LogLevel, OutputFormat};
use crate::process::ServerLookup;

pub const DEFAULT_BINARY: &str = "bazel";
pub const DEFAULT_COMMAND: &str = "build";
pub const DEFAULT_RUNS: usize = 5;
pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 50;

const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "/etc/bench-rt/bench-rt.yaml",
    "/etc/bench-rt/bench-rt.yml",
    "/etc/bench-rt/bench-rt.json",
    "./bench-rt.yaml",
    "./bench-rt.yml",
    "./bench-rt.json",
    "./bench-rt.toml",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // What to run
    /// Build-tool binaries to compare; each gets its own session.
    pub binaries: Option<Vec<String>>,
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
    /// Revision of the benchmarked project, recorded with each result.
    pub project_revision: Option<String>,

    // Trials
    pub runs: Option<usize>,
    #[serde(alias = "warmup")]
    pub warmup_runs: Option<usize>,
    pub sample_interval_ms: Option<u64>,

    // Server lookup: pid > name > query
    pub server_pid: Option<u32>,
    pub server_name: Option<String>,
    /// Arguments passed to the binary to print the server PID.
    pub server_query: Option<Vec<String>>,

    // Output
    pub output_log: Option<PathBuf>,
    pub output_format: Option<OutputFormat>,
    pub output_file: Option<PathBuf>,

    // Logging
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            binaries: Some(vec![DEFAULT_BINARY.to_string()]),
            command: Some(DEFAULT_COMMAND.to_string()),
            args: Some(Vec::new()),
            project_revision: None,
            runs: Some(DEFAULT_RUNS),
            warmup_runs: Some(DEFAULT_WARMUP_RUNS),
            sample_interval_ms: Some(DEFAULT_SAMPLE_INTERVAL_MS),
            server_pid: None,
            server_name: None,
            server_query: Some(vec!["info".to_string(), "server_pid".to_string()]),
            output_log: None,
            output_format: Some(OutputFormat::Table),
            output_file: None,
            log_level: Some("info".into()),
        }
    }
}

impl Config {
    pub fn binaries(&self) -> Vec<String> {
        self.binaries
            .clone()
            .unwrap_or_else(|| vec![DEFAULT_BINARY.to_string()])
    }

    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or(DEFAULT_COMMAND)
    }

    pub fn args(&self) -> &[String] {
        self.args.as_deref().unwrap_or(&[])
    }

    pub fn runs(&self) -> usize {
        self.runs.unwrap_or(DEFAULT_RUNS)
    }

    pub fn warmup_runs(&self) -> usize {
        self.warmup_runs.unwrap_or(DEFAULT_WARMUP_RUNS)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms.unwrap_or(DEFAULT_SAMPLE_INTERVAL_MS))
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format.unwrap_or(OutputFormat::Table)
    }

    /// Server lookup for `binary`.
    pub fn server_lookup(&self, binary: &str) -> ServerLookup {
        if let Some(pid) = self.server_pid {
            return ServerLookup::Pid(pid);
        }
        if let Some(name) = &self.server_name {
            return ServerLookup::Name(name.clone());
        }
        match &self.server_query {
            Some(args) if !args.is_empty() => ServerLookup::Query {
                program: binary.to_string(),
                args: args.clone(),
            },
            _ => ServerLookup::bazel_server_pid(binary),
        }
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let binaries = cfg.binaries();
    if binaries.is_empty() || binaries.iter().any(|b| b.trim().is_empty()) {
        return Err("binaries must list at least one non-empty binary".into());
    }

    if cfg.command().trim().is_empty() {
        return Err("command must not be empty".into());
    }

    if cfg.runs() <= cfg.warmup_runs() {
        return Err(format!(
            "runs ({}) must be greater than warmup_runs ({})",
            cfg.runs(),
            cfg.warmup_runs()
        )
        .into());
    }

    if cfg.sample_interval_ms == Some(0) {
        return Err("sample_interval_ms must be greater than 0".into());
    }

    if let Some(name) = cfg.server_name.as_deref() {
        if name.trim().is_empty() {
            return Err("server_name must not be empty".into());
        }
    }

    if let Some(level) = cfg.log_level.as_deref() {
        if level.parse::<LogLevel>().is_err() {
            return Err(format!("Invalid log_level '{}'", level).into());
        }
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// Precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if !args.binary.is_empty() {
        config.binaries = Some(args.binary.clone());
    }
    if let Some(command) = &args.bench_command {
        config.command = Some(command.clone());
    }
    if !args.targets.is_empty() {
        config.args = Some(args.targets.clone());
    }
    if let Some(rev) = &args.project_revision {
        config.project_revision = Some(rev.clone());
    }

    if args.runs.is_some() {
        config.runs = args.runs;
    }
    if args.warmup.is_some() {
        config.warmup_runs = args.warmup;
    }
    if args.sample_interval_ms.is_some() {
        config.sample_interval_ms = args.sample_interval_ms;
    }

    if args.server_pid.is_some() {
        config.server_pid = args.server_pid;
    }
    if let Some(name) = &args.server_name {
        config.server_name = Some(name.clone());
    }

    if let Some(path) = &args.output_log {
        config.output_log = Some(path.clone());
    }
    if args.format.is_some() {
        config.output_format = args.format;
    }
    if let Some(path) = &args.output {
        config.output_file = Some(path.clone());
    }
    if let Some(level) = args.log_level {
        config.log_level = Some(level.as_str().to_string());
    }

    Ok(config)
}

/// Loads a config file, falling back to the default locations and then to
/// built-in defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(format!("Config file not found: {}", p.display()).into());
            }
            p.to_path_buf()
        }
        None => match DEFAULT_CONFIG_PATHS.iter().map(Path::new).find(|p| p.exists()) {
            Some(p) => p.to_path_buf(),
            None => return Ok(Config::default()),
        },
    };

    let content = fs::read_to_string(&path)?;
    let config = parse_config(&content, &path)?;
    info!("Loaded configuration from: {}", path.display());
    Ok(config)
}

fn parse_config(content: &str, path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
    let defaults = Config::default();
    let parsed: Config = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str(content)?,
        Some("toml") => toml::from_str(content)?,
        // Default to YAML
        _ => serde_yaml::from_str(content)?,
    };
    Ok(merge(parsed, defaults))
}

/// Fills fields missing from `cfg` with values from `defaults`.
fn merge(cfg: Config, defaults: Config) -> Config {
    Config {
        binaries: cfg.binaries.or(defaults.binaries),
        command: cfg.command.or(defaults.command),
        args: cfg.args.or(defaults.args),
        project_revision: cfg.project_revision.or(defaults.project_revision),
        runs: cfg.runs.or(defaults.runs),
        warmup_runs: cfg.warmup_runs.or(defaults.warmup_runs),
        sample_interval_ms: cfg.sample_interval_ms.or(defaults.sample_interval_ms),
        server_pid: cfg.server_pid.or(defaults.server_pid),
        server_name: cfg.server_name.or(defaults.server_name),
        server_query: cfg.server_query.or(defaults.server_query),
        output_log: cfg.output_log.or(defaults.output_log),
        output_format: cfg.output_format.or(defaults.output_format),
        output_file: cfg.output_file.or(defaults.output_file),
        log_level: cfg.log_level.or(defaults.log_level),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(argv: &[&str]) -> Args {
        let mut full = vec!["bench-rt"];
        full.extend_from_slice(argv);
        Args::parse_from(full)
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_effective_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_runs_must_exceed_warmup() {
        let cfg = Config {
            runs: Some(1),
            warmup_runs: Some(1),
            ..Config::default()
        };
        assert!(validate_effective_config(&cfg).is_err());
    }

    #[test]
    fn test_rejects_zero_interval_and_empty_binary() {
        let cfg = Config {
            sample_interval_ms: Some(0),
            ..Config::default()
        };
        assert!(validate_effective_config(&cfg).is_err());

        let cfg = Config {
            binaries: Some(vec!["".into()]),
            ..Config::default()
        };
        assert!(validate_effective_config(&cfg).is_err());

        let cfg = Config {
            log_level: Some("loud".into()),
            ..Config::default()
        };
        assert!(validate_effective_config(&cfg).is_err());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.yaml");
        fs::write(&path, "binaries: [/opt/bazel-6, /opt/bazel-7]\nruns: 3\n").unwrap();

        let cfg = load_config(Some(path.as_path())).unwrap();
        assert_eq!(cfg.binaries(), vec!["/opt/bazel-6", "/opt/bazel-7"]);
        assert_eq!(cfg.runs(), 3);
        assert_eq!(cfg.warmup_runs(), DEFAULT_WARMUP_RUNS);
        assert_eq!(cfg.command(), DEFAULT_COMMAND);
    }

    #[test]
    fn test_json_and_toml_formats() {
        let dir = tempfile::tempdir().unwrap();

        let json = dir.path().join("bench.json");
        fs::write(&json, r#"{"command": "test", "warmup": 2, "runs": 4}"#).unwrap();
        let cfg = load_config(Some(json.as_path())).unwrap();
        assert_eq!(cfg.command(), "test");
        assert_eq!(cfg.warmup_runs(), 2);

        let toml_path = dir.path().join("bench.toml");
        fs::write(&toml_path, "server_name = \"java\"\nsample_interval_ms = 20\n").unwrap();
        let cfg = load_config(Some(toml_path.as_path())).unwrap();
        assert_eq!(cfg.server_name.as_deref(), Some("java"));
        assert_eq!(cfg.sample_interval(), Duration::from_millis(20));
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(dir.path().join("missing.yaml").as_path())).is_err());
    }

    #[test]
    fn test_cli_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.yaml");
        fs::write(&path, "runs: 3\ncommand: test\nargs: ['//a:b']\n").unwrap();
        let path_str = path.to_str().unwrap();

        let cfg = resolve_config(&args(&["-c", path_str, "--runs", "7", "--arg", "//pkg:target"])).unwrap();
        assert_eq!(cfg.runs(), 7);
        assert_eq!(cfg.command(), "test");
        assert_eq!(cfg.args(), ["//pkg:target".to_string()]);
    }

    #[test]
    fn test_server_lookup_precedence() {
        let mut cfg = Config::default();
        assert_eq!(cfg.server_lookup("bazel"), ServerLookup::bazel_server_pid("bazel"));

        cfg.server_name = Some("java".into());
        assert_eq!(cfg.server_lookup("bazel"), ServerLookup::Name("java".into()));

        cfg.server_pid = Some(42);
        assert_eq!(cfg.server_lookup("bazel"), ServerLookup::Pid(42));
    }
}
