//! Config command implementation.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::Config;

/// Renders `config` in the requested format.
pub fn render_config(config: &Config, format: ConfigFormat) -> Result<String> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}

/// Generates a configuration file with default values.
pub fn command_config(output: Option<PathBuf>, format: ConfigFormat, commented: bool) -> Result<()> {
    let config = Config::default();
    let output = output.unwrap_or_else(|| PathBuf::from("bench-rt.yaml"));

    let mut content = render_config(&config, format)?;
    if commented && format == ConfigFormat::Yaml {
        content = add_config_comments(content);
    }

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)
            .with_context(|| format!("Failed to write {}", output.display()))?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Adds comments to YAML configuration
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# bench-rt Configuration
# =======================
#
# What to run
# -----------
# binaries: ["bazel"]          # Binaries to compare, one session each
# command: "build"             # Build-tool command
# args: []                     # Arguments after the command, e.g. ["//pkg:target"]
# project_revision: null       # Recorded with the results
#
# Trials
# ------
# runs: 5                      # Trials per binary
# warmup_runs: 1               # Leading trials left out of the aggregate
# sample_interval_ms: 50       # Memory sampling interval
#
# Server Process (first match wins: pid, name, query)
# ---------------------------------------------------
# server_pid: null             # Fixed PID
# server_name: null            # Process name, e.g. "java"
# server_query: ["info", "server_pid"]  # Arguments printing the PID
#
# Output
# ------
# output_log: null             # Append build output here (null = discard)
# output_format: table         # table, yaml, json, toml
# output_file: null            # Report file (null = stdout)
# log_level: "info"            # off, error, warn, info, debug, trace
"#;

    format!("{comments}\n{yaml}")
}
