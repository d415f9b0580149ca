// bench-rt - build-tool benchmark harness
use anyhow::anyhow;
use bench_rt::cli::{Args, Commands, ConfigFormat, LogLevel};
use bench_rt::commands::{command_check, command_config, command_run};
use bench_rt::config::{resolve_config, validate_effective_config, Config};
use clap::Parser;
use tracing::{info, Level};

/// Initializes tracing logging subsystem with configured log level
fn setup_logging(config: &Config) {
    let level = config
        .log_level
        .as_deref()
        .and_then(|l| l.parse::<LogLevel>().ok())
        .unwrap_or(LogLevel::Info);

    let max_level = match level {
        LogLevel::Off => return,
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    };

    // Logs go to stderr so reports on stdout stay machine-readable.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Tracing subscriber already installed");
    }

    info!("Logging initialized with level: {:?}", level);
}

/// Shows configuration in requested format
fn show_config(config: &Config, format: ConfigFormat) -> anyhow::Result<()> {
    let output = bench_rt::commands::config::render_config(config, format)?;
    println!("{output}");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if let Some(Commands::Config {
        output,
        format,
        commented,
    }) = &args.command
    {
        return command_config(output.clone(), *format, *commented);
    }

    let config = resolve_config(&args).map_err(|e| anyhow!("Failed to load configuration: {}", e))?;

    if args.check_config {
        if let Err(e) = validate_effective_config(&config) {
            eprintln!("❌ Configuration invalid: {}", e);
            std::process::exit(1);
        }
        println!("✅ Configuration is valid");
        return Ok(());
    }

    if args.show_config {
        return show_config(&config, args.config_format);
    }

    setup_logging(&config);

    match &args.command {
        Some(Commands::Check { proc, server, all }) => {
            if !command_check(*proc, *server, *all, &config)? {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Commands::Run) | None => {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            info!("Starting bench-rt");
            command_run(&config).await
        }
        Some(Commands::Config { .. }) => Ok(()),
    }
}
