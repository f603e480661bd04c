use std::io;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use sqlpipe::commands::Commands;
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum LoggingMode {
    #[default]
    Pretty,
    Json,
}

impl From<LoggingMode> for logutil::LogFormat {
    fn from(mode: LoggingMode) -> Self {
        match mode {
            LoggingMode::Pretty => logutil::LogFormat::HumanReadable,
            LoggingMode::Json => logutil::LogFormat::Json,
        }
    }
}

#[derive(Parser)]
#[clap(name = "sqlpipe")]
#[clap(version)]
#[clap(about = "Render lazy relational plans to SQL and run grouped traversals", long_about = None)]
struct Cli {
    /// Minimum level of logs written to stderr. `RUST_LOG` overrides this.
    #[clap(long, global = true, default_value = "error")]
    log_level: tracing::Level,

    #[clap(long, global = true, value_enum, default_value_t = LoggingMode::Pretty)]
    log_format: LoggingMode,

    #[clap(subcommand)]
    command: Commands,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logutil::configure_global_logger(cli.log_level, cli.log_format.into(), io::stderr);

    info!(version = env!("CARGO_PKG_VERSION"), "starting...");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    cli.command.run(&mut out)
}
