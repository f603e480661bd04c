//! Utilities for logging.

use tracing::Level;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    HumanReadable,
    Json,
}

/// Install the global subscriber. `RUST_LOG` directives take precedence over
/// `level`.
///
/// Fails silently if a global subscriber is already set.
pub fn configure_global_logger<W>(level: Level, format: LogFormat, writer: W)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let _ = try_configure_global_logger(level, format, writer);
}

pub fn try_configure_global_logger<W>(
    level: Level,
    format: LogFormat,
    writer: W,
) -> Result<(), SetGlobalDefaultError>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = env_filter(level);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(true);

    match format {
        LogFormat::HumanReadable => tracing::subscriber::set_global_default(builder.finish()),
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
    }
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy()
}

/// Logger for tests, writes to the captured test output.
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(Level::DEBUG))
        .with_test_writer()
        .try_init();
}
