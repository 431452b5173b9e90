//! Logging initialisation.
//!
//! `json` format emits structured lines for log aggregation; anything else is the
//! human-readable formatter. When `output` names a directory the logs go to a
//! daily-rotated file through a non-blocking writer.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggerConfig;

/// Installs the global subscriber. Keep the returned guard alive for the whole
/// process, otherwise buffered file output is dropped.
pub fn init(config: &LoggerConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;
    let json = config.format.eq_ignore_ascii_case("json");

    if config.output.eq_ignore_ascii_case("stdout") || config.output.is_empty() {
        let registry = tracing_subscriber::registry().with(env_filter);
        if json {
            registry
                .with(fmt::layer().json().with_target(true).with_writer(std::io::stdout))
                .try_init()?;
        } else {
            registry
                .with(fmt::layer().with_target(true).with_writer(std::io::stdout))
                .try_init()?;
        }
        return Ok(None);
    }

    let appender = tracing_appender::rolling::daily(&config.output, "perp_pilot.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(fmt::layer().json().with_ansi(false).with_writer(writer))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_ansi(false).with_writer(writer))
            .try_init()?;
    }
    Ok(Some(guard))
}
