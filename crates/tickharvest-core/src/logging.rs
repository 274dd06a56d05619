//! Tracing subscriber setup for binaries embedding the pipeline.
//!
//! Console output goes to stderr so stdout stays free for command results.
//! An optional directory receives daily-rotated plain-text logs.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "tickharvest";

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `log_level`. Fails if a subscriber is
/// already installed.
pub fn init_logging(log_level: &str, log_dir: Option<&str>) -> Result<(), TryInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(true);

    if let Some(dir) = log_dir {
        let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
        let file_layer = fmt::layer()
            .with_writer(file_appender)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .try_init()
    }
}
