use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::prelude::*;

use crate::config::{LogFormat, Logging};

/// Installs the global subscriber. Logs go to stderr, stdout is reserved for watched values.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(logging: &Logging) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from(logging.level).into())
        .from_env_lossy();

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(UtcTime::rfc_3339());
    let layer = match (logging.format, console::user_attended_stderr()) {
        (LogFormat::Json, _) => layer.json().with_current_span(true).boxed(),
        (LogFormat::Pretty, _) | (LogFormat::Auto, true) => layer.pretty().boxed(),
        (LogFormat::Simplified, _) | (LogFormat::Auto, false) => {
            layer.compact().with_ansi(false).boxed()
        }
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .with(sentry::integrations::tracing::layer())
        .init();
}

/// Reports a fatal error through the logger, or on stderr if logging never came up.
pub fn report_error(error: &anyhow::Error) {
    if tracing::dispatcher::has_been_set() {
        tracing::error!(error = ?error, "freshcli failed");
    } else {
        eprintln!("{error:?}");
    }
}
