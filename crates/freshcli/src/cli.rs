//! Exposes the command line application.
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use freshcache::DurationSetting;

use crate::config::Config;
use crate::logging;
use crate::watch::{self, WatchOptions};

/// Prints a value from a JSON document that is reloaded in the background.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to your configuration file.
    #[arg(long, short, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Refresh period of the document, overrides the configuration.
    #[arg(long, value_parser = humantime::parse_duration)]
    ttl: Option<Duration>,

    /// Bound on a single reload of the document, overrides the configuration. `0s` disables it.
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// JSON pointer to the value to print, for example `/items/0/name`.
    #[arg(long, short, default_value = "")]
    pointer: String,

    /// How many times to print the value.
    #[arg(long, short = 'n', default_value_t = 1)]
    count: usize,

    /// Time between two prints.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "1s")]
    interval: Duration,

    /// The JSON document to watch.
    #[arg(value_name = "FILE")]
    file: PathBuf,
}

impl Cli {
    /// Applies the command line overrides to the configuration.
    fn apply(&self, config: &mut Config) {
        if let Some(ttl) = self.ttl {
            config.cache.ttl = Some(DurationSetting::Exact(ttl));
        }
        if let Some(timeout) = self.timeout {
            config.cache.timeout = Some(DurationSetting::Exact(timeout));
        }
    }

    fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            path: self.file.clone(),
            pointer: self.pointer.clone(),
            count: self.count,
            interval: self.interval,
        }
    }
}

/// Runs the main application.
pub fn execute() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::get(cli.config.as_deref()).context("failed loading config")?;
    cli.apply(&mut config);

    let _sentry = sentry::init(sentry::ClientOptions {
        dsn: config.sentry_dsn.clone(),
        release: sentry::release_name!(),
        ..Default::default()
    });

    logging::init_logging(&config.logging);

    if let Some(ref statsd) = config.metrics.statsd {
        freshcache::metrics::configure_statsd(
            &config.metrics.prefix,
            statsd.as_str(),
            config.metrics.custom_tags.clone(),
        )
        .context("failed to configure metrics")?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("freshcli")
        .build()
        .context("failed to start the runtime")?;

    let options = cli.watch_options();
    runtime.block_on(async move {
        let mut stdout = std::io::stdout().lock();
        watch::run(config.cache, options, &mut stdout).await
    })
}
