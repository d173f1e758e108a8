//! Watches a JSON document through a [`RefreshCache`].
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use freshcache::{CacheBuilder, CacheConfig, GetError, RefreshCache};
use serde_json::Value;

/// What to watch and how often to print it.
#[derive(Clone, Debug)]
pub struct WatchOptions {
    /// The JSON document to load.
    pub path: PathBuf,
    /// A JSON pointer into the document, the empty pointer selects all of it.
    pub pointer: String,
    /// How many times to print the value.
    pub count: usize,
    /// Time between two prints.
    pub interval: Duration,
}

fn build_cache(
    config: CacheConfig,
    path: PathBuf,
) -> Result<RefreshCache<Value, impl freshcache::Projection<Value, Args = String, Output = Value>>>
{
    let cache = CacheBuilder::new()
        .config(config)
        .loader_fn(move || {
            let path = path.clone();
            async move {
                let contents = tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?;
                let document: Value = serde_json::from_slice(&contents)
                    .with_context(|| format!("failed to parse {}", path.display()))?;
                anyhow::Ok(document)
            }
        })
        .on_error(|err| tracing::error!(error = %err, "failed to reload document"))
        .sync_getter(|document: &Value, pointer: String| {
            document
                .pointer(&pointer)
                .cloned()
                .ok_or_else(|| anyhow!("nothing at pointer {pointer:?}"))
        })
        .build()?;

    Ok(cache)
}

/// Prints the watched value `count` times to `out`.
///
/// Reads that fail are logged and skipped, except before the document could be loaded once.
pub async fn run<W: Write>(config: CacheConfig, options: WatchOptions, out: &mut W) -> Result<()> {
    let cache = build_cache(config, options.path)?;

    for round in 0..options.count {
        if round > 0 {
            tokio::time::sleep(options.interval).await;
        }

        match cache.get(options.pointer.clone()).await {
            Ok(value) => writeln!(out, "{}", serde_json::to_string(&value)?)?,
            Err(err @ GetError::Projection(_)) => {
                tracing::warn!(error = %err, "cannot show value");
            }
            Err(err @ GetError::NoData(_)) if round == 0 => {
                return Err(err).context("the document could not be loaded");
            }
            Err(err) => tracing::warn!(error = %err, "cannot show value"),
        }
        out.flush()?;
    }

    cache.stop();
    Ok(())
}
