//! Errors reported while building, refreshing and reading a cache.

use std::any::Any;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinError;

/// An invalid cache configuration, reported by [`CacheBuilder::build`](crate::CacheBuilder::build).
///
/// Construction either succeeds completely or fails with one of these before any load is
/// attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// No loader was configured.
    #[error("a loader must be configured before building the cache")]
    MissingLoader,
    /// The refresh period is not a non-negative duration.
    #[error("the ttl option must be a number greater than or equal to 0, got {0}")]
    InvalidTtl(String),
    /// The load timeout is not a non-negative duration.
    #[error("the timeout option must be a number greater than or equal to 0, got {0}")]
    InvalidTimeout(String),
    /// The overrun factor is not a finite, non-negative number.
    #[error("the overrun factor must be a finite number greater than or equal to 0, got {0}")]
    InvalidOverrunFactor(String),
}

/// The failure of a single refresh attempt.
///
/// This is cloned out to every caller that attached to the attempt, so the details are kept
/// as plain strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The loader returned an error.
    #[error("load failed: {0}")]
    Failed(String),
    /// The loader panicked, either when invoked or while running.
    #[error("loader panicked: {0}")]
    Panicked(String),
    /// The loader did not finish within the configured timeout.
    #[error("load timed out after {0:?}")]
    Timeout(Duration),
    /// The attempt was dropped before it produced an outcome, for example because the runtime
    /// shut down.
    #[error("load attempt was interrupted")]
    Interrupted,
}

impl LoadError {
    /// Flattens an application error, including its context chain.
    pub(crate) fn from_anyhow(err: anyhow::Error) -> Self {
        Self::Failed(format!("{err:#}"))
    }

    pub(crate) fn from_join_error(err: JoinError) -> Self {
        match err.try_into_panic() {
            Ok(payload) => Self::Panicked(panic_message(payload.as_ref())),
            Err(_) => Self::Interrupted,
        }
    }

    /// A short tag describing the kind of failure, used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            LoadError::Failed(_) => "failed",
            LoadError::Panicked(_) => "panicked",
            LoadError::Timeout(_) => "timeout",
            LoadError::Interrupted => "interrupted",
        }
    }
}

/// The failure of a single read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GetError {
    /// No value was ever loaded and the most recent attempt failed.
    #[error("no data available: {0}")]
    NoData(#[source] LoadError),
    /// The getter failed for this particular call.
    #[error("projection failed: {0}")]
    Projection(String),
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
