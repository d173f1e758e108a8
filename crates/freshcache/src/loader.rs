//! Loaders produce the value held by a [`RefreshCache`](crate::RefreshCache).
//!
//! A loader is anything implementing [`Loader`]. The adapters in this module cover the common
//! shapes:
//!
//! - [`from_fn`] for closures returning a future,
//! - [`from_sync_fn`] for closures computing the value directly,
//! - [`from_callback`] for loaders that signal completion through a [`LoadCallback`].
//!
//! However the loader reports its outcome, the cache observes one result per attempt.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::{self, BoxFuture, FutureExt};

use crate::error::LoadError;
use crate::timer;
use crate::utils::CancelOnDrop;

/// Produces a fresh value for the cache.
///
/// `load` is invoked once per refresh attempt. Errors and panics, whether raised while creating
/// the future or while it runs, fail only that attempt.
pub trait Loader<V>: Send + Sync + 'static {
    /// Starts loading a new value.
    fn load(&self) -> BoxFuture<'static, anyhow::Result<V>>;
}

/// A [`Loader`] backed by a closure returning a future, see [`from_fn`].
pub struct FnLoader<F>(F);

impl<V, F, Fut> Loader<V> for FnLoader<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
{
    fn load(&self) -> BoxFuture<'static, anyhow::Result<V>> {
        (self.0)().boxed()
    }
}

/// Creates a [`Loader`] from an async closure.
pub fn from_fn<F>(f: F) -> FnLoader<F> {
    FnLoader(f)
}

/// A [`Loader`] backed by a synchronous closure, see [`from_sync_fn`].
pub struct SyncFnLoader<F>(F);

impl<V, F> Loader<V> for SyncFnLoader<F>
where
    F: Fn() -> anyhow::Result<V> + Send + Sync + 'static,
    V: Send + 'static,
{
    fn load(&self) -> BoxFuture<'static, anyhow::Result<V>> {
        future::ready((self.0)()).boxed()
    }
}

/// Creates a [`Loader`] from a synchronous closure.
///
/// The closure runs on a runtime worker, so it should be cheap. The load timeout does not interrupt
/// it, and on a current-thread runtime its result is used even if it blocked past the timeout.
pub fn from_sync_fn<F>(f: F) -> SyncFnLoader<F> {
    SyncFnLoader(f)
}

/// The completion handle passed to a callback-style loader.
///
/// Exactly one outcome can be reported. Dropping the callback without completing it fails the
/// attempt.
pub struct LoadCallback<V> {
    sender: oneshot::Sender<anyhow::Result<V>>,
}

impl<V> LoadCallback<V> {
    /// Reports the outcome of the load.
    pub fn complete(self, result: anyhow::Result<V>) {
        // the attempt may already have been abandoned after a timeout
        self.sender.send(result).ok();
    }

    /// Reports a successfully loaded value.
    pub fn ok(self, value: V) {
        self.complete(Ok(value))
    }

    /// Reports a failed load.
    pub fn err(self, err: impl Into<anyhow::Error>) {
        self.complete(Err(err.into()))
    }
}

impl<V> fmt::Debug for LoadCallback<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadCallback")
            .field("canceled", &self.sender.is_canceled())
            .finish()
    }
}

/// A [`Loader`] that reports through a [`LoadCallback`], see [`from_callback`].
pub struct CallbackLoader<F>(F);

impl<V, F> Loader<V> for CallbackLoader<F>
where
    F: Fn(LoadCallback<V>) + Send + Sync + 'static,
    V: Send + 'static,
{
    fn load(&self) -> BoxFuture<'static, anyhow::Result<V>> {
        let (sender, receiver) = oneshot::channel();
        (self.0)(LoadCallback { sender });

        receiver
            .map(|result| {
                result.unwrap_or_else(|_canceled| {
                    Err(anyhow::anyhow!("loader dropped its completion callback"))
                })
            })
            .boxed()
    }
}

/// Creates a [`Loader`] from a closure that reports its outcome through a [`LoadCallback`].
pub fn from_callback<F>(f: F) -> CallbackLoader<F> {
    CallbackLoader(f)
}

/// Runs one load attempt, bounded by `timeout`.
///
/// The loader runs in its own task so that panics are contained. When the timeout hits, that task
/// is aborted and whatever it would have produced is discarded.
pub(crate) async fn invoke<V>(
    loader: Arc<dyn Loader<V>>,
    timeout: Option<Duration>,
) -> Result<V, LoadError>
where
    V: Send + 'static,
{
    let task = CancelOnDrop::new(tokio::spawn(async move { loader.load().await }));

    match timer::bounded(timeout, task).await {
        Err(limit) => Err(LoadError::Timeout(limit)),
        Ok(Err(join_error)) => Err(LoadError::from_join_error(join_error)),
        Ok(Ok(result)) => result.map_err(LoadError::from_anyhow),
    }
}
