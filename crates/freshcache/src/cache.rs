use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::{CacheConfig, DurationSetting};
use crate::coordinator::{
    CacheState, Coordinator, ErrorHook, Gate, Hooks, Overrun, OverrunHook, RefreshOutcome,
};
use crate::error::{GetError, LoadError, ValidationError};
use crate::getter::{AsyncGetter, Identity, Projection, SyncGetter};
use crate::loader::{self, Loader};
use crate::timer::RecurringTask;

/// Configures and starts a [`RefreshCache`].
///
/// The only mandatory part is the loader. Everything else has defaults, see [`CacheConfig`].
///
/// ```
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// use std::time::Duration;
///
/// let cache = freshcache::CacheBuilder::new()
///     .ttl(Duration::from_secs(60))
///     .loader_fn(|| async { anyhow::Ok(vec![(1, "one"), (2, "two")]) })
///     .sync_getter(|items: &Vec<(u32, &'static str)>, id: u32| {
///         Ok(items.iter().find(|(key, _)| *key == id).map(|(_, name)| *name))
///     })
///     .build()?;
///
/// assert_eq!(cache.get(2).await?, Some("two"));
/// # Ok(())
/// # }
/// ```
pub struct CacheBuilder<V, P = Identity> {
    config: CacheConfig,
    loader: Option<Arc<dyn Loader<V>>>,
    projection: P,
    on_error: Option<ErrorHook>,
    on_overrun: Option<OverrunHook>,
}

impl<V> CacheBuilder<V, Identity>
where
    V: Send + Sync + 'static,
{
    /// Creates a builder with the default configuration and no loader.
    pub fn new() -> Self {
        Self {
            config: CacheConfig::default(),
            loader: None,
            projection: Identity,
            on_error: None,
            on_overrun: None,
        }
    }
}

impl<V> Default for CacheBuilder<V, Identity>
where
    V: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V, P> CacheBuilder<V, P>
where
    V: Send + Sync + 'static,
{
    /// Replaces the whole configuration.
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the name used in logs and metrics.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Sets the refresh period.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.config.ttl = Some(DurationSetting::Exact(ttl));
        self
    }

    /// Sets the bound on a single load. A zero duration disables it.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(DurationSetting::Exact(timeout));
        self
    }

    /// Sets the multiple of the refresh period after which a load cycle counts as an overrun.
    pub fn overrun_factor(mut self, factor: f64) -> Self {
        self.config.overrun_factor = factor;
        self
    }

    /// Sets the loader.
    pub fn loader(mut self, loader: impl Loader<V>) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    /// Sets an async closure as the loader, see [`loader::from_fn`].
    pub fn loader_fn<F, Fut>(self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        self.loader(loader::from_fn(f))
    }

    /// Sets a callback that receives every load failure.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&LoadError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Sets a callback that is notified when a successful load completes more than
    /// `ttl * overrun_factor` after the previous one.
    pub fn on_overrun<F>(mut self, f: F) -> Self
    where
        F: Fn(&Overrun) + Send + Sync + 'static,
    {
        self.on_overrun = Some(Arc::new(f));
        self
    }

    /// Sets a custom projection for reads.
    pub fn projection<Q>(self, projection: Q) -> CacheBuilder<V, Q>
    where
        Q: Projection<V>,
    {
        CacheBuilder {
            config: self.config,
            loader: self.loader,
            projection,
            on_error: self.on_error,
            on_overrun: self.on_overrun,
        }
    }

    /// Sets an async getter, which receives the cached value and the arguments of each read.
    pub fn getter<A, R, F, Fut>(self, f: F) -> CacheBuilder<V, AsyncGetter<F, A>>
    where
        A: Send + 'static,
        F: Fn(Arc<V>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        self.projection(AsyncGetter::new(f))
    }

    /// Sets a synchronous getter, which borrows the cached value for each read.
    pub fn sync_getter<A, R, F>(self, f: F) -> CacheBuilder<V, SyncGetter<F, A>>
    where
        A: Send + 'static,
        R: Send + 'static,
        F: Fn(&V, A) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        self.projection(SyncGetter::new(f))
    }

    /// Validates the configuration and starts the cache.
    ///
    /// On success the first load is already running, and a refresh is scheduled every `ttl`.
    /// Nothing is started when validation fails.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn build(self) -> Result<RefreshCache<V, P>, ValidationError>
    where
        P: Projection<V>,
    {
        let loader = self.loader.ok_or(ValidationError::MissingLoader)?;
        let settings = self.config.resolve()?;
        let ttl = settings.ttl;

        let hooks = Hooks {
            on_error: self.on_error,
            on_overrun: self.on_overrun,
        };
        let coordinator = Arc::new(Coordinator::new(settings, loader, hooks));

        // the first load starts right away, its outcome is picked up by the first reads
        let _initial = coordinator.refresh();
        let schedule = schedule_refreshes(Arc::downgrade(&coordinator), ttl);

        tracing::info!(
            cache = %coordinator.settings().name,
            ttl = ?ttl,
            timeout = ?coordinator.settings().timeout,
            "started refresh schedule"
        );

        Ok(RefreshCache {
            inner: Arc::new(CacheInner {
                coordinator,
                projection: self.projection,
                schedule: Mutex::new(Some(schedule)),
            }),
        })
    }
}

impl<V, P> fmt::Debug for CacheBuilder<V, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheBuilder")
            .field("config", &self.config)
            .field("has_loader", &self.loader.is_some())
            .field("has_error_hook", &self.on_error.is_some())
            .field("has_overrun_hook", &self.on_overrun.is_some())
            .finish()
    }
}

/// Triggers a refresh every `ttl` for as long as the coordinator is alive.
fn schedule_refreshes<V>(coordinator: Weak<Coordinator<V>>, ttl: Duration) -> RecurringTask
where
    V: Send + Sync + 'static,
{
    RecurringTask::spawn(ttl, move || match coordinator.upgrade() {
        Some(coordinator) => {
            tracing::trace!(cache = %coordinator.settings().name, "scheduled refresh");
            let _not_awaiting_future = coordinator.refresh();
            true
        }
        None => false,
    })
}

struct CacheInner<V, P> {
    coordinator: Arc<Coordinator<V>>,
    projection: P,
    schedule: Mutex<Option<RecurringTask>>,
}

/// A single value that is reloaded in the background on a fixed schedule.
///
/// Reads are served from the most recent successful load. Only reads that arrive before any load
/// has succeeded wait, and they receive the outcome of the running attempt. Failed loads are
/// recorded and reported, but never replace a value that was loaded before.
///
/// Handles are cheap to clone. The refresh schedule stops with [`stop`](Self::stop), or when the
/// last handle is dropped.
pub struct RefreshCache<V, P = Identity> {
    inner: Arc<CacheInner<V, P>>,
}

impl<V, P> Clone for RefreshCache<V, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V, P> fmt::Debug for RefreshCache<V, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshCache")
            .field("coordinator", &self.inner.coordinator)
            .field("stopped", &self.inner.schedule.lock().is_none())
            .finish()
    }
}

impl<V, P> RefreshCache<V, P>
where
    V: Send + Sync + 'static,
    P: Projection<V>,
{
    /// Reads the current value through the getter.
    ///
    /// Returns immediately once any load has succeeded, even if a refresh is running. Before
    /// that, waits for the running attempt and fails with [`GetError::NoData`] if it fails.
    pub async fn get(&self, args: P::Args) -> Result<P::Output, GetError> {
        let value = self.value().await?;

        self.inner
            .projection
            .project(value, args)
            .await
            .map_err(|err| {
                metric!(
                    counter("get.projection_failure") += 1,
                    "cache" => &self.name(),
                );
                GetError::Projection(format!("{err:#}"))
            })
    }

    /// Reads the current value without applying the getter.
    pub async fn value(&self) -> Result<Arc<V>, GetError> {
        match self.inner.coordinator.gate() {
            Gate::Ready(value) => Ok(value),
            Gate::Failed(err) => Err(GetError::NoData(err)),
            Gate::Wait(pending) => {
                metric!(counter("get.cold_wait") += 1, "cache" => &self.name());
                pending.await.map_err(GetError::NoData)
            }
        }
    }

    /// Forces a refresh outside of the schedule and returns its outcome.
    ///
    /// If a refresh is already running, this attaches to it rather than starting another. The
    /// refresh starts even if the returned future is never awaited.
    pub fn reload(&self) -> BoxFuture<'static, RefreshOutcome<V>> {
        self.inner.coordinator.refresh()
    }

    /// Stops the refresh schedule.
    ///
    /// A refresh that is currently running completes normally. Reads and [`reload`](Self::reload)
    /// keep working.
    pub fn stop(&self) {
        if self.inner.schedule.lock().take().is_some() {
            tracing::info!(cache = %self.name(), "stopped refresh schedule");
        }
    }

    /// Returns `true` once [`stop`](Self::stop) was called.
    pub fn is_stopped(&self) -> bool {
        self.inner.schedule.lock().is_none()
    }

    /// Returns the state of the refresh cycle.
    pub fn state(&self) -> CacheState {
        self.inner.coordinator.state()
    }

    /// Returns the most recent load failure, if any.
    ///
    /// This is kept after later successful loads.
    pub fn last_error(&self) -> Option<LoadError> {
        self.inner.coordinator.last_error()
    }

    /// Returns when the most recent successful load completed.
    pub fn last_loaded(&self) -> Option<Instant> {
        self.inner.coordinator.last_loaded()
    }

    /// The name used in logs and metrics.
    pub fn name(&self) -> &str {
        &self.inner.coordinator.settings().name
    }

    /// The effective refresh period.
    pub fn ttl(&self) -> Duration {
        self.inner.coordinator.settings().ttl
    }

    /// The effective load timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.inner.coordinator.settings().timeout
    }
}
