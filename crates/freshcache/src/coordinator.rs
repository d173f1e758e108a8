use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt, Shared, TryFutureExt};
use parking_lot::Mutex;
use sentry::{Hub, SentryFutureExt};
use tokio::time::Instant;
use tracing::Instrument;

use crate::config::RefreshSettings;
use crate::error::LoadError;
use crate::loader::{self, Loader};
use crate::utils::CallOnDrop;

/// The outcome of a refresh attempt.
pub type RefreshOutcome<V> = Result<Arc<V>, LoadError>;

type RefreshChannel<V> = Shared<oneshot::Receiver<RefreshOutcome<V>>>;

type Attempt = BoxFuture<'static, ()>;

/// Receives every load failure.
pub type ErrorHook = Arc<dyn Fn(&LoadError) + Send + Sync>;

/// Receives a notification for every successful load that overran its schedule.
pub type OverrunHook = Arc<dyn Fn(&Overrun) + Send + Sync>;

/// Details about a load cycle that took longer than the configured threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Overrun {
    /// Time between the previous successful load and this one.
    pub elapsed: Duration,
    /// The configured refresh period.
    pub ttl: Duration,
    /// The threshold that was exceeded, `ttl` times the overrun factor.
    pub threshold: Duration,
}

/// The externally observable state of a cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheState {
    /// No load was ever started.
    Uninitialized,
    /// No value was loaded yet. Reads wait for the running attempt, if any.
    Loading,
    /// A value is available and no refresh is running.
    Ready,
    /// A value is available and a background refresh is running.
    ReadyRefreshing,
}

#[derive(Default)]
pub(crate) struct Hooks {
    pub on_error: Option<ErrorHook>,
    pub on_overrun: Option<OverrunHook>,
}

struct InFlight<V> {
    id: u64,
    channel: RefreshChannel<V>,
}

/// The mutable state of a cache. All access goes through one lock.
struct Slot<V> {
    value: Option<Arc<V>>,
    last_error: Option<LoadError>,
    in_flight: Option<InFlight<V>>,
    last_loaded: Option<Instant>,
    attempts: u64,
}

impl<V> Slot<V> {
    fn clear_in_flight(&mut self, id: u64) {
        if self.in_flight.as_ref().is_some_and(|in_flight| in_flight.id == id) {
            self.in_flight = None;
        }
    }
}

/// What a read has to do to get at the value.
pub(crate) enum Gate<V> {
    /// A value is available right away.
    Ready(Arc<V>),
    /// There is no value yet, but an attempt is running.
    Wait(BoxFuture<'static, RefreshOutcome<V>>),
    /// There is no value, nothing is running and the most recent attempt failed.
    Failed(LoadError),
}

/// The single-flight refresh state machine.
///
/// At most one load attempt runs at any time. Every trigger that arrives while an attempt is
/// running attaches to that attempt's outcome instead of starting another one.
pub(crate) struct Coordinator<V> {
    settings: RefreshSettings,
    loader: Arc<dyn Loader<V>>,
    hooks: Hooks,
    slot: Arc<Mutex<Slot<V>>>,
}

impl<V> fmt::Debug for Coordinator<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.try_lock();
        f.debug_struct("Coordinator")
            .field("settings", &self.settings)
            .field("has_value", &slot.as_ref().map(|slot| slot.value.is_some()))
            .field(
                "refreshing",
                &slot.as_ref().map(|slot| slot.in_flight.is_some()),
            )
            .finish()
    }
}

impl<V> Coordinator<V>
where
    V: Send + Sync + 'static,
{
    pub fn new(settings: RefreshSettings, loader: Arc<dyn Loader<V>>, hooks: Hooks) -> Self {
        Self {
            settings,
            loader,
            hooks,
            slot: Arc::new(Mutex::new(Slot {
                value: None,
                last_error: None,
                in_flight: None,
                last_loaded: None,
                attempts: 0,
            })),
        }
    }

    pub fn settings(&self) -> &RefreshSettings {
        &self.settings
    }

    /// Starts a refresh attempt, or attaches to the one that is already running.
    ///
    /// NOTE: This function itself is *not* `async`, because it should eagerly spawn the attempt,
    /// even if the returned future is never awaited.
    pub fn refresh(self: &Arc<Self>) -> BoxFuture<'static, RefreshOutcome<V>> {
        let (channel, attempt) = {
            let mut slot = self.slot.lock();
            let running = slot
                .in_flight
                .as_ref()
                .map(|in_flight| in_flight.channel.clone());
            match running {
                Some(channel) => {
                    tracing::trace!(cache = %self.settings.name, "attaching to running refresh");
                    metric!(counter("refresh.coalesced") += 1, "cache" => &self.settings.name);
                    (channel, None)
                }
                None => {
                    let (channel, attempt) = self.prepare_attempt(&mut slot);
                    (channel, Some(attempt))
                }
            }
        };

        if let Some(attempt) = attempt {
            tokio::spawn(attempt);
        }

        Box::pin(channel.unwrap_or_else(|_canceled| Err(LoadError::Interrupted)))
    }

    /// Decides how a read gets at the value, as one atomic step.
    ///
    /// A cold cache that has nothing running and no recorded failure starts an attempt.
    pub fn gate(self: &Arc<Self>) -> Gate<V> {
        let (channel, attempt) = {
            let mut slot = self.slot.lock();
            if let Some(value) = &slot.value {
                return Gate::Ready(Arc::clone(value));
            }

            let running = slot
                .in_flight
                .as_ref()
                .map(|in_flight| in_flight.channel.clone());
            match running {
                Some(channel) => (channel, None),
                None => match slot.last_error.clone() {
                    Some(err) => return Gate::Failed(err),
                    None => {
                        let (channel, attempt) = self.prepare_attempt(&mut slot);
                        (channel, Some(attempt))
                    }
                },
            }
        };

        if let Some(attempt) = attempt {
            tokio::spawn(attempt);
        }

        Gate::Wait(Box::pin(
            channel.unwrap_or_else(|_canceled| Err(LoadError::Interrupted)),
        ))
    }

    pub fn state(&self) -> CacheState {
        let slot = self.slot.lock();
        match (&slot.value, &slot.in_flight) {
            (Some(_), Some(_)) => CacheState::ReadyRefreshing,
            (Some(_), None) => CacheState::Ready,
            (None, _) if slot.attempts == 0 => CacheState::Uninitialized,
            (None, _) => CacheState::Loading,
        }
    }

    pub fn last_error(&self) -> Option<LoadError> {
        self.slot.lock().last_error.clone()
    }

    pub fn last_loaded(&self) -> Option<Instant> {
        self.slot.lock().last_loaded
    }

    /// Registers a new attempt as the running one and returns it, ready to be spawned.
    ///
    /// Must be called with the slot locked, so that checking for a running attempt and starting
    /// a new one happen as one step. The attempt must be spawned after the lock is released: a
    /// runtime that is shutting down drops it right away, which clears the slot again.
    fn prepare_attempt(self: &Arc<Self>, slot: &mut Slot<V>) -> (RefreshChannel<V>, Attempt) {
        slot.attempts += 1;
        let id = slot.attempts;
        let name = &self.settings.name;

        tracing::debug!(cache = %name, attempt = id, "starting refresh");
        metric!(counter("refresh.started") += 1, "cache" => name);

        let (sender, receiver) = oneshot::channel();
        let channel = receiver.shared();
        slot.in_flight = Some(InFlight {
            id,
            channel: channel.clone(),
        });

        // Clears the attempt if it is dropped without finishing, for example on runtime shutdown.
        let clear_token = {
            let slot = Arc::clone(&self.slot);
            CallOnDrop::new(move || slot.lock().clear_in_flight(id))
        };

        let coordinator = Arc::clone(self);
        let attempt = async move {
            let started = Instant::now();
            let result = loader::invoke(
                Arc::clone(&coordinator.loader),
                coordinator.settings.timeout,
            )
            .await;
            let outcome = coordinator.finish(id, started, result);
            drop(clear_token);
            sender.send(outcome).ok();
        }
        .instrument(tracing::info_span!("refresh", cache = %name, attempt = id))
        .bind_hub(Hub::new_from_top(Hub::current()));

        (channel, Box::pin(attempt))
    }

    /// Publishes the result of attempt `id` and notifies the hooks.
    fn finish(&self, id: u64, started: Instant, result: Result<V, LoadError>) -> RefreshOutcome<V> {
        let name = &self.settings.name;
        metric!(timer("refresh.duration") = started.elapsed(), "cache" => name);

        match result {
            Ok(value) => {
                let value = Arc::new(value);
                let now = Instant::now();
                let previous = {
                    let mut slot = self.slot.lock();
                    slot.value = Some(Arc::clone(&value));
                    slot.clear_in_flight(id);
                    slot.last_loaded.replace(now)
                };

                tracing::debug!(cache = %name, "refresh succeeded");
                metric!(counter("refresh.success") += 1, "cache" => name);

                if let Some(previous) = previous {
                    self.check_overrun(now.duration_since(previous));
                }

                Ok(value)
            }
            Err(err) => {
                {
                    let mut slot = self.slot.lock();
                    slot.last_error = Some(err.clone());
                    slot.clear_in_flight(id);
                }

                tracing::warn!(cache = %name, error = %err, "refresh failed");
                metric!(
                    counter("refresh.failure") += 1,
                    "cache" => name,
                    "reason" => err.kind(),
                );

                if let Some(on_error) = &self.hooks.on_error {
                    on_error(&err);
                }

                Err(err)
            }
        }
    }

    fn check_overrun(&self, elapsed: Duration) {
        let threshold = self.settings.overrun_threshold;
        if elapsed <= threshold {
            return;
        }

        tracing::debug!(
            cache = %self.settings.name,
            elapsed = ?elapsed,
            threshold = ?threshold,
            "refresh cycle overran"
        );
        metric!(counter("refresh.overrun") += 1, "cache" => &self.settings.name);

        if let Some(on_overrun) = &self.hooks.on_overrun {
            on_overrun(&Overrun {
                elapsed,
                ttl: self.settings.ttl,
                threshold,
            });
        }
    }
}
