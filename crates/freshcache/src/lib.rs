//! A refresh-ahead, single-flight cache for one value that is reloaded on a fixed schedule.
//!
//! A [`RefreshCache`] owns a loader that produces the whole value, and reloads it in the
//! background every `ttl`:
//!
//!  - Reads never wait for a refresh once a value was loaded. They are served the most recent
//!    successful value, even while a refresh is running or after refreshes failed.
//!
//!  - Only one load runs at any time. Scheduled refreshes, manual [`reload`](RefreshCache::reload)s
//!    and cold reads that overlap all share the outcome of that one load.
//!
//!  - Every load is bounded by a timeout. Failures, timeouts and panics are recorded and reported
//!    to an optional hook, but never clear a value that was loaded before.
//!
//! Reads can go through a getter, which projects the cached value plus per-call arguments into the
//! result. See [`CacheBuilder`] for all options.
#![warn(missing_docs)]

#[macro_use]
pub mod metrics;

mod cache;
pub mod config;
mod coordinator;
pub mod error;
pub mod getter;
pub mod loader;
pub mod timer;
mod utils;

pub use cache::{CacheBuilder, RefreshCache};
pub use config::{CacheConfig, DurationSetting};
pub use coordinator::{CacheState, ErrorHook, Overrun, OverrunHook, RefreshOutcome};
pub use error::{GetError, LoadError, ValidationError};
pub use getter::{Identity, Projection};
pub use loader::{LoadCallback, Loader};
