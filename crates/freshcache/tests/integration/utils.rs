use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use freshcache::loader::{self, Loader};
use freshcache_test::{Record, records};
use tokio::time;

pub use freshcache_test::{ConcurrencyProbe, find_record, setup};

/// Counts loader invocations. Clones share the counter.
#[derive(Clone, Debug, Default)]
pub struct Calls(Arc<AtomicUsize>);

impl Calls {
    /// Registers a call and returns its 1-based number.
    pub fn next(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// A loader that returns [`records`] after `delay`, counting its calls.
pub fn records_loader(delay: Duration) -> (impl Loader<Vec<Record>>, Calls) {
    let calls = Calls::default();
    let loader = {
        let calls = calls.clone();
        loader::from_fn(move || {
            calls.next();
            async move {
                time::sleep(delay).await;
                anyhow::Ok(records())
            }
        })
    };
    (loader, calls)
}

/// A loader that returns its call number, failing on every call for which `fails` returns `true`.
pub fn numbered_loader<F>(fails: F) -> (impl Loader<usize>, Calls)
where
    F: Fn(usize) -> bool + Send + Sync + 'static,
{
    let calls = Calls::default();
    let loader = {
        let calls = calls.clone();
        loader::from_sync_fn(move || {
            let call = calls.next();
            if fails(call) {
                anyhow::bail!("call {call} failed");
            }
            Ok(call)
        })
    };
    (loader, calls)
}
