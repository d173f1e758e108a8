//! Helpers for testing caches.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - When using [`tempdir`], hold on to the returned handle for the entire test. The directory is
//!    deleted as soon as it is dropped: `let dir = test::tempdir();`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

pub use tempfile::TempDir;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `freshcache` crate and mutes all
///    other logs.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("freshcache=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// Creates a temporary directory.
///
/// The directory is deleted when the [`TempDir`] instance is dropped.
pub fn tempdir() -> TempDir {
    TempDir::new().unwrap()
}

/// A small record type used as cached data in tests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: u32,
    pub name: String,
}

/// Returns the fixed set of records `1 => "a"`, `2 => "b"` and `3 => "c"`.
pub fn records() -> Vec<Record> {
    vec![
        Record {
            id: 1,
            name: "a".into(),
        },
        Record {
            id: 2,
            name: "b".into(),
        },
        Record {
            id: 3,
            name: "c".into(),
        },
    ]
}

/// Finds the record with the given id.
pub fn find_record(records: &[Record], id: u32) -> Option<Record> {
    records.iter().find(|record| record.id == id).cloned()
}

/// Writes `value` as JSON into `dir` and returns the path of the new file.
pub fn write_json<T: Serialize>(dir: &Path, name: &str, value: &T) -> PathBuf {
    let path = dir.join(name);
    let contents = serde_json::to_vec_pretty(value).unwrap();
    std::fs::write(&path, contents).unwrap();
    path
}

/// Tracks how many callers are inside a section at the same time.
///
/// Clones share the same counters.
#[derive(Clone, Debug, Default)]
pub struct ConcurrencyProbe {
    inner: Arc<ProbeCounters>,
}

#[derive(Debug, Default)]
struct ProbeCounters {
    calls: AtomicUsize,
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the start of a section. The section ends when the guard is dropped.
    pub fn enter(&self) -> ProbeGuard {
        let counters = &self.inner;
        counters.calls.fetch_add(1, Ordering::SeqCst);
        let current = counters.current.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak.fetch_max(current, Ordering::SeqCst);

        ProbeGuard {
            counters: Arc::clone(&self.inner),
        }
    }

    /// The total number of entered sections.
    pub fn calls(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }

    /// The highest number of sections that were active at the same time.
    pub fn peak(&self) -> usize {
        self.inner.peak.load(Ordering::SeqCst)
    }
}

/// Returned by [`ConcurrencyProbe::enter`].
#[derive(Debug)]
pub struct ProbeGuard {
    counters: Arc<ProbeCounters>,
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        self.counters.current.fetch_sub(1, Ordering::SeqCst);
    }
}
