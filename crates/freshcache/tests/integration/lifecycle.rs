use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use freshcache::loader::{self, LoadCallback};
use freshcache::{CacheBuilder, CacheState, GetError, LoadError};
use freshcache_test::{Record, records};
use tokio::time::{self, Instant};

use crate::{Calls, numbered_loader, records_loader, setup};

#[tokio::test(start_paused = true)]
async fn test_state_transitions() {
    setup();

    let (loader, _calls) = records_loader(Duration::from_millis(10));
    let cache = CacheBuilder::new()
        .ttl(Duration::from_secs(60))
        .loader(loader)
        .build()
        .unwrap();

    assert_eq!(cache.state(), CacheState::Loading);
    assert_eq!(cache.last_loaded(), None);

    cache.value().await.unwrap();
    assert_eq!(cache.state(), CacheState::Ready);
    assert_eq!(cache.last_loaded(), Some(Instant::now()));

    let reload = cache.reload();
    assert_eq!(cache.state(), CacheState::ReadyRefreshing);
    reload.await.unwrap();
    assert_eq!(cache.state(), CacheState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_stop_lets_running_load_finish() {
    setup();

    let (loader, calls) = records_loader(Duration::from_millis(20));
    let cache = CacheBuilder::new()
        .ttl(Duration::from_millis(10))
        .loader(loader)
        .build()
        .unwrap();

    time::sleep(Duration::from_millis(1)).await;
    cache.stop();
    assert!(cache.is_stopped());

    assert_eq!(*cache.value().await.unwrap(), records());

    time::sleep(Duration::from_millis(100)).await;
    assert_eq!(calls.get(), 1);

    // stopping twice is fine
    cache.stop();
    assert!(cache.is_stopped());
}

#[tokio::test(start_paused = true)]
async fn test_drop_lets_running_load_finish() {
    setup();

    let finished = Arc::new(AtomicBool::new(false));
    let calls = Calls::default();
    let loader = {
        let finished = Arc::clone(&finished);
        let calls = calls.clone();
        loader::from_fn(move || {
            calls.next();
            let finished = Arc::clone(&finished);
            async move {
                time::sleep(Duration::from_millis(20)).await;
                finished.store(true, Ordering::SeqCst);
                anyhow::Ok(())
            }
        })
    };
    let cache = CacheBuilder::new()
        .ttl(Duration::from_millis(10))
        .loader(loader)
        .build()
        .unwrap();

    time::sleep(Duration::from_millis(1)).await;
    drop(cache);

    time::sleep(Duration::from_millis(100)).await;
    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(calls.get(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reload_returns_outcome() {
    setup();

    let (loader, _calls) = numbered_loader(|call| call == 2);
    let cache = CacheBuilder::new().loader(loader).build().unwrap();

    assert_eq!(*cache.value().await.unwrap(), 1);
    assert_eq!(
        cache.reload().await.unwrap_err(),
        LoadError::Failed("call 2 failed".into())
    );
    assert_eq!(*cache.value().await.unwrap(), 1);
    assert_eq!(*cache.reload().await.unwrap(), 3);
    assert_eq!(*cache.value().await.unwrap(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_callback_loader() {
    setup();

    let loader = loader::from_callback(|done: LoadCallback<Vec<Record>>| {
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(5)).await;
            done.ok(records());
        });
    });
    let cache = CacheBuilder::new().loader(loader).build().unwrap();

    assert_eq!(*cache.value().await.unwrap(), records());
}

#[tokio::test(start_paused = true)]
async fn test_callback_loader_failure() {
    setup();

    let loader = loader::from_callback(|done: LoadCallback<Vec<Record>>| {
        done.err(anyhow::anyhow!("upstream unavailable"));
    });
    let cache = CacheBuilder::new().loader(loader).build().unwrap();

    assert_eq!(
        cache.value().await.unwrap_err(),
        GetError::NoData(LoadError::Failed("upstream unavailable".into()))
    );
}

#[test]
fn test_reload_after_runtime_shutdown() {
    setup();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();
    let handle = runtime.handle().clone();

    let (loader, calls) = numbered_loader(|_| false);
    let cache = {
        let _guard = runtime.enter();
        CacheBuilder::new().loader(loader).build().unwrap()
    };
    assert_eq!(*runtime.block_on(cache.value()).unwrap(), 1);

    runtime.shutdown_timeout(Duration::from_secs(1));
    let _guard = handle.enter();

    // the runtime drops the new attempt as soon as it is spawned
    let outcome = futures::executor::block_on(cache.reload());
    assert_eq!(outcome.unwrap_err(), LoadError::Interrupted);

    // and the cache is still usable afterwards
    assert_eq!(cache.state(), CacheState::Ready);
    assert_eq!(*futures::executor::block_on(cache.value()).unwrap(), 1);
    assert_eq!(calls.get(), 1);
}
