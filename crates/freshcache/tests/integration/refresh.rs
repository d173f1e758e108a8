use std::sync::Arc;
use std::time::Duration;

use freshcache::loader;
use freshcache::{CacheBuilder, LoadError, Overrun};
use parking_lot::Mutex;
use tokio::time;

use crate::{Calls, ConcurrencyProbe, numbered_loader, setup};

#[tokio::test(start_paused = true)]
async fn test_refreshes_on_schedule() {
    setup();

    let appended = Arc::new(Mutex::new(Vec::new()));
    let loader = {
        let appended = Arc::clone(&appended);
        loader::from_sync_fn(move || {
            let mut appended = appended.lock();
            let next = appended.len();
            appended.push(next);
            anyhow::Ok(appended.clone())
        })
    };
    let cache = CacheBuilder::new()
        .ttl(Duration::from_millis(10))
        .loader(loader)
        .build()
        .unwrap();

    time::sleep(Duration::from_millis(50)).await;
    assert!(cache.value().await.unwrap().len() >= 4);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_keeps_previous_value() {
    setup();

    let errors = Arc::new(Mutex::new(Vec::new()));
    let calls = Calls::default();
    let loader = {
        let calls = calls.clone();
        loader::from_fn(move || {
            let call = calls.next();
            async move {
                if call == 2 {
                    time::sleep(Duration::from_secs(1)).await;
                }
                anyhow::Ok(call)
            }
        })
    };
    let cache = CacheBuilder::new()
        .ttl(Duration::from_millis(10))
        .timeout(Duration::from_millis(5))
        .loader(loader)
        .on_error({
            let errors = Arc::clone(&errors);
            move |err: &LoadError| errors.lock().push(err.clone())
        })
        .build()
        .unwrap();

    assert_eq!(*cache.value().await.unwrap(), 1);

    // the second load starts at 10ms and times out at 15ms
    time::sleep(Duration::from_millis(16)).await;
    assert_eq!(
        *errors.lock(),
        vec![LoadError::Timeout(Duration::from_millis(5))]
    );
    assert_eq!(*cache.value().await.unwrap(), 1);
    assert_eq!(
        cache.last_error(),
        Some(LoadError::Timeout(Duration::from_millis(5)))
    );

    // the timed out load never lands
    time::sleep(Duration::from_secs(2)).await;
    assert_ne!(*cache.value().await.unwrap(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failures_do_not_stop_schedule() {
    setup();

    let failures = Calls::default();
    let (loader, calls) = numbered_loader(|_| true);
    let cache = CacheBuilder::new()
        .ttl(Duration::from_millis(10))
        .loader(loader)
        .on_error({
            let failures = failures.clone();
            move |_: &LoadError| {
                failures.next();
            }
        })
        .build()
        .unwrap();

    time::sleep(Duration::from_millis(55)).await;
    assert_eq!(calls.get(), 6);
    assert_eq!(failures.get(), 6);
    assert!(!cache.is_stopped());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_flight_under_concurrent_reads() {
    setup();

    let probe = ConcurrencyProbe::new();
    let loader = {
        let probe = probe.clone();
        loader::from_fn(move || {
            let guard = probe.enter();
            async move {
                time::sleep(Duration::from_millis(3)).await;
                drop(guard);
                anyhow::Ok(())
            }
        })
    };
    let cache = CacheBuilder::new()
        .ttl(Duration::from_millis(5))
        .loader(loader)
        .build()
        .unwrap();

    let mut tasks = Vec::new();
    for i in 0..32 {
        let cache = cache.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..20 {
                if i % 2 == 0 {
                    cache.value().await.unwrap();
                } else {
                    cache.reload().await.unwrap();
                }
                time::sleep(Duration::from_millis(1)).await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert!(probe.calls() > 1);
    assert_eq!(probe.peak(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reload_attaches_to_running_load() {
    setup();

    let calls = Calls::default();
    let loader = {
        let calls = calls.clone();
        loader::from_fn(move || {
            let call = calls.next();
            async move {
                time::sleep(Duration::from_millis(20)).await;
                anyhow::Ok(call)
            }
        })
    };
    let cache = CacheBuilder::new().loader(loader).build().unwrap();

    let outcomes = futures::future::join_all((0..10).map(|_| cache.reload())).await;
    for outcome in outcomes {
        assert_eq!(*outcome.unwrap(), 1);
    }
    assert_eq!(calls.get(), 1);

    // once resolved, the next reload starts a new load
    assert_eq!(*cache.reload().await.unwrap(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_overrun_hook() {
    setup();

    let overruns = Arc::new(Mutex::new(Vec::new()));
    let loader = loader::from_fn(|| async {
        time::sleep(Duration::from_millis(30)).await;
        anyhow::Ok(())
    });
    let _cache = CacheBuilder::new()
        .ttl(Duration::from_millis(10))
        .timeout(Duration::ZERO)
        .loader(loader)
        .on_overrun({
            let overruns = Arc::clone(&overruns);
            move |overrun: &Overrun| overruns.lock().push(*overrun)
        })
        .build()
        .unwrap();

    time::sleep(Duration::from_millis(100)).await;

    let overruns = overruns.lock();
    assert!(!overruns.is_empty());
    for overrun in overruns.iter() {
        assert!(overrun.elapsed >= Duration::from_millis(30));
        assert_eq!(overrun.ttl, Duration::from_millis(10));
        assert_eq!(overrun.threshold, Duration::from_millis(15));
    }
}
