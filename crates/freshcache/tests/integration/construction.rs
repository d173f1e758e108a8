use std::time::Duration;

use freshcache::{CacheBuilder, CacheConfig, DurationSetting, ValidationError};
use freshcache_test::Record;
use tokio::time;

use crate::{numbered_loader, setup};

#[tokio::test(start_paused = true)]
async fn test_missing_loader() {
    setup();

    let result = CacheBuilder::<Vec<Record>>::new()
        .ttl(Duration::from_secs(1))
        .build();

    assert_eq!(result.unwrap_err(), ValidationError::MissingLoader);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_durations_fail_before_loading() {
    setup();

    let cases = [
        (
            CacheConfig {
                ttl: Some(DurationSetting::Millis(-5.0)),
                ..Default::default()
            },
            ValidationError::InvalidTtl("-5".into()),
        ),
        (
            CacheConfig {
                ttl: Some(DurationSetting::Text("soon".into())),
                ..Default::default()
            },
            ValidationError::InvalidTtl("\"soon\"".into()),
        ),
        (
            CacheConfig {
                timeout: Some(DurationSetting::Millis(f64::NAN)),
                ..Default::default()
            },
            ValidationError::InvalidTimeout("NaN".into()),
        ),
        (
            CacheConfig {
                timeout: Some(DurationSetting::Text("-3s".into())),
                ..Default::default()
            },
            ValidationError::InvalidTimeout("\"-3s\"".into()),
        ),
    ];

    for (config, expected) in cases {
        let (loader, calls) = numbered_loader(|_| false);
        let result = CacheBuilder::new().config(config).loader(loader).build();
        assert_eq!(result.unwrap_err(), expected);

        time::sleep(Duration::from_secs(600)).await;
        assert_eq!(calls.get(), 0);
    }
}

#[tokio::test(start_paused = true)]
async fn test_valid_durations() {
    setup();

    let settings = [
        (DurationSetting::Millis(0.0), DurationSetting::Millis(0.0)),
        (DurationSetting::Millis(250.0), DurationSetting::Millis(1.5)),
        (
            DurationSetting::Text("2m".into()),
            DurationSetting::Text("500ms".into()),
        ),
    ];

    for (ttl, timeout) in settings {
        let (loader, _calls) = numbered_loader(|_| false);
        let config = CacheConfig {
            ttl: Some(ttl),
            timeout: Some(timeout),
            ..Default::default()
        };

        let cache = CacheBuilder::new().config(config).loader(loader).build();
        assert!(cache.is_ok());
    }
}

#[tokio::test(start_paused = true)]
async fn test_build_from_yaml() {
    setup();

    let config = CacheConfig::from_yaml_str("name: listings\nttl: 2s\ntimeout: 0\n").unwrap();
    let (loader, calls) = numbered_loader(|_| false);
    let cache = CacheBuilder::new().config(config).loader(loader).build().unwrap();

    assert_eq!(cache.name(), "listings");
    assert_eq!(cache.ttl(), Duration::from_secs(2));
    assert_eq!(cache.timeout(), None);

    assert_eq!(*cache.value().await.unwrap(), 1);
    time::sleep(Duration::from_millis(4500)).await;
    assert_eq!(calls.get(), 3);
}
