//! Management service bootstrap tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use stackpilot::deploy::bootstrap::{ensure_service, Options};
use stackpilot::errors::PilotError;
use stackpilot::storage::profiles::ServiceSettings;

use crate::common::{no_wait, FakeRuntime, MemoryStore};

fn settings() -> ServiceSettings {
    ServiceSettings {
        image: Some("stackpilot/service:1".to_string()),
        proxy_host: Some("example.com".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_healthy_service_is_left_alone() {
    let store = MemoryStore::new();
    let runtime = FakeRuntime::new();

    ensure_service(&Options::default(), store.as_ref(), runtime.as_ref(), &settings(), no_wait)
        .await
        .unwrap();

    assert!(runtime.names().is_empty());
}

#[tokio::test]
async fn test_down_without_image_is_unavailable() {
    let store = MemoryStore::new();
    store.take_down();
    let runtime = FakeRuntime::new();

    let result = ensure_service(
        &Options::default(),
        store.as_ref(),
        runtime.as_ref(),
        &ServiceSettings::default(),
        no_wait,
    )
    .await;

    assert!(matches!(result, Err(PilotError::ServiceUnavailable(_))));
    assert!(runtime.names().is_empty());
}

#[tokio::test]
async fn test_starts_service_and_waits_until_ready() {
    let store = MemoryStore::new();
    // Down at the first check and the first poll
    store.unhealthy_for(2);
    let runtime = FakeRuntime::new();
    let sleeps = AtomicUsize::new(0);

    ensure_service(&Options::default(), store.as_ref(), runtime.as_ref(), &settings(), |interval| {
        assert_eq!(interval, Duration::from_secs(5));
        sleeps.fetch_add(1, Ordering::SeqCst);
        std::future::ready(())
    })
    .await
    .unwrap();

    assert_eq!(sleeps.load(Ordering::SeqCst), 2);
    let service = runtime.container("stackpilot-service").unwrap();
    assert!(service.is_running());
    assert_eq!(service.image, "stackpilot/service:1");
    assert_eq!(service.networks, vec!["stackpilot-proxy".to_string()]);
    assert!(runtime.has_network("stackpilot-proxy"));
}

#[tokio::test]
async fn test_restarts_stopped_service_container() {
    let store = MemoryStore::new();
    store.unhealthy_for(1);
    let runtime = FakeRuntime::new();
    runtime.add_container("stackpilot-service", "", "exited");

    ensure_service(&Options::default(), store.as_ref(), runtime.as_ref(), &settings(), no_wait)
        .await
        .unwrap();

    assert_eq!(runtime.names(), vec!["stackpilot-service"]);
    assert!(runtime.container("stackpilot-service").unwrap().is_running());
}

#[tokio::test]
async fn test_gives_up_after_attempts() {
    let store = MemoryStore::new();
    store.take_down();
    let runtime = FakeRuntime::new();
    let options = Options {
        attempts: 2,
        interval: Duration::from_millis(1),
        ..Default::default()
    };

    let err = ensure_service(&options, store.as_ref(), runtime.as_ref(), &settings(), no_wait)
        .await
        .unwrap_err();

    assert!(matches!(err, PilotError::ServiceUnavailable(_)));
    assert!(err.to_string().contains("2 checks"));
}
