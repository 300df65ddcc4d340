//! Proxy reconciliation tests

use stackpilot::deploy::proxy::{ProxyChange, ProxyReconciler};

use crate::common::MemoryProxies;

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let proxies = MemoryProxies::new();
    let reconciler = ProxyReconciler::new(proxies.clone());

    let first = reconciler.reconcile("api-shop", "api.shop:3000").await.unwrap();
    let second = reconciler.reconcile("api-shop", "api.shop:3000").await.unwrap();

    assert_eq!(first.change, ProxyChange::Created);
    assert_eq!(first.url.as_deref(), Some("https://api-shop.example.com"));
    assert_eq!(second.change, ProxyChange::Unchanged);
    assert_eq!(second.url.as_deref(), Some("https://api-shop.example.com"));
    assert_eq!(proxies.counts(), (1, 0, 0));
}

#[tokio::test]
async fn test_changed_target_updates_in_place() {
    let proxies = MemoryProxies::new();
    proxies.insert("api-shop", "api.shop:3000");
    let reconciler = ProxyReconciler::new(proxies.clone());

    let outcome = reconciler.reconcile("api-shop", "api.shop:8080").await.unwrap();

    assert_eq!(outcome.change, ProxyChange::Updated);
    assert_eq!(proxies.counts(), (0, 1, 0));
    let entries = proxies.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, "1");
    assert_eq!(entries[0].target, "api.shop:8080");
}

#[tokio::test]
async fn test_lookup_ignores_partial_matches() {
    let proxies = MemoryProxies::new();
    // The registrar lookup would also answer this one for "api-shop"
    proxies.insert("api-shop-admin", "admin.shop:80");
    let reconciler = ProxyReconciler::new(proxies.clone());

    let outcome = reconciler.reconcile("api-shop", "api.shop:3000").await.unwrap();

    assert_eq!(outcome.change, ProxyChange::Created);
    assert_eq!(proxies.entries().len(), 2);
    assert_eq!(proxies.counts(), (1, 0, 0));
}

#[tokio::test]
async fn test_remove_deletes_only_exact_subdomain() {
    let proxies = MemoryProxies::new();
    proxies.insert("web-shop", "web.shop:80");
    proxies.insert("web-shop-admin", "admin.shop:80");
    let reconciler = ProxyReconciler::new(proxies.clone());

    assert_eq!(reconciler.remove("web-shop").await.unwrap(), 1);
    assert_eq!(reconciler.remove("web-shop").await.unwrap(), 0);

    let entries = proxies.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].subdomain, "web-shop-admin");
}
