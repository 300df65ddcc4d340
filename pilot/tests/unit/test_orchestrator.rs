//! Orchestrator tests

use std::sync::Arc;

use serde_json::json;
use stackpilot::catalog::Catalog;
use stackpilot::console::LoggerFactory;
use stackpilot::deploy::images::ImageManager;
use stackpilot::deploy::orchestrator::{DeploySettings, Deployer};
use stackpilot::deploy::pipeline::{self, PipelineContext};
use stackpilot::deploy::proxy::ProxyReconciler;
use stackpilot::deploy::rollback::RollbackCoordinator;
use stackpilot::deploy::status::StatusReporter;
use stackpilot::http::deployments::DeploymentStore;
use stackpilot::models::deployment::{DeploymentStatus, NewDeployment, ResourceRecord, ResourceStatus};
use stackpilot::models::resource::ResourceExtra;
use tempfile::TempDir;

use crate::common::{self, FakeRuntime, MemoryProxies, MemoryStore, ScriptedConfirm};

struct Harness {
    runtime: Arc<FakeRuntime>,
    store: Arc<MemoryStore>,
    proxies: Arc<MemoryProxies>,
    confirm: Arc<ScriptedConfirm>,
    dir: TempDir,
}

impl Harness {
    fn new(answers: &[bool]) -> Self {
        Self {
            runtime: FakeRuntime::new(),
            store: MemoryStore::new(),
            proxies: MemoryProxies::new(),
            confirm: ScriptedConfirm::new(answers),
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn deployer(&self) -> Deployer {
        Deployer::new(
            self.runtime.clone(),
            self.store.clone(),
            ProxyReconciler::new(self.proxies.clone()),
            self.confirm.clone(),
        )
        .with_templates(common::templates())
    }

    fn catalog(&self, yaml: &str) -> Catalog {
        common::catalog(self.dir.path(), yaml)
    }
}

fn record<'a>(records: &'a [ResourceRecord], name: &str) -> &'a ResourceRecord {
    records
        .iter()
        .find(|r| r.name == name)
        .unwrap_or_else(|| panic!("no record for {}", name))
}

fn names(selected: &[&str]) -> Vec<String> {
    selected.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_subset_deploy_skips_the_rest() {
    let h = Harness::new(&[]);
    let mut db_extra = ResourceExtra {
        hostname: Some("db.shop".to_string()),
        ..Default::default()
    };
    db_extra.other.insert("owner".to_string(), json!("data-team"));
    h.store.seed(
        "shop",
        &[("api", "2", ResourceExtra::default()), ("db", "1", db_extra.clone())],
    );
    h.runtime.add_container("api-shop-2", "shop", "running");
    h.runtime.add_container("db-shop-1", "shop", "running");

    let catalog = h.catalog(&common::static_stack(&["api", "db"]));
    let outcome = h.deployer().deploy(catalog, &names(&["api"])).await.unwrap();

    assert!(outcome.succeeded());
    let latest = h.store.latest();
    assert_eq!(latest.status, DeploymentStatus::Success);

    let api = record(&latest.resources, "api");
    assert_eq!(api.version, "3");
    assert_eq!(api.status, ResourceStatus::Success);
    assert_eq!(api.extra.hostname.as_deref(), Some("api.shop"));

    let db = record(&latest.resources, "db");
    assert_eq!(db.version, "1");
    assert_eq!(db.status, ResourceStatus::Skipped);
    assert_eq!(db.extra, db_extra);

    assert!(h.runtime.container("api-shop-3").unwrap().is_running());
    assert!(!h.runtime.container("api-shop-2").unwrap().is_running());
    assert!(h.runtime.container("db-shop-1").unwrap().is_running());
    assert!(h.confirm.asked().is_empty());
}

#[tokio::test]
async fn test_version_is_past_store_and_live_containers() {
    let h = Harness::new(&[]);
    h.store.seed("shop", &[("api", "3", ResourceExtra::default())]);
    h.runtime.add_container("api-shop-5", "shop", "exited");

    let catalog = h.catalog(&common::static_stack(&["api"]));
    let outcome = h.deployer().deploy(catalog, &[]).await.unwrap();

    assert!(outcome.succeeded());
    assert_eq!(record(&outcome.deployment.resources, "api").version, "6");
    assert!(h.runtime.container("api-shop-6").unwrap().is_running());
}

#[tokio::test]
async fn test_redeploys_are_monotonic() {
    let h = Harness::new(&[]);
    let yaml = common::static_stack(&["api"]);

    for expected in ["1", "2", "3"] {
        let outcome = h.deployer().deploy(h.catalog(&yaml), &[]).await.unwrap();
        assert_eq!(record(&outcome.deployment.resources, "api").version, expected);
    }
    assert_eq!(h.runtime.names(), vec!["api-shop-1", "api-shop-2", "api-shop-3"]);
}

#[tokio::test]
async fn test_failed_build_rolls_back_every_resource() {
    let h = Harness::new(&[]);
    h.store.seed(
        "shop",
        &[("api", "1", ResourceExtra::default()), ("web", "1", ResourceExtra::default())],
    );
    h.runtime.add_container("api-shop-1", "shop", "running");
    h.runtime.add_container("web-shop-1", "shop", "running");
    h.runtime.fail_build_of("web-shop:");

    let catalog = h.catalog(&common::static_stack(&["api", "web"]));
    let outcome = h.deployer().deploy(catalog, &[]).await.unwrap();

    assert!(!outcome.succeeded());
    assert_eq!(outcome.failed, vec!["web".to_string()]);
    assert_eq!(outcome.rollback_failures, 0);

    assert!(h.runtime.container("api-shop-1").unwrap().is_running());
    assert!(h.runtime.container("web-shop-1").unwrap().is_running());
    assert!(h.runtime.container("api-shop-2").is_none());
    assert!(h.runtime.container("web-shop-2").is_none());

    let latest = h.store.latest();
    assert_eq!(latest.status, DeploymentStatus::Failed);
    let api = record(&latest.resources, "api");
    assert_eq!(api.status, ResourceStatus::Rollback);
    assert_eq!(api.extra.rollback_target.as_deref(), Some("api-shop-1"));
    let web = record(&latest.resources, "web");
    assert_eq!(web.status, ResourceStatus::Rollback);
    assert!(web.task_log.iter().any(|l| l.contains("missing entry point")));
}

#[tokio::test]
async fn test_failed_start_restores_previous_container() {
    let h = Harness::new(&[]);
    h.store.seed("shop", &[("api", "1", ResourceExtra::default())]);
    h.runtime.add_container("api-shop-1", "shop", "running");
    h.runtime.fail_start_of("api-shop-2");

    let catalog = h.catalog(&common::static_stack(&["api"]));
    let outcome = h.deployer().deploy(catalog, &[]).await.unwrap();

    assert_eq!(outcome.failed, vec!["api".to_string()]);
    assert_eq!(h.runtime.names(), vec!["api-shop-1"]);
    assert!(h.runtime.container("api-shop-1").unwrap().is_running());

    let api = record(&h.store.latest().resources, "api").clone();
    assert!(api.task_log.iter().any(|l| l.contains("port is already allocated")));
}

#[tokio::test]
async fn test_rename_inherits_history() {
    let h = Harness::new(&[true]);
    h.store.seed("shop", &[("web", "4", ResourceExtra::default())]);
    h.runtime.add_container("web-shop-4", "shop", "running");

    let catalog = h.catalog(&common::static_stack(&["site"]));
    let outcome = h.deployer().deploy(catalog, &[]).await.unwrap();

    assert!(outcome.succeeded());
    assert_eq!(h.confirm.asked().len(), 1);

    let latest = h.store.latest();
    assert_eq!(latest.resources.len(), 1);
    let site = record(&latest.resources, "site");
    assert_eq!(site.version, "5");
    assert_eq!(site.extra.renamed_from.as_deref(), Some("web"));

    // The old container is retired like any previous version
    assert!(!h.runtime.container("web-shop-4").unwrap().is_running());
    assert!(h.runtime.container("site-shop-5").unwrap().is_running());
}

#[tokio::test]
async fn test_declined_removal_is_carried_and_asked_again() {
    // First deploy declines; the second falls back to the default (yes)
    let h = Harness::new(&[false]);
    h.store.seed(
        "shop",
        &[("api", "1", ResourceExtra::default()), ("legacy", "7", ResourceExtra::default())],
    );
    h.runtime.add_container("legacy-shop-7", "shop", "running");
    let yaml = common::static_stack(&["api"]);

    h.deployer().deploy(h.catalog(&yaml), &[]).await.unwrap();

    let latest = h.store.latest();
    let legacy = record(&latest.resources, "legacy");
    assert_eq!(legacy.status, ResourceStatus::Skipped);
    assert_eq!(legacy.version, "7");
    assert!(h.runtime.container("legacy-shop-7").is_some());

    h.deployer().deploy(h.catalog(&yaml), &[]).await.unwrap();

    assert_eq!(h.confirm.asked().len(), 2);
    assert!(h.store.latest().resource("legacy").is_none());
    assert!(h.runtime.container("legacy-shop-7").is_none());
}

#[tokio::test]
async fn test_confirmed_removal_deletes_everything() {
    let h = Harness::new(&[]);
    h.store.seed(
        "shop",
        &[("api", "1", ResourceExtra::default()), ("legacy", "7", ResourceExtra::default())],
    );
    h.runtime.add_container("legacy-shop-6", "shop", "exited");
    h.runtime.add_container("legacy-shop-7", "shop", "running");
    h.proxies.insert("legacy-shop", "legacy.shop:80");

    let catalog = h.catalog(&common::static_stack(&["api"]));
    h.deployer().deploy(catalog, &[]).await.unwrap();

    assert_eq!(h.runtime.names(), vec!["api-shop-2"]);
    assert!(h.runtime.removed_images().contains(&"legacy-shop:7".to_string()));
    assert!(h.proxies.entries().is_empty());
}

#[tokio::test]
async fn test_unknown_selection_fails_before_side_effects() {
    let h = Harness::new(&[]);
    let catalog = h.catalog(&common::static_stack(&["api"]));

    let err = h.deployer().deploy(catalog, &names(&["nope"])).await.unwrap_err();

    assert!(err.is_config());
    assert!(err.to_string().contains("nope"));
    assert!(h.store.deployments().is_empty());
    assert!(h.runtime.names().is_empty());
}

#[tokio::test]
async fn test_concurrent_status_updates_are_not_lost() {
    let h = Harness::new(&[]);
    let resources: Vec<String> = (0..8).map(|i| format!("svc{}", i)).collect();
    let refs: Vec<&str> = resources.iter().map(String::as_str).collect();

    let catalog = h.catalog(&common::static_stack(&refs));
    let outcome = h.deployer().deploy(catalog, &[]).await.unwrap();
    assert!(outcome.succeeded());

    let latest = h.store.latest();
    assert_eq!(latest.resources.len(), 8);
    for record in &latest.resources {
        assert_eq!(record.status, ResourceStatus::Success, "{}", record.name);
        assert!(record.task_log.iter().any(|l| l.starts_with("COMPILED:")), "{}", record.name);
        assert!(record.task_log.iter().any(|l| l.starts_with("STARTED:")), "{}", record.name);
    }
    assert!(h.store.updates() > 8 * 4);
}

#[tokio::test]
async fn test_panicking_pipeline_counts_as_failure() {
    let h = Harness::new(&[]);
    let yaml = "name: shop\nresources:\n  api:\n    template: static\n  boom:\n    template: exploding\n";

    let outcome = h.deployer().deploy(h.catalog(yaml), &[]).await.unwrap();

    assert_eq!(outcome.failed, vec!["boom".to_string()]);
    let latest = h.store.latest();
    assert_eq!(latest.status, DeploymentStatus::Failed);
    let boom = record(&latest.resources, "boom");
    assert_eq!(boom.status, ResourceStatus::Rollback);
    assert!(boom.task_log.iter().any(|l| l.contains("panicked")));
    // api had no previous container; its new one is gone
    assert!(h.runtime.names().is_empty());
}

#[tokio::test]
async fn test_proxy_route_is_created_once() {
    let h = Harness::new(&[]);
    let yaml = "name: shop\nresources:\n  api:\n    template: static\n    proxy: true\n    spec:\n      port: 8080\n";
    let deployer = h.deployer().with_settings(DeploySettings {
        keep: 2,
        proxy_network: "edge".to_string(),
    });

    deployer.deploy(h.catalog(yaml), &[]).await.unwrap();
    let outcome = deployer.deploy(h.catalog(yaml), &[]).await.unwrap();

    assert_eq!(h.proxies.counts(), (1, 0, 0));
    let entries = h.proxies.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].target, "api.shop:8080");

    let api = record(&outcome.deployment.resources, "api");
    assert_eq!(api.version, "2");
    assert_eq!(api.extra.proxy_url.as_deref(), Some("https://api-shop.example.com"));
    assert!(h.runtime.has_network("edge"));
    assert!(h.runtime.container("api-shop-2").unwrap().networks.contains(&"edge".to_string()));
}

#[cfg(unix)]
#[tokio::test]
async fn test_task_resource_runs_without_container() {
    let h = Harness::new(&[]);
    let yaml = "name: shop\nresources:\n  migrate:\n    template: script\n    props:\n      command: echo migrated\n";

    let outcome = h.deployer().deploy(h.catalog(yaml), &[]).await.unwrap();

    assert!(outcome.succeeded());
    assert_eq!(record(&outcome.deployment.resources, "migrate").status, ResourceStatus::Success);
    assert!(h.runtime.names().is_empty());
    assert!(h.runtime.images().is_empty());
}

#[tokio::test]
async fn test_unrecorded_success_rolls_back_and_errors() {
    let h = Harness::new(&[]);
    h.store.seed("shop", &[("api", "1", ResourceExtra::default())]);
    h.runtime.add_container("api-shop-1", "shop", "running");
    h.store.reject_status_updates();

    let catalog = h.catalog(&common::static_stack(&["api"]));
    let err = h.deployer().deploy(catalog, &[]).await.unwrap_err();

    assert!(err.to_string().contains("final status"));
    assert_eq!(h.runtime.names(), vec!["api-shop-1"]);
    assert!(h.runtime.container("api-shop-1").unwrap().is_running());

    let latest = h.store.latest();
    assert_ne!(latest.status, DeploymentStatus::Success);
    let api = record(&latest.resources, "api");
    assert_eq!(api.status, ResourceStatus::Rollback);
    assert_eq!(api.extra.rollback_target.as_deref(), Some("api-shop-1"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_failed_pre_deploy_hook_rolls_back() {
    let h = Harness::new(&[]);
    h.store.seed("shop", &[("api", "1", ResourceExtra::default())]);
    h.runtime.add_container("api-shop-1", "shop", "running");
    let yaml = "name: shop\nresources:\n  api:\n    template: static\n    preDeploy: echo nope; exit 4\n";

    let outcome = h.deployer().deploy(h.catalog(yaml), &[]).await.unwrap();

    assert_eq!(outcome.failed, vec!["api".to_string()]);
    assert!(h.runtime.images().is_empty());
    assert_eq!(h.runtime.names(), vec!["api-shop-1"]);
    assert!(h.runtime.container("api-shop-1").unwrap().is_running());

    let latest = h.store.latest();
    assert_eq!(latest.status, DeploymentStatus::Failed);
    let api = record(&latest.resources, "api");
    assert_eq!(api.status, ResourceStatus::Rollback);
    let failure = api
        .task_log
        .iter()
        .find(|l| l.contains("Pre-deploy hook failed"))
        .expect("hook failure logged");
    assert!(failure.contains("exited with 4"));
    assert!(failure.contains("nope"));
}

#[tokio::test]
async fn test_failed_cleanup_does_not_abort_deploy() {
    let h = Harness::new(&[]);
    h.store.seed("shop", &[("api", "1", ResourceExtra::default())]);
    h.runtime.add_container("api-shop-1", "shop", "running");
    h.runtime.fail_stop_of("api-shop-1");

    let catalog = h.catalog(&common::static_stack(&["api"]));
    let outcome = h.deployer().deploy(catalog, &[]).await.unwrap();

    assert!(outcome.succeeded());
    assert!(h.runtime.container("api-shop-2").unwrap().is_running());
    // The stop failed, so the old version is still up
    assert!(h.runtime.container("api-shop-1").unwrap().is_running());

    let api = record(&h.store.latest().resources, "api").clone();
    assert_eq!(api.status, ResourceStatus::Success);
    assert!(!api.task_log.iter().any(|l| l.starts_with("CLEANUP:")));
    assert!(api.task_log.iter().any(|l| l.starts_with("STARTED:")));
}

#[tokio::test]
async fn test_rollback_keeps_container_sharing_the_new_name() {
    let h = Harness::new(&[]);
    h.runtime.add_container("api-shop-2", "shop", "running");

    let catalog = h.catalog(&common::static_stack(&["api"]));
    let mut resource = catalog.resources[0].clone();
    resource.version = 2;

    let store: Arc<dyn DeploymentStore> = h.store.clone();
    let request = NewDeployment {
        status: DeploymentStatus::Processing,
        resources: vec![ResourceRecord {
            name: "api".to_string(),
            version: "2".to_string(),
            status: ResourceStatus::Pending,
            extra: ResourceExtra::default(),
            task_log: Vec::new(),
        }],
    };
    let deployment = store.create("shop", &request).await.unwrap();

    let rollback = Arc::new(RollbackCoordinator::new());
    let ctx = PipelineContext {
        runtime: h.runtime.clone(),
        images: ImageManager::new(h.runtime.clone(), "edge"),
        proxies: ProxyReconciler::new(h.proxies.clone()),
        status: Arc::new(StatusReporter::new(store, deployment)),
        rollback: rollback.clone(),
        templates: common::templates(),
        loggers: LoggerFactory::new(),
        keep: 5,
    };

    // The name is taken, so the start stage fails
    let err = pipeline::run(ctx, resource).await.unwrap_err();
    assert!(err.to_string().contains("already in use"));

    assert_eq!(rollback.run().await, 0);
    assert_eq!(h.runtime.names(), vec!["api-shop-2"]);
    assert!(h.runtime.container("api-shop-2").unwrap().is_running());

    let api = record(&h.store.latest().resources, "api").clone();
    assert_eq!(api.status, ResourceStatus::Rollback);
    assert_eq!(api.extra.rollback_target.as_deref(), Some("api-shop-2"));
}
