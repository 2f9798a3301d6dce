//! End-to-end tests: orchestrator run, queue drain, registration.

mod common;

use bridge_traits::background::{JobLimits, RunBudget};
use bridge_traits::catalog::CatalogBuild;
use bridge_traits::error::BridgeError;
use bridge_traits::http::HttpClient;
use bytes::Bytes;
use common::{macho_zip, FakeCatalog, FakeFactory, Harness, MockHttp};
use core_registry::{ApplicationRepository, BundleRepository, ProjectId};
use core_sync::{AppRef, BuildTaskStatus, FetchBuildRequest, FetchOutcome};
use std::sync::Arc;
use std::time::Duration;

fn http_serving_archive(times: usize) -> Arc<dyn HttpClient> {
    let mut http = MockHttp::new();
    http.expect_download()
        .withf(|url, options| {
            url.starts_with("https://cdn.example.com/") && options.timeout == Duration::from_secs(120)
        })
        .times(times)
        .returning(|_, _| Ok(macho_zip()));
    Arc::new(http)
}

#[tokio::test]
async fn test_sync_then_drain_registers_build() {
    let factory = FakeFactory::new().with_catalog("tok-1", FakeCatalog::new().with_app("app1", "Example", &["100"]));
    let h = Harness::new(factory, http_serving_archive(1)).await;
    h.add_project("p1", "tok-1").await;

    let report = h.orchestrator.run(&RunBudget::unbounded()).await.unwrap();
    assert_eq!(report.projects_seen, 1);
    assert_eq!(report.projects_synced, 1);
    assert_eq!(report.applications_upserted, 1);
    assert_eq!(report.builds_dispatched, 1);
    assert!(!report.interrupted);

    let drain = h.worker.drain(&RunBudget::unbounded()).await.unwrap();
    assert_eq!(drain.claimed, 1);
    assert_eq!(drain.registered, 1);

    let app = h
        .applications
        .find_by_remote_id(&ProjectId::from("p1"), "app1")
        .await
        .unwrap()
        .unwrap();
    let bundle = h.bundles.find(&app.id, "100").await.unwrap().unwrap();
    assert_eq!(bundle.version, "1.0");
    assert_eq!(bundle.platform, "ios");

    let files = h.bundles.files_for(&bundle.id).await.unwrap();
    assert_eq!(files.len(), 1);
    assert!(files[0].path.starts_with(h.store_dir("p1")));
    assert!(h.spool_is_empty());
}

#[tokio::test]
async fn test_repeated_runs_are_idempotent() {
    let factory = FakeFactory::new().with_catalog("tok-1", FakeCatalog::new().with_app("app1", "Example", &["100"]));
    // The archive is downloaded exactly once across both cycles.
    let h = Harness::new(factory, http_serving_archive(1)).await;
    h.add_project("p1", "tok-1").await;

    h.orchestrator.run(&RunBudget::unbounded()).await.unwrap();
    h.worker.drain(&RunBudget::unbounded()).await.unwrap();
    let tasks_after_first = h.queue.stats().await.unwrap().total();

    let second = h.orchestrator.run(&RunBudget::unbounded()).await.unwrap();
    assert_eq!(second.applications_upserted, 1);
    assert_eq!(second.builds_dispatched, 0);
    assert_eq!(second.builds_already_synced, 1);

    let drain = h.worker.drain(&RunBudget::unbounded()).await.unwrap();
    assert_eq!(drain.claimed, 0);
    assert_eq!(h.queue.stats().await.unwrap().total(), tasks_after_first);

    let apps = h
        .applications
        .list_for_project(&ProjectId::from("p1"))
        .await
        .unwrap();
    assert_eq!(apps.len(), 1);
    assert_eq!(h.bundles.count_for_application(&apps[0].id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_repeated_runs_do_not_duplicate_pending_tasks() {
    let factory = FakeFactory::new().with_catalog(
        "tok-1",
        FakeCatalog::new().with_app("app1", "Example", &["100", "101"]),
    );
    let h = Harness::new(factory, Arc::new(MockHttp::new())).await;
    h.add_project("p1", "tok-1").await;

    let first = h.orchestrator.run(&RunBudget::unbounded()).await.unwrap();
    let second = h.orchestrator.run(&RunBudget::unbounded()).await.unwrap();

    assert_eq!(first.builds_dispatched, 2);
    assert_eq!(second.builds_dispatched, 0);
    assert_eq!(second.builds_already_queued, 2);
    assert_eq!(h.queue.stats().await.unwrap().pending, 2);
}

#[tokio::test]
async fn test_misconfigured_project_is_skipped() {
    let factory = FakeFactory::new().with_catalog("tok-2", FakeCatalog::new().with_app("app2", "Other", &["7"]));
    let h = Harness::new(factory, Arc::new(MockHttp::new())).await;
    // Enabled, but without a token.
    h.add_project("p1", "").await;
    h.add_project("p2", "tok-2").await;

    let report = h.orchestrator.run(&RunBudget::unbounded()).await.unwrap();
    assert_eq!(report.projects_seen, 2);
    assert_eq!(report.projects_skipped, 1);
    assert_eq!(report.projects_synced, 1);
    assert_eq!(report.builds_dispatched, 1);
}

#[tokio::test]
async fn test_failing_project_does_not_stop_others() {
    let factory = FakeFactory::new()
        .with_catalog("tok-1", FakeCatalog::new().failing_with(503))
        .with_catalog("tok-2", FakeCatalog::new().with_app("app2", "Other", &["7", "8"]));
    let h = Harness::new(factory, Arc::new(MockHttp::new())).await;
    h.add_project("p1", "tok-1").await;
    h.add_project("p2", "tok-2").await;

    let report = h.orchestrator.run(&RunBudget::unbounded()).await.unwrap();
    assert_eq!(report.projects_failed, 1);
    assert_eq!(report.projects_synced, 1);
    assert_eq!(report.builds_dispatched, 2);
}

#[tokio::test]
async fn test_rejected_credentials_skip_project() {
    let factory = FakeFactory::new().with_catalog("tok-1", FakeCatalog::new().failing_with(401));
    let h = Harness::new(factory, Arc::new(MockHttp::new())).await;
    h.add_project("p1", "tok-1").await;

    let report = h.orchestrator.run(&RunBudget::unbounded()).await.unwrap();
    assert_eq!(report.projects_skipped, 1);
    assert_eq!(report.projects_failed, 0);
}

#[tokio::test]
async fn test_soft_limit_stops_new_projects() {
    let factory = FakeFactory::new()
        .with_catalog(
            "tok-1",
            FakeCatalog::new()
                .with_app("app1", "Example", &["100"])
                .with_listing_delay(Duration::from_millis(200)),
        )
        .with_catalog("tok-2", FakeCatalog::new().with_app("app2", "Other", &["7"]));
    let h = Harness::new(factory, Arc::new(MockHttp::new())).await;
    h.add_project("p1", "tok-1").await;
    h.add_project("p2", "tok-2").await;

    let budget = RunBudget::start(JobLimits::new(
        Duration::from_millis(100),
        Duration::from_secs(5),
    ));
    let report = h.orchestrator.run(&budget).await.unwrap();

    assert!(report.interrupted);
    assert_eq!(report.projects_seen, 2);
    assert_eq!(report.projects_synced, 0);
    // Nothing was started for the second project.
    let p2_apps = h
        .applications
        .list_for_project(&ProjectId::from("p2"))
        .await
        .unwrap();
    assert!(p2_apps.is_empty());
}

#[tokio::test]
async fn test_invalid_archive_fails_task_permanently() {
    let factory = FakeFactory::new().with_catalog("tok-1", FakeCatalog::new().with_app("app1", "Example", &["100"]));
    let mut http = MockHttp::new();
    http.expect_download()
        .times(1)
        .returning(|_, _| Ok(Bytes::from_static(b"<html>maintenance</html>")));
    let h = Harness::new(factory, Arc::new(http)).await;
    h.add_project("p1", "tok-1").await;

    h.orchestrator.run(&RunBudget::unbounded()).await.unwrap();
    let drain = h.worker.drain(&RunBudget::unbounded()).await.unwrap();
    assert_eq!(drain.failed, 1);
    assert_eq!(drain.retrying, 0);

    let failed = h.queue.get_failed_tasks().await.unwrap();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].error_message.as_deref().unwrap_or("").contains("format"));

    let app = h
        .applications
        .find_by_remote_id(&ProjectId::from("p1"), "app1")
        .await
        .unwrap()
        .unwrap();
    assert!(!h.bundles.exists(&app.id, "100").await.unwrap());
    assert!(h.spool_is_empty());
}

#[tokio::test]
async fn test_transport_failure_is_retried() {
    let factory = FakeFactory::new().with_catalog("tok-1", FakeCatalog::new().with_app("app1", "Example", &["100"]));
    let mut http = MockHttp::new();
    http.expect_download()
        .times(1)
        .returning(|_, _| Err(BridgeError::OperationFailed("connection reset".into())));
    let h = Harness::new(factory, Arc::new(http)).await;
    h.add_project("p1", "tok-1").await;

    h.orchestrator.run(&RunBudget::unbounded()).await.unwrap();
    let drain = h.worker.drain(&RunBudget::unbounded()).await.unwrap();
    assert_eq!(drain.retrying, 1);

    let stats = h.queue.stats().await.unwrap();
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.failed, 0);
}

#[tokio::test]
async fn test_missing_application_fails_task() {
    let h = Harness::new(FakeFactory::new(), Arc::new(MockHttp::new())).await;
    h.add_project("p1", "tok-1").await;

    let request = FetchBuildRequest {
        project_id: ProjectId::from("p1"),
        app: AppRef {
            remote_app_id: "ghost".to_string(),
            name: "Ghost".to_string(),
        },
        build: CatalogBuild::new("1", "1.0", "ios"),
    };
    h.queue.enqueue(&request).await.unwrap();

    let drain = h.worker.drain(&RunBudget::unbounded()).await.unwrap();
    assert_eq!(drain.failed, 1);
    let failed = h.queue.get_failed_tasks().await.unwrap();
    assert_eq!(failed[0].status, BuildTaskStatus::Failed);
}

#[tokio::test]
async fn test_concurrent_fetches_register_once() {
    let factory = FakeFactory::new().with_catalog("tok-1", FakeCatalog::new().with_app("app1", "Example", &["100"]));
    let mut http = MockHttp::new();
    http.expect_download().returning(|_, _| Ok(macho_zip()));
    let h = Harness::new(factory, Arc::new(http)).await;
    h.add_project("p1", "tok-1").await;
    h.orchestrator.run(&RunBudget::unbounded()).await.unwrap();

    let request = FetchBuildRequest {
        project_id: ProjectId::from("p1"),
        app: AppRef {
            remote_app_id: "app1".to_string(),
            name: "Example".to_string(),
        },
        build: CatalogBuild::new("100", "1.0", "ios"),
    };

    let (a, b) = tokio::join!(
        h.fetcher.fetch_build(&request),
        h.fetcher.fetch_build(&request)
    );
    let outcomes = [a.unwrap(), b.unwrap()];
    let registered = outcomes
        .iter()
        .filter(|o| matches!(o, FetchOutcome::Registered { .. }))
        .count();
    assert_eq!(registered, 1);

    let app = h
        .applications
        .find_by_remote_id(&ProjectId::from("p1"), "app1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(h.bundles.count_for_application(&app.id).await.unwrap(), 1);
    // The losing fetch removed its copies.
    assert_eq!(std::fs::read_dir(h.store_dir("p1")).unwrap().count(), 1);
}
