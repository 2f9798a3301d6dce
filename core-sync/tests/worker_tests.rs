//! Worker behaviour: time limits, recovery, concurrency.

mod common;

use async_trait::async_trait;
use bridge_traits::background::{JobLimits, RunBudget};
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{FetchOptions, HttpClient, HttpRequest, HttpResponse};
use bytes::Bytes;
use common::{macho_zip, FakeCatalog, FakeFactory, Harness};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Serves the archive after a delay and tracks overlapping downloads.
struct SlowHttp {
    delay: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl SlowHttp {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl HttpClient for SlowHttp {
    async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
        Err(BridgeError::NotAvailable("not used".into()))
    }

    async fn download(&self, _url: &str, _options: FetchOptions) -> BridgeResult<Bytes> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(macho_zip())
    }
}

fn many_builds(count: usize) -> FakeCatalog {
    let ids: Vec<String> = (0..count).map(|i| (100 + i).to_string()).collect();
    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    FakeCatalog::new().with_app("app1", "Example", &refs)
}

#[tokio::test]
async fn test_task_time_limit_is_retryable_failure() {
    let factory = FakeFactory::new().with_catalog("tok-1", many_builds(1));
    let http = Arc::new(SlowHttp::new(Duration::from_secs(2)));
    let h = Harness::with_task_time_limit(factory, http, Duration::from_millis(50)).await;
    h.add_project("p1", "tok-1").await;

    h.orchestrator.run(&RunBudget::unbounded()).await.unwrap();
    let drain = h.worker.drain(&RunBudget::unbounded()).await.unwrap();

    assert_eq!(drain.claimed, 1);
    assert_eq!(drain.retrying, 1);
    let task = h.queue.stats().await.unwrap();
    assert_eq!(task.pending, 1);
}

#[tokio::test]
async fn test_drain_respects_concurrency() {
    let factory = FakeFactory::new().with_catalog("tok-1", many_builds(8));
    let http = Arc::new(SlowHttp::new(Duration::from_millis(50)));
    let h = Harness::new(factory, http.clone()).await;
    h.add_project("p1", "tok-1").await;

    h.orchestrator.run(&RunBudget::unbounded()).await.unwrap();
    let drain = h.worker.drain(&RunBudget::unbounded()).await.unwrap();

    assert_eq!(drain.registered, 8);
    assert!(http.peak.load(Ordering::SeqCst) <= 4);
    assert!(h.queue.stats().await.unwrap().is_idle());
}

#[tokio::test]
async fn test_soft_limit_stops_claiming() {
    let factory = FakeFactory::new().with_catalog("tok-1", many_builds(3));
    let http = Arc::new(SlowHttp::new(Duration::from_millis(10)));
    let h = Harness::new(factory, http).await;
    h.add_project("p1", "tok-1").await;
    h.orchestrator.run(&RunBudget::unbounded()).await.unwrap();

    let exhausted = RunBudget::start(JobLimits::new(Duration::ZERO, Duration::from_secs(1)));
    let drain = h.worker.drain(&exhausted).await.unwrap();

    assert!(drain.interrupted);
    assert_eq!(drain.claimed, 0);
    assert_eq!(h.queue.stats().await.unwrap().pending, 3);
}

#[tokio::test]
async fn test_recover_requeues_abandoned_tasks() {
    let factory = FakeFactory::new().with_catalog("tok-1", many_builds(2));
    let http = Arc::new(SlowHttp::new(Duration::from_millis(1)));
    let h = Harness::new(factory, http).await;
    h.add_project("p1", "tok-1").await;
    h.orchestrator.run(&RunBudget::unbounded()).await.unwrap();

    // A crashed worker claimed a task and never reported back.
    h.queue.dequeue().await.unwrap().unwrap();

    assert_eq!(h.worker.recover().await.unwrap(), 1);
    let drain = h.worker.drain(&RunBudget::unbounded()).await.unwrap();
    assert_eq!(drain.registered, 2);
}

#[tokio::test]
async fn test_drain_does_not_claim_after_waiting_past_soft_limit() {
    let factory = FakeFactory::new().with_catalog("tok-1", many_builds(2));
    let http = Arc::new(SlowHttp::new(Duration::from_millis(200)));
    let h = Harness::with_worker(factory, http, Duration::from_millis(250), 1).await;
    h.add_project("p1", "tok-1").await;
    h.orchestrator.run(&RunBudget::unbounded()).await.unwrap();

    // Run the drain under its hard limit the way the scheduler does.
    let limits = JobLimits::new(Duration::from_millis(50), Duration::from_millis(350));
    let drain = tokio::time::timeout(limits.hard_limit, h.worker.drain(&RunBudget::start(limits)))
        .await
        .expect("drain finished within the hard limit")
        .unwrap();

    assert_eq!(drain.claimed, 1);
    assert!(drain.interrupted);
    let stats = h.queue.stats().await.unwrap();
    assert_eq!(stats.processing, 0);
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.completed, 1);

    let next = h.worker.drain(&RunBudget::unbounded()).await.unwrap();
    assert_eq!(next.registered, 1);
    assert!(h.queue.stats().await.unwrap().is_idle());
}

#[tokio::test]
async fn test_drain_requeues_claims_older_than_task_limit() {
    let factory = FakeFactory::new().with_catalog("tok-1", many_builds(2));
    let http = Arc::new(SlowHttp::new(Duration::from_millis(1)));
    let h = Harness::with_task_time_limit(factory, http, Duration::from_millis(100)).await;
    h.add_project("p1", "tok-1").await;
    h.orchestrator.run(&RunBudget::unbounded()).await.unwrap();

    // A dropped drain left this claim behind in the same process.
    h.queue.dequeue().await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    let drain = h.worker.drain(&RunBudget::unbounded()).await.unwrap();
    assert_eq!(drain.registered, 2);
    let stats = h.queue.stats().await.unwrap();
    assert_eq!(stats.processing, 0);
    assert_eq!(stats.completed, 2);
}
