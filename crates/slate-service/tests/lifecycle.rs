//! End-to-end lifecycle tests over a fully wired service context.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use slate_engine::stub::StubFactory;
use slate_service::{ServiceConfig, ServiceContext, ServiceError};
use slate_state::{RedbTaskStore, TaskStatus};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

fn test_context(config: ServiceConfig) -> (Arc<ServiceContext>, Arc<StubFactory>) {
    init_logging();
    let factory = Arc::new(StubFactory::new());
    let store = Arc::new(RedbTaskStore::open_in_memory().unwrap());
    let ctx = ServiceContext::new(factory.clone(), store, config);
    (ctx, factory)
}

/// Poll until `check` passes or the timeout elapses.
async fn wait_for<F>(mut check: F, what: &str)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn task_status(ctx: &ServiceContext, task_id: &str) -> TaskStatus {
    ctx.task(task_id).unwrap().unwrap().status
}

#[tokio::test]
async fn submitted_task_runs_to_success() {
    let (ctx, _factory) = test_context(ServiceConfig::default());

    let task_id = ctx.submit("SELECT 1").await.unwrap();
    wait_for(
        || task_status(&ctx, &task_id) == TaskStatus::Success,
        "task success",
    )
    .await;

    let record = ctx.task(&task_id).unwrap().unwrap();
    assert_eq!(record.query, "SELECT 1");
    assert!(record.started_at.is_some());
    assert!(record.completed_at.is_some());
    assert!(record.execution_time_ms.is_some());
    let result = record.result_info.unwrap();
    assert_eq!(result.row_count, 1);

    // The worker released its connection and unregistered its query.
    assert_eq!(ctx.active_queries().len(), 0);
    assert_eq!(ctx.pool_stats().busy, 0);

    ctx.shutdown().await;
}

#[tokio::test]
async fn cancel_mid_execution_lands_in_cancelled() {
    let (ctx, factory) = test_context(ServiceConfig::default());
    factory.profile().block_execute.store(true, Ordering::SeqCst);

    let task_id = ctx.submit("SELECT long_running()").await.unwrap();

    // Wait until the task is executing and its connection is registered.
    wait_for(
        || ctx.registry().active_count() == 1,
        "task registration",
    )
    .await;
    assert_eq!(task_status(&ctx, &task_id), TaskStatus::Running);

    assert!(ctx.cancel(&task_id, "user requested").await.unwrap());
    wait_for(
        || task_status(&ctx, &task_id) == TaskStatus::Cancelled,
        "task cancellation",
    )
    .await;

    let record = ctx.task(&task_id).unwrap().unwrap();
    assert_eq!(record.cancel_reason.as_deref(), Some("user requested"));
    assert!(record.execution_time_ms.is_some());

    // A late completion attempt must not overwrite the cancellation.
    let late = ctx
        .manager()
        .complete(
            &task_id,
            slate_engine::QueryOutput {
                columns: vec![],
                row_count: 0,
            },
        )
        .await
        .unwrap();
    assert!(!late);
    assert_eq!(task_status(&ctx, &task_id), TaskStatus::Cancelled);

    ctx.shutdown().await;
}

#[tokio::test]
async fn sync_query_interrupted_via_registry() {
    let (ctx, factory) = test_context(ServiceConfig::default());
    factory.profile().block_execute.store(true, Ordering::SeqCst);

    let runner = {
        let ctx = ctx.clone();
        tokio::spawn(async move { ctx.execute_query("q-interactive", "SELECT slow()").await })
    };

    wait_for(|| ctx.registry().active_count() == 1, "query registration").await;
    assert!(ctx.registry().interrupt("q-interactive").unwrap());

    let result = runner.await.unwrap();
    assert!(matches!(result, Err(ServiceError::Interrupted)));

    // The interrupted connection went back to the pool healthy.
    let stats = ctx.pool_stats();
    assert_eq!(stats.busy, 0);
    assert_eq!(stats.idle, 1);
    assert_eq!(ctx.active_queries().len(), 0);

    ctx.shutdown().await;
}

#[tokio::test]
async fn engine_failure_fails_task_and_quarantines_connection() {
    let (ctx, factory) = test_context(ServiceConfig::default());
    factory.profile().fail_execute.store(true, Ordering::SeqCst);

    let task_id = ctx.submit("SELECT broken()").await.unwrap();
    wait_for(
        || task_status(&ctx, &task_id) == TaskStatus::Failed,
        "task failure",
    )
    .await;

    let record = ctx.task(&task_id).unwrap().unwrap();
    assert!(record.error_message.is_some());
    assert!(record.result_info.is_none());
    assert!(ctx.pool_stats().errors >= 1);

    ctx.shutdown().await;
}

#[tokio::test]
async fn cancel_unknown_task_reports_not_found() {
    let (ctx, _factory) = test_context(ServiceConfig::default());
    assert!(!ctx.cancel("task-never-existed", "whatever").await.unwrap());
    ctx.shutdown().await;
}

#[tokio::test]
async fn cancel_completed_task_is_refused() {
    let (ctx, _factory) = test_context(ServiceConfig::default());

    let task_id = ctx.submit("SELECT 1").await.unwrap();
    wait_for(
        || task_status(&ctx, &task_id) == TaskStatus::Success,
        "task success",
    )
    .await;

    assert!(!ctx.cancel(&task_id, "too late").await.unwrap());
    assert_eq!(task_status(&ctx, &task_id), TaskStatus::Success);

    ctx.shutdown().await;
}

#[tokio::test]
async fn concurrent_submissions_share_bounded_pool() {
    let mut config = ServiceConfig::default();
    config.pool.max_connections = 2;
    let (ctx, _factory) = test_context(config);

    let mut task_ids = Vec::new();
    for i in 0..6 {
        task_ids.push(ctx.submit(&format!("SELECT {i}")).await.unwrap());
    }
    for task_id in &task_ids {
        wait_for(
            || task_status(&ctx, task_id) == TaskStatus::Success,
            "all tasks succeed",
        )
        .await;
    }

    let stats = ctx.pool_stats();
    assert!(stats.created <= 2, "pool overshot its bound: {stats:?}");
    assert_eq!(stats.busy, 0);

    ctx.shutdown().await;
}

#[tokio::test]
async fn task_list_surfaces_submissions() {
    let (ctx, _factory) = test_context(ServiceConfig::default());

    let a = ctx.submit("SELECT 'a'").await.unwrap();
    let b = ctx.submit("SELECT 'b'").await.unwrap();
    for task_id in [&a, &b] {
        wait_for(
            || task_status(&ctx, task_id) == TaskStatus::Success,
            "tasks finish",
        )
        .await;
    }

    let tasks = ctx.tasks(10).unwrap();
    assert_eq!(tasks.len(), 2);

    ctx.shutdown().await;
}

#[tokio::test]
async fn background_loops_start_once_and_stop() {
    let (ctx, _factory) = test_context(ServiceConfig::default());

    ctx.start_background();
    // Second call is a guarded no-op.
    ctx.start_background();

    // Warm-up honored the configured minimum.
    assert_eq!(ctx.pool_stats().idle as u32, ctx.pool().config().min_connections);

    ctx.shutdown().await;
    assert_eq!(ctx.pool_stats().total, 0);
}

#[tokio::test]
async fn pool_exhaustion_surfaces_as_retryable_error() {
    let mut config = ServiceConfig::default();
    config.pool.max_connections = 1;
    config.pool.connection_timeout_ms = 50;
    let (ctx, factory) = test_context(config);
    factory.profile().block_execute.store(true, Ordering::SeqCst);

    let task_id = ctx.submit("SELECT slow()").await.unwrap();
    wait_for(|| ctx.registry().active_count() == 1, "task holds the pool").await;

    let err = ctx.execute_query("q-starved", "SELECT 1").await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Pool(slate_pool::PoolError::Exhausted(_))
    ));

    // Free the pool by cancelling the hog.
    ctx.cancel(&task_id, "cleanup").await.unwrap();
    wait_for(
        || task_status(&ctx, &task_id) == TaskStatus::Cancelled,
        "hog cancelled",
    )
    .await;

    factory.profile().block_execute.store(false, Ordering::SeqCst);
    let output = ctx.execute_query("q-after", "SELECT 1").await.unwrap();
    assert_eq!(output.row_count, 1);

    ctx.shutdown().await;
}
