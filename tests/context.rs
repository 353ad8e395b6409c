use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use worklane::{
    Context, ContextManager, ContextValue, PoolConfig, TaskError, TaskPool, WorkItem,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deadline_is_honored_and_observed() {
    let mgr = ContextManager::default();
    let (seen_tx, seen_rx) = oneshot::channel::<Instant>();

    let started = Instant::now();
    let res = mgr
        .execute_with_timeout(&Context::background(), Duration::from_millis(50), |ctx| async move {
            let begun = Instant::now();
            while begun.elapsed() < Duration::from_millis(200) {
                if ctx.is_cancelled() {
                    let _ = seen_tx.send(Instant::now());
                    return Err(TaskError::Cancelled);
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            Ok("ok")
        })
        .await;
    let returned = started.elapsed();

    assert_eq!(res, Err(TaskError::DeadlineExceeded));
    assert!(returned >= Duration::from_millis(50), "returned after {returned:?}");
    assert!(returned < Duration::from_millis(120), "returned after {returned:?}");

    let seen = tokio::time::timeout(Duration::from_millis(200), seen_rx)
        .await
        .expect("operation never observed cancellation")
        .unwrap();
    let lag = seen.saturating_duration_since(started + Duration::from_millis(50));
    assert!(lag < Duration::from_millis(40), "observed {lag:?} after the deadline");
}

#[tokio::test]
async fn zero_deadline_never_starts_the_operation() {
    let mgr = ContextManager::default();
    let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    let res = mgr
        .execute_with_timeout(&Context::background(), Duration::ZERO, move |_ctx| async move {
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok::<(), TaskError>(())
        })
        .await;
    assert_eq!(res, Err(TaskError::DeadlineExceeded));
    assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
}

#[tokio::test]
async fn cancelling_a_parent_reaches_every_descendant() {
    let (parent, release) = Context::background().with_cancel();
    let child = parent.with_value("k", 1u8);
    let (grandchild, _g) = child.with_timeout(Duration::from_secs(60));

    release.release();
    release.release();
    assert!(child.is_cancelled());
    assert!(grandchild.is_cancelled());
    grandchild.cancelled().await;
}

fn rid(value: &str) -> [(&'static str, ContextValue); 1] {
    [("rid", Arc::new(value.to_string()) as ContextValue)]
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn values_follow_work_items_onto_the_pool() {
    let pool = TaskPool::new(PoolConfig {
        num_workers: 2,
        ..PoolConfig::default()
    })
    .unwrap();

    let ctx = Context::background().with_values(rid("r-1"));
    let sibling = ctx.with_values(rid("r-2"));

    let read = |parent: &Context| {
        let (tx, rx) = oneshot::channel::<Option<String>>();
        let item = WorkItem::new(0, tx, |ctx, tx| async move {
            let seen = ctx.value::<String>("rid").map(|v| v.as_ref().clone());
            let _ = tx.send(seen);
            Ok::<_, TaskError>(())
        })
        .with_context(parent.clone());
        pool.submit(item).unwrap();
        rx
    };

    assert_eq!(read(&ctx).await.unwrap().as_deref(), Some("r-1"));
    assert_eq!(read(&sibling).await.unwrap().as_deref(), Some("r-2"));
    assert_eq!(
        ctx.value::<String>("rid").as_deref().map(String::as_str),
        Some("r-1")
    );
    pool.shutdown().await;
}
