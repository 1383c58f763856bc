// tests/work_queue.rs

mod common;
use crate::common::{init_tracing, with_timeout};

use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;

use patchrun::engine::WorkQueue;

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn items_run_in_arrival_order_one_at_a_time() -> TestResult {
    init_tracing();
    let queue = Arc::new(WorkQueue::new("order"));
    let cancel = CancellationToken::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    let running = Arc::new(AtomicUsize::new(0));
    let max_running = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for i in 0..5usize {
        let queue = Arc::clone(&queue);
        let cancel = cancel.clone();
        let order = Arc::clone(&order);
        let running = Arc::clone(&running);
        let max_running = Arc::clone(&max_running);
        handles.push(tokio::spawn(async move {
            queue
                .enqueue(&cancel, move |_| async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    max_running.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_millis(5)).await;
                    order.lock().unwrap().push(i);
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(i)
                })
                .await
        }));
        // Make arrival order deterministic.
        sleep(Duration::from_millis(1)).await;
    }

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(with_timeout(handle).await??, i);
    }
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    assert_eq!(max_running.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn item_cancelled_while_waiting_never_runs() -> TestResult {
    init_tracing();
    let queue = Arc::new(WorkQueue::new("skip"));
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let ran = Arc::new(AtomicUsize::new(0));

    // Occupy the worker.
    let blocker = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move {
            queue
                .enqueue(&CancellationToken::new(), move |_| async move {
                    let _ = release_rx.await;
                    Ok(())
                })
                .await
        })
    };
    sleep(Duration::from_millis(10)).await;

    let waiting_cancel = CancellationToken::new();
    let waiting = {
        let queue = Arc::clone(&queue);
        let ran = Arc::clone(&ran);
        let cancel = waiting_cancel.clone();
        tokio::spawn(async move {
            queue
                .enqueue(&cancel, move |_| async move {
                    ran.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
        })
    };
    sleep(Duration::from_millis(10)).await;

    waiting_cancel.cancel();
    let err = with_timeout(waiting).await?.unwrap_err();
    assert!(err.is_cancelled());

    let _ = release_tx.send(());
    with_timeout(blocker).await??;

    // Anything queued after the cancelled item still runs.
    queue
        .enqueue(&CancellationToken::new(), |_| async { Ok(()) })
        .await?;
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn running_item_sees_cancellation() -> TestResult {
    init_tracing();
    let queue = WorkQueue::new("running");
    let cancel = CancellationToken::new();
    let (seen_tx, seen_rx) = oneshot::channel::<bool>();
    let (started_tx, started_rx) = oneshot::channel::<()>();

    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let _ = started_rx.await;
            cancel.cancel();
        })
    };

    let err = with_timeout(queue.enqueue(&cancel, move |token| async move {
        let _ = started_tx.send(());
        token.cancelled().await;
        let _ = seen_tx.send(true);
        Ok(())
    }))
    .await
    .unwrap_err();

    assert!(err.is_cancelled());
    assert!(with_timeout(seen_rx).await?);
    canceller.await?;
    Ok(())
}
