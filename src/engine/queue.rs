// src/engine/queue.rs

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::anyhow;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{PatchrunError, Result};

type BoxedRun = Box<dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// One enqueued unit of work.
///
/// The result travels back to the caller through a oneshot captured inside
/// `run`, so the worker loop never needs to know its type.
struct WorkItem {
    id: u64,
    cancel: CancellationToken,
    run: BoxedRun,
}

/// FIFO queue that runs at most one work item at a time.
///
/// Items run in arrival order on a background worker task. An item whose
/// token is cancelled before its turn is skipped without ever starting. An
/// item that has started receives the cancellation through its own token and
/// is expected to tear down whatever it launched; the queue waits for it to
/// return before starting the next item.
pub struct WorkQueue {
    scope: String,
    tx: mpsc::UnboundedSender<WorkItem>,
    next_id: AtomicU64,
}

impl fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueue")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl WorkQueue {
    /// Create the queue and spawn its worker. Must be called inside a tokio
    /// runtime.
    pub fn new(scope: impl Into<String>) -> Self {
        let scope = scope.into();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(worker_loop(scope.clone(), rx));
        Self {
            scope,
            tx,
            next_id: AtomicU64::new(0),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Queue `work` and wait for its result.
    ///
    /// `work` receives a token derived from `cancel`. Returns
    /// `PatchrunError::Cancelled` as soon as `cancel` fires, whether the item
    /// was still waiting or already running.
    pub async fn enqueue<T, F, Fut>(&self, cancel: &CancellationToken, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(PatchrunError::Cancelled);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let item_cancel = cancel.child_token();
        let (done_tx, done_rx) = oneshot::channel();

        let item = WorkItem {
            id,
            cancel: item_cancel.clone(),
            run: Box::new(move |token| {
                Box::pin(async move {
                    let result = work(token).await;
                    let _ = done_tx.send(result);
                })
            }),
        };

        self.tx.send(item).map_err(|_| {
            PatchrunError::Other(anyhow!("work queue '{}' has shut down", self.scope))
        })?;
        debug!(scope = %self.scope, id, "work item enqueued");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                item_cancel.cancel();
                debug!(scope = %self.scope, id, "enqueue cancelled");
                Err(PatchrunError::Cancelled)
            }
            done = done_rx => match done {
                Ok(result) => result,
                Err(_) => Err(PatchrunError::Other(anyhow!(
                    "work item {id} in queue '{}' ended without a result",
                    self.scope
                ))),
            },
        }
    }
}

async fn worker_loop(scope: String, mut rx: mpsc::UnboundedReceiver<WorkItem>) {
    while let Some(item) = rx.recv().await {
        if item.cancel.is_cancelled() {
            debug!(%scope, id = item.id, "skipping cancelled work item");
            continue;
        }

        debug!(%scope, id = item.id, "work item started");
        let fut = (item.run)(item.cancel.clone());
        // Run on its own task so a panicking item cannot take the loop down.
        if let Err(e) = tokio::spawn(fut).await {
            warn!(%scope, id = item.id, error = %e, "work item aborted");
        }
        debug!(%scope, id = item.id, "work item finished");
    }
    debug!(%scope, "work queue closed");
}

/// One [`WorkQueue`] per scope name, created on first use.
#[derive(Debug, Default)]
pub struct ScopedQueues {
    queues: Mutex<HashMap<String, Arc<WorkQueue>>>,
}

impl ScopedQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, scope: &str) -> Arc<WorkQueue> {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        queues
            .entry(scope.to_string())
            .or_insert_with(|| Arc::new(WorkQueue::new(scope)))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_the_work_result() {
        let queue = WorkQueue::new("unit");
        let cancel = CancellationToken::new();
        let value = queue.enqueue(&cancel, |_| async { Ok(21 * 2) }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn work_errors_propagate() {
        let queue = WorkQueue::new("unit");
        let cancel = CancellationToken::new();
        let err = queue
            .enqueue(&cancel, |_| async {
                Err::<(), _>(PatchrunError::Build("boom".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PatchrunError::Build(_)));
    }

    #[tokio::test]
    async fn already_cancelled_token_never_enqueues() {
        let queue = WorkQueue::new("unit");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = queue
            .enqueue(&cancel, |_| async { Ok(()) })
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn panicking_item_does_not_stop_the_queue() {
        let queue = WorkQueue::new("unit");
        let cancel = CancellationToken::new();
        let err = queue
            .enqueue(&cancel, |_| async {
                if true {
                    panic!("boom");
                }
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PatchrunError::Other(_)));

        let ok = queue.enqueue(&cancel, |_| async { Ok("next") }).await.unwrap();
        assert_eq!(ok, "next");
    }

    #[tokio::test]
    async fn scoped_queues_are_reused_per_scope() {
        let queues = ScopedQueues::new();
        let a = queues.get("a");
        let again = queues.get("a");
        let b = queues.get("b");
        assert!(Arc::ptr_eq(&a, &again));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(queues.len(), 2);
    }
}
