//! Global execution queue
//!
//! A FIFO task channel drained by a single worker: task N+1 never starts
//! before task N has finished, whichever artifact enqueued them.

use crate::error::{Result, WorkbenchError};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error};

type Job = BoxFuture<'static, ()>;

pub struct ExecutionQueue {
    tx: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    pending: watch::Sender<usize>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Completion handle of an enqueued task
pub struct QueueTicket<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> QueueTicket<T> {
    /// Wait for the task's output
    pub async fn wait(self) -> Result<T> {
        self.rx.await.map_err(|_| WorkbenchError::QueueClosed)
    }
}

impl ExecutionQueue {
    /// Create the queue and spawn its worker on the current runtime
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let (pending, _) = watch::channel(0usize);
        let pending_worker = pending.clone();

        let worker = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                    error!("Queued task panicked; continuing with the next task");
                }
                pending_worker.send_modify(|n| *n = n.saturating_sub(1));
            }
            debug!("Execution queue worker stopped");
        });

        Self {
            tx: Mutex::new(Some(tx)),
            pending,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Append a task; it runs after everything enqueued before it
    pub fn push<F, T>(&self, task: F) -> Result<QueueTicket<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let job = async move {
            let output = task.await;
            let _ = done_tx.send(output);
        }
        .boxed();

        let guard = self.tx.lock().map_err(|_| WorkbenchError::QueueClosed)?;
        let tx = guard.as_ref().ok_or(WorkbenchError::QueueClosed)?;
        self.pending.send_modify(|n| *n += 1);
        if tx.send(job).is_err() {
            self.pending.send_modify(|n| *n = n.saturating_sub(1));
            return Err(WorkbenchError::QueueClosed);
        }
        Ok(QueueTicket { rx: done_rx })
    }

    /// Number of tasks queued or running
    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    /// Observe the pending count; a transition to zero means the queue drained
    pub fn watch_pending(&self) -> watch::Receiver<usize> {
        self.pending.subscribe()
    }

    /// Resolve once nothing is queued or running
    pub async fn wait_idle(&self) {
        let mut rx = self.pending.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Stop accepting tasks; already queued ones still run
    pub fn close(&self) {
        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }
    }

    /// Close and wait for the worker to finish the backlog
    pub async fn shutdown(&self) {
        self.close();
        let worker = self.worker.lock().ok().and_then(|mut w| w.take());
        if let Some(worker) = worker {
            let _ = worker.await;
        }
    }
}

impl Default for ExecutionQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Mutex as AsyncMutex;

    #[tokio::test]
    async fn test_tasks_run_strictly_in_order() {
        let queue = ExecutionQueue::new();
        let log = Arc::new(AsyncMutex::new(Vec::new()));

        let mut tickets = Vec::new();
        for (i, delay) in [30u64, 1, 10].into_iter().enumerate() {
            let log = log.clone();
            tickets.push(
                queue
                    .push(async move {
                        log.lock().await.push(format!("start {}", i));
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        log.lock().await.push(format!("end {}", i));
                        i
                    })
                    .unwrap(),
            );
        }

        for (i, ticket) in tickets.into_iter().enumerate() {
            assert_eq!(ticket.wait().await.unwrap(), i);
        }
        assert_eq!(
            *log.lock().await,
            vec!["start 0", "end 0", "start 1", "end 1", "start 2", "end 2"]
        );
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn test_panicking_task_does_not_stop_worker() {
        let queue = ExecutionQueue::new();
        let bad = queue.push(async { panic!("boom") }).unwrap();
        let good = queue.push(async { 7 }).unwrap();

        let bad_result: Result<()> = bad.wait().await;
        assert!(matches!(bad_result, Err(WorkbenchError::QueueClosed)));
        assert_eq!(good.wait().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_closed_queue_rejects_new_tasks() {
        let queue = ExecutionQueue::new();
        let ticket = queue
            .push(async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                "done"
            })
            .unwrap();
        queue.close();

        assert!(matches!(
            queue.push(async {}),
            Err(WorkbenchError::QueueClosed)
        ));
        assert_eq!(ticket.wait().await.unwrap(), "done");
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_wait_idle() {
        let queue = ExecutionQueue::new();
        queue.wait_idle().await;

        let flag = Arc::new(AsyncMutex::new(false));
        let f = flag.clone();
        queue
            .push(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                *f.lock().await = true;
            })
            .unwrap();
        queue.wait_idle().await;
        assert!(*flag.lock().await);
    }
}
