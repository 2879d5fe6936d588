use async_trait::async_trait;
use maestro_core::{MaestroError, MaestroResult, ProgressCallback, Task, TaskStatus};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Executes one task end-to-end. Implementations must return promptly once
/// the cancellation token fires.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(
        &self,
        cancel: CancellationToken,
        task: Task,
        callback: ProgressCallback,
    ) -> MaestroResult<()>;
}

/// A queued task together with its cancellation token and callback.
pub struct TaskItem {
    pub task: Task,
    pub cancel: CancellationToken,
    pub callback: ProgressCallback,
}

struct ActiveEntry {
    task: Task,
    cancel: CancellationToken,
    callback: ProgressCallback,
}

/// Bounded FIFO task queue feeding a fixed worker pool.
///
/// Enqueue is non-blocking: a full channel is a [`MaestroError::QueueFull`]
/// refusal without state changes. Every enqueued task is tracked in the
/// active set until its worker finishes with it.
pub struct TaskQueue {
    tx: Mutex<Option<mpsc::Sender<TaskItem>>>,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<TaskItem>>>,
    active: Arc<Mutex<HashMap<u64, ActiveEntry>>>,
    shutdown: CancellationToken,
    workers: usize,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskQueue {
    pub fn new(workers: usize, queue_size: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_size);
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
            active: Arc::new(Mutex::new(HashMap::new())),
            shutdown: CancellationToken::new(),
            workers,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the worker pool.
    pub fn start(&self, executor: Arc<dyn TaskExecutor>) {
        let mut handles = self.handles.lock().expect("queue lock poisoned");
        for worker_id in 0..self.workers {
            let rx = self.rx.clone();
            let active = self.active.clone();
            let shutdown = self.shutdown.clone();
            let executor = executor.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let item = tokio::select! {
                        _ = shutdown.cancelled() => break,
                        item = async { rx.lock().await.recv().await } => match item {
                            Some(item) => item,
                            None => break,
                        },
                    };
                    process_task(worker_id, item, &executor, &active).await;
                }
            }));
        }
    }

    /// Add a task to the queue. Fails with `QueueFull` when the channel is
    /// at capacity and `QueueClosed` after [`stop`](Self::stop).
    pub fn enqueue(&self, task: Task, callback: ProgressCallback) -> MaestroResult<()> {
        let tx = {
            let guard = self.tx.lock().expect("queue lock poisoned");
            guard.clone().ok_or(MaestroError::QueueClosed)?
        };

        let cancel = self.shutdown.child_token();
        let item = TaskItem {
            task: task.clone(),
            cancel: cancel.clone(),
            callback: callback.clone(),
        };

        match tx.try_send(item) {
            Ok(()) => {
                self.active.lock().expect("queue lock poisoned").insert(
                    task.id,
                    ActiveEntry {
                        task,
                        cancel,
                        callback,
                    },
                );
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(MaestroError::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(MaestroError::QueueClosed),
        }
    }

    /// Best-effort cancel: removes the task from the active set, signals
    /// its cancellation token and reports `cancelled` through the
    /// callback. A subprocess already running is reaped by the executor
    /// when it observes the token.
    pub async fn cancel(&self, task_id: u64) -> MaestroResult<()> {
        let entry = {
            let mut active = self.active.lock().expect("queue lock poisoned");
            active
                .remove(&task_id)
                .ok_or_else(|| MaestroError::NotFound(format!("task {task_id}")))?
        };

        entry.cancel.cancel();
        (entry.callback)(
            task_id,
            0,
            TaskStatus::Cancelled,
            "task cancelled by user".to_string(),
            None,
        )
        .await;
        info!(task_id, "task cancelled");
        Ok(())
    }

    /// Snapshot of tasks currently queued or being processed.
    pub fn active(&self) -> Vec<Task> {
        self.active
            .lock()
            .expect("queue lock poisoned")
            .values()
            .map(|entry| entry.task.clone())
            .collect()
    }

    /// Cancel the shared context, close the channel and wait for every
    /// worker to return. No callbacks fire afterwards.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        self.tx.lock().expect("queue lock poisoned").take();

        let handles: Vec<JoinHandle<()>> =
            std::mem::take(&mut *self.handles.lock().expect("queue lock poisoned"));
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker did not shut down cleanly");
            }
        }
    }
}

async fn process_task(
    worker_id: usize,
    item: TaskItem,
    executor: &Arc<dyn TaskExecutor>,
    active: &Arc<Mutex<HashMap<u64, ActiveEntry>>>,
) {
    let task_id = item.task.id;
    let callback = item.callback.clone();
    info!(worker_id, task_id, "worker picked up task");

    // Run the executor in its own task so a panic is contained to this
    // item rather than taking the worker down.
    let handle = {
        let executor = executor.clone();
        tokio::spawn(async move { executor.execute(item.cancel, item.task, item.callback).await })
    };

    match handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(worker_id, task_id, error = %e, "task execution failed");
            callback(
                task_id,
                0,
                TaskStatus::Failed,
                format!("execution failed: {e}"),
                None,
            )
            .await;
        }
        Err(join_err) if join_err.is_panic() => {
            let payload = join_err.into_panic();
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(worker_id, task_id, panic = %msg, "task panicked");
            callback(
                task_id,
                0,
                TaskStatus::Failed,
                format!("panic: {msg}"),
                None,
            )
            .await;
        }
        Err(_) => {}
    }

    active
        .lock()
        .expect("queue lock poisoned")
        .remove(&task_id);
}
