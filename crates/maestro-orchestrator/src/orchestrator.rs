use crate::queue::{TaskExecutor, TaskQueue};
use maestro_core::{MaestroResult, ProgressCallback, Task};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Orchestrator tuning knobs.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub workers: usize,
    pub queue_size: usize,
    /// Scratch directory handed to executors for checkouts.
    pub workspace_dir: PathBuf,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            queue_size: 100,
            workspace_dir: PathBuf::from("/tmp/maestro-workspaces"),
        }
    }
}

/// Facade over the task queue: submission, cancellation and shutdown.
pub struct Orchestrator {
    config: OrchestratorConfig,
    queue: TaskQueue,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        let queue = TaskQueue::new(config.workers, config.queue_size);
        Self { config, queue }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn start(&self, executor: Arc<dyn TaskExecutor>) {
        info!(workers = self.config.workers, "starting orchestrator");
        self.queue.start(executor);
    }

    pub async fn stop(&self) {
        info!("stopping orchestrator");
        self.queue.stop().await;
    }

    pub fn submit_task(&self, task: Task, callback: ProgressCallback) -> MaestroResult<()> {
        info!(task_id = task.id, title = %task.title, "submitting task");
        self.queue.enqueue(task, callback)
    }

    pub async fn cancel_task(&self, task_id: u64) -> MaestroResult<()> {
        self.queue.cancel(task_id).await
    }

    pub fn active_tasks(&self) -> Vec<Task> {
        self.queue.active()
    }
}
