//! Task scheduling for the maestro platform.
//!
//! A bounded FIFO queue feeds a fixed pool of workers; each worker owns
//! one task for its full execution. Enqueue never blocks (a full queue is
//! refused), cancellation is best-effort via the active set plus a
//! per-task token, and the lifecycle callback fans every progress event
//! out to subscribers and the task store.

pub mod lifecycle;
pub mod orchestrator;
pub mod queue;

pub use lifecycle::task_progress_callback;
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use queue::{TaskExecutor, TaskItem, TaskQueue};
