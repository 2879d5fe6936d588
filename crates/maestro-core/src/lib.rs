//! Shared error and task domain types for the maestro platform.

pub mod error;
pub mod task;

pub use error::{MaestroError, MaestroResult};
pub use task::{ProgressCallback, ResourceRecord, Task, TaskLog, TaskStatus, Workspace};
