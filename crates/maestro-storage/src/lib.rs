//! Repository contracts the core consumes, plus an in-memory
//! implementation used by tests and adapterless deployments. SQL-backed
//! stores (mysql/postgres from the server configuration) live in their
//! own adapter and implement the same traits.

pub mod memory;

use async_trait::async_trait;
use maestro_core::{MaestroResult, ResourceRecord, Task, TaskLog, Workspace};
use std::sync::Arc;

pub use memory::MemoryStorage;

#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Persist a new resource row, returning it with its assigned id.
    async fn create(&self, record: ResourceRecord) -> MaestroResult<ResourceRecord>;
    async fn update(&self, record: &ResourceRecord) -> MaestroResult<()>;
    /// Look up by the `(workspace, kind, name)` identity.
    async fn get_by_name(
        &self,
        workspace_id: u64,
        name: &str,
        kind: &str,
    ) -> MaestroResult<ResourceRecord>;
    async fn list(
        &self,
        workspace_id: u64,
        kind: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> MaestroResult<Vec<ResourceRecord>>;
    async fn delete(&self, id: u64) -> MaestroResult<()>;
    async fn exists(&self, workspace_id: u64, name: &str, kind: &str) -> MaestroResult<bool>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a new task, returning it with its assigned id.
    async fn create(&self, task: Task) -> MaestroResult<Task>;
    async fn update(&self, task: &Task) -> MaestroResult<()>;
    async fn get_by_id(&self, id: u64) -> MaestroResult<Task>;
    async fn list_by_user(
        &self,
        user_id: u64,
        limit: usize,
        offset: usize,
    ) -> MaestroResult<Vec<Task>>;
    async fn delete(&self, id: u64) -> MaestroResult<()>;
    async fn add_log(&self, log: TaskLog) -> MaestroResult<()>;
    async fn get_logs(&self, task_id: u64, limit: usize) -> MaestroResult<Vec<TaskLog>>;
}

#[async_trait]
pub trait WorkspaceStore: Send + Sync {
    async fn create(&self, workspace: Workspace) -> MaestroResult<Workspace>;
    /// Workspaces owned by a user, oldest first; index 0 is the default
    /// workspace used when a task submission names none.
    async fn list_by_user(&self, user_id: u64) -> MaestroResult<Vec<Workspace>>;
}

/// Bundle of the three repositories the core consumes.
#[derive(Clone)]
pub struct Storage {
    resources: Arc<dyn ResourceStore>,
    tasks: Arc<dyn TaskStore>,
    workspaces: Arc<dyn WorkspaceStore>,
}

impl Storage {
    pub fn new(
        resources: Arc<dyn ResourceStore>,
        tasks: Arc<dyn TaskStore>,
        workspaces: Arc<dyn WorkspaceStore>,
    ) -> Self {
        Self {
            resources,
            tasks,
            workspaces,
        }
    }

    /// All three repositories backed by a single in-memory store.
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStorage::new());
        Self {
            resources: store.clone(),
            tasks: store.clone(),
            workspaces: store,
        }
    }

    pub fn resources(&self) -> &dyn ResourceStore {
        self.resources.as_ref()
    }

    pub fn tasks(&self) -> &dyn TaskStore {
        self.tasks.as_ref()
    }

    pub fn workspaces(&self) -> &dyn WorkspaceStore {
        self.workspaces.as_ref()
    }
}
