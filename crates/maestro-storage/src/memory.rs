use crate::{ResourceStore, TaskStore, WorkspaceStore};
use async_trait::async_trait;
use chrono::Utc;
use maestro_core::{MaestroError, MaestroResult, ResourceRecord, Task, TaskLog, Workspace};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// In-memory storage backing all three repository traits.
pub struct MemoryStorage {
    resources: RwLock<HashMap<u64, ResourceRecord>>,
    tasks: RwLock<HashMap<u64, Task>>,
    logs: RwLock<Vec<TaskLog>>,
    workspaces: RwLock<HashMap<u64, Workspace>>,
    next_id: AtomicU64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            resources: RwLock::new(HashMap::new()),
            tasks: RwLock::new(HashMap::new()),
            logs: RwLock::new(Vec::new()),
            workspaces: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn assign_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceStore for MemoryStorage {
    async fn create(&self, mut record: ResourceRecord) -> MaestroResult<ResourceRecord> {
        let mut resources = self.resources.write().await;
        if resources.values().any(|r| {
            r.workspace_id == record.workspace_id && r.kind == record.kind && r.name == record.name
        }) {
            return Err(MaestroError::Storage(format!(
                "{} \"{}\" already exists in workspace {}",
                record.kind, record.name, record.workspace_id
            )));
        }
        record.id = self.assign_id();
        resources.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update(&self, record: &ResourceRecord) -> MaestroResult<()> {
        let mut resources = self.resources.write().await;
        match resources.get_mut(&record.id) {
            Some(existing) => {
                *existing = record.clone();
                existing.updated_at = Utc::now();
                Ok(())
            }
            None => Err(MaestroError::NotFound(format!("resource {}", record.id))),
        }
    }

    async fn get_by_name(
        &self,
        workspace_id: u64,
        name: &str,
        kind: &str,
    ) -> MaestroResult<ResourceRecord> {
        let resources = self.resources.read().await;
        resources
            .values()
            .find(|r| r.workspace_id == workspace_id && r.kind == kind && r.name == name)
            .cloned()
            .ok_or_else(|| {
                MaestroError::NotFound(format!(
                    "{kind} \"{name}\" in workspace {workspace_id}"
                ))
            })
    }

    async fn list(
        &self,
        workspace_id: u64,
        kind: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> MaestroResult<Vec<ResourceRecord>> {
        let resources = self.resources.read().await;
        let mut matching: Vec<ResourceRecord> = resources
            .values()
            .filter(|r| r.workspace_id == workspace_id)
            .filter(|r| kind.is_none_or(|k| r.kind == k))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn delete(&self, id: u64) -> MaestroResult<()> {
        let mut resources = self.resources.write().await;
        resources
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| MaestroError::NotFound(format!("resource {id}")))
    }

    async fn exists(&self, workspace_id: u64, name: &str, kind: &str) -> MaestroResult<bool> {
        let resources = self.resources.read().await;
        Ok(resources
            .values()
            .any(|r| r.workspace_id == workspace_id && r.kind == kind && r.name == name))
    }
}

#[async_trait]
impl TaskStore for MemoryStorage {
    async fn create(&self, mut task: Task) -> MaestroResult<Task> {
        task.id = self.assign_id();
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(task)
    }

    async fn update(&self, task: &Task) -> MaestroResult<()> {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&task.id) {
            Some(existing) => {
                *existing = task.clone();
                existing.updated_at = Utc::now();
                Ok(())
            }
            None => Err(MaestroError::NotFound(format!("task {}", task.id))),
        }
    }

    async fn get_by_id(&self, id: u64) -> MaestroResult<Task> {
        self.tasks
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| MaestroError::NotFound(format!("task {id}")))
    }

    async fn list_by_user(
        &self,
        user_id: u64,
        limit: usize,
        offset: usize,
    ) -> MaestroResult<Vec<Task>> {
        let tasks = self.tasks.read().await;
        let mut matching: Vec<Task> = tasks
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn delete(&self, id: u64) -> MaestroResult<()> {
        let mut tasks = self.tasks.write().await;
        tasks
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| MaestroError::NotFound(format!("task {id}")))?;
        self.logs.write().await.retain(|l| l.task_id != id);
        Ok(())
    }

    async fn add_log(&self, mut log: TaskLog) -> MaestroResult<()> {
        let mut logs = self.logs.write().await;
        log.id = self.assign_id();
        logs.push(log);
        Ok(())
    }

    async fn get_logs(&self, task_id: u64, limit: usize) -> MaestroResult<Vec<TaskLog>> {
        let logs = self.logs.read().await;
        Ok(logs
            .iter()
            .filter(|l| l.task_id == task_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl WorkspaceStore for MemoryStorage {
    async fn create(&self, mut workspace: Workspace) -> MaestroResult<Workspace> {
        workspace.id = self.assign_id();
        self.workspaces
            .write()
            .await
            .insert(workspace.id, workspace.clone());
        Ok(workspace)
    }

    async fn list_by_user(&self, user_id: u64) -> MaestroResult<Vec<Workspace>> {
        let workspaces = self.workspaces.read().await;
        let mut matching: Vec<Workspace> = workspaces
            .values()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect();
        matching.sort_by_key(|w| w.id);
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Storage;
    use maestro_core::TaskStatus;

    fn record(workspace_id: u64, kind: &str, name: &str) -> ResourceRecord {
        let now = Utc::now();
        ResourceRecord {
            id: 0,
            workspace_id,
            kind: kind.to_string(),
            name: name.to_string(),
            description: String::new(),
            spec: "apiVersion: maestro.io/v1".to_string(),
            status: "active".to_string(),
            labels: None,
            annotations: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn resource_create_and_get_by_name() {
        let storage = Storage::in_memory();
        let created = storage
            .resources()
            .create(record(1, "Soul", "helper"))
            .await
            .unwrap();
        assert_ne!(created.id, 0);

        let found = storage
            .resources()
            .get_by_name(1, "helper", "Soul")
            .await
            .unwrap();
        assert_eq!(found.id, created.id);

        // Same name, different kind or workspace: not found
        assert!(storage
            .resources()
            .get_by_name(1, "helper", "Mind")
            .await
            .is_err());
        assert!(storage
            .resources()
            .get_by_name(2, "helper", "Soul")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn resource_identity_is_unique() {
        let storage = Storage::in_memory();
        storage
            .resources()
            .create(record(1, "Soul", "helper"))
            .await
            .unwrap();
        assert!(storage
            .resources()
            .create(record(1, "Soul", "helper"))
            .await
            .is_err());
        // Different kind is a different identity
        storage
            .resources()
            .create(record(1, "Mind", "helper"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn resource_list_filters_and_paginates() {
        let storage = Storage::in_memory();
        for i in 0..5 {
            storage
                .resources()
                .create(record(1, "Mind", &format!("m{i}")))
                .await
                .unwrap();
        }
        storage
            .resources()
            .create(record(1, "Soul", "s"))
            .await
            .unwrap();

        let minds = storage
            .resources()
            .list(1, Some("Mind"), 10, 0)
            .await
            .unwrap();
        assert_eq!(minds.len(), 5);

        let page = storage.resources().list(1, None, 2, 4).await.unwrap();
        assert_eq!(page.len(), 2);

        assert!(storage.resources().exists(1, "s", "Soul").await.unwrap());
        assert!(!storage.resources().exists(1, "s", "Craft").await.unwrap());
    }

    #[tokio::test]
    async fn task_lifecycle_and_logs() {
        let storage = Storage::in_memory();
        let task = Task::new(1, 7, "t", "prompt", "robot", "r");
        let mut task = storage.tasks().create(task).await.unwrap();
        assert_ne!(task.id, 0);

        task.status = TaskStatus::Running;
        task.progress = 40;
        storage.tasks().update(&task).await.unwrap();
        let loaded = storage.tasks().get_by_id(task.id).await.unwrap();
        assert_eq!(loaded.status, TaskStatus::Running);
        assert_eq!(loaded.progress, 40);

        for i in 0..3 {
            storage
                .tasks()
                .add_log(TaskLog::new(task.id, "info", format!("msg {i}"), "info"))
                .await
                .unwrap();
        }
        let logs = storage.tasks().get_logs(task.id, 100).await.unwrap();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].message, "msg 0");

        storage.tasks().delete(task.id).await.unwrap();
        assert!(storage.tasks().get_by_id(task.id).await.is_err());
        assert!(storage
            .tasks()
            .get_logs(task.id, 100)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn workspaces_by_user_oldest_first() {
        let storage = Storage::in_memory();
        for name in ["first", "second"] {
            storage
                .workspaces()
                .create(Workspace {
                    id: 0,
                    user_id: 3,
                    name: name.to_string(),
                    description: String::new(),
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        let list = storage.workspaces().list_by_user(3).await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].name, "first");
        assert!(storage
            .workspaces()
            .list_by_user(99)
            .await
            .unwrap()
            .is_empty());
    }
}
