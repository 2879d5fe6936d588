//! End-to-end runner executor tests against a stub agent runtime: a shell
//! script that consumes the plan on stdin and emits NDJSON events.

use chrono::Utc;
use maestro_broadcast::EventBroadcaster;
use maestro_core::{MaestroError, ResourceRecord, Task, TaskStatus};
use maestro_executor::{RunnerConfig, RunnerExecutor};
use maestro_orchestrator::{task_progress_callback, TaskExecutor};
use maestro_storage::Storage;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

async fn seed(storage: &Storage, kind: &str, name: &str, spec: &str) {
    let now = Utc::now();
    storage
        .resources()
        .create(ResourceRecord {
            id: 0,
            workspace_id: 1,
            kind: kind.to_string(),
            name: name.to_string(),
            description: String::new(),
            spec: spec.to_string(),
            status: "active".to_string(),
            labels: None,
            annotations: None,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
}

/// Storage pre-loaded with a robot "r" wired to soul "a" and mind "m".
async fn fixture_storage() -> Storage {
    let storage = Storage::in_memory();
    seed(
        &storage,
        "Soul",
        "a",
        "apiVersion: maestro.io/v1\nkind: Soul\nmetadata:\n  name: a\nspec:\n  personality: You are helpful.\n",
    )
    .await;
    seed(
        &storage,
        "Mind",
        "m",
        "apiVersion: maestro.io/v1\nkind: Mind\nmetadata:\n  name: m\nspec:\n  provider: ollama\n  model_id: llama3\n",
    )
    .await;
    seed(
        &storage,
        "Robot",
        "r",
        "apiVersion: maestro.io/v1\nkind: Robot\nmetadata:\n  name: r\nspec:\n  soul: a\n  mind: m\n",
    )
    .await;
    storage
}

fn write_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("stub_runner.sh");
    std::fs::write(&path, body).unwrap();
    path
}

fn config(script: PathBuf) -> RunnerConfig {
    RunnerConfig {
        script,
        interpreter: "/bin/sh".to_string(),
        proxy: None,
    }
}

async fn submit_task(storage: &Storage) -> Task {
    storage
        .tasks()
        .create(Task::new(1, 1, "say hi", "hi", "robot", "r"))
        .await
        .unwrap()
}

#[tokio::test]
async fn happy_path_accumulates_content_and_completes() {
    let storage = fixture_storage().await;
    let broadcaster = EventBroadcaster::new();
    let tmp = tempfile::tempdir().unwrap();
    let stdin_capture = tmp.path().join("plan.json");

    let script = write_script(
        tmp.path(),
        &format!(
            r#"cat > "{}"
echo '{{"type":"started"}}'
echo 'plain text noise from the runtime'
echo '{{"type":"debug","content":"internal chatter"}}'
echo '{{"type":"content","content":"hello"}}'
echo '{{"type":"content","content":" world"}}'
echo '{{"type":"completed"}}'
"#,
            stdin_capture.display()
        ),
    );

    let task = submit_task(&storage).await;
    let mut sub = broadcaster.subscribe(task.id);
    let callback = task_progress_callback(storage.clone(), broadcaster.clone());
    let executor = RunnerExecutor::new(storage.clone(), config(script));

    executor
        .execute(CancellationToken::new(), task.clone(), callback)
        .await
        .unwrap();

    let done = storage.tasks().get_by_id(task.id).await.unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.progress, 100);
    assert_eq!(done.result, "hello world");
    assert!(done.error.is_empty());
    assert!(done.started_at.is_some());
    assert!(done.completed_at.is_some());

    // Raw NDJSON lines, noise and debug chatter filtered out.
    let lines: Vec<&str> = done.event_logs.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].contains("\"started\""));
    assert!(lines[3].contains("\"completed\""));

    // The runner received the serialized plan on stdin.
    let plan: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&stdin_capture).unwrap()).unwrap();
    assert_eq!(plan["type"], "robot");
    assert_eq!(plan["session_id"], format!("task-{}", task.id));
    assert_eq!(plan["model"]["provider"], "ollama");
    assert_eq!(plan["soul"]["personality"], "You are helpful.");

    // One log row per callback: task started, started, 2x content, completed.
    let logs = storage.tasks().get_logs(task.id, 100).await.unwrap();
    assert!(logs.len() >= 4, "expected at least 4 log rows, got {}", logs.len());
    assert!(logs.iter().any(|l| l.event_type == "started"));
    assert_eq!(logs.iter().filter(|l| l.event_type == "content").count(), 2);

    // Subscribers saw the same sequence, content verbatim and in order.
    let mut contents = Vec::new();
    while let Some(event) = sub.try_recv() {
        if event.event_type.as_deref() == Some("content") {
            contents.push(event.content.clone());
        }
        if event.status.as_deref() == Some("completed") {
            break;
        }
    }
    assert_eq!(contents, vec!["hello", " world"]);
}

#[tokio::test]
async fn runner_error_and_nonzero_exit_fail_the_task() {
    let storage = fixture_storage().await;
    let broadcaster = EventBroadcaster::new();
    let tmp = tempfile::tempdir().unwrap();

    let script = write_script(
        tmp.path(),
        r#"cat > /dev/null
echo '{"type":"content","content":"partial"}'
echo '{"type":"error","content":"boom"}'
exit 1
"#,
    );

    let task = submit_task(&storage).await;
    let callback = task_progress_callback(storage.clone(), broadcaster.clone());
    let executor = RunnerExecutor::new(storage.clone(), config(script));

    let err = executor
        .execute(CancellationToken::new(), task.clone(), callback)
        .await
        .unwrap_err();
    assert!(matches!(err, MaestroError::Runtime(_)));
    assert!(err.to_string().contains("boom"));

    let failed = storage.tasks().get_by_id(task.id).await.unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert!(failed.error.contains("boom"));
    // Partial output is discarded from the result but kept in the event log.
    assert!(failed.result.is_empty());
    let lines: Vec<&str> = failed.event_logs.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("partial"));
    assert!(lines[1].contains("boom"));
}

#[tokio::test]
async fn nonzero_exit_without_error_event_reports_exit_status() {
    let storage = fixture_storage().await;
    let broadcaster = EventBroadcaster::new();
    let tmp = tempfile::tempdir().unwrap();

    let script = write_script(tmp.path(), "cat > /dev/null\nexit 3\n");
    let task = submit_task(&storage).await;
    let callback = task_progress_callback(storage.clone(), broadcaster.clone());
    let executor = RunnerExecutor::new(storage.clone(), config(script));

    let err = executor
        .execute(CancellationToken::new(), task, callback)
        .await
        .unwrap_err();
    assert!(matches!(err, MaestroError::RuntimeExit(_)));
}

#[tokio::test]
async fn missing_runner_script_fails_fast() {
    let storage = fixture_storage().await;
    let broadcaster = EventBroadcaster::new();

    let task = submit_task(&storage).await;
    let callback = task_progress_callback(storage.clone(), broadcaster.clone());
    let executor = RunnerExecutor::new(
        storage.clone(),
        config(PathBuf::from("/nonexistent/runner.py")),
    );

    let err = executor
        .execute(CancellationToken::new(), task.clone(), callback)
        .await
        .unwrap_err();
    assert!(matches!(err, MaestroError::RunnerMissing(_)));

    let failed = storage.tasks().get_by_id(task.id).await.unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert!(failed.error.contains("/nonexistent/runner.py"));
}

#[tokio::test]
async fn missing_reference_fails_without_partial_result() {
    let storage = Storage::in_memory();
    seed(
        &storage,
        "Mind",
        "m",
        "apiVersion: maestro.io/v1\nkind: Mind\nmetadata:\n  name: m\nspec:\n  provider: ollama\n  model_id: llama3\n",
    )
    .await;
    seed(
        &storage,
        "Robot",
        "r",
        "apiVersion: maestro.io/v1\nkind: Robot\nmetadata:\n  name: r\nspec:\n  soul: ghost\n  mind: m\n",
    )
    .await;
    let broadcaster = EventBroadcaster::new();
    let tmp = tempfile::tempdir().unwrap();
    let script = write_script(tmp.path(), "cat > /dev/null\n");

    let task = submit_task(&storage).await;
    let mut sub = broadcaster.subscribe(task.id);
    let callback = task_progress_callback(storage.clone(), broadcaster.clone());
    let executor = RunnerExecutor::new(storage.clone(), config(script));

    let err = executor
        .execute(CancellationToken::new(), task.clone(), callback)
        .await
        .unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("Soul") && msg.contains("ghost"), "{msg}");

    let failed = storage.tasks().get_by_id(task.id).await.unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert!(failed.result.is_empty());
    assert!(failed.error.contains("ghost"));

    // No content event ever reached subscribers.
    while let Some(event) = sub.try_recv() {
        assert_ne!(event.event_type.as_deref(), Some("content"));
    }
}

#[tokio::test]
async fn cancellation_kills_the_runner_and_keeps_partial_result() {
    let storage = fixture_storage().await;
    let broadcaster = EventBroadcaster::new();
    let tmp = tempfile::tempdir().unwrap();

    let script = write_script(
        tmp.path(),
        r#"cat > /dev/null
echo '{"type":"started"}'
echo '{"type":"content","content":"partial"}'
sleep 30
echo '{"type":"completed"}'
"#,
    );

    let task = submit_task(&storage).await;
    let mut sub = broadcaster.subscribe(task.id);
    let callback = task_progress_callback(storage.clone(), broadcaster.clone());
    let executor = RunnerExecutor::new(storage.clone(), config(script));

    let cancel = CancellationToken::new();
    let exec_handle = {
        let cancel = cancel.clone();
        let task = task.clone();
        tokio::spawn(async move { executor.execute(cancel, task, callback).await })
    };

    // Wait until the runner has streamed its first content chunk.
    loop {
        let event = sub.recv().await.unwrap();
        if event.event_type.as_deref() == Some("content") {
            break;
        }
    }

    cancel.cancel();
    exec_handle.await.unwrap().unwrap();

    let cancelled = storage.tasks().get_by_id(task.id).await.unwrap();
    assert_eq!(cancelled.status, TaskStatus::Cancelled);
    assert_eq!(cancelled.result, "partial");

    // Subscribers observe the cancelled frame.
    let mut saw_cancelled = false;
    while let Some(event) = sub.try_recv() {
        if event.status.as_deref() == Some("cancelled") {
            saw_cancelled = true;
        }
    }
    assert!(saw_cancelled);
}

#[tokio::test]
async fn runner_emitted_cancelled_event_ends_the_run() {
    let storage = fixture_storage().await;
    let broadcaster = EventBroadcaster::new();
    let tmp = tempfile::tempdir().unwrap();

    let script = write_script(
        tmp.path(),
        r#"cat > /dev/null
echo '{"type":"content","content":"so far"}'
echo '{"type":"cancelled"}'
"#,
    );

    let task = submit_task(&storage).await;
    let callback = task_progress_callback(storage.clone(), broadcaster.clone());
    let executor = RunnerExecutor::new(storage.clone(), config(script));

    executor
        .execute(CancellationToken::new(), task.clone(), callback)
        .await
        .unwrap();

    let cancelled = storage.tasks().get_by_id(task.id).await.unwrap();
    assert_eq!(cancelled.status, TaskStatus::Cancelled);
    assert_eq!(cancelled.result, "so far");
}
