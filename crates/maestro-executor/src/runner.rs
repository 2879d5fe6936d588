//! Streaming executor backed by the external agent runtime.
//!
//! One task maps to one runner subprocess: the execution plan goes in as a
//! single JSON object on stdin, NDJSON events come back on stdout, and
//! stderr is logged line by line. Each event updates progress, feeds the
//! progress callback and lands verbatim in the task's event log.

use crate::plan::ExecutionPlan;
use crate::resolver::PlanResolver;
use async_trait::async_trait;
use chrono::Utc;
use maestro_core::{MaestroError, MaestroResult, ProgressCallback, Task, TaskStatus};
use maestro_orchestrator::TaskExecutor;
use maestro_storage::Storage;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How the runner subprocess is launched.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub script: PathBuf,
    pub interpreter: String,
    /// When set, `http_proxy`/`https_proxy`/`all_proxy` (and uppercase
    /// variants) point the subprocess at this endpoint.
    pub proxy: Option<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            script: PathBuf::from("scripts/agno_runner.py"),
            interpreter: "python3".to_string(),
            proxy: None,
        }
    }
}

/// One line of runner stdout, when it parses as JSON.
#[derive(Debug, Deserialize)]
struct RunnerEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    details: Option<serde_json::Value>,
    #[serde(default)]
    #[allow(dead_code)]
    agent_id: Option<String>,
}

enum RunOutcome {
    Completed(String),
    Cancelled(String),
}

pub struct RunnerExecutor {
    storage: Storage,
    resolver: PlanResolver,
    config: RunnerConfig,
}

impl RunnerExecutor {
    pub fn new(storage: Storage, config: RunnerConfig) -> Self {
        let resolver = PlanResolver::new(storage.clone());
        Self {
            storage,
            resolver,
            config,
        }
    }

    async fn run_plan(
        &self,
        cancel: &CancellationToken,
        plan: &ExecutionPlan,
        task_id: u64,
        callback: &ProgressCallback,
        event_logs: &mut Vec<String>,
    ) -> MaestroResult<RunOutcome> {
        if !self.config.script.exists() {
            return Err(MaestroError::RunnerMissing(self.config.script.clone()));
        }

        let mut cmd = Command::new(&self.config.interpreter);
        cmd.arg(&self.config.script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(proxy) = &self.config.proxy {
            for key in [
                "http_proxy",
                "https_proxy",
                "all_proxy",
                "HTTP_PROXY",
                "HTTPS_PROXY",
                "ALL_PROXY",
            ] {
                cmd.env(key, proxy);
            }
        }

        let mut child = cmd.spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| MaestroError::Runtime("runner stdin not available".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MaestroError::Runtime("runner stdout not available".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MaestroError::Runtime("runner stderr not available".to_string()))?;

        // A runner that exits before reading its stdin surfaces through
        // the exit status, not through a broken pipe here.
        let payload = serde_json::to_vec(plan)?;
        if let Err(e) = stdin.write_all(&payload).await {
            warn!(task_id, error = %e, "failed to write plan to runner stdin");
        }
        let _ = stdin.write_all(b"\n").await;
        drop(stdin);

        // Stderr is diagnostics only, never fatal.
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                error!(task_id, line = %line, "runner stderr");
            }
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut result = String::new();
        let mut last_error = String::new();

        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => {
                    info!(task_id, "cancellation requested, killing runner");
                    let _ = child.start_kill();
                    return Ok(RunOutcome::Cancelled(result));
                }
                line = lines.next_line() => line?,
            };
            let Some(line) = line else { break };

            let event: RunnerEvent = match serde_json::from_str(line.trim()) {
                Ok(event) => event,
                // Non-JSON output is ignored.
                Err(_) => continue,
            };

            // Internal chatter never reaches logs or subscribers.
            if matches!(
                event.event_type.as_str(),
                "debug" | "debug_event" | "run_content"
            ) {
                continue;
            }
            event_logs.push(line.clone());

            match event.event_type.as_str() {
                "started" => {
                    info!(task_id, "agent started");
                    report(callback, task_id, 20, "agent started", &event, false).await;
                }
                "git_downloaded" => {
                    info!(task_id, content = %event.content, "repository downloaded");
                    report(callback, task_id, 15, &event.content, &event, true).await;
                }
                "mcp_connected" | "session_reused" => {
                    info!(task_id, content = %event.content, "runner session ready");
                    report(callback, task_id, 25, &event.content, &event, false).await;
                }
                "run_started" | "team_run_started" => {
                    info!(task_id, content = %event.content, "run started");
                    report(callback, task_id, 30, &event.content, &event, false).await;
                }
                "thinking_step" => {
                    report(callback, task_id, 40, &event.content, &event, true).await;
                }
                "content" => {
                    result.push_str(&event.content);
                    report(callback, task_id, 50, &event.content, &event, false).await;
                }
                "reasoning" => {
                    report(callback, task_id, 55, "reasoning", &event, true).await;
                }
                "tool_call_started" | "member_tool_started" => {
                    report(callback, task_id, 60, "tool call started", &event, true).await;
                }
                "tool_call_completed" | "member_tool_completed" => {
                    report(callback, task_id, 70, "tool call completed", &event, true).await;
                }
                "run_completed" | "team_run_completed" => {
                    info!(task_id, content = %event.content, "run completed");
                    report(callback, task_id, 90, &event.content, &event, false).await;
                }
                "warning" => {
                    warn!(task_id, content = %event.content, "runner warning");
                }
                "error" => {
                    // Remembered, combined with the exit status after EOF.
                    error!(task_id, content = %event.content, "runner reported error");
                    last_error = event.content;
                }
                "cancelled" => {
                    info!(task_id, "runner cancelled the run");
                    return Ok(RunOutcome::Cancelled(result));
                }
                "completed" => {
                    info!(task_id, "runner completed");
                }
                _ => {}
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            if !last_error.is_empty() {
                return Err(MaestroError::Runtime(last_error));
            }
            return Err(MaestroError::RuntimeExit(status.to_string()));
        }

        Ok(RunOutcome::Completed(result))
    }
}

/// Forward one runner event through the progress callback as a running
/// update, carrying its type (and optionally details) as metadata.
async fn report(
    callback: &ProgressCallback,
    task_id: u64,
    progress: i32,
    message: &str,
    event: &RunnerEvent,
    with_details: bool,
) {
    let mut metadata = serde_json::json!({ "type": event.event_type });
    if with_details {
        if let Some(details) = &event.details {
            metadata["details"] = details.clone();
        }
    }
    callback(
        task_id,
        progress,
        TaskStatus::Running,
        message.to_string(),
        Some(metadata),
    )
    .await;
}

#[async_trait]
impl TaskExecutor for RunnerExecutor {
    async fn execute(
        &self,
        cancel: CancellationToken,
        mut task: Task,
        callback: ProgressCallback,
    ) -> MaestroResult<()> {
        // Cancelled while still queued: the task is already terminal.
        if cancel.is_cancelled() {
            return Ok(());
        }

        info!(
            task_id = task.id,
            resource_type = %task.resource_type,
            resource_name = %task.resource_name,
            "executing task"
        );

        let started = Utc::now();
        task.status = TaskStatus::Running;
        task.started_at = Some(started);
        self.storage.tasks().update(&task).await?;
        callback(
            task.id,
            10,
            TaskStatus::Running,
            "task started".to_string(),
            None,
        )
        .await;

        let mut event_logs = Vec::new();
        let run_result = match self.resolver.resolve(&task).await {
            Ok(plan) => {
                self.run_plan(&cancel, &plan, task.id, &callback, &mut event_logs)
                    .await
            }
            Err(e) => Err(e),
        };

        let completed = Utc::now();
        task.completed_at = Some(completed);
        task.duration_ms = (completed - started).num_milliseconds();
        task.event_logs = event_logs.join("\n");

        match run_result {
            Ok(RunOutcome::Completed(result)) => {
                task.status = TaskStatus::Completed;
                task.progress = 100;
                task.result = result.clone();
                self.storage.tasks().update(&task).await?;
                callback(
                    task.id,
                    100,
                    TaskStatus::Completed,
                    "task completed".to_string(),
                    Some(serde_json::json!({ "details": { "result": result } })),
                )
                .await;
                Ok(())
            }
            Ok(RunOutcome::Cancelled(partial)) => {
                task.status = TaskStatus::Cancelled;
                task.result = partial.clone();
                self.storage.tasks().update(&task).await?;
                callback(
                    task.id,
                    task.progress,
                    TaskStatus::Cancelled,
                    partial,
                    Some(serde_json::json!({ "type": "cancelled" })),
                )
                .await;
                Ok(())
            }
            Err(e) => {
                // Partial output stays in event_logs only.
                task.status = TaskStatus::Failed;
                task.error = e.to_string();
                task.result = String::new();
                self.storage.tasks().update(&task).await?;
                callback(task.id, 0, TaskStatus::Failed, e.to_string(), None).await;
                Err(e)
            }
        }
    }
}
