//! In-process executor used when no external runner is configured: the
//! resolved plan is executed directly against an LLM provider, streaming
//! chunks through the progress callback. Clients are cached per
//! `(provider, model, base_url)` and shared across tasks.

use crate::llm::{ChatMessage, GeminiClient, LlmClient, OllamaClient, OpenAiClient};
use crate::plan::{ExecutionPlan, PlanModel, PlanTeam};
use crate::resolver::PlanResolver;
use async_trait::async_trait;
use chrono::Utc;
use maestro_core::{MaestroError, MaestroResult, ProgressCallback, Task, TaskStatus};
use maestro_orchestrator::TaskExecutor;
use maestro_storage::Storage;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct DirectExecutor {
    storage: Storage,
    resolver: PlanResolver,
    clients: Mutex<HashMap<String, Arc<dyn LlmClient>>>,
}

enum DirectOutcome {
    Completed(String),
    Cancelled(String),
}

impl DirectExecutor {
    pub fn new(storage: Storage) -> Self {
        let resolver = PlanResolver::new(storage.clone());
        Self {
            storage,
            resolver,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Get or build the client for a model spec. API keys come from the
    /// Mind spec or fall back to the provider's well-known environment
    /// variable.
    pub fn client(&self, model: &PlanModel) -> MaestroResult<Arc<dyn LlmClient>> {
        let cache_key = format!(
            "{}:{}:{}",
            model.provider,
            model.model_id,
            model.base_url.as_deref().unwrap_or("")
        );
        if let Some(client) = self
            .clients
            .lock()
            .expect("client cache lock poisoned")
            .get(&cache_key)
        {
            return Ok(client.clone());
        }

        let client = build_client(model)?;
        self.clients
            .lock()
            .expect("client cache lock poisoned")
            .insert(cache_key, client.clone());
        Ok(client)
    }

    async fn run_plan(
        &self,
        cancel: &CancellationToken,
        plan: &ExecutionPlan,
        task_id: u64,
        callback: &ProgressCallback,
    ) -> MaestroResult<DirectOutcome> {
        match &plan.team {
            None => self.run_robot(cancel, plan, task_id, callback).await,
            Some(team) => self.run_team(cancel, plan, team, task_id, callback).await,
        }
    }

    async fn run_robot(
        &self,
        cancel: &CancellationToken,
        plan: &ExecutionPlan,
        task_id: u64,
        callback: &ProgressCallback,
    ) -> MaestroResult<DirectOutcome> {
        let client = self.client(&plan.model)?;
        let personality = plan
            .soul
            .as_ref()
            .map(|soul| soul.personality.clone())
            .unwrap_or_default();
        let messages = vec![
            ChatMessage::system(personality),
            ChatMessage::user(&plan.prompt),
        ];

        callback(
            task_id,
            30,
            TaskStatus::Running,
            "calling LLM...".to_string(),
            None,
        )
        .await;
        self.stream_chunks(cancel, &client, messages, task_id, 60, callback)
            .await
    }

    async fn run_team(
        &self,
        cancel: &CancellationToken,
        plan: &ExecutionPlan,
        team: &PlanTeam,
        task_id: u64,
        callback: &ProgressCallback,
    ) -> MaestroResult<DirectOutcome> {
        // Leader-coordination only: the leader's model runs with the team
        // roster folded into its system prompt.
        let Some(leader) = &team.leader else {
            return Ok(DirectOutcome::Completed(String::new()));
        };

        let client = self.client(&plan.model)?;
        let member_names: Vec<&str> = team.members.iter().map(|m| m.name.as_str()).collect();
        let team_context = format!(
            "You are leading a team with {} members. Coordinate their work to accomplish the task.\n\nTeam members: {:?}\nCollaboration mode: {}",
            team.members.len(),
            member_names,
            team.mode,
        );
        let messages = vec![
            ChatMessage::system(format!("{}\n\n{team_context}", leader.personality)),
            ChatMessage::user(&plan.prompt),
        ];

        callback(
            task_id,
            30,
            TaskStatus::Running,
            "team leader coordinating...".to_string(),
            None,
        )
        .await;
        self.stream_chunks(cancel, &client, messages, task_id, 70, callback)
            .await
    }

    async fn stream_chunks(
        &self,
        cancel: &CancellationToken,
        client: &Arc<dyn LlmClient>,
        messages: Vec<ChatMessage>,
        task_id: u64,
        progress: i32,
        callback: &ProgressCallback,
    ) -> MaestroResult<DirectOutcome> {
        info!(task_id, client = %client.name(), "streaming completion");
        let (mut rx, handle) = client.stream(&messages).await?;

        let mut partial = String::new();
        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => {
                    handle.abort();
                    return Ok(DirectOutcome::Cancelled(partial));
                }
                chunk = rx.recv() => chunk,
            };
            let Some(chunk) = chunk else { break };

            partial.push_str(&chunk);
            callback(
                task_id,
                progress,
                TaskStatus::Running,
                chunk,
                Some(serde_json::json!({ "type": "content" })),
            )
            .await;
        }

        let full = handle
            .await
            .map_err(|e| MaestroError::Runtime(format!("stream task failed: {e}")))??;
        Ok(DirectOutcome::Completed(full))
    }
}

fn build_client(model: &PlanModel) -> MaestroResult<Arc<dyn LlmClient>> {
    let key_or_env = |env: &str| -> MaestroResult<String> {
        model
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(env).ok().filter(|k| !k.is_empty()))
            .ok_or_else(|| MaestroError::MissingApiKey(model.provider.clone()))
    };
    let base_url = model.base_url.clone().filter(|u| !u.is_empty());

    let client: Arc<dyn LlmClient> = match model.provider.as_str() {
        "ollama" => Arc::new(OllamaClient::new(
            &model.model_id,
            base_url.unwrap_or_default(),
        )),
        "openai" => {
            let key = key_or_env("OPENAI_API_KEY")?;
            match base_url {
                Some(url) => Arc::new(OpenAiClient::compatible(&model.model_id, key, url)),
                None => Arc::new(OpenAiClient::new(&model.model_id, key)),
            }
        }
        "groq" => Arc::new(OpenAiClient::compatible(
            &model.model_id,
            key_or_env("GROQ_API_KEY")?,
            "https://api.groq.com/openai/v1",
        )),
        "together" => Arc::new(OpenAiClient::compatible(
            &model.model_id,
            key_or_env("TOGETHER_API_KEY")?,
            "https://api.together.xyz/v1",
        )),
        "deepseek" => Arc::new(OpenAiClient::compatible(
            &model.model_id,
            key_or_env("DEEPSEEK_API_KEY")?,
            "https://api.deepseek.com/v1",
        )),
        "openrouter" => Arc::new(OpenAiClient::compatible(
            &model.model_id,
            key_or_env("OPENROUTER_API_KEY")?,
            "https://openrouter.ai/api/v1",
        )),
        "gemini" | "google" => {
            let key = key_or_env("GEMINI_API_KEY").or_else(|_| key_or_env("GOOGLE_API_KEY"))?;
            Arc::new(GeminiClient::new(&model.model_id, key))
        }
        other => match base_url {
            // Unknown providers work when they expose an OpenAI-compatible API.
            Some(url) => Arc::new(OpenAiClient::compatible(
                &model.model_id,
                model.api_key.clone().unwrap_or_default(),
                url,
            )),
            None => return Err(MaestroError::UnsupportedProvider(other.to_string())),
        },
    };
    Ok(client)
}

#[async_trait]
impl TaskExecutor for DirectExecutor {
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
            "executing task in-process"
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

        let run_result = match self.resolver.resolve(&task).await {
            Ok(plan) => self.run_plan(&cancel, &plan, task.id, &callback).await,
            Err(e) => Err(e),
        };

        let completed = Utc::now();
        task.completed_at = Some(completed);
        task.duration_ms = (completed - started).num_milliseconds();

        match run_result {
            Ok(DirectOutcome::Completed(result)) => {
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
            Ok(DirectOutcome::Cancelled(partial)) => {
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
                task.status = TaskStatus::Failed;
                task.error = e.to_string();
                self.storage.tasks().update(&task).await?;
                callback(task.id, 0, TaskStatus::Failed, e.to_string(), None).await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(provider: &str, base_url: Option<&str>) -> PlanModel {
        PlanModel {
            provider: provider.to_string(),
            model_id: "test-model".to_string(),
            api_key: None,
            base_url: base_url.map(str::to_string),
        }
    }

    #[test]
    fn clients_are_cached_per_provider_model_and_base_url() {
        let executor = DirectExecutor::new(Storage::in_memory());

        let a = executor.client(&model("ollama", None)).unwrap();
        let b = executor.client(&model("ollama", None)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let c = executor
            .client(&model("ollama", Some("http://other:11434")))
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn unknown_provider_without_base_url_is_rejected() {
        let executor = DirectExecutor::new(Storage::in_memory());
        let err = executor.client(&model("mystery", None)).unwrap_err();
        assert!(matches!(err, MaestroError::UnsupportedProvider(p) if p == "mystery"));
    }

    #[test]
    fn unknown_provider_with_base_url_is_openai_compatible() {
        let executor = DirectExecutor::new(Storage::in_memory());
        let client = executor
            .client(&model("mystery", Some("http://localhost:8000/v1")))
            .unwrap();
        assert_eq!(client.name(), "openai:test-model");
    }

    #[test]
    fn spec_api_key_wins_over_environment() {
        let executor = DirectExecutor::new(Storage::in_memory());
        let mut spec = model("openai", None);
        spec.api_key = Some("sk-from-spec".to_string());
        assert!(executor.client(&spec).is_ok());
    }

    #[test]
    fn missing_api_key_is_an_error() {
        // A provider whose key env var is very unlikely to be set in CI.
        let executor = DirectExecutor::new(Storage::in_memory());
        std::env::remove_var("DEEPSEEK_API_KEY");
        let err = executor.client(&model("deepseek", None)).unwrap_err();
        assert!(matches!(err, MaestroError::MissingApiKey(p) if p == "deepseek"));
    }
}
