//! The fully-dereferenced execution plan handed to the runner as a single
//! JSON object on stdin.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default tool-server call timeout forwarded to the runner, in seconds.
pub const DEFAULT_TOOL_TIMEOUT_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// "robot" or "team".
    #[serde(rename = "type")]
    pub target: String,
    pub prompt: String,
    pub session_id: String,
    /// The driving model: the robot's mind, or for teams the leader's
    /// mind (first member's mind when there is no leader).
    pub model: PlanModel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soul: Option<PlanSoul>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<PlanTeam>,
    pub context: PlanContext,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mcp_tools: Vec<PlanTool>,

    pub stream: bool,
    pub debug: bool,
    pub debug_level: i32,
    pub reuse_session: bool,
}

impl ExecutionPlan {
    /// Plan skeleton with the execution options every run uses.
    pub fn new(target: impl Into<String>, prompt: impl Into<String>, task_id: u64) -> Self {
        Self {
            target: target.into(),
            prompt: prompt.into(),
            session_id: format!("task-{task_id}"),
            model: PlanModel::default(),
            soul: None,
            team: None,
            context: PlanContext::default(),
            mcp_tools: Vec::new(),
            stream: true,
            debug: false,
            debug_level: 2,
            reuse_session: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanModel {
    pub provider: String,
    pub model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanSoul {
    pub name: String,
    pub personality: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTeam {
    pub name: String,
    /// "coordinate", "collaborate" or "route".
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader: Option<PlanMember>,
    pub members: Vec<PlanMember>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanMember {
    pub name: String,
    pub model: PlanModel,
    pub personality: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,
}

/// Launch spec for an external tool server, forwarded verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTool {
    pub name: String,
    /// "stdio", "sse" or "streamable-http".
    #[serde(rename = "type")]
    pub transport: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sse_read_timeout: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_serializes_runner_contract() {
        let mut plan = ExecutionPlan::new("robot", "hi", 42);
        plan.model = PlanModel {
            provider: "ollama".to_string(),
            model_id: "llama3".to_string(),
            api_key: None,
            base_url: None,
        };
        plan.soul = Some(PlanSoul {
            name: "r".to_string(),
            personality: "You are helpful.".to_string(),
        });

        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&plan).unwrap()).unwrap();
        assert_eq!(json["type"], "robot");
        assert_eq!(json["session_id"], "task-42");
        assert_eq!(json["stream"], true);
        assert_eq!(json["debug"], false);
        assert_eq!(json["debug_level"], 2);
        assert_eq!(json["reuse_session"], true);
        assert_eq!(json["model"]["provider"], "ollama");
        assert_eq!(json["soul"]["personality"], "You are helpful.");
        // Optional sections stay out of the payload entirely.
        assert!(json.get("team").is_none());
        assert!(json.get("mcp_tools").is_none());
        assert!(json["model"].get("api_key").is_none());
    }
}
