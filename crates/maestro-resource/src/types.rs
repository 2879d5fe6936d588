use chrono::{DateTime, Utc};
use maestro_core::{MaestroError, MaestroResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The single recognized apiVersion for declarative resources.
pub const API_VERSION: &str = "maestro.io/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Soul,
    Mind,
    Craft,
    Robot,
    Team,
    Collaboration,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Soul => write!(f, "Soul"),
            ResourceKind::Mind => write!(f, "Mind"),
            ResourceKind::Craft => write!(f, "Craft"),
            ResourceKind::Robot => write!(f, "Robot"),
            ResourceKind::Team => write!(f, "Team"),
            ResourceKind::Collaboration => write!(f, "Collaboration"),
        }
    }
}

/// Metadata shared by all resource kinds. `(workspace, kind, name)` is the
/// unique identity; references between resources are by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Soul: an agent's personality and behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Soul {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: ResourceKind,
    pub metadata: Metadata,
    pub spec: SoulSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SoulSpec {
    pub personality: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
}

/// Mind: LLM model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mind {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: ResourceKind,
    pub metadata: Metadata,
    pub spec: MindSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MindSpec {
    pub provider: String,
    pub model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
}

/// Craft: tool descriptors plus external tool-server launch specs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Craft {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: ResourceKind,
    pub metadata: Metadata,
    pub spec: CraftSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CraftSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp: Option<McpConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub tool_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_yaml_ng::Value>,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<McpServer>,
}

/// Launch spec for an external tool server the runner connects to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpServer {
    pub name: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
}

/// Robot: a runnable agent referencing one Soul, one Mind and
/// optionally one Craft, all by name within the same workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Robot {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: ResourceKind,
    pub metadata: Metadata,
    pub spec: RobotSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RobotSpec {
    pub soul: String,
    pub mind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub craft: Option<String>,
}

/// Team: a collaboration of robots with an optional leader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: ResourceKind,
    pub metadata: Metadata,
    pub spec: TeamSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader: Option<String>,
    pub members: Vec<String>,
    pub mode: CollaborationMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub craft: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollaborationMode {
    Coordinate,
    Collaborate,
    Route,
}

impl std::fmt::Display for CollaborationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollaborationMode::Coordinate => write!(f, "coordinate"),
            CollaborationMode::Collaborate => write!(f, "collaborate"),
            CollaborationMode::Route => write!(f, "route"),
        }
    }
}

/// Collaboration: an explicit step graph for custom agent pipelines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collaboration {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: ResourceKind,
    pub metadata: Metadata,
    pub spec: CollaborationSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborationSpec {
    /// "sequential", "parallel" or "conditional".
    #[serde(rename = "type")]
    pub step_type: String,
    pub steps: Vec<CollaborationStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<serde_yaml_ng::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborationStep {
    pub name: String,
    pub agent: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// A parsed, validated resource of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Soul(Soul),
    Mind(Mind),
    Craft(Craft),
    Robot(Robot),
    Team(Team),
    Collaboration(Collaboration),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Soul(_) => ResourceKind::Soul,
            Resource::Mind(_) => ResourceKind::Mind,
            Resource::Craft(_) => ResourceKind::Craft,
            Resource::Robot(_) => ResourceKind::Robot,
            Resource::Team(_) => ResourceKind::Team,
            Resource::Collaboration(_) => ResourceKind::Collaboration,
        }
    }

    pub fn metadata(&self) -> &Metadata {
        match self {
            Resource::Soul(r) => &r.metadata,
            Resource::Mind(r) => &r.metadata,
            Resource::Craft(r) => &r.metadata,
            Resource::Robot(r) => &r.metadata,
            Resource::Team(r) => &r.metadata,
            Resource::Collaboration(r) => &r.metadata,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata().name
    }

    pub fn validate(&self) -> MaestroResult<()> {
        if self.metadata().name.is_empty() {
            return Err(MaestroError::InvalidMetadata(format!(
                "{} is missing metadata.name",
                self.kind()
            )));
        }
        match self {
            Resource::Soul(r) if r.spec.personality.is_empty() => Err(
                MaestroError::InvalidSpec("Soul requires spec.personality".to_string()),
            ),
            Resource::Mind(r) if r.spec.provider.is_empty() || r.spec.model_id.is_empty() => {
                Err(MaestroError::InvalidSpec(
                    "Mind requires spec.provider and spec.model_id".to_string(),
                ))
            }
            Resource::Robot(r) if r.spec.soul.is_empty() || r.spec.mind.is_empty() => Err(
                MaestroError::InvalidSpec("Robot requires spec.soul and spec.mind".to_string()),
            ),
            Resource::Team(r) if r.spec.members.is_empty() => Err(MaestroError::InvalidSpec(
                "Team requires a non-empty spec.members list".to_string(),
            )),
            _ => Ok(()),
        }
    }
}
