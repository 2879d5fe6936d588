//! Walks a task's resource references into a fully materialized
//! [`ExecutionPlan`]. References resolve by name against the repository at
//! execution time; a dangling leaf reference fails the plan, except for
//! team members, which are skipped with a warning as long as at least one
//! valid member or a leader remains.

use crate::plan::*;
use maestro_core::{MaestroError, MaestroResult, Task};
use maestro_resource::{parse, Craft, Mind, Resource, ResourceKind, Robot, Soul, Team};
use maestro_storage::Storage;
use tracing::{info, warn};

pub struct PlanResolver {
    storage: Storage,
}

impl PlanResolver {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub async fn resolve(&self, task: &Task) -> MaestroResult<ExecutionPlan> {
        match task.resource_type.as_str() {
            "robot" | "bot" => self.resolve_robot(task).await,
            "team" => self.resolve_team(task).await,
            other => Err(MaestroError::InvalidSpec(format!(
                "unsupported resource type: {other}"
            ))),
        }
    }

    async fn resolve_robot(&self, task: &Task) -> MaestroResult<ExecutionPlan> {
        let robot = self
            .load_robot(task.workspace_id, &task.resource_name)
            .await?;
        let soul = self.load_soul(task.workspace_id, &robot.spec.soul).await?;
        let mind = self.load_mind(task.workspace_id, &robot.spec.mind).await?;

        let mut plan = ExecutionPlan::new("robot", &task.prompt, task.id);
        plan.model = model_from_mind(&mind);
        plan.soul = Some(PlanSoul {
            name: robot.metadata.name.clone(),
            personality: soul.spec.personality.clone(),
        });
        plan.context = task_context(task);
        if let Some(craft_name) = &robot.spec.craft {
            plan.mcp_tools = self.load_tool_servers(task.workspace_id, craft_name).await;
        }
        Ok(plan)
    }

    async fn resolve_team(&self, task: &Task) -> MaestroResult<ExecutionPlan> {
        let team = self
            .load_team(task.workspace_id, &task.resource_name)
            .await?;

        let mut leader = None;
        let mut driving_mind: Option<Mind> = None;
        if let Some(leader_name) = &team.spec.leader {
            let (member, mind) = self
                .load_robot_as_member(task.workspace_id, leader_name)
                .await?;
            leader = Some(member);
            driving_mind = Some(mind);
        }

        let mut members = Vec::new();
        for member_name in &team.spec.members {
            match self
                .load_robot_as_member(task.workspace_id, member_name)
                .await
            {
                Ok((member, mind)) => {
                    if driving_mind.is_none() {
                        driving_mind = Some(mind);
                    }
                    members.push(member);
                }
                Err(e) => {
                    warn!(member = %member_name, error = %e, "failed to load team member, skipping");
                }
            }
        }

        if members.is_empty() && leader.is_none() {
            return Err(MaestroError::ResourceResolution {
                name: team.metadata.name.clone(),
                kind: ResourceKind::Team.to_string(),
                cause: "team has no valid members or leader".to_string(),
            });
        }
        let driving_mind = driving_mind.ok_or_else(|| MaestroError::ResourceResolution {
            name: team.metadata.name.clone(),
            kind: ResourceKind::Team.to_string(),
            cause: "no mind found for team".to_string(),
        })?;

        // The task may override the team's declared collaboration mode.
        let mode = task
            .mode
            .clone()
            .unwrap_or_else(|| team.spec.mode.to_string());

        let mut plan = ExecutionPlan::new("team", &task.prompt, task.id);
        plan.model = model_from_mind(&driving_mind);
        plan.team = Some(PlanTeam {
            name: team.metadata.name.clone(),
            mode,
            leader,
            members,
            description: team.spec.description.clone(),
        });
        plan.context = task_context(task);
        Ok(plan)
    }

    async fn load_robot_as_member(
        &self,
        workspace_id: u64,
        robot_name: &str,
    ) -> MaestroResult<(PlanMember, Mind)> {
        let robot = self.load_robot(workspace_id, robot_name).await?;
        let soul = self.load_soul(workspace_id, &robot.spec.soul).await?;
        let mind = self.load_mind(workspace_id, &robot.spec.mind).await?;

        let member = PlanMember {
            name: robot.metadata.name.clone(),
            model: model_from_mind(&mind),
            personality: soul.spec.personality.clone(),
            description: robot.metadata.description.clone(),
        };
        Ok((member, mind))
    }

    /// Tool-server failures never fail the plan; a robot just runs without
    /// its craft.
    async fn load_tool_servers(&self, workspace_id: u64, craft_name: &str) -> Vec<PlanTool> {
        let craft = match self.load_craft(workspace_id, craft_name).await {
            Ok(craft) => craft,
            Err(e) => {
                warn!(craft = %craft_name, error = %e, "failed to load craft, skipping tools");
                return Vec::new();
            }
        };

        let servers = craft
            .spec
            .mcp
            .map(|mcp| mcp.servers)
            .unwrap_or_default();
        let tools: Vec<PlanTool> = servers
            .into_iter()
            .map(|server| PlanTool {
                name: server.name,
                transport: "stdio".to_string(),
                command: Some(server.command),
                args: server.args,
                env: server.env,
                url: None,
                headers: None,
                timeout: Some(DEFAULT_TOOL_TIMEOUT_SECS),
                sse_read_timeout: None,
            })
            .collect();
        info!(count = tools.len(), "loaded tool servers");
        tools
    }

    async fn load(
        &self,
        workspace_id: u64,
        name: &str,
        kind: ResourceKind,
    ) -> MaestroResult<Resource> {
        let record = self
            .storage
            .resources()
            .get_by_name(workspace_id, name, &kind.to_string())
            .await
            .map_err(|e| resolution_error(name, kind, e))?;
        parse(&record.spec).map_err(|e| resolution_error(name, kind, e))
    }

    async fn load_robot(&self, workspace_id: u64, name: &str) -> MaestroResult<Robot> {
        match self.load(workspace_id, name, ResourceKind::Robot).await? {
            Resource::Robot(robot) => Ok(robot),
            other => Err(kind_mismatch(name, ResourceKind::Robot, &other)),
        }
    }

    async fn load_soul(&self, workspace_id: u64, name: &str) -> MaestroResult<Soul> {
        match self.load(workspace_id, name, ResourceKind::Soul).await? {
            Resource::Soul(soul) => Ok(soul),
            other => Err(kind_mismatch(name, ResourceKind::Soul, &other)),
        }
    }

    async fn load_mind(&self, workspace_id: u64, name: &str) -> MaestroResult<Mind> {
        match self.load(workspace_id, name, ResourceKind::Mind).await? {
            Resource::Mind(mind) => Ok(mind),
            other => Err(kind_mismatch(name, ResourceKind::Mind, &other)),
        }
    }

    async fn load_craft(&self, workspace_id: u64, name: &str) -> MaestroResult<Craft> {
        match self.load(workspace_id, name, ResourceKind::Craft).await? {
            Resource::Craft(craft) => Ok(craft),
            other => Err(kind_mismatch(name, ResourceKind::Craft, &other)),
        }
    }

    async fn load_team(&self, workspace_id: u64, name: &str) -> MaestroResult<Team> {
        match self.load(workspace_id, name, ResourceKind::Team).await? {
            Resource::Team(team) => Ok(team),
            other => Err(kind_mismatch(name, ResourceKind::Team, &other)),
        }
    }
}

fn resolution_error(name: &str, kind: ResourceKind, cause: MaestroError) -> MaestroError {
    MaestroError::ResourceResolution {
        name: name.to_string(),
        kind: kind.to_string(),
        cause: cause.to_string(),
    }
}

fn kind_mismatch(name: &str, expected: ResourceKind, got: &Resource) -> MaestroError {
    MaestroError::ResourceResolution {
        name: name.to_string(),
        kind: expected.to_string(),
        cause: format!("stored spec declares kind {}", got.kind()),
    }
}

fn model_from_mind(mind: &Mind) -> PlanModel {
    PlanModel {
        provider: mind.spec.provider.clone(),
        model_id: mind.spec.model_id.clone(),
        api_key: mind.spec.api_key.clone(),
        base_url: mind.spec.base_url.clone(),
    }
}

fn task_context(task: &Task) -> PlanContext {
    PlanContext {
        cwd: None,
        git_url: task.git_url.clone(),
        branch: task.branch_name.clone(),
        project_path: None,
    }
}
