//! Task execution for the maestro platform.
//!
//! The [`PlanResolver`] dereferences a task's declarative resources into
//! an [`ExecutionPlan`]; the [`RunnerExecutor`] runs that plan through the
//! external agent runtime over an NDJSON pipe, while the
//! [`DirectExecutor`] runs it in-process against an LLM provider when no
//! runner is configured.

pub mod direct;
pub mod llm;
pub mod plan;
pub mod resolver;
pub mod runner;

pub use direct::DirectExecutor;
pub use plan::{
    ExecutionPlan, PlanContext, PlanMember, PlanModel, PlanSoul, PlanTeam, PlanTool,
    DEFAULT_TOOL_TIMEOUT_SECS,
};
pub use resolver::PlanResolver;
pub use runner::{RunnerConfig, RunnerExecutor};
