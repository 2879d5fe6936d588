//! Declarative agent resource model and YAML parser.
//!
//! Six kinds form a reference DAG: a [`Robot`] references one [`Soul`]
//! (personality) and one [`Mind`] (model configuration) plus optionally a
//! [`Craft`] (tools); a [`Team`] references robots by name; a
//! [`Collaboration`] describes an explicit step graph. References are
//! workspace-scoped names resolved at execution time, not at definition
//! time.

pub mod parser;
pub mod types;

pub use parser::{marshal, parse, parse_multi};
pub use types::{
    Collaboration, CollaborationMode, CollaborationSpec, CollaborationStep, Craft, CraftSpec,
    McpConfig, McpServer, Metadata, Mind, MindSpec, Resource, ResourceKind, Robot, RobotSpec,
    Soul, SoulSpec, Team, TeamSpec, ToolConfig, API_VERSION,
};
