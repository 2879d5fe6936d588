//! YAML parsing and marshalling for declarative resources.
//!
//! Parsing is two-phase: a head pass reads `apiVersion` and `kind`, then
//! the document is decoded into the typed struct for that kind and
//! validated. Multi-document input uses the standard `---` delimiter and
//! stops at the first parse or validation error.

use crate::types::*;
use maestro_core::{MaestroError, MaestroResult};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Head {
    #[serde(default, rename = "apiVersion")]
    api_version: String,
    #[serde(default)]
    kind: String,
}

/// Parse a single YAML document into a validated resource.
pub fn parse(input: &str) -> MaestroResult<Resource> {
    let value: serde_yaml_ng::Value = serde_yaml_ng::from_str(input)?;
    parse_value(value)
}

/// Parse a stream of `---`-separated YAML documents. Empty documents are
/// skipped; the first invalid document aborts the whole parse.
pub fn parse_multi(input: &str) -> MaestroResult<Vec<Resource>> {
    let mut resources = Vec::new();
    for doc in serde_yaml_ng::Deserializer::from_str(input) {
        let value = serde_yaml_ng::Value::deserialize(doc)?;
        if value.is_null() {
            continue;
        }
        resources.push(parse_value(value)?);
    }
    Ok(resources)
}

/// Convert a resource back to YAML. Field order follows the declaration
/// order of the typed structs (apiVersion, kind, metadata, spec).
pub fn marshal(resource: &Resource) -> MaestroResult<String> {
    let out = match resource {
        Resource::Soul(r) => serde_yaml_ng::to_string(r)?,
        Resource::Mind(r) => serde_yaml_ng::to_string(r)?,
        Resource::Craft(r) => serde_yaml_ng::to_string(r)?,
        Resource::Robot(r) => serde_yaml_ng::to_string(r)?,
        Resource::Team(r) => serde_yaml_ng::to_string(r)?,
        Resource::Collaboration(r) => serde_yaml_ng::to_string(r)?,
    };
    Ok(out)
}

fn parse_value(value: serde_yaml_ng::Value) -> MaestroResult<Resource> {
    let head: Head = serde_yaml_ng::from_value(value.clone())?;

    if head.api_version != API_VERSION {
        return Err(MaestroError::UnsupportedApiVersion(head.api_version));
    }

    let resource = match head.kind.as_str() {
        "Soul" => Resource::Soul(serde_yaml_ng::from_value(value)?),
        "Mind" => Resource::Mind(serde_yaml_ng::from_value(value)?),
        "Craft" => Resource::Craft(serde_yaml_ng::from_value(value)?),
        "Robot" => Resource::Robot(serde_yaml_ng::from_value(value)?),
        "Team" => Resource::Team(serde_yaml_ng::from_value(value)?),
        "Collaboration" => Resource::Collaboration(serde_yaml_ng::from_value(value)?),
        other => return Err(MaestroError::UnknownKind(other.to_string())),
    };

    resource.validate()?;
    Ok(resource)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOUL_YAML: &str = r#"
apiVersion: maestro.io/v1
kind: Soul
metadata:
  name: helper
  description: A helpful assistant
spec:
  personality: You are helpful.
"#;

    const MIND_YAML: &str = r#"
apiVersion: maestro.io/v1
kind: Mind
metadata:
  name: local-llama
spec:
  provider: ollama
  model_id: llama3
  temperature: 0.2
"#;

    const ROBOT_YAML: &str = r#"
apiVersion: maestro.io/v1
kind: Robot
metadata:
  name: r
spec:
  soul: helper
  mind: local-llama
"#;

    const TEAM_YAML: &str = r#"
apiVersion: maestro.io/v1
kind: Team
metadata:
  name: dev-team
spec:
  leader: r
  members:
    - r
    - reviewer
  mode: coordinate
"#;

    #[test]
    fn parse_soul() {
        let resource = parse(SOUL_YAML).unwrap();
        assert_eq!(resource.kind(), ResourceKind::Soul);
        assert_eq!(resource.name(), "helper");
        match resource {
            Resource::Soul(soul) => assert_eq!(soul.spec.personality, "You are helpful."),
            _ => panic!("expected Soul"),
        }
    }

    #[test]
    fn parse_mind_optional_fields() {
        let resource = parse(MIND_YAML).unwrap();
        match resource {
            Resource::Mind(mind) => {
                assert_eq!(mind.spec.provider, "ollama");
                assert_eq!(mind.spec.model_id, "llama3");
                assert_eq!(mind.spec.temperature, Some(0.2));
                assert!(mind.spec.api_key.is_none());
            }
            _ => panic!("expected Mind"),
        }
    }

    #[test]
    fn parse_team_mode() {
        let resource = parse(TEAM_YAML).unwrap();
        match resource {
            Resource::Team(team) => {
                assert_eq!(team.spec.mode, CollaborationMode::Coordinate);
                assert_eq!(team.spec.leader.as_deref(), Some("r"));
                assert_eq!(team.spec.members.len(), 2);
            }
            _ => panic!("expected Team"),
        }
    }

    #[test]
    fn rejects_wrong_api_version() {
        let yaml = SOUL_YAML.replace("maestro.io/v1", "other.io/v2");
        let err = parse(&yaml).unwrap_err();
        assert!(matches!(err, MaestroError::UnsupportedApiVersion(v) if v == "other.io/v2"));
    }

    #[test]
    fn rejects_missing_api_version() {
        let yaml = "kind: Soul\nmetadata:\n  name: x\nspec:\n  personality: p\n";
        assert!(matches!(
            parse(yaml),
            Err(MaestroError::UnsupportedApiVersion(_))
        ));
    }

    #[test]
    fn rejects_unknown_kind() {
        let yaml = SOUL_YAML.replace("kind: Soul", "kind: Gadget");
        let err = parse(&yaml).unwrap_err();
        assert!(matches!(err, MaestroError::UnknownKind(k) if k == "Gadget"));
    }

    #[test]
    fn rejects_missing_personality() {
        let yaml = r#"
apiVersion: maestro.io/v1
kind: Soul
metadata:
  name: hollow
spec:
  personality: ""
"#;
        assert!(matches!(parse(yaml), Err(MaestroError::InvalidSpec(_))));
    }

    #[test]
    fn rejects_missing_name() {
        let yaml = r#"
apiVersion: maestro.io/v1
kind: Mind
metadata:
  name: ""
spec:
  provider: openai
  model_id: gpt-4o
"#;
        assert!(matches!(parse(yaml), Err(MaestroError::InvalidMetadata(_))));
    }

    #[test]
    fn rejects_robot_without_mind() {
        let yaml = r#"
apiVersion: maestro.io/v1
kind: Robot
metadata:
  name: broken
spec:
  soul: helper
  mind: ""
"#;
        assert!(matches!(parse(yaml), Err(MaestroError::InvalidSpec(_))));
    }

    #[test]
    fn rejects_empty_team() {
        let yaml = r#"
apiVersion: maestro.io/v1
kind: Team
metadata:
  name: ghosts
spec:
  members: []
  mode: route
"#;
        assert!(matches!(parse(yaml), Err(MaestroError::InvalidSpec(_))));
    }

    #[test]
    fn parse_multi_documents() {
        let combined = format!("{SOUL_YAML}---{MIND_YAML}---{ROBOT_YAML}");
        let resources = parse_multi(&combined).unwrap();
        assert_eq!(resources.len(), 3);
        assert_eq!(resources[0].kind(), ResourceKind::Soul);
        assert_eq!(resources[1].kind(), ResourceKind::Mind);
        assert_eq!(resources[2].kind(), ResourceKind::Robot);
    }

    #[test]
    fn parse_multi_stops_at_first_error() {
        let bad_robot = ROBOT_YAML.replace("mind: local-llama", "mind: \"\"");
        let combined = format!("{SOUL_YAML}---{bad_robot}---{MIND_YAML}");
        assert!(parse_multi(&combined).is_err());
    }

    #[test]
    fn parse_craft_with_tool_servers() {
        let yaml = r#"
apiVersion: maestro.io/v1
kind: Craft
metadata:
  name: dev-tools
spec:
  mcp:
    servers:
      - name: fs
        command: npx
        args: ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"]
        env:
          LOG_LEVEL: warn
"#;
        match parse(yaml).unwrap() {
            Resource::Craft(craft) => {
                let servers = &craft.spec.mcp.as_ref().unwrap().servers;
                assert_eq!(servers.len(), 1);
                assert_eq!(servers[0].command, "npx");
                assert_eq!(servers[0].args.len(), 3);
            }
            _ => panic!("expected Craft"),
        }
    }

    #[test]
    fn parse_collaboration_steps() {
        let yaml = r#"
apiVersion: maestro.io/v1
kind: Collaboration
metadata:
  name: pipeline
spec:
  type: sequential
  steps:
    - name: draft
      agent: writer
    - name: review
      agent: critic
      depends_on: [draft]
"#;
        match parse(yaml).unwrap() {
            Resource::Collaboration(collab) => {
                assert_eq!(collab.spec.step_type, "sequential");
                assert_eq!(collab.spec.steps.len(), 2);
                assert_eq!(collab.spec.steps[1].depends_on, vec!["draft"]);
            }
            _ => panic!("expected Collaboration"),
        }
    }

    #[test]
    fn marshal_roundtrip() {
        for yaml in [SOUL_YAML, MIND_YAML, ROBOT_YAML, TEAM_YAML] {
            let original = parse(yaml).unwrap();
            let text = marshal(&original).unwrap();
            let reparsed = parse(&text).unwrap();
            assert_eq!(reparsed, original);
        }
    }
}
