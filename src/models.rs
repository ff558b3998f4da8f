//! Core data types: projects, jobs and the rendered graph.
//!
//! Job fields mirror the keys of a Zuul `job` entry. Keys the builder does not
//! interpret are kept verbatim in [`Job::extra`] so they still reach graph
//! consumers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// One resolved repository clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    /// Local clone directory.
    pub path: PathBuf,
    /// Source identifier as supplied by the caller.
    pub url: String,
    /// Revision the clone was at when last resolved or synchronized.
    pub commit: String,
}

/// A reference from a job to a job it depends on.
///
/// Zuul accepts both `- other-job` and `- name: other-job` (with optional
/// `soft: true` and friends). Anything else is kept but produces no edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobDependency {
    Name(String),
    Named {
        name: String,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    Other(Value),
}

impl JobDependency {
    pub fn name(&self) -> Option<&str> {
        match self {
            JobDependency::Name(name) => Some(name),
            JobDependency::Named { name, .. } => Some(name),
            JobDependency::Other(_) => None,
        }
    }
}

/// A `job` entry as written in a config file, before provenance is attached.
#[derive(Debug, Clone, Deserialize)]
pub struct JobDefinition {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub vars: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub dependencies: Vec<JobDependency>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub roles: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A job with its source-location provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub vars: Map<String, Value>,
    pub dependencies: Vec<JobDependency>,
    pub roles: Vec<Value>,
    /// Path of the defining file relative to the project root.
    pub source_file: String,
    /// 1-based line where the job body starts: its first key for a block
    /// mapping, the `job:` line for an inline one.
    pub source_line: usize,
    /// Browsable link to the definition at the pinned commit.
    pub source_url: String,
    /// Browsable link per variable, for variables whose line was located.
    pub vars_source: Map<String, Value>,
    /// Unrecognized job keys, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Job {
    /// Names this job depends on, in declaration order.
    pub fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.dependencies.iter().filter_map(JobDependency::name)
    }

    /// A job with no provenance, convenient for building registries by hand.
    pub fn named(name: impl Into<String>) -> Self {
        Job {
            name: name.into(),
            parent: None,
            vars: Map::new(),
            dependencies: Vec::new(),
            roles: Vec::new(),
            source_file: String::new(),
            source_line: 1,
            source_url: String::new(),
            vars_source: Map::new(),
            extra: Map::new(),
        }
    }
}

/// Variables contributed by one ancestor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InheritedVars {
    /// The ancestor's job name.
    pub name: String,
    pub vars: Map<String, Value>,
    pub vars_source: Map<String, Value>,
}

/// Node/edge rendering of the job registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub data: NodeData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeData {
    pub label: String,
    pub details: NodeDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeDetails {
    #[serde(flatten)]
    pub job: Job,
    pub inherited_vars: Vec<InheritedVars>,
    /// Present when the parent chain loops; lists the walk up to the repeat.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inheritance_cycle: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Inheritance,
    Dependency,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
    pub animated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_definition_reads_both_dependency_forms() {
        let def: JobDefinition = serde_yaml::from_str(
            r#"
name: deploy
parent: base
vars:
  zeta: 1
  alpha: two
dependencies:
  - build
  - name: lint
    soft: true
  - 42
roles:
  - zuul: org/roles
timeout: 1800
"#,
        )
        .unwrap();

        assert_eq!(def.name, "deploy");
        assert_eq!(def.parent.as_deref(), Some("base"));
        let keys: Vec<&String> = def.vars.keys().collect();
        assert_eq!(keys, ["zeta", "alpha"]);
        let names: Vec<Option<&str>> = def.dependencies.iter().map(|d| d.name()).collect();
        assert_eq!(names, [Some("build"), Some("lint"), None]);
        assert_eq!(def.roles.len(), 1);
        assert_eq!(def.extra.get("timeout"), Some(&Value::from(1800)));
    }

    #[test]
    fn test_job_definition_null_fields() {
        let def: JobDefinition = serde_yaml::from_str("name: bare\nvars:\ndependencies:\n").unwrap();
        assert!(def.vars.is_empty());
        assert!(def.dependencies.is_empty());
        assert!(def.parent.is_none());
    }

    #[test]
    fn test_job_definition_requires_name() {
        let res: Result<JobDefinition, _> = serde_yaml::from_str("parent: base\n");
        assert!(res.is_err());
    }

    #[test]
    fn test_edge_serialization_omits_missing_label() {
        let edge = GraphEdge {
            id: "a-b".to_string(),
            source: "a".to_string(),
            target: "b".to_string(),
            kind: EdgeKind::Inheritance,
            animated: false,
            label: None,
        };
        let json = serde_json::to_value(&edge).unwrap();
        assert!(json.get("label").is_none());
        assert_eq!(json["kind"], "inheritance");
    }

    #[test]
    fn test_node_details_flatten_job_fields() {
        let mut job = Job::named("child");
        job.extra.insert("voting".to_string(), Value::Bool(false));
        let details = NodeDetails {
            job,
            inherited_vars: Vec::new(),
            inheritance_cycle: None,
        };
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["name"], "child");
        assert_eq!(json["voting"], false);
        assert!(json["inherited_vars"].as_array().unwrap().is_empty());
        assert!(json.get("inheritance_cycle").is_none());
    }
}
