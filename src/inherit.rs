//! Variable inheritance along `parent` chains.

use std::collections::HashSet;

use crate::error::InheritanceError;
use crate::models::InheritedVars;
use crate::registry::JobRegistry;

/// Result of walking a job's ancestors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AncestorWalk {
    /// One record per ancestor declaring vars, nearest first.
    pub records: Vec<InheritedVars>,
    /// Set when the walk revisited a name: the names in walk order, ending
    /// with the repeated one.
    pub cycle: Option<Vec<String>>,
}

/// Walks `parent` references upward from `job_name`.
///
/// The walk ends at a job without a parent, at a parent missing from the
/// registry, or at the first name already visited.
pub fn walk_ancestors(registry: &JobRegistry, job_name: &str) -> AncestorWalk {
    let mut walk = AncestorWalk::default();
    let Some(mut current) = registry.get(job_name) else {
        return walk;
    };

    let mut chain = vec![job_name.to_string()];
    let mut visited: HashSet<&str> = HashSet::from([job_name]);

    while let Some(parent_name) = current.parent.as_deref() {
        if !visited.insert(parent_name) {
            chain.push(parent_name.to_string());
            walk.cycle = Some(chain);
            break;
        }
        let Some(parent) = registry.get(parent_name) else {
            break;
        };
        chain.push(parent_name.to_string());

        if !parent.vars.is_empty() {
            walk.records.push(InheritedVars {
                name: parent_name.to_string(),
                vars: parent.vars.clone(),
                vars_source: parent.vars_source.clone(),
            });
        }
        current = parent;
    }

    walk
}

/// Variables inherited by `job_name`, nearest ancestor first.
///
/// Unknown jobs inherit nothing. A cyclic parent chain is an error.
pub fn inherited_vars(
    registry: &JobRegistry,
    job_name: &str,
) -> Result<Vec<InheritedVars>, InheritanceError> {
    let walk = walk_ancestors(registry, job_name);
    match walk.cycle {
        Some(chain) => Err(InheritanceError::Cycle {
            job: job_name.to_string(),
            chain,
        }),
        None => Ok(walk.records),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Job;
    use serde_json::{json, Map, Value};

    fn job(name: &str, parent: Option<&str>, vars: Value) -> Job {
        let mut job = Job::named(name);
        job.parent = parent.map(str::to_string);
        if let Value::Object(map) = vars {
            job.vars = map;
        }
        job
    }

    #[test]
    fn test_base_child_scenario() {
        let registry: JobRegistry = vec![
            job("base-job", None, json!({"foo": "bar"})),
            job("child-job", Some("base-job"), json!({"baz": "qux"})),
        ]
        .into_iter()
        .collect();

        let inherited = inherited_vars(&registry, "child-job").unwrap();
        assert_eq!(inherited.len(), 1);
        assert_eq!(inherited[0].name, "base-job");
        assert_eq!(Value::Object(inherited[0].vars.clone()), json!({"foo": "bar"}));
        assert_eq!(inherited[0].vars_source, Map::new());
    }

    #[test]
    fn test_nearest_first_and_skips_empty_vars() {
        let registry: JobRegistry = vec![
            job("root", None, json!({"a": 1})),
            job("middle", Some("root"), json!({})),
            job("upper", Some("middle"), json!({"b": 2})),
            job("leaf", Some("upper"), json!({})),
        ]
        .into_iter()
        .collect();

        let names: Vec<String> = inherited_vars(&registry, "leaf")
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, ["upper", "root"]);
    }

    #[test]
    fn test_missing_parent_stops_walk() {
        let registry: JobRegistry = vec![job("orphan", Some("elsewhere"), json!({"x": 1}))]
            .into_iter()
            .collect();
        assert!(inherited_vars(&registry, "orphan").unwrap().is_empty());
        assert!(inherited_vars(&registry, "unknown").unwrap().is_empty());
    }

    #[test]
    fn test_two_job_cycle_terminates_with_error() {
        let registry: JobRegistry = vec![
            job("a", Some("b"), json!({"from_a": 1})),
            job("b", Some("a"), json!({"from_b": 2})),
        ]
        .into_iter()
        .collect();

        let err = inherited_vars(&registry, "a").unwrap_err();
        assert_eq!(
            err,
            InheritanceError::Cycle {
                job: "a".to_string(),
                chain: vec!["a".to_string(), "b".to_string(), "a".to_string()],
            }
        );

        let walk = walk_ancestors(&registry, "a");
        assert_eq!(walk.records.len(), 1);
        assert_eq!(walk.records[0].name, "b");
    }

    #[test]
    fn test_self_parent_is_a_cycle() {
        let registry: JobRegistry = vec![job("loop", Some("loop"), json!({}))]
            .into_iter()
            .collect();
        assert!(inherited_vars(&registry, "loop").is_err());
    }

    #[test]
    fn test_cycle_above_the_start() {
        let registry: JobRegistry = vec![
            job("x", Some("y"), json!({})),
            job("y", Some("z"), json!({})),
            job("z", Some("y"), json!({})),
        ]
        .into_iter()
        .collect();
        let walk = walk_ancestors(&registry, "x");
        assert_eq!(
            walk.cycle,
            Some(vec!["x".into(), "y".into(), "z".into(), "y".into()])
        );
    }
}
