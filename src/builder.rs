//! The configuration graph builder.
//!
//! [`ConfigGraphBuilder::parse`] rebuilds the job registry from scratch on
//! every call: projects are processed in the order given, and within a
//! project in [`discover`](crate::discover::discover) order. The last
//! definition processed for a name wins.

use std::sync::Arc;

use crate::discover::{discover, IgnoreMarker};
use crate::error::{InheritanceError, ParseError};
use crate::graph::GraphCache;
use crate::inherit;
use crate::models::{Graph, InheritedVars, Job, ProjectInfo};
use crate::parser::parse_file;
use crate::registry::{JobCollision, JobRegistry};

/// Outcome of one parse pass.
#[derive(Debug, Default)]
pub struct ParseReport {
    pub projects: usize,
    pub files_parsed: usize,
    pub jobs: usize,
    pub collisions: Vec<JobCollision>,
    pub failures: Vec<ParseError>,
}

impl ParseReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct ConfigGraphBuilder {
    registry: JobRegistry,
    cache: GraphCache,
}

impl ConfigGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the registry with the jobs found in `projects`.
    pub fn parse(&mut self, projects: &[ProjectInfo]) -> ParseReport {
        let (registry, report) = Self::collect(projects);
        self.install(registry);
        report
    }

    /// Builds a registry from `projects` without touching any builder.
    pub fn collect(projects: &[ProjectInfo]) -> (JobRegistry, ParseReport) {
        let mut report = ParseReport {
            projects: projects.len(),
            ..ParseReport::default()
        };
        let mut registry = JobRegistry::new();

        for project in projects {
            if !project.path.exists() {
                tracing::warn!(path = %project.path.display(), "project path does not exist");
                report.failures.push(ParseError::MissingProject {
                    path: project.path.clone(),
                });
                continue;
            }

            let discovery = discover(&project.path, &IgnoreMarker);
            report.failures.extend(discovery.failures);

            for file in discovery.files {
                tracing::debug!(file = %file.display(), "parsing config file");
                match parse_file(&file, project) {
                    Ok(parsed) => {
                        report.files_parsed += 1;
                        report.failures.extend(parsed.failures);
                        for job in parsed.jobs {
                            if let Some(collision) = registry.insert(job) {
                                tracing::warn!(
                                    job = %collision.name,
                                    replaced = %collision.replaced.source_url,
                                    kept = %collision.kept.source_url,
                                    "job redefined, later definition wins"
                                );
                                report.collisions.push(collision);
                            }
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "skipping config file");
                        report.failures.push(err);
                    }
                }
            }
        }

        report.jobs = registry.len();

        tracing::info!(
            projects = report.projects,
            files = report.files_parsed,
            jobs = report.jobs,
            collisions = report.collisions.len(),
            failures = report.failures.len(),
            "job configuration parsed"
        );
        (registry, report)
    }

    /// Swaps in `registry` and drops the cached graph.
    pub fn install(&mut self, registry: JobRegistry) {
        self.registry = registry;
        self.cache.invalidate();
    }

    /// The graph for the current registry, built on first use after a parse.
    pub fn get_graph_data(&mut self) -> Arc<Graph> {
        self.cache.get_or_build(&self.registry)
    }

    /// Empties the registry and drops the cached graph.
    pub fn reset(&mut self) {
        self.registry.clear();
        self.cache.invalidate();
    }

    pub fn job(&self, name: &str) -> Option<&Job> {
        self.registry.get(name)
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.registry.iter()
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn inherited_vars(&self, name: &str) -> Result<Vec<InheritedVars>, InheritanceError> {
        inherit::inherited_vars(&self.registry, name)
    }

    pub fn is_graph_cached(&self) -> bool {
        self.cache.is_cached()
    }
}
