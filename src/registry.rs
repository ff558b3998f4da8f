//! Name-keyed job registry.
//!
//! Job names are global across all projects. When a name is defined more
//! than once, the definition inserted last replaces the earlier one while
//! keeping the earlier one's position in iteration order. Every replacement
//! is returned to the caller as a [`JobCollision`].

use serde::Serialize;
use std::collections::HashMap;

use crate::models::Job;

/// Where a job definition came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobOrigin {
    pub source_file: String,
    pub source_line: usize,
    pub source_url: String,
}

impl From<&Job> for JobOrigin {
    fn from(job: &Job) -> Self {
        JobOrigin {
            source_file: job.source_file.clone(),
            source_line: job.source_line,
            source_url: job.source_url.clone(),
        }
    }
}

/// A definition that replaced an earlier one with the same name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobCollision {
    pub name: String,
    pub replaced: JobOrigin,
    pub kept: JobOrigin,
}

#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Vec<Job>,
    by_name: HashMap<String, usize>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `job`, replacing any job with the same name.
    pub fn insert(&mut self, job: Job) -> Option<JobCollision> {
        match self.by_name.get(&job.name) {
            Some(&slot) => {
                let collision = JobCollision {
                    name: job.name.clone(),
                    replaced: JobOrigin::from(&self.jobs[slot]),
                    kept: JobOrigin::from(&job),
                };
                self.jobs[slot] = job;
                Some(collision)
            }
            None => {
                self.by_name.insert(job.name.clone(), self.jobs.len());
                self.jobs.push(job);
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Job> {
        self.by_name.get(name).map(|&slot| &self.jobs[slot])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Jobs in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
        self.by_name.clear();
    }
}

impl FromIterator<Job> for JobRegistry {
    fn from_iter<I: IntoIterator<Item = Job>>(iter: I) -> Self {
        let mut registry = JobRegistry::new();
        for job in iter {
            registry.insert(job);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_at(name: &str, file: &str) -> Job {
        let mut job = Job::named(name);
        job.source_file = file.to_string();
        job
    }

    #[test]
    fn test_later_definition_wins() {
        let mut registry = JobRegistry::new();
        assert!(registry.insert(job_at("unit", "a.yaml")).is_none());
        registry.insert(job_at("lint", "a.yaml"));

        let collision = registry.insert(job_at("unit", "b.yaml")).unwrap();
        assert_eq!(collision.name, "unit");
        assert_eq!(collision.replaced.source_file, "a.yaml");
        assert_eq!(collision.kept.source_file, "b.yaml");

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("unit").unwrap().source_file, "b.yaml");
        let order: Vec<&str> = registry.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(order, ["unit", "lint"]);
    }

    #[test]
    fn test_clear() {
        let mut registry: JobRegistry = vec![Job::named("a"), Job::named("b")].into_iter().collect();
        assert!(registry.contains("a"));
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.get("a").is_none());
    }
}
