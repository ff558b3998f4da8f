//! The service-level facade over resolver, builder and tracked projects.
//!
//! A request-serving layer holds one `Arc<Workspace>` and hands a clone of
//! it to the [`SyncScheduler`](crate::scheduler::SyncScheduler) as its
//! [`CacheInvalidator`], so every sync cycle ends with a rebuild.
//!
//! Lock order is always projects, then builder. The builder lock is only
//! taken on blocking threads. Every rebuild or clear takes a new generation
//! while holding the project lock, and a parsed registry is only installed
//! if its generation is still the latest; a rebuild whose caller went away
//! mid-parse therefore cannot overwrite a newer result.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::builder::{ConfigGraphBuilder, ParseReport};
use crate::config::Config;
use crate::error::{ResolveError, WorkspaceError};
use crate::models::{Graph, InheritedVars, Job, ProjectInfo};
use crate::registry::JobRegistry;
use crate::resolver::{normalize_source, ProjectResolver, Resolution};
use crate::scheduler::{CacheInvalidator, SharedProjects, SyncTrigger};

/// What [`Workspace::bootstrap`] did.
#[derive(Debug)]
pub struct BootstrapReport {
    pub resolution: Resolution,
    pub parse: ParseReport,
}

pub struct Workspace {
    config: Config,
    resolver: ProjectResolver,
    projects: SharedProjects,
    builder: Arc<Mutex<ConfigGraphBuilder>>,
    generation: Arc<AtomicU64>,
    trigger: SyncTrigger,
}

impl Workspace {
    pub fn new(config: Config, trigger: SyncTrigger) -> Self {
        Self {
            resolver: ProjectResolver::from_config(&config),
            config,
            projects: SharedProjects::default(),
            builder: Arc::new(Mutex::new(ConfigGraphBuilder::new())),
            generation: Arc::new(AtomicU64::new(0)),
            trigger,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn resolver(&self) -> &ProjectResolver {
        &self.resolver
    }

    /// Handle to the tracked project list, for the sync scheduler.
    pub fn shared_projects(&self) -> SharedProjects {
        Arc::clone(&self.projects)
    }

    /// Resolves the statically configured sources and performs the first
    /// parse. Clone failures are reported in the returned resolution; the
    /// projects that did resolve are tracked and parsed regardless.
    pub async fn bootstrap(&self) -> Result<BootstrapReport, WorkspaceError> {
        let resolution = self.resolver.resolve(self.config.static_sources()).await;
        if let Some(err) = resolution.error() {
            tracing::warn!(error = %err, "startup resolution incomplete");
        }

        {
            let mut projects = self.projects.lock().await;
            for project in &resolution.projects {
                track(&mut projects, project.clone());
            }
        }

        let parse = self.rebuild().await?;
        Ok(BootstrapReport { resolution, parse })
    }

    /// Re-parses every tracked project. The project list stays locked for
    /// the whole parse.
    pub async fn rebuild(&self) -> Result<ParseReport, WorkspaceError> {
        let projects = self.projects.lock().await;
        let snapshot = projects.clone();
        let generation = self.next_generation();
        let builder = Arc::clone(&self.builder);
        let current = Arc::clone(&self.generation);

        let report = tokio::task::spawn_blocking(move || {
            let (registry, report) = ConfigGraphBuilder::collect(&snapshot);
            install_if_current(&builder, &current, generation, registry);
            report
        })
        .await?;
        drop(projects);
        Ok(report)
    }

    pub async fn graph(&self) -> Result<Arc<Graph>, WorkspaceError> {
        self.with_builder(|b| b.get_graph_data()).await
    }

    pub async fn job(&self, name: &str) -> Result<Option<Job>, WorkspaceError> {
        let name = name.to_string();
        self.with_builder(move |b| b.job(&name).cloned()).await
    }

    pub async fn inherited_vars(&self, name: &str) -> Result<Vec<InheritedVars>, WorkspaceError> {
        let name = name.to_string();
        Ok(self.with_builder(move |b| b.inherited_vars(&name)).await??)
    }

    /// Snapshot of the tracked projects.
    pub async fn projects(&self) -> Vec<ProjectInfo> {
        self.projects.lock().await.clone()
    }

    /// Resolves and tracks one more repository, rebuilds, and asks the
    /// scheduler to sync right away.
    pub async fn load_repository(&self, url: &str) -> Result<ProjectInfo, WorkspaceError> {
        let url = url.trim();
        if !self.resolver.is_supported(url) {
            return Err(ResolveError::UnsupportedSource {
                source_id: url.to_string(),
                allowed: self.config.resolver.allowed_prefixes.clone(),
            }
            .into());
        }

        let mut resolution = self.resolver.resolve(&[url]).await;
        if !resolution.failures.is_empty() {
            return Err(resolution.failures.remove(0).into());
        }
        let project = resolution
            .projects
            .pop()
            .ok_or_else(|| WorkspaceError::NothingResolved(url.to_string()))?;

        {
            let mut projects = self.projects.lock().await;
            if track(&mut projects, project.clone()) {
                tracing::info!(url, path = %project.path.display(), "repository loaded");
            } else {
                tracing::info!(url, path = %project.path.display(), "repository already tracked");
            }
        }

        self.rebuild().await?;
        self.trigger.force_run();
        Ok(project)
    }

    /// Forgets every tracked project, deleting the clones of those whose
    /// URL is not in `static_sources`, and empties the registry.
    ///
    /// Returns the deleted clone paths. Deletion failures are logged only.
    pub async fn clear<S: AsRef<str>>(
        &self,
        static_sources: &[S],
    ) -> Result<Vec<PathBuf>, WorkspaceError> {
        let static_set: HashSet<String> = static_sources
            .iter()
            .map(|s| normalize_source(s.as_ref()))
            .collect();

        let mut projects = self.projects.lock().await;
        let mut deleted = Vec::new();
        for project in projects.iter() {
            if static_set.contains(&normalize_source(&project.url)) {
                continue;
            }
            if tokio::fs::metadata(&project.path).await.is_err() {
                continue;
            }
            tracing::info!(path = %project.path.display(), "deleting non-static repository");
            match tokio::fs::remove_dir_all(&project.path).await {
                Ok(()) => deleted.push(project.path.clone()),
                Err(err) => {
                    tracing::warn!(path = %project.path.display(), error = %err, "failed to delete")
                }
            }
        }
        projects.clear();

        self.next_generation();
        self.with_builder(|b| b.reset()).await?;
        drop(projects);
        Ok(deleted)
    }

    /// Claims a new generation. Callers hold the project lock.
    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn with_builder<T, F>(&self, f: F) -> Result<T, WorkspaceError>
    where
        F: FnOnce(&mut ConfigGraphBuilder) -> T + Send + 'static,
        T: Send + 'static,
    {
        let builder = Arc::clone(&self.builder);
        let value = tokio::task::spawn_blocking(move || f(&mut builder.lock())).await?;
        Ok(value)
    }
}

/// Installs `registry` unless a newer rebuild or clear has started since
/// `generation` was claimed.
fn install_if_current(
    builder: &Mutex<ConfigGraphBuilder>,
    current: &AtomicU64,
    generation: u64,
    registry: JobRegistry,
) -> bool {
    let mut builder = builder.lock();
    if current.load(Ordering::SeqCst) != generation {
        tracing::debug!(generation, "discarding superseded parse");
        return false;
    }
    builder.install(registry);
    true
}

/// Appends `project` unless one with the same path is already tracked.
fn track(projects: &mut Vec<ProjectInfo>, project: ProjectInfo) -> bool {
    if projects.iter().any(|p| p.path == project.path) {
        return false;
    }
    projects.push(project);
    true
}

#[async_trait]
impl CacheInvalidator for Workspace {
    async fn invalidate(&self) -> Result<()> {
        let report = self.rebuild().await?;
        tracing::info!(jobs = report.jobs, "graph refreshed after sync");
        Ok(())
    }
}
