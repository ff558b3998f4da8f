//! Background repository synchronization.
//!
//! A [`SyncScheduler`] owns one tokio task that runs [`SyncScheduler::sync_cycle`]
//! once at startup, then every `interval`, and immediately whenever a
//! [`SyncTrigger`] fires. Each cycle:
//!
//! 1. drops projects that are no longer statically configured, deleting
//!    their clones (no network access is needed for this);
//! 2. mirrors every remaining clone to its remote default branch and records
//!    the new HEAD;
//! 3. calls the [`CacheInvalidator`] once, after the project list lock has
//!    been released.
//!
//! Failures are per project: they are logged, recorded in the
//! [`SyncReport`], and never stop the cycle or the scheduler.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;

use crate::config::{Config, SyncConfig};
use crate::error::SyncError;
use crate::git::GitRunner;
use crate::models::ProjectInfo;
use crate::resolver::normalize_source;

/// The tracked project list, shared between the workspace and the scheduler.
pub type SharedProjects = Arc<Mutex<Vec<ProjectInfo>>>;

/// Supplies the statically configured sources, consulted once per cycle.
pub trait StaticSources: Send + Sync {
    fn static_sources(&self) -> Result<Vec<String>>;
}

impl StaticSources for Vec<String> {
    fn static_sources(&self) -> Result<Vec<String>> {
        Ok(self.clone())
    }
}

/// Re-reads the configuration file (and environment) on every call, so
/// edits to the static source list take effect at the next cycle.
#[derive(Debug, Clone)]
pub struct ConfigFileSources {
    path: PathBuf,
}

impl ConfigFileSources {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StaticSources for ConfigFileSources {
    fn static_sources(&self) -> Result<Vec<String>> {
        Ok(Config::load(&self.path)?.static_sources().to_vec())
    }
}

/// Hook run after each cycle to discard derived state.
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate(&self) -> Result<()>;
}

/// Cloneable handle that asks the scheduler to run as soon as possible.
#[derive(Debug, Clone, Default)]
pub struct SyncTrigger {
    notify: Arc<Notify>,
}

impl SyncTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the next run to now. Requests made while a cycle is running
    /// cause one more cycle right after it.
    pub fn force_run(&self) {
        self.notify.notify_one();
    }

    pub(crate) async fn fired(&self) {
        self.notify.notified().await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdatedProject {
    pub path: PathBuf,
    pub previous: String,
    pub commit: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum InvalidationOutcome {
    NotConfigured,
    Succeeded,
    Failed(String),
}

/// What one cycle did.
#[derive(Debug)]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Clones deleted because their source is no longer static.
    pub pruned: Vec<PathBuf>,
    pub updated: Vec<UpdatedProject>,
    pub failures: Vec<SyncError>,
    /// Set when the static source list could not be obtained; pruning is
    /// skipped for that cycle.
    pub static_sources_error: Option<String>,
    pub invalidation: InvalidationOutcome,
}

pub struct SyncScheduler {
    inner: Arc<SchedulerInner>,
    trigger: SyncTrigger,
    interval: Duration,
    run_on_startup: bool,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

struct SchedulerInner {
    projects: SharedProjects,
    static_sources: Arc<dyn StaticSources>,
    invalidator: Option<Arc<dyn CacheInvalidator>>,
    git: GitRunner,
    last_report: parking_lot::Mutex<Option<Arc<SyncReport>>>,
}

impl SyncScheduler {
    pub fn new(
        config: &SyncConfig,
        git: GitRunner,
        projects: SharedProjects,
        static_sources: Arc<dyn StaticSources>,
        trigger: SyncTrigger,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(SchedulerInner {
                projects,
                static_sources,
                invalidator: None,
                git,
                last_report: parking_lot::Mutex::new(None),
            }),
            trigger,
            interval: config.interval(),
            run_on_startup: config.run_on_startup,
            shutdown_tx,
            task: None,
        }
    }

    /// Sets the hook called after every cycle. Must be called before
    /// [`start`](Self::start).
    pub fn with_invalidator(mut self, invalidator: Arc<dyn CacheInvalidator>) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.invalidator = Some(invalidator),
            None => tracing::warn!("scheduler already running, invalidator ignored"),
        }
        self
    }

    pub fn trigger(&self) -> SyncTrigger {
        self.trigger.clone()
    }

    pub fn force_run(&self) {
        self.trigger.force_run();
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// The report of the most recently completed cycle.
    pub fn last_report(&self) -> Option<Arc<SyncReport>> {
        self.inner.last_report.lock().clone()
    }

    /// Spawns the background task. Calling it again while running is a no-op.
    pub fn start(&mut self) {
        if self.is_running() {
            tracing::warn!("scheduler already started");
            return;
        }
        self.shutdown_tx.send_replace(false);
        let shutdown = self.shutdown_tx.subscribe();
        let inner = Arc::clone(&self.inner);
        let trigger = self.trigger.clone();
        let interval = self.interval;
        let run_now = self.run_on_startup;

        tracing::info!(interval_secs = interval.as_secs(), "scheduler started");
        self.task = Some(tokio::spawn(run_loop(inner, trigger, interval, run_now, shutdown)));
    }

    /// Stops the background task, cancelling a cycle in progress.
    pub async fn shutdown(&mut self) {
        self.shutdown_tx.send_replace(true);
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::error!(error = %err, "scheduler task ended abnormally");
            }
        }
        tracing::info!("scheduler stopped");
    }

    /// Runs one cycle on the caller's task.
    pub async fn sync_cycle(&self) -> Arc<SyncReport> {
        self.inner.sync_cycle().await
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}

async fn run_loop(
    inner: Arc<SchedulerInner>,
    trigger: SyncTrigger,
    interval: Duration,
    run_now: bool,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut due = run_now;
    loop {
        if *shutdown.borrow() {
            break;
        }
        if !due {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = trigger.fired() => tracing::info!("sync requested"),
                _ = shutdown.changed() => break,
            }
        }
        due = false;

        tokio::select! {
            _ = inner.sync_cycle() => {}
            _ = shutdown.changed() => {
                tracing::info!("sync cycle cancelled by shutdown");
                break;
            }
        }
    }
}

impl SchedulerInner {
    async fn sync_cycle(&self) -> Arc<SyncReport> {
        let started_at = Utc::now();
        tracing::info!("starting repository sync");

        let mut pruned = Vec::new();
        let mut updated = Vec::new();
        let mut failures = Vec::new();

        let (static_set, static_sources_error) = match self.static_sources.static_sources() {
            Ok(sources) => (
                Some(
                    sources
                        .iter()
                        .map(|s| normalize_source(s))
                        .collect::<HashSet<_>>(),
                ),
                None,
            ),
            Err(err) => {
                tracing::warn!(error = %err, "cannot read static sources, skipping cleanup");
                (None, Some(err.to_string()))
            }
        };

        {
            let mut projects = self.projects.lock().await;
            // Index-based so that cancellation between awaits never loses an
            // entry.
            let mut i = 0;
            while i < projects.len() {
                let is_static = static_set
                    .as_ref()
                    .map_or(true, |set| set.contains(&normalize_source(&projects[i].url)));

                if !is_static {
                    let path = projects[i].path.clone();
                    tracing::info!(path = %path.display(), "cleaning up non-static repository");
                    match remove_clone(&path).await {
                        Ok(()) => {
                            projects.remove(i);
                            pruned.push(path);
                            continue;
                        }
                        Err(source) => {
                            let err = SyncError::Prune { path, source };
                            tracing::warn!(error = %err, "cleanup failed");
                            failures.push(err);
                        }
                    }
                }

                let path = projects[i].path.clone();
                if is_working_copy(&path).await {
                    tracing::info!(path = %path.display(), "updating");
                    match self.mirror(&path).await {
                        Ok(commit) => {
                            let previous = std::mem::replace(&mut projects[i].commit, commit.clone());
                            updated.push(UpdatedProject {
                                path,
                                previous,
                                commit,
                            });
                        }
                        Err(source) => {
                            let err = SyncError::Git { path, source };
                            tracing::warn!(error = %err, "update failed");
                            failures.push(err);
                        }
                    }
                }
                i += 1;
            }
        }

        let invalidation = self.run_invalidator().await;

        let report = Arc::new(SyncReport {
            started_at,
            finished_at: Utc::now(),
            pruned,
            updated,
            failures,
            static_sources_error,
            invalidation,
        });
        tracing::info!(
            pruned = report.pruned.len(),
            updated = report.updated.len(),
            failures = report.failures.len(),
            "repository sync finished"
        );
        *self.last_report.lock() = Some(Arc::clone(&report));
        report
    }

    async fn mirror(&self, path: &Path) -> Result<String, crate::error::GitError> {
        self.git.mirror_remote(path).await?;
        self.git.head_sha(path).await
    }

    async fn run_invalidator(&self) -> InvalidationOutcome {
        let Some(invalidator) = self.invalidator.clone() else {
            return InvalidationOutcome::NotConfigured;
        };
        tracing::info!("triggering cache refresh");
        // Run on its own task so a panicking hook is contained as well.
        match tokio::spawn(async move { invalidator.invalidate().await }).await {
            Ok(Ok(())) => InvalidationOutcome::Succeeded,
            Ok(Err(err)) => {
                tracing::error!(error = %err, "cache refresh failed");
                InvalidationOutcome::Failed(err.to_string())
            }
            Err(err) => {
                tracing::error!(error = %err, "cache refresh panicked");
                InvalidationOutcome::Failed(err.to_string())
            }
        }
    }
}

async fn remove_clone(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

async fn is_working_copy(path: &Path) -> bool {
    tokio::fs::metadata(path.join(".git"))
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}
