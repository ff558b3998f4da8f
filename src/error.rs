//! Error types for resolution, parsing, git and sync.
//!
//! Failures are scoped to one unit of work (a source, a file, a project) and
//! are collected into the reports returned by each operation, so one bad
//! repository or file never aborts its siblings.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures running the `git` binary.
#[derive(Error, Debug)]
pub enum GitError {
    /// The binary could not be started.
    #[error("failed to execute '{program} {args}': {source}")]
    Spawn {
        program: String,
        args: String,
        #[source]
        source: std::io::Error,
    },

    /// The command ran and exited unsuccessfully.
    #[error("'git {args}' failed: {stderr}")]
    Failed { args: String, stderr: String },

    /// The command exceeded the configured timeout and was killed.
    #[error("'git {args}' timed out after {}s", timeout.as_secs())]
    TimedOut { args: String, timeout: Duration },
}

/// Failures while turning source identifiers into local clones.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("unsupported source (expected one of {allowed:?}): {source_id}")]
    UnsupportedSource {
        source_id: String,
        allowed: Vec<String>,
    },

    #[error("error cloning repository {source_id} into {}: {cause}", path.display())]
    Clone {
        source_id: String,
        path: PathBuf,
        #[source]
        cause: CloneFailure,
    },
}

/// Why a clone did not produce a usable directory.
#[derive(Error, Debug)]
pub enum CloneFailure {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error("cannot create clone directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures scoped to one project root, config file or job entry.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("project path does not exist: {}", path.display())]
    MissingProject { path: PathBuf },

    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed YAML in {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{}: top-level document must be a sequence", path.display())]
    NotASequence { path: PathBuf },

    #[error("{}: entry {index} is not a valid job: {source}", path.display())]
    InvalidJob {
        path: PathBuf,
        index: usize,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Failures scoped to one tracked project during a sync cycle.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("failed to delete {}: {source}", path.display())]
    Prune {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to update {}: {source}", path.display())]
    Git {
        path: PathBuf,
        #[source]
        source: GitError,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InheritanceError {
    /// The parent chain of `job` loops back on itself. `chain` lists the
    /// visited names in walk order, ending with the repeated name.
    #[error("cyclic parent chain for job '{job}': {}", chain.join(" -> "))]
    Cycle { job: String, chain: Vec<String> },
}

/// Errors surfaced by the [`Workspace`](crate::workspace::Workspace) facade.
#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("no repository resolved for source: {0}")]
    NothingResolved(String),

    #[error(transparent)]
    Inheritance(#[from] InheritanceError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
