//! Thin async wrapper around the `git` binary.
//!
//! Every invocation is bounded by a timeout. The child process is killed when
//! the timeout fires or when the calling future is dropped, so a hung remote
//! never stalls a sync cycle past its budget.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::config::GitConfig;
use crate::error::GitError;

#[derive(Debug, Clone)]
pub struct GitRunner {
    program: String,
    timeout: Duration,
}

impl GitRunner {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn from_config(config: &GitConfig) -> Self {
        Self::new(config.program.clone(), config.timeout())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `git clone <url> <dest>`
    pub async fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), GitError> {
        let dest = dest.to_string_lossy();
        self.run(None, &["clone", url, dest.as_ref()]).await?;
        Ok(())
    }

    /// `git fetch origin` followed by `git reset --hard origin/HEAD`, making
    /// the working copy an exact mirror of the remote default branch.
    pub async fn mirror_remote(&self, repo: &Path) -> Result<(), GitError> {
        self.run(Some(repo), &["fetch", "origin"]).await?;
        self.run(Some(repo), &["reset", "--hard", "origin/HEAD"]).await?;
        Ok(())
    }

    /// `git rev-parse HEAD`
    pub async fn head_sha(&self, repo: &Path) -> Result<String, GitError> {
        let stdout = self.run(Some(repo), &["rev-parse", "HEAD"]).await?;
        Ok(stdout.trim().to_string())
    }

    /// Whether the configured binary can be executed at all.
    pub async fn is_available(&self) -> bool {
        self.run(None, &["--version"]).await.is_ok()
    }

    async fn run(&self, repo: Option<&Path>, args: &[&str]) -> Result<String, GitError> {
        let mut cmd = Command::new(&self.program);
        if let Some(repo) = repo {
            cmd.arg("-C").arg(repo);
            // Never fall through to an enclosing repository when `repo` has
            // lost its own `.git`.
            if let Some(parent) = repo.parent().filter(|p| p.is_absolute()) {
                cmd.env("GIT_CEILING_DIRECTORIES", parent);
            }
        }
        cmd.args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let joined = args.join(" ");
        tracing::debug!(repo = ?repo, args = %joined, "running git");

        let child = cmd.spawn().map_err(|source| GitError::Spawn {
            program: self.program.clone(),
            args: joined.clone(),
            source,
        })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| GitError::Spawn {
                program: self.program.clone(),
                args: joined.clone(),
                source,
            })?,
            Err(_) => {
                return Err(GitError::TimedOut {
                    args: joined,
                    timeout: self.timeout,
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GitError::Failed {
                args: joined,
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
