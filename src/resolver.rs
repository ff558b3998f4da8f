//! Turning source identifiers into local clones.
//!
//! Each accepted source maps to a directory under the clone root named
//! `<repo>_<hash>`, where `hash` is the first 8 hex digits of the SHA-256 of
//! the normalized identifier. The same source therefore always lands in the
//! same directory, and two repositories that share a name do not collide.

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::{Config, ResolverConfig};
use crate::error::{CloneFailure, ResolveError};
use crate::git::GitRunner;
use crate::models::ProjectInfo;

/// Revision recorded when the clone's HEAD cannot be read.
pub const FALLBACK_REVISION: &str = "master";

/// Outcome of [`ProjectResolver::resolve`].
#[derive(Debug, Default)]
pub struct Resolution {
    /// Resolved projects, in input order.
    pub projects: Vec<ProjectInfo>,
    /// Sources rejected for an unsupported prefix.
    pub skipped: Vec<String>,
    /// Clone failures. With fail-fast resolution there is at most one, and
    /// sources after it were not attempted.
    pub failures: Vec<ResolveError>,
}

impl Resolution {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// The first clone failure, if any.
    pub fn error(&self) -> Option<&ResolveError> {
        self.failures.first()
    }
}

#[derive(Debug, Clone)]
pub struct ProjectResolver {
    clone_dir: PathBuf,
    allowed_prefixes: Vec<String>,
    fail_fast: bool,
    git: GitRunner,
}

impl ProjectResolver {
    pub fn new(config: &ResolverConfig, git: GitRunner) -> Self {
        Self {
            clone_dir: config.clone_dir.clone(),
            allowed_prefixes: config.allowed_prefixes.clone(),
            fail_fast: config.fail_fast,
            git,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.resolver, GitRunner::from_config(&config.git))
    }

    pub fn clone_dir(&self) -> &Path {
        &self.clone_dir
    }

    pub fn is_supported(&self, source: &str) -> bool {
        let source = source.trim();
        self.allowed_prefixes
            .iter()
            .any(|prefix| source.starts_with(prefix.as_str()))
    }

    /// Local clone path for `source`.
    pub fn target_path(&self, source: &str) -> PathBuf {
        self.clone_dir.join(clone_dir_name(source))
    }

    /// Resolves `sources` into local clones, cloning the missing ones.
    ///
    /// Existing clones are used as they are; bringing them up to date is
    /// the sync scheduler's job.
    pub async fn resolve<S: AsRef<str>>(&self, sources: &[S]) -> Resolution {
        let mut resolution = Resolution::default();
        let mut seen = HashSet::new();

        tracing::info!(clone_dir = %self.clone_dir.display(), "resolving {} source(s)", sources.len());

        for source in sources {
            let source = source.as_ref().trim();
            if !seen.insert(normalize_source(source)) {
                continue;
            }

            if !self.is_supported(source) {
                tracing::warn!(source, "skipping non-git source");
                resolution.skipped.push(source.to_string());
                continue;
            }

            let target = self.target_path(source);
            if !target.exists() {
                tracing::info!(source, path = %target.display(), "cloning");
                if let Err(cause) = self.clone_into(source, &target).await {
                    let err = ResolveError::Clone {
                        source_id: source.to_string(),
                        path: target,
                        cause,
                    };
                    tracing::warn!(error = %err, "clone failed");
                    resolution.failures.push(err);
                    if self.fail_fast {
                        break;
                    }
                    continue;
                }
            }

            let commit = match self.git.head_sha(&target).await {
                Ok(sha) => sha,
                Err(err) => {
                    tracing::warn!(path = %target.display(), error = %err, "cannot read HEAD, using fallback revision");
                    FALLBACK_REVISION.to_string()
                }
            };

            resolution.projects.push(ProjectInfo {
                path: target,
                url: source.to_string(),
                commit,
            });
        }

        resolution
    }

    async fn clone_into(&self, source: &str, target: &Path) -> Result<(), CloneFailure> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if let Err(err) = self.git.clone_repo(source, target).await {
            // A killed or failed clone may leave a partial directory behind,
            // which would otherwise be mistaken for a usable clone next time.
            if tokio::fs::metadata(target).await.is_ok() {
                if let Err(cleanup) = tokio::fs::remove_dir_all(target).await {
                    tracing::warn!(path = %target.display(), error = %cleanup, "cannot remove partial clone");
                }
            }
            return Err(err.into());
        }
        Ok(())
    }
}

/// Identity form of a source: trimmed, without trailing `/` or `.git`.
pub fn normalize_source(source: &str) -> String {
    let normalized = source.trim().trim_end_matches('/');
    normalized
        .strip_suffix(".git")
        .unwrap_or(normalized)
        .to_string()
}

/// Directory name for `source`: `<last path segment>_<8 hex digits>`.
pub fn clone_dir_name(source: &str) -> String {
    let normalized = normalize_source(source);
    let repo_name = normalized
        .rsplit(['/', ':'])
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("repo");
    format!("{}_{}", repo_name, short_hash(&normalized))
}

fn short_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn resolver(clone_dir: &Path, prefixes: &[&str], fail_fast: bool) -> ProjectResolver {
        let config = ResolverConfig {
            clone_dir: clone_dir.to_path_buf(),
            allowed_prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
            fail_fast,
            ..ResolverConfig::default()
        };
        ProjectResolver::new(&config, GitRunner::new("git", Duration::from_secs(30)))
    }

    #[test]
    fn test_normalize_source() {
        assert_eq!(
            normalize_source("  https://github.com/org/repo.git/ "),
            "https://github.com/org/repo"
        );
        assert_eq!(normalize_source("https://x/y//"), "https://x/y");
    }

    #[test]
    fn test_clone_dir_name_is_stable_and_normalized() {
        let a = clone_dir_name("https://github.com/org/zuul-jobs");
        let b = clone_dir_name("https://github.com/org/zuul-jobs.git");
        let c = clone_dir_name("https://github.com/org/zuul-jobs/");
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert!(a.starts_with("zuul-jobs_"));
        assert_eq!(a.len(), "zuul-jobs_".len() + 8);
        assert!(a["zuul-jobs_".len()..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_same_name_different_hosts_do_not_collide() {
        let a = clone_dir_name("https://github.com/one/project");
        let b = clone_dir_name("https://gitlab.com/two/project");
        assert_ne!(a, b);
        assert!(a.starts_with("project_") && b.starts_with("project_"));
    }

    #[test]
    fn test_scp_style_repo_name() {
        assert!(clone_dir_name("git@host:repo.git").starts_with("repo_"));
    }

    #[tokio::test]
    async fn test_unsupported_sources_are_skipped() {
        let tmp = tempfile::TempDir::new().unwrap();
        let resolver = resolver(tmp.path(), &["http", "git", "ssh"], true);

        let resolution = resolver.resolve(&["/local/path", "ftp://x/y"]).await;
        assert!(resolution.projects.is_empty());
        assert!(resolution.is_complete());
        assert_eq!(resolution.skipped, ["/local/path", "ftp://x/y"]);
    }

    #[tokio::test]
    async fn test_existing_directory_is_reused_with_fallback_revision() {
        let tmp = tempfile::TempDir::new().unwrap();
        let resolver = resolver(tmp.path(), &["https"], true);
        let source = "https://example.invalid/org/cached";
        std::fs::create_dir_all(resolver.target_path(source)).unwrap();

        let resolution = resolver
            .resolve(&[source, "https://example.invalid/org/cached.git"])
            .await;
        assert!(resolution.is_complete());
        assert_eq!(resolution.projects.len(), 1);
        assert_eq!(resolution.projects[0].url, source);
        assert_eq!(resolution.projects[0].path, resolver.target_path(source));
        assert_eq!(resolution.projects[0].commit, FALLBACK_REVISION);
    }

    #[tokio::test]
    async fn test_clone_failure_fail_fast_keeps_partial_result() {
        let tmp = tempfile::TempDir::new().unwrap();
        let resolver = resolver(tmp.path(), &["file"], true);
        let cached = "file:///nonexistent/cached";
        std::fs::create_dir_all(resolver.target_path(cached)).unwrap();

        let resolution = resolver
            .resolve(&[
                cached,
                "file:///nonexistent/missing-one",
                "file:///nonexistent/missing-two",
            ])
            .await;

        assert_eq!(resolution.projects.len(), 1);
        assert_eq!(resolution.failures.len(), 1);
        assert!(matches!(
            resolution.error(),
            Some(ResolveError::Clone { .. })
        ));
        assert!(!resolver.target_path("file:///nonexistent/missing-one").exists());
    }

    #[tokio::test]
    async fn test_clone_failure_without_fail_fast_attempts_all() {
        let tmp = tempfile::TempDir::new().unwrap();
        let resolver = resolver(tmp.path(), &["file"], false);

        let resolution = resolver
            .resolve(&[
                "file:///nonexistent/missing-one",
                "file:///nonexistent/missing-two",
            ])
            .await;

        assert!(resolution.projects.is_empty());
        assert_eq!(resolution.failures.len(), 2);
    }
}
