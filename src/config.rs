//! TOML configuration.
//!
//! A missing configuration file is not an error: every section has defaults
//! and the service starts with no sources, ready for repositories to be
//! loaded at runtime. Environment variables override file values.
//!
//! ```toml
//! [resolver]
//! clone_dir = "repo_data"
//! sources = ["https://opendev.org/zuul/zuul-jobs"]
//!
//! [sync]
//! interval_secs = 86400
//!
//! [git]
//! timeout_secs = 300
//!
//! [logging]
//! level = "info"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub git: GitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResolverConfig {
    #[serde(default = "default_clone_dir")]
    pub clone_dir: PathBuf,
    /// Statically configured sources. `source = "<url>"` is accepted as a
    /// single-entry alias.
    #[serde(default, alias = "source")]
    pub sources: SourceList,
    #[serde(default = "default_allowed_prefixes")]
    pub allowed_prefixes: Vec<String>,
    /// Abort a resolution batch at the first clone failure.
    #[serde(default = "default_true")]
    pub fail_fast: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            clone_dir: default_clone_dir(),
            sources: SourceList::default(),
            allowed_prefixes: default_allowed_prefixes(),
            fail_fast: true,
        }
    }
}

/// One source or a list of sources.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(from = "SourceListRepr")]
pub struct SourceList(pub Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum SourceListRepr {
    One(String),
    Many(Vec<String>),
}

impl From<SourceListRepr> for SourceList {
    fn from(repr: SourceListRepr) -> Self {
        match repr {
            SourceListRepr::One(s) => SourceList(vec![s]),
            SourceListRepr::Many(v) => SourceList(v),
        }
    }
}

impl SourceList {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

fn default_clone_dir() -> PathBuf {
    PathBuf::from("repo_data")
}
fn default_allowed_prefixes() -> Vec<String> {
    vec!["http".to_string(), "git".to_string(), "ssh".to_string()]
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_interval_secs", alias = "doc_update_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_true")]
    pub run_on_startup: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            run_on_startup: true,
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_interval_secs() -> u64 {
    86_400
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitConfig {
    #[serde(default = "default_git_program")]
    pub program: String,
    #[serde(default = "default_git_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            program: default_git_program(),
            timeout_secs: default_git_timeout_secs(),
        }
    }
}

impl GitConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_git_program() -> String {
    "git".to_string()
}
fn default_git_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// An `EnvFilter` directive such as `info` or `zuul_graph=debug`.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Loads `path` if it exists, otherwise starts from defaults; then
    /// applies environment overrides and validates.
    pub fn load(path: &Path) -> Result<Config> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// [`Config::load`] with an explicit environment. Validation runs once,
    /// after the overrides.
    pub fn load_with_env<F>(path: &Path, lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = if path.exists() {
            read_config(path)?
        } else {
            Config::default()
        };
        config.apply_env_overrides(lookup);
        config.absolutize_clone_dir()?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `CLONE_DIR`, `SOURCES`, `SYNC_INTERVAL` (legacy name
    /// `DOC_UPDATE_INTERVAL`) and `GIT_TIMEOUT`.
    ///
    /// `lookup` abstracts the environment so callers (and tests) can supply
    /// their own. Unparsable numeric values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("CLONE_DIR").filter(|d| !d.is_empty()) {
            self.resolver.clone_dir = PathBuf::from(dir);
        }
        if let Some(sources) = lookup("SOURCES") {
            self.resolver.sources = SourceList(
                sources
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            );
        }
        let interval = ["SYNC_INTERVAL", "DOC_UPDATE_INTERVAL"]
            .into_iter()
            .find_map(|key| lookup(key).and_then(|v| v.trim().parse().ok()));
        if let Some(secs) = interval {
            self.sync.interval_secs = secs;
        }
        if let Some(secs) = lookup("GIT_TIMEOUT").and_then(|v| v.trim().parse().ok()) {
            self.git.timeout_secs = secs;
        }
    }

    /// The statically configured sources.
    pub fn static_sources(&self) -> &[String] {
        self.resolver.sources.as_slice()
    }

    fn absolutize_clone_dir(&mut self) -> Result<()> {
        if self.resolver.clone_dir.is_relative() {
            let cwd = std::env::current_dir().context("cannot determine working directory")?;
            self.resolver.clone_dir = cwd.join(&self.resolver.clone_dir);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync.interval_secs == 0 {
            bail!("sync.interval_secs must be > 0");
        }
        if self.git.timeout_secs == 0 {
            bail!("git.timeout_secs must be > 0");
        }
        if self.resolver.allowed_prefixes.is_empty() {
            bail!("resolver.allowed_prefixes must not be empty");
        }
        Ok(())
    }
}

/// Reads, parses and validates a TOML configuration file without applying
/// overrides.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = read_config(path)?;
    config.validate()?;
    Ok(config)
}

fn read_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    toml::from_str(&content).with_context(|| "Failed to parse config file")
}
