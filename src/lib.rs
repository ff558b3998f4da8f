//! # zuul-graph
//!
//! Builds a queryable graph of CI job definitions from Zuul-style
//! configuration spread across many git repositories, and keeps those
//! repositories in sync in the background.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Resolver  │──▶│   Builder    │──▶│  Graph cache │
//! │ git clones │   │ YAML → jobs  │   │ nodes+edges  │
//! └─────▲──────┘   └──────▲───────┘   └──────────────┘
//!       │                 │ rebuild
//!       │          ┌──────┴───────┐
//!       └──────────│    Sync      │
//!        prune /   │  scheduler   │
//!        update    └──────────────┘
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use zuul_graph::config::Config;
//! use zuul_graph::git::GitRunner;
//! use zuul_graph::scheduler::{ConfigFileSources, SyncScheduler, SyncTrigger};
//! use zuul_graph::workspace::Workspace;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let path = Path::new("zuul-graph.toml");
//! let config = Config::load(path)?;
//! zuul_graph::logging::init(&config.logging);
//!
//! let trigger = SyncTrigger::new();
//! let workspace = Arc::new(Workspace::new(config.clone(), trigger.clone()));
//! workspace.bootstrap().await?;
//!
//! let mut scheduler = SyncScheduler::new(
//!     &config.sync,
//!     GitRunner::from_config(&config.git),
//!     workspace.shared_projects(),
//!     Arc::new(ConfigFileSources::new(path)),
//!     trigger,
//! )
//! .with_invalidator(workspace.clone());
//! scheduler.start();
//!
//! let graph = workspace.graph().await?;
//! println!("{}", serde_json::to_string(&*graph)?);
//! scheduler.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`error`] | Error types |
//! | [`models`] | Projects, jobs and graph types |
//! | [`resolver`] | Source identifiers → local clones |
//! | [`git`] | Bounded `git` subprocesses |
//! | [`discover`] | Locating configuration files in a project |
//! | [`lines`] | Line positions for YAML entries |
//! | [`parser`] | Config file → jobs with source links |
//! | [`registry`] | Jobs by name, last definition wins |
//! | [`inherit`] | Parent chain walk and inherited vars |
//! | [`graph`] | Graph construction and cache |
//! | [`builder`] | Parse pass over all projects |
//! | [`scheduler`] | Background prune/update cycles |
//! | [`workspace`] | Facade for a serving layer |

pub mod builder;
pub mod config;
pub mod discover;
pub mod error;
pub mod git;
pub mod graph;
pub mod inherit;
pub mod lines;
pub mod logging;
pub mod models;
pub mod parser;
pub mod registry;
pub mod resolver;
pub mod scheduler;
pub mod workspace;
