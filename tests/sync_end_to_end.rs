use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use zuul_graph::config::Config;
use zuul_graph::git::GitRunner;
use zuul_graph::scheduler::{InvalidationOutcome, SyncScheduler, SyncTrigger};
use zuul_graph::workspace::Workspace;

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(repo: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo)
        .args(["-c", "user.name=Test", "-c", "user.email=test@example.com"])
        .args(args)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn commit_file(repo: &Path, rel: &str, content: &str, message: &str) -> String {
    let path = repo.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
    git(repo, &["add", "."]);
    git(repo, &["commit", "-q", "-m", message]);
    git(repo, &["rev-parse", "HEAD"])
}

fn setup_upstream(root: &Path) -> (std::path::PathBuf, String, String) {
    let upstream = root.join("upstream");
    fs::create_dir_all(&upstream).unwrap();
    git(&upstream, &["init", "-q"]);
    let first = commit_file(
        &upstream,
        "zuul.d/jobs.yaml",
        "- job:\n    name: base\n    vars:\n      python: \"3.11\"\n- job:\n    name: unit\n    parent: base\n",
        "initial jobs",
    );
    let url = format!("file://{}", upstream.display());
    (upstream, url, first)
}

fn config(root: &Path, url: &str) -> Config {
    let mut config = Config::default();
    config.resolver.clone_dir = root.join("clones");
    config.resolver.allowed_prefixes = vec!["file".to_string()];
    config.resolver.sources.0 = vec![url.to_string()];
    config.git.timeout_secs = 60;
    config
}

fn scheduler(config: &Config, workspace: &Arc<Workspace>, statics: Vec<String>) -> SyncScheduler {
    SyncScheduler::new(
        &config.sync,
        GitRunner::from_config(&config.git),
        workspace.shared_projects(),
        Arc::new(statics),
        SyncTrigger::new(),
    )
    .with_invalidator(workspace.clone())
}

#[tokio::test]
async fn test_bootstrap_clones_and_builds_graph() {
    if !git_available() {
        return;
    }
    let tmp = TempDir::new().unwrap();
    let (_upstream, url, first) = setup_upstream(tmp.path());
    let config = config(tmp.path(), &url);
    let workspace = Workspace::new(config, SyncTrigger::new());

    let report = workspace.bootstrap().await.unwrap();
    assert!(report.resolution.is_complete());
    assert_eq!(report.parse.jobs, 2);

    let projects = workspace.projects().await;
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].commit, first);
    assert!(projects[0].path.join(".git").is_dir());

    let unit = workspace.job("unit").await.unwrap().unwrap();
    assert_eq!(unit.source_file, "zuul.d/jobs.yaml");
    assert_eq!(unit.source_line, 6);
    assert_eq!(
        unit.source_url,
        format!("{}/blob/{}/zuul.d/jobs.yaml#L6", url, first)
    );

    let graph = workspace.graph().await.unwrap();
    assert_eq!(graph.nodes.len(), 2);
    assert_eq!(graph.edges.len(), 1);
    assert_eq!(graph.edges[0].source, "base");
}

#[tokio::test]
async fn test_sync_cycle_pulls_new_commits_and_rebuilds() {
    if !git_available() {
        return;
    }
    let tmp = TempDir::new().unwrap();
    let (upstream, url, first) = setup_upstream(tmp.path());
    let config = config(tmp.path(), &url);
    let workspace = Arc::new(Workspace::new(config.clone(), SyncTrigger::new()));
    workspace.bootstrap().await.unwrap();

    let second = commit_file(
        &upstream,
        "zuul.d/more.yaml",
        "- job:\n    name: lint\n    dependencies:\n      - unit\n",
        "add lint",
    );
    assert_ne!(first, second);

    let sched = scheduler(&config, &workspace, vec![url.clone()]);
    let report = sched.sync_cycle().await;

    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(report.updated.len(), 1);
    assert_eq!(report.updated[0].previous, first);
    assert_eq!(report.updated[0].commit, second);
    assert_eq!(report.invalidation, InvalidationOutcome::Succeeded);

    assert_eq!(workspace.projects().await[0].commit, second);
    assert!(workspace.job("lint").await.unwrap().is_some());
    let graph = workspace.graph().await.unwrap();
    assert_eq!(graph.nodes.len(), 3);
    assert!(graph
        .edges
        .iter()
        .any(|e| e.source == "unit" && e.target == "lint" && e.animated));
}

#[tokio::test]
async fn test_sync_cycle_prunes_dropped_source() {
    if !git_available() {
        return;
    }
    let tmp = TempDir::new().unwrap();
    let (_upstream, url, _) = setup_upstream(tmp.path());
    let config = config(tmp.path(), &url);
    let workspace = Arc::new(Workspace::new(config.clone(), SyncTrigger::new()));
    workspace.bootstrap().await.unwrap();
    let clone = workspace.projects().await[0].path.clone();

    let sched = scheduler(&config, &workspace, Vec::new());
    let report = sched.sync_cycle().await;

    assert_eq!(report.pruned, vec![clone.clone()]);
    assert!(!clone.exists());
    assert!(workspace.projects().await.is_empty());
    assert!(workspace.graph().await.unwrap().nodes.is_empty());
}

#[tokio::test]
async fn test_background_scheduler_runs_on_trigger() {
    if !git_available() {
        return;
    }
    let tmp = TempDir::new().unwrap();
    let (upstream, url, _) = setup_upstream(tmp.path());
    let mut config = config(tmp.path(), &url);
    config.sync.run_on_startup = false;
    config.sync.interval_secs = 3600;
    let workspace = Arc::new(Workspace::new(config.clone(), SyncTrigger::new()));
    workspace.bootstrap().await.unwrap();

    let second = commit_file(&upstream, "zuul.yaml", "- job:\n    name: top\n", "top");
    let mut sched = scheduler(&config, &workspace, vec![url.clone()]);
    sched.start();
    sched.force_run();

    tokio::time::timeout(Duration::from_secs(30), async {
        while sched.last_report().is_none() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
    sched.shutdown().await;

    assert_eq!(workspace.projects().await[0].commit, second);
    assert!(workspace.job("top").await.unwrap().is_some());
}
