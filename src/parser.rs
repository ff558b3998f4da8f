//! Parsing of a single Zuul config file into provenance-tagged jobs.

use serde_json::{Map, Value};
use std::path::{Component, Path};

use crate::error::ParseError;
use crate::lines::LineIndex;
use crate::models::{Job, JobDefinition, ProjectInfo};

/// Jobs read from one file, plus failures of individual entries.
#[derive(Debug, Default)]
pub struct ParsedFile {
    pub jobs: Vec<Job>,
    pub failures: Vec<ParseError>,
}

/// Reads `path` (a file inside `project`) and extracts its `job` entries.
///
/// A file that cannot be read, is not valid YAML, or whose document is not a
/// sequence fails as a whole. An entry keyed `job` that does not describe a
/// job is reported on its own; the remaining entries are still returned.
pub fn parse_file(path: &Path, project: &ProjectInfo) -> Result<ParsedFile, ParseError> {
    let text = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_str(&text, path, project)
}

/// Like [`parse_file`], for content already in memory.
pub fn parse_str(text: &str, path: &Path, project: &ProjectInfo) -> Result<ParsedFile, ParseError> {
    let document: serde_yaml::Value =
        serde_yaml::from_str(text).map_err(|source| ParseError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;

    let entries = match document {
        serde_yaml::Value::Null => return Ok(ParsedFile::default()),
        serde_yaml::Value::Sequence(entries) => entries,
        _ => {
            return Err(ParseError::NotASequence {
                path: path.to_path_buf(),
            })
        }
    };

    let index = LineIndex::scan(text);
    // Positions are only trusted when the text scan saw the same items as
    // the YAML parser.
    let positions = (index.len() == entries.len()).then_some(&index);

    let source_file = relative_path(path, &project.path);
    let link = SourceLink::new(&project.url, &project.commit, &source_file);

    let mut parsed = ParsedFile::default();
    for (i, entry) in entries.into_iter().enumerate() {
        let serde_yaml::Value::Mapping(mut mapping) = entry else {
            continue;
        };
        let Some(body) = mapping.remove("job") else {
            continue;
        };

        let definition: JobDefinition = match serde_yaml::from_value(string_keys(body)) {
            Ok(def) => def,
            Err(source) => {
                parsed.failures.push(ParseError::InvalidJob {
                    path: path.to_path_buf(),
                    index: i,
                    source,
                });
                continue;
            }
        };

        let source_line = positions.and_then(|p| p.value_line(i)).unwrap_or(1);
        let var_lines = positions.map(|p| p.var_lines(i)).unwrap_or_default();

        let mut vars_source = Map::new();
        for name in definition.vars.keys() {
            if let Some(line) = var_lines.get(name) {
                vars_source.insert(name.clone(), Value::String(link.at_line(*line)));
            }
        }

        parsed.jobs.push(Job {
            name: definition.name,
            parent: definition.parent,
            vars: definition.vars,
            dependencies: definition.dependencies,
            roles: definition.roles,
            source_file: source_file.clone(),
            source_line,
            source_url: link.at_line(source_line),
            vars_source,
            extra: definition.extra,
        });
    }

    Ok(parsed)
}

/// Rewrites every mapping key as a string (`8080` → `"8080"`, `true` →
/// `"true"`), recursively, so job fields can be held in JSON maps.
fn string_keys(value: serde_yaml::Value) -> serde_yaml::Value {
    use serde_yaml::Value as Yaml;

    match value {
        Yaml::Mapping(mapping) => Yaml::Mapping(
            mapping
                .into_iter()
                .map(|(key, value)| (Yaml::String(key_string(key)), string_keys(value)))
                .collect(),
        ),
        Yaml::Sequence(items) => Yaml::Sequence(items.into_iter().map(string_keys).collect()),
        Yaml::Tagged(tagged) => string_keys(tagged.value),
        other => other,
    }
}

fn key_string(key: serde_yaml::Value) -> String {
    use serde_yaml::Value as Yaml;

    match key {
        Yaml::String(s) => s,
        Yaml::Number(n) => n.to_string(),
        Yaml::Bool(b) => b.to_string(),
        Yaml::Null => "null".to_string(),
        other => serde_yaml::to_string(&other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

/// `path` relative to `root`, `/`-separated. Falls back to the full path
/// when `path` is not under `root`.
pub fn relative_path(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Builder for browsable links into a repository at a pinned commit.
#[derive(Debug, Clone)]
pub struct SourceLink {
    prefix: String,
}

impl SourceLink {
    pub fn new(repo_url: &str, commit: &str, relative_path: &str) -> Self {
        let base = web_base(repo_url);
        let segment = if base.contains("gitlab") {
            "-/blob"
        } else {
            "blob"
        };
        SourceLink {
            prefix: format!("{}/{}/{}/{}", base, segment, commit, relative_path),
        }
    }

    pub fn at_line(&self, line: usize) -> String {
        format!("{}#L{}", self.prefix, line)
    }
}

/// Web base URL for a remote: trailing `/` and `.git` removed, scp-style and
/// `ssh://` remotes rewritten to `https://`.
pub fn web_base(repo_url: &str) -> String {
    let trimmed = repo_url.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);

    if let Some(rest) = trimmed.strip_prefix("ssh://") {
        let rest = rest.split_once('@').map(|(_, host)| host).unwrap_or(rest);
        // ssh://host:port/path carries a port, not a path separator.
        let rest = match rest.split_once('/') {
            Some((host, path)) => format!("{}/{}", host.split(':').next().unwrap_or(host), path),
            None => rest.to_string(),
        };
        return format!("https://{}", rest);
    }

    if !trimmed.contains("://") {
        if let Some((user_host, path)) = trimmed.split_once(':') {
            let host = user_host
                .split_once('@')
                .map(|(_, host)| host)
                .unwrap_or(user_host);
            return format!("https://{}/{}", host, path.trim_start_matches('/'));
        }
    }

    trimmed.to_string()
}
