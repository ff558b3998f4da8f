//! Source positions for Zuul config files.
//!
//! `serde_yaml` values carry no location information, so positions are
//! recovered from the block structure of the text: the top-level sequence
//! items, the keys of each item's mapping, and the keys of a `vars` block.
//! Flow-style entries (`- job: {name: x}`) have no recoverable key lines and
//! simply report nothing; callers fall back to defaults.

use std::collections::HashMap;

/// Line positions of the top-level sequence items of one YAML document.
#[derive(Debug, Clone, Default)]
pub struct LineIndex {
    lines: Vec<Line>,
    entries: Vec<Entry>,
}

#[derive(Debug, Clone)]
struct Line {
    indent: usize,
    /// Content after indentation; `None` for blank and comment-only lines.
    text: Option<String>,
}

#[derive(Debug, Clone)]
struct Entry {
    /// 0-based line holding the entry's key.
    key_line: usize,
    /// 0-based line where the key's value starts.
    value_line: usize,
    /// First and one-past-last 0-based line of the entry.
    start: usize,
    end: usize,
}

impl LineIndex {
    pub fn scan(source: &str) -> Self {
        let lines: Vec<Line> = source.lines().map(classify).collect();

        let seq_indent = lines.iter().find_map(|l| match &l.text {
            Some(t) if is_directive(t) => None,
            Some(t) if is_item(t) => Some(l.indent),
            Some(_) => Some(usize::MAX),
            None => None,
        });
        let seq_indent = match seq_indent {
            Some(indent) if indent != usize::MAX => indent,
            _ => {
                return LineIndex {
                    lines,
                    entries: Vec::new(),
                }
            }
        };

        let mut starts = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            if let Some(t) = &line.text {
                if line.indent == seq_indent && is_item(t) {
                    starts.push(i);
                }
            }
        }

        let mut entries = Vec::with_capacity(starts.len());
        for (n, &start) in starts.iter().enumerate() {
            let end = starts.get(n + 1).copied().unwrap_or(lines.len());
            let rest = lines[start].text.as_deref().unwrap_or("")[1..].trim();
            let (key_line, key_text) = if rest.is_empty() || rest.starts_with('#') {
                // Bare `-`: the key sits on the next meaningful line.
                match (start + 1..end).find(|&i| lines[i].text.is_some()) {
                    Some(i) => (i, lines[i].text.as_deref().unwrap_or("")),
                    None => (start, rest),
                }
            } else {
                (start, rest)
            };
            // A block mapping value starts at its first key; an inline value
            // starts on the key line itself.
            let value_line = if block_key(key_text).is_some() {
                (key_line + 1..end)
                    .find(|&i| lines[i].text.is_some())
                    .unwrap_or(key_line)
            } else {
                key_line
            };
            entries.push(Entry {
                key_line,
                value_line,
                start,
                end,
            });
        }

        LineIndex { lines, entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 1-based line of the key of top-level item `index`.
    pub fn entry_line(&self, index: usize) -> Option<usize> {
        self.entries.get(index).map(|e| e.key_line + 1)
    }

    /// 1-based line where the value of top-level item `index` starts: the
    /// first nested key for a block mapping, the key line otherwise.
    pub fn value_line(&self, index: usize) -> Option<usize> {
        self.entries.get(index).map(|e| e.value_line + 1)
    }

    /// 1-based lines of the keys directly under `vars:` in item `index`.
    pub fn var_lines(&self, index: usize) -> HashMap<String, usize> {
        let mut found = HashMap::new();
        let Some(entry) = self.entries.get(index) else {
            return found;
        };

        // Indentation of the job mapping's own keys.
        let Some(body_indent) = self.first_indent_after(entry.key_line, entry.end) else {
            return found;
        };
        if body_indent <= self.lines[entry.key_line].indent {
            return found;
        }

        let vars_line = (entry.key_line + 1..entry.end).find(|&i| {
            let line = &self.lines[i];
            line.indent == body_indent
                && line
                    .text
                    .as_deref()
                    .and_then(block_key)
                    .is_some_and(|key| key == "vars")
        });
        let Some(vars_line) = vars_line else {
            return found;
        };
        let Some(var_indent) = self.first_indent_after(vars_line, entry.end) else {
            return found;
        };
        if var_indent <= body_indent {
            return found;
        }

        for i in vars_line + 1..entry.end {
            let line = &self.lines[i];
            let Some(text) = &line.text else { continue };
            if line.indent <= body_indent {
                break;
            }
            if line.indent == var_indent {
                if let Some(key) = mapping_key(text) {
                    found.entry(key).or_insert(i + 1);
                }
            }
        }
        found
    }

    fn first_indent_after(&self, line: usize, end: usize) -> Option<usize> {
        (line + 1..end).find_map(|i| self.lines[i].text.as_ref().map(|_| self.lines[i].indent))
    }
}

fn classify(raw: &str) -> Line {
    let trimmed = raw.trim_start_matches(' ');
    let indent = raw.len() - trimmed.len();
    let content = trimmed.trim_end();
    let text = if content.is_empty() || content.starts_with('#') {
        None
    } else {
        Some(content.to_string())
    };
    Line { indent, text }
}

fn is_directive(text: &str) -> bool {
    text == "---" || text.starts_with("--- ") || text.starts_with('%')
}

fn is_item(text: &str) -> bool {
    text == "-" || text.starts_with("- ")
}

/// The key of a `key:` line that opens a nested block (nothing after the colon).
fn block_key(text: &str) -> Option<String> {
    let (key, rest) = split_key(text)?;
    let rest = rest.trim();
    (rest.is_empty() || rest.starts_with('#')).then_some(key)
}

/// The key of any `key: value` or `key:` line.
fn mapping_key(text: &str) -> Option<String> {
    split_key(text).map(|(key, _)| key)
}

fn split_key(text: &str) -> Option<(String, &str)> {
    if text.starts_with('-') && is_item(text) {
        return None;
    }
    for quote in ['"', '\''] {
        if let Some(inner) = text.strip_prefix(quote) {
            let close = inner.find(quote)?;
            let after = inner[close + 1..].trim_start();
            let rest = after.strip_prefix(':')?;
            if rest.is_empty() || rest.starts_with(' ') {
                return Some((inner[..close].to_string(), rest));
            }
            return None;
        }
    }
    let colon = match text.find(": ") {
        Some(pos) => pos,
        None if text.ends_with(':') => text.len() - 1,
        None => return None,
    };
    let key = text[..colon].trim_end();
    if key.is_empty() || key.starts_with(['{', '[', '&', '*', '!', '|', '>']) {
        return None;
    }
    Some((key.to_string(), &text[colon + 1..]))
}
