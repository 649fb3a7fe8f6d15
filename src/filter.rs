//! File eligibility rules for the ingestion walk.
//!
//! A [`FileFilter`] decides whether a repository path gets indexed. Symbolic
//! links and paths with a hidden (dot-prefixed) segment are always excluded.
//! Beyond that, rules come from one of three mutually exclusive sources:
//!
//! - an inclusion list (`ext:`/`file:`/`dir:` lines) — only matches pass,
//! - an exclusion list (same format) — matches are dropped,
//! - a gitignore-style pattern file — full gitignore semantics, including
//!   `!pattern` re-includes and directory-anchored patterns.
//!
//! The compiled pattern spec is cached against the rule file's modification
//! time and rebuilt lazily when the file changes, so long-running jobs pick
//! up edits without recompiling on every path.

use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::config::FilterConfig;
use crate::error::{PipelineError, Result};

#[derive(Debug)]
pub struct FileFilter {
    rules: RuleSource,
}

#[derive(Debug)]
enum RuleSource {
    None,
    Include(RuleList),
    Exclude(RuleList),
    Patterns(IgnoreCache),
}

impl FileFilter {
    /// Builds a filter from configuration. Fails before any file is read if
    /// more than one rule source is configured.
    pub fn from_config(config: &FilterConfig) -> Result<Self> {
        let configured = [
            config.inclusion_file.is_some(),
            config.exclusion_file.is_some(),
            config.ignore_file.is_some(),
        ];
        if configured.iter().filter(|set| **set).count() > 1 {
            return Err(PipelineError::Config(
                "only one of filter.inclusion_file, filter.exclusion_file, filter.ignore_file \
                 may be set"
                    .to_string(),
            ));
        }

        let rules = if let Some(path) = &config.inclusion_file {
            RuleSource::Include(RuleList::parse(path)?)
        } else if let Some(path) = &config.exclusion_file {
            RuleSource::Exclude(RuleList::parse(path)?)
        } else if let Some(path) = &config.ignore_file {
            RuleSource::Patterns(IgnoreCache::new(path.clone()))
        } else {
            RuleSource::None
        };

        Ok(Self { rules })
    }

    /// Whether a file should be indexed. `abs_path` is consulted for symlink
    /// detection; `rel_path` (relative to the snapshot root) for rule matching.
    pub fn should_include(&self, abs_path: &Path, rel_path: &Path) -> bool {
        let is_symlink = fs::symlink_metadata(abs_path)
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false);
        if is_symlink {
            return false;
        }

        if has_hidden_segment(rel_path) {
            return false;
        }

        match &self.rules {
            RuleSource::None => true,
            RuleSource::Include(rules) => rules.matches(rel_path),
            RuleSource::Exclude(rules) => !rules.matches(rel_path),
            RuleSource::Patterns(cache) => cache.allows(rel_path),
        }
    }
}

fn has_hidden_segment(rel_path: &Path) -> bool {
    rel_path.components().any(|component| {
        matches!(component, Component::Normal(name) if name.to_string_lossy().starts_with('.'))
    })
}

/// Parsed `ext:`/`file:`/`dir:` rule list.
#[derive(Debug, Default)]
struct RuleList {
    extensions: Vec<String>,
    files: Vec<String>,
    dirs: Vec<String>,
}

impl RuleList {
    /// Parses a rule file. Lines are `# comment`, `ext:.py`, `file:setup.py`
    /// or `dir:vendor`; anything else is logged and skipped.
    fn parse(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut rules = RuleList::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                tracing::error!(line, "malformed filter rule, skipping");
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "ext" => rules.extensions.push(normalize_extension(value)),
                "file" => rules.files.push(value.to_string()),
                "dir" => rules.dirs.push(value.to_string()),
                other => tracing::error!(key = other, "unrecognized filter rule key, skipping"),
            }
        }

        Ok(rules)
    }

    fn matches(&self, rel_path: &Path) -> bool {
        if let Some(ext) = rel_path.extension().and_then(|e| e.to_str()) {
            let ext = format!(".{}", ext.to_lowercase());
            if self.extensions.contains(&ext) {
                return true;
            }
        }

        if let Some(name) = rel_path.file_name().and_then(|n| n.to_str()) {
            if self.files.iter().any(|file| file == name) {
                return true;
            }
        }

        if let Some(parent) = rel_path.parent() {
            for component in parent.components() {
                if let Component::Normal(dir) = component {
                    if self.dirs.iter().any(|d| dir.to_string_lossy() == d.as_str()) {
                        return true;
                    }
                }
            }
        }

        false
    }
}

/// Extension rules are case-insensitive and may be written with or without
/// the leading dot.
fn normalize_extension(value: &str) -> String {
    let value = value.trim().to_lowercase();
    if value.starts_with('.') {
        value
    } else {
        format!(".{value}")
    }
}

/// Compiled gitignore patterns keyed by the rule file's modification time.
#[derive(Debug)]
struct IgnoreCache {
    source: PathBuf,
    compiled: RefCell<Option<CompiledPatterns>>,
    recompiles: Cell<usize>,
}

#[derive(Debug)]
struct CompiledPatterns {
    matcher: Gitignore,
    source_mtime: Option<SystemTime>,
}

impl IgnoreCache {
    fn new(source: PathBuf) -> Self {
        Self {
            source,
            compiled: RefCell::new(None),
            recompiles: Cell::new(0),
        }
    }

    /// True when the path survives the ignore patterns. The compiled matcher
    /// is rebuilt only when the rule file's mtime differs from the cached one.
    fn allows(&self, rel_path: &Path) -> bool {
        let observed = fs::metadata(&self.source).and_then(|m| m.modified()).ok();

        let mut slot = self.compiled.borrow_mut();
        let stale = match slot.as_ref() {
            Some(cached) => cached.source_mtime != observed,
            None => true,
        };

        if stale {
            match compile_patterns(&self.source) {
                Ok(matcher) => {
                    *slot = Some(CompiledPatterns {
                        matcher,
                        source_mtime: observed,
                    });
                    self.recompiles.set(self.recompiles.get() + 1);
                }
                Err(err) => {
                    tracing::warn!(
                        file = %self.source.display(),
                        error = %err,
                        "unable to compile ignore patterns, including path",
                    );
                    *slot = None;
                    return true;
                }
            }
        }

        match slot.as_ref() {
            Some(cached) => !cached
                .matcher
                .matched_path_or_any_parents(rel_path, false)
                .is_ignore(),
            None => true,
        }
    }
}

fn compile_patterns(source: &Path) -> Result<Gitignore> {
    let content = fs::read_to_string(source)?;

    let mut builder = GitignoreBuilder::new("");
    for line in content.lines() {
        if let Err(err) = builder.add_line(None, line) {
            tracing::warn!(line, error = %err, "invalid ignore pattern, skipping");
        }
    }

    builder
        .build()
        .map_err(|err| PipelineError::Config(format!("ignore file {}: {err}", source.display())))
}
