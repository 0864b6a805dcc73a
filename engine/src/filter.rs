//! Include / exclude filtering of relative paths.
//!
//! Rules use rsync-style glob conventions:
//! - a rule without `/` matches the entry's file name at any depth (`*.py`)
//! - a rule containing `/` matches the relative path; a leading `/` anchors it
//!   to the job root, otherwise it may match at any depth
//! - a trailing `/` restricts the rule to directories
//! - `*` stops at `/`, `**` does not
//!
//! Includes are checked first (first match wins), then any matching exclude
//! vetoes the entry. With a non-empty include list, entries matching no include
//! are dropped. Directories are only held to the include list when it contains
//! a directory rule; otherwise they pass so the walk can reach matching files.

use std::path::{Component, Path};
use globset::{GlobBuilder, GlobMatcher};
use crate::error::EngineError;

/// Outcome of filtering one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Included,
    /// Include rules exist and none matched
    NotIncluded,
    /// Provisionally included, then vetoed by an exclude rule
    Excluded,
}

#[derive(Debug, Clone)]
struct Rule {
    matcher: GlobMatcher,
    dir_only: bool,
    whole_path: bool,
}

impl Rule {
    fn compile(raw: &str) -> Result<Rule, EngineError> {
        let mut pattern = raw;
        let dir_only = pattern.len() > 1 && pattern.ends_with('/');
        if dir_only {
            pattern = &pattern[..pattern.len() - 1];
        }

        let anchored = pattern.starts_with('/');
        let whole_path = anchored || pattern.contains('/');
        let glob = if anchored {
            pattern.trim_start_matches('/').to_string()
        } else if whole_path && !pattern.starts_with("**/") {
            format!("**/{}", pattern)
        } else {
            pattern.to_string()
        };

        let matcher = GlobBuilder::new(&glob)
            .literal_separator(true)
            .build()
            .map_err(|e| EngineError::InvalidPattern {
                pattern: raw.to_string(),
                source: e,
            })?
            .compile_matcher();

        Ok(Rule {
            matcher,
            dir_only,
            whole_path,
        })
    }

    fn matches(&self, rel_path: &str, is_dir: bool) -> bool {
        if self.dir_only && !is_dir {
            return false;
        }
        if self.whole_path {
            self.matcher.is_match(rel_path)
        } else {
            let name = rel_path.rsplit('/').next().unwrap_or(rel_path);
            self.matcher.is_match(name)
        }
    }
}

/// Compiled include/exclude rule lists for one job.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    includes: Vec<Rule>,
    excludes: Vec<Rule>,
    dirs_need_include: bool,
}

impl PathFilter {
    /// Compile the rule lists. Blank rules are ignored.
    pub fn new<S: AsRef<str>>(includes: &[S], excludes: &[S]) -> Result<Self, EngineError> {
        let compile_all = |rules: &[S]| -> Result<Vec<Rule>, EngineError> {
            rules
                .iter()
                .map(|r| r.as_ref().trim())
                .filter(|r| !r.is_empty())
                .map(Rule::compile)
                .collect()
        };

        let includes = compile_all(includes)?;
        let excludes = compile_all(excludes)?;
        let dirs_need_include = includes.iter().any(|r| r.dir_only);

        Ok(PathFilter {
            includes,
            excludes,
            dirs_need_include,
        })
    }

    pub fn decision(&self, rel_path: &Path, is_dir: bool) -> FilterDecision {
        let rel = to_match_string(rel_path);

        let included = self.includes.is_empty()
            || (is_dir && !self.dirs_need_include)
            || self.includes.iter().any(|r| r.matches(&rel, is_dir));
        if !included {
            return FilterDecision::NotIncluded;
        }

        if self.excludes.iter().any(|r| r.matches(&rel, is_dir)) {
            FilterDecision::Excluded
        } else {
            FilterDecision::Included
        }
    }

    pub fn allows(&self, rel_path: &Path, is_dir: bool) -> bool {
        self.decision(rel_path, is_dir) == FilterDecision::Included
    }
}

/// Join normal components with `/` so matching is identical on every platform.
fn to_match_string(rel_path: &Path) -> String {
    rel_path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
