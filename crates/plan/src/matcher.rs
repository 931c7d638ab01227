//! Changed file to operation matching
//!
//! A watch pattern is a glob when it contains `*` or `?`, otherwise an exact
//! repository path. `*` and `?` stay within one path segment, `**` crosses
//! segments, and every pattern is anchored to the whole path. Other glob
//! syntax such as `[...]` and `{...}` is matched literally. Matching is
//! case-sensitive.

use deltaplan_config::OperationMap;
use deltaplan_core::{Error, RepoPath, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

const WILDCARDS: &[char] = &['*', '?'];

#[derive(Debug, Clone)]
struct WatchSet {
    operation: String,
    exact: BTreeSet<String>,
    globs: Option<GlobSet>,
}

impl WatchSet {
    fn matches(&self, path: &RepoPath) -> bool {
        self.exact.contains(path.as_str())
            || self
                .globs
                .as_ref()
                .is_some_and(|globs| globs.is_match(path.as_str()))
    }
}

/// Compiled watch patterns of every operation in a map
#[derive(Debug, Clone)]
pub struct FileMatcher {
    watch_sets: Vec<WatchSet>,
}

impl FileMatcher {
    /// Compile the watch patterns of `map`.
    ///
    /// Fails with `InvalidPattern` on the first glob that does not compile.
    /// Blank patterns match nothing.
    pub fn new(map: &OperationMap) -> Result<Self> {
        let mut watch_sets = Vec::new();

        for op in map.operations() {
            let mut exact = BTreeSet::new();
            let mut globs = GlobSetBuilder::new();
            let mut glob_count = 0usize;

            for pattern in &op.watch_files {
                let normalized = normalize_pattern(pattern);
                if normalized.is_empty() {
                    continue;
                }

                if normalized.contains(WILDCARDS) {
                    let glob = GlobBuilder::new(&glob_source(normalized))
                        .literal_separator(true)
                        .backslash_escape(false)
                        .build()
                        .map_err(|e| Error::invalid_pattern(&op.name, pattern, e.kind().to_string()))?;
                    globs.add(glob);
                    glob_count += 1;
                } else {
                    exact.insert(normalized.to_string());
                }
            }

            if exact.is_empty() && glob_count == 0 {
                continue;
            }

            let globs = if glob_count > 0 {
                Some(globs.build().map_err(|e| {
                    Error::invalid_pattern(&op.name, op.watch_files.join(", "), e.to_string())
                })?)
            } else {
                None
            };

            watch_sets.push(WatchSet {
                operation: op.name.clone(),
                exact,
                globs,
            });
        }

        Ok(Self { watch_sets })
    }

    /// Match changed files against every operation's watch patterns
    pub fn match_paths(&self, changed: &[RepoPath]) -> MatchResult {
        let mut matches: BTreeMap<String, BTreeSet<RepoPath>> = BTreeMap::new();
        let mut unmatched = BTreeSet::new();

        for path in changed {
            let mut hit = false;
            for watch in &self.watch_sets {
                if watch.matches(path) {
                    matches
                        .entry(watch.operation.clone())
                        .or_default()
                        .insert(path.clone());
                    hit = true;
                }
            }
            if !hit {
                unmatched.insert(path.clone());
            }
        }

        tracing::debug!(
            changed = changed.len(),
            impacted = matches.len(),
            unmatched = unmatched.len(),
            "matched changed files"
        );

        MatchResult { matches, unmatched }
    }

    /// Operations whose patterns match at least one changed file
    pub fn impacted(&self, changed: &[RepoPath]) -> BTreeSet<String> {
        self.match_paths(changed).impacted()
    }
}

fn normalize_pattern(pattern: &str) -> &str {
    let mut pattern = pattern.trim();
    while let Some(rest) = pattern.strip_prefix("./") {
        pattern = rest;
    }
    pattern
}

/// Keep `*` and `?` as wildcards and escape every other run of text
fn glob_source(pattern: &str) -> String {
    let mut source = String::with_capacity(pattern.len());
    let mut rest = pattern;
    while let Some(at) = rest.find(WILDCARDS) {
        source.push_str(&globset::escape(&rest[..at]));
        source.push_str(&rest[at..at + 1]);
        rest = &rest[at + 1..];
    }
    source.push_str(&globset::escape(rest));
    source
}

/// Which changed files matched which operations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    matches: BTreeMap<String, BTreeSet<RepoPath>>,
    unmatched: BTreeSet<RepoPath>,
}

impl MatchResult {
    /// Impacted operation names, ascending
    pub fn impacted(&self) -> BTreeSet<String> {
        self.matches.keys().cloned().collect()
    }

    /// Changed files matched by `operation`'s patterns
    pub fn files_for(&self, operation: &str) -> Option<&BTreeSet<RepoPath>> {
        self.matches.get(operation)
    }

    /// Changed files no operation watches
    pub fn unmatched(&self) -> &BTreeSet<RepoPath> {
        &self.unmatched
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deltaplan_config::{MapBuilder, Operation};

    fn paths(raw: &[&str]) -> Vec<RepoPath> {
        raw.iter().map(|p| RepoPath::new(p).unwrap()).collect()
    }

    fn matcher_for(ops: Vec<Operation>) -> FileMatcher {
        let mut builder = MapBuilder::new();
        builder.add_source("test", ops).unwrap();
        FileMatcher::new(&builder.build()).unwrap()
    }

    #[test]
    fn test_exact_path_is_anchored() {
        let matcher = matcher_for(vec![
            Operation::new("nginx").with_watch_files(["templates/nginx.conf.j2"]),
        ]);
        assert_eq!(
            matcher.impacted(&paths(&["templates/nginx.conf.j2"])),
            BTreeSet::from(["nginx".to_string()])
        );
        assert!(matcher.impacted(&paths(&["old/templates/nginx.conf.j2"])).is_empty());
        assert!(matcher.impacted(&paths(&["templates/nginx.conf.j2.bak"])).is_empty());
    }

    #[test]
    fn test_single_star_stays_in_segment() {
        let matcher = matcher_for(vec![Operation::new("vars").with_watch_files(["group_vars/*.yml"])]);
        assert!(!matcher.impacted(&paths(&["group_vars/all.yml"])).is_empty());
        assert!(matcher.impacted(&paths(&["group_vars/web/main.yml"])).is_empty());
    }

    #[test]
    fn test_double_star_crosses_segments() {
        let matcher = matcher_for(vec![Operation::new("web").with_watch_files(["roles/web/**"])]);
        assert!(!matcher.impacted(&paths(&["roles/web/tasks/main.yml"])).is_empty());
        assert!(!matcher.impacted(&paths(&["roles/web/files/deep/a/b.txt"])).is_empty());
        assert!(matcher.impacted(&paths(&["roles/db/tasks/main.yml"])).is_empty());
    }

    #[test]
    fn test_question_mark_and_case_sensitivity() {
        let matcher = matcher_for(vec![Operation::new("env").with_watch_files(["env/app?.conf"])]);
        assert!(!matcher.impacted(&paths(&["env/app1.conf"])).is_empty());
        assert!(matcher.impacted(&paths(&["env/app12.conf"])).is_empty());
        assert!(matcher.impacted(&paths(&["ENV/app1.conf"])).is_empty());
    }

    #[test]
    fn test_match_result_tracks_files_and_unmatched() {
        let matcher = matcher_for(vec![
            Operation::new("a").with_watch_files(["./src/**/*.rs"]),
            Operation::new("b").with_watch_files(["src/main.rs"]),
        ]);
        let result = matcher.match_paths(&paths(&["src/main.rs", "README.md"]));

        assert_eq!(result.impacted().len(), 2);
        assert_eq!(result.files_for("a").map(BTreeSet::len), Some(1));
        assert_eq!(result.unmatched(), &BTreeSet::from([RepoPath::new("README.md").unwrap()]));
    }

    #[test]
    fn test_invalid_glob_is_reported() {
        let map = MapBuilder::new()
            .with("test", Operation::new("broken").with_watch_files(["roles/web**/tasks"]))
            .unwrap()
            .build();
        let err = FileMatcher::new(&map).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidPattern { ref operation, ref pattern, .. }
                if operation == "broken" && pattern == "roles/web**/tasks"
        ));
    }

    #[test]
    fn test_brackets_and_braces_are_literal() {
        let matcher = matcher_for(vec![
            Operation::new("app").with_watch_files(["files/app[1].txt"]),
            Operation::new("tmpl").with_watch_files(["templates/{{ app }}.conf"]),
        ]);
        assert_eq!(
            matcher.impacted(&paths(&["files/app[1].txt"])),
            BTreeSet::from(["app".to_string()])
        );
        assert!(matcher.impacted(&paths(&["files/app1.txt"])).is_empty());
        assert_eq!(
            matcher.impacted(&paths(&["templates/{{ app }}.conf"])),
            BTreeSet::from(["tmpl".to_string()])
        );
    }

    #[test]
    fn test_wildcards_next_to_literal_brackets() {
        let matcher = matcher_for(vec![
            Operation::new("mixed").with_watch_files(["files/app[1]/*.txt", "conf/{a,b}?.yml"]),
        ]);
        assert!(!matcher.impacted(&paths(&["files/app[1]/notes.txt"])).is_empty());
        assert!(matcher.impacted(&paths(&["files/app1/notes.txt"])).is_empty());
        assert!(!matcher.impacted(&paths(&["conf/{a,b}1.yml"])).is_empty());
        assert!(matcher.impacted(&paths(&["conf/a1.yml"])).is_empty());
    }

    #[test]
    fn test_no_changes_no_impact() {
        let matcher = matcher_for(vec![Operation::new("a").with_watch_files(["**"])]);
        assert!(matcher.match_paths(&[]).is_empty());
    }
}
