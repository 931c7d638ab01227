//! Classification of changed files by naming convention

use deltaplan_core::RepoPath;
use std::collections::BTreeSet;

/// Decides whether a changed file is inert configuration.
///
/// Classification is by extension only. A file without an extension is never
/// configuration, so ambiguous files fall on the side of running work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFileClassifier {
    extensions: BTreeSet<String>,
}

impl ConfigFileClassifier {
    /// Build a classifier from extensions, with or without a leading dot
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { extensions }
    }

    /// Whether the path is an inert configuration file
    pub fn is_config(&self, path: &RepoPath) -> bool {
        path.extension()
            .is_some_and(|ext| self.extensions.contains(&ext))
    }

    /// The recognised extensions
    pub fn extensions(&self) -> &BTreeSet<String> {
        &self.extensions
    }
}

impl Default for ConfigFileClassifier {
    fn default() -> Self {
        Self::new(deltaplan_core::DEFAULT_CONFIG_EXTENSIONS.iter().copied())
    }
}
