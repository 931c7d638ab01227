//! Engine settings with precedence handling
//!
//! Values are layered: built-in defaults, then a JSON settings file, then
//! `DELTAPLAN_*` environment variables, then explicit overrides from the
//! caller. The last layer that changed anything is recorded as the source.

use deltaplan_core::{
    constants::{
        DEFAULT_CONFIG_EXTENSIONS, DEFAULT_GRAPH_CACHE_ENTRIES, DELTAPLAN_CONFIG_EXTENSIONS_VAR,
        DELTAPLAN_FAST_TRACK_VAR, DELTAPLAN_GRAPH_CACHE_ENTRIES_VAR, DELTAPLAN_MAP_VAR,
        MAP_FILENAMES, MAP_SEARCH_SUBDIRS, SETTINGS_DIR_NAME, SETTINGS_FILENAME,
        SETTINGS_GLOBAL_FILENAME,
    },
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where the effective settings came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Built-in defaults
    Default,
    /// Settings file
    ConfigFile(PathBuf),
    /// Environment variables
    EnvironmentVariable(String),
    /// Values passed explicitly by the caller
    Override,
}

/// Settings consumed by the planning pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineSettings {
    /// Explicit map documents; empty means auto-discovery
    pub map_paths: Vec<PathBuf>,
    /// Extensions of inert configuration files
    pub config_extensions: Vec<String>,
    /// Changes at or under these repository paths force a full deploy
    pub sentinel_paths: Vec<String>,
    /// Whether the fast-track classifier runs
    pub fast_track: bool,
    /// Capacity of the graph cache
    pub graph_cache_entries: usize,
    pub source: ConfigSource,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            map_paths: Vec::new(),
            config_extensions: DEFAULT_CONFIG_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            sentinel_paths: default_sentinel_paths(),
            fast_track: true,
            graph_cache_entries: DEFAULT_GRAPH_CACHE_ENTRIES,
            source: ConfigSource::Default,
        }
    }
}

/// Every location map discovery reads, relative to the repository root
pub fn default_sentinel_paths() -> Vec<String> {
    std::iter::once("")
        .chain(MAP_SEARCH_SUBDIRS.iter().copied())
        .flat_map(|dir| {
            MAP_FILENAMES.iter().map(move |file| {
                if dir.is_empty() {
                    file.to_string()
                } else {
                    format!("{dir}/{file}")
                }
            })
        })
        .collect()
}

/// Partial settings as found in a file, the environment or caller overrides
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SettingsOverrides {
    pub map_paths: Option<Vec<PathBuf>>,
    pub config_extensions: Option<Vec<String>>,
    pub sentinel_paths: Option<Vec<String>>,
    pub fast_track: Option<bool>,
    pub graph_cache_entries: Option<usize>,
}

impl SettingsOverrides {
    pub fn with_map_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.map_paths = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_config_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config_extensions = Some(extensions.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_sentinel_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sentinel_paths = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_fast_track(mut self, enabled: bool) -> Self {
        self.fast_track = Some(enabled);
        self
    }

    pub fn with_graph_cache_entries(mut self, entries: usize) -> Self {
        self.graph_cache_entries = Some(entries);
        self
    }

    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl EngineSettings {
    /// Layer `overrides` on top of these settings.
    ///
    /// Relative map paths are resolved against `base_dir`.
    pub fn merge(mut self, overrides: SettingsOverrides, base_dir: &Path, source: ConfigSource) -> Self {
        if overrides.is_empty() {
            return self;
        }

        if let Some(paths) = overrides.map_paths {
            self.map_paths = paths
                .into_iter()
                .map(|p| if p.is_absolute() { p } else { base_dir.join(p) })
                .collect();
        }
        if let Some(extensions) = overrides.config_extensions {
            self.config_extensions = extensions;
        }
        if let Some(sentinels) = overrides.sentinel_paths {
            self.sentinel_paths = sentinels;
        }
        if let Some(fast_track) = overrides.fast_track {
            self.fast_track = fast_track;
        }
        if let Some(entries) = overrides.graph_cache_entries {
            self.graph_cache_entries = entries;
        }
        self.source = source;
        self
    }
}

/// Loads [`EngineSettings`] for a repository
pub struct SettingsLoader;

impl SettingsLoader {
    /// Defaults, then settings file, then environment
    pub fn load(repo_root: &Path) -> Result<EngineSettings> {
        let mut settings = EngineSettings::default();

        if let Some((path, file_settings)) = Self::load_from_file(repo_root)? {
            settings = settings.merge(file_settings, repo_root, ConfigSource::ConfigFile(path));
        }

        let env_settings = Self::load_from_env()?;
        settings = settings.merge(
            env_settings,
            repo_root,
            ConfigSource::EnvironmentVariable("DELTAPLAN_*".to_string()),
        );

        tracing::debug!(source = ?settings.source, "engine settings loaded");
        Ok(settings)
    }

    /// [`SettingsLoader::load`] followed by explicit caller overrides
    pub fn load_with_overrides(
        repo_root: &Path,
        overrides: SettingsOverrides,
    ) -> Result<EngineSettings> {
        let settings = Self::load(repo_root)?;
        Ok(settings.merge(overrides, repo_root, ConfigSource::Override))
    }

    /// The settings file that applies to `repo_root`, if any exists
    pub fn settings_file_path(repo_root: &Path) -> Option<PathBuf> {
        let local = repo_root.join(SETTINGS_FILENAME);
        if local.is_file() {
            return Some(local);
        }

        let config_dir = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(dirs::config_dir)?;
        let global = config_dir.join(SETTINGS_DIR_NAME).join(SETTINGS_GLOBAL_FILENAME);
        global.is_file().then_some(global)
    }

    fn load_from_file(repo_root: &Path) -> Result<Option<(PathBuf, SettingsOverrides)>> {
        let Some(path) = Self::settings_file_path(repo_root) else {
            return Ok(None);
        };

        let content =
            std::fs::read_to_string(&path).map_err(|e| Error::file_system(&path, "read", e))?;
        let parsed: SettingsOverrides = serde_json::from_str(&content).map_err(|e| {
            Error::parse_with_source(
                path.display().to_string(),
                format!("invalid settings file: {e}"),
                e,
            )
        })?;

        Ok(Some((path, parsed)))
    }

    fn load_from_env() -> Result<SettingsOverrides> {
        let mut overrides = SettingsOverrides::default();

        if let Some(maps) = std::env::var_os(DELTAPLAN_MAP_VAR) {
            let paths: Vec<PathBuf> = std::env::split_paths(&maps)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
            if !paths.is_empty() {
                overrides.map_paths = Some(paths);
            }
        }

        if let Ok(value) = std::env::var(DELTAPLAN_FAST_TRACK_VAR) {
            overrides.fast_track = Some(parse_bool(DELTAPLAN_FAST_TRACK_VAR, &value)?);
        }

        if let Ok(value) = std::env::var(DELTAPLAN_CONFIG_EXTENSIONS_VAR) {
            overrides.config_extensions = Some(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|ext| !ext.is_empty())
                    .map(str::to_string)
                    .collect(),
            );
        }

        if let Ok(value) = std::env::var(DELTAPLAN_GRAPH_CACHE_ENTRIES_VAR) {
            let entries = value.trim().parse::<usize>().map_err(|_| {
                Error::configuration(format!(
                    "{DELTAPLAN_GRAPH_CACHE_ENTRIES_VAR} must be a non-negative integer, got '{value}'"
                ))
            })?;
            overrides.graph_cache_entries = Some(entries);
        }

        Ok(overrides)
    }
}

fn parse_bool(var: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::configuration(format!(
            "{var} must be true or false, got '{value}'"
        ))),
    }
}
