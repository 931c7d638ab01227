//! Operation map loading
//!
//! [`MapLoader`] collects map documents, playbook directories carrying inline
//! metadata, and in-memory text, then merges them into one [`OperationMap`].
//! This module and [`crate::settings`] are the only places that read files.

use crate::model::{MapBuilder, OperationMap};
use crate::parser::{extract_inline_records, parse_document};
use crate::settings::EngineSettings;
use deltaplan_core::{
    constants::{MAP_FILENAMES, MAP_SEARCH_PARENT_LEVELS, MAP_SEARCH_SUBDIRS, PLAYBOOK_EXTENSIONS},
    Error, Result,
};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// How many map files [`discover_map_files`] returns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DiscoveryMode {
    /// Stop at the first map file found
    #[default]
    First,
    /// Every map file found, in search priority order
    All,
}

/// Search for operation map documents starting at `start`.
///
/// Each directory is checked directly and through the `ansible/` and
/// `playbooks/` subdirectories, walking up to three parents.
pub fn discover_map_files(start: &Path, mode: DiscoveryMode) -> Vec<PathBuf> {
    let mut found = Vec::new();

    for dir in start.ancestors().take(MAP_SEARCH_PARENT_LEVELS + 1) {
        let candidates = std::iter::once(dir.to_path_buf())
            .chain(MAP_SEARCH_SUBDIRS.iter().map(|sub| dir.join(sub)));

        for candidate_dir in candidates {
            for filename in MAP_FILENAMES {
                let path = candidate_dir.join(filename);
                if path.is_file() {
                    tracing::debug!(path = %path.display(), "found operation map");
                    if mode == DiscoveryMode::First {
                        return vec![path];
                    }
                    found.push(path);
                }
            }
        }
    }

    found
}

/// Read every inline operation record under `dir`, one source per playbook
pub fn load_inline_directory(dir: &Path) -> Result<MapBuilder> {
    let mut builder = MapBuilder::new();
    add_inline_directory(&mut builder, dir)?;
    Ok(builder)
}

fn add_inline_directory(builder: &mut MapBuilder, dir: &Path) -> Result<()> {
    let walker = WalkDir::new(dir).sort_by_file_name().follow_links(false);

    for entry in walker {
        let entry = entry.map_err(|e| walk_error(dir, e))?;

        if !entry.file_type().is_file() || !is_playbook(entry.path()) {
            continue;
        }

        let content = read_source(entry.path())?;
        let source_name = entry.path().display().to_string();
        let records = extract_inline_records(&source_name, &content)?;
        if !records.is_empty() {
            tracing::debug!(
                source = %source_name,
                count = records.len(),
                "loaded inline operations"
            );
        }
        builder.add_source(&source_name, records)?;
    }

    Ok(())
}

fn is_playbook(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| PLAYBOOK_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

pub(crate) fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| Error::file_system(path, "read", e))
}

pub(crate) fn walk_error(root: &Path, error: walkdir::Error) -> Error {
    let path = error.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
    let source = error
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
    Error::file_system(path, "walk", source)
}

#[derive(Debug, Clone)]
enum MapSource {
    File(PathBuf),
    InlineDirectory(PathBuf),
    Text { name: String, content: String },
}

/// Collects map sources and merges them into one [`OperationMap`]
#[derive(Debug, Clone, Default)]
pub struct MapLoader {
    sources: Vec<MapSource>,
}

impl MapLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sources selected by `settings` for the repository at `repo_root`.
    ///
    /// Explicit `map_paths` are used as given, relative ones resolved against
    /// `repo_root`. Without any, every discovered map file is loaded. Finding
    /// no map at all is a configuration error.
    pub fn from_settings(settings: &EngineSettings, repo_root: &Path) -> Result<Self> {
        if !settings.map_paths.is_empty() {
            let paths = settings.map_paths.iter().map(|path| {
                if path.is_absolute() {
                    path.clone()
                } else {
                    repo_root.join(path)
                }
            });
            return Ok(Self::new().files(paths));
        }

        let discovered = discover_map_files(repo_root, DiscoveryMode::All);
        if discovered.is_empty() {
            return Err(Error::configuration(format!(
                "no operation map found from '{}'; set map_paths or add one of {}",
                repo_root.display(),
                MAP_FILENAMES.join(", ")
            )));
        }
        tracing::debug!(count = discovered.len(), "using discovered operation maps");
        Ok(Self::new().files(discovered))
    }

    /// Add a map document
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(MapSource::File(path.into()));
        self
    }

    /// Add several map documents
    pub fn files<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.sources
            .extend(paths.into_iter().map(|p| MapSource::File(p.into())));
        self
    }

    /// Add a directory of playbooks carrying inline metadata
    pub fn inline_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sources.push(MapSource::InlineDirectory(dir.into()));
        self
    }

    /// Add an in-memory map document
    pub fn text(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.sources.push(MapSource::Text {
            name: name.into(),
            content: content.into(),
        });
        self
    }

    /// Number of registered sources
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Parse every source and merge them
    pub fn load(self) -> Result<OperationMap> {
        let mut builder = MapBuilder::new();

        for source in self.sources {
            match source {
                MapSource::File(path) => {
                    let content = read_source(&path)?;
                    let name = path.display().to_string();
                    builder.add_source(&name, parse_document(&name, &content)?)?;
                }
                MapSource::InlineDirectory(dir) => add_inline_directory(&mut builder, &dir)?,
                MapSource::Text { name, content } => {
                    builder.add_source(&name, parse_document(&name, &content)?)?;
                }
            }
        }

        let map = builder.build();
        tracing::info!(
            operations = map.len(),
            fingerprint = %map.fingerprint().short(),
            "operation map loaded"
        );
        for warning in map.lint() {
            tracing::warn!("{warning}");
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const NGINX_MAP: &str = r#"
- name: generate_nginx_conf
  provides: [web_config]
  watch_files: [templates/nginx.conf.j2]
  triggers: [restart_nginx]
- name: restart_nginx
  depends_on: [web_config]
"#;

    #[test]
    fn test_discovery_prefers_start_directory() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("ansible")).unwrap();
        fs::write(temp.path().join("operation_map.yml"), NGINX_MAP).unwrap();
        fs::write(temp.path().join("ansible/operation_map.yaml"), NGINX_MAP).unwrap();

        let first = discover_map_files(temp.path(), DiscoveryMode::First);
        assert_eq!(first, vec![temp.path().join("operation_map.yml")]);

        let all = discover_map_files(temp.path(), DiscoveryMode::All);
        assert_eq!(
            all,
            vec![
                temp.path().join("operation_map.yml"),
                temp.path().join("ansible/operation_map.yaml"),
            ]
        );
    }

    #[test]
    fn test_discovery_walks_parents() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("roles/web/tasks");
        fs::create_dir_all(&nested).unwrap();
        fs::create_dir_all(temp.path().join("playbooks")).unwrap();
        fs::write(temp.path().join("playbooks/operation_map.yml"), NGINX_MAP).unwrap();

        let found = discover_map_files(&nested, DiscoveryMode::First);
        assert_eq!(found, vec![temp.path().join("playbooks/operation_map.yml")]);
    }

    #[test]
    fn test_load_merges_file_and_text_sources() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("operation_map.yml");
        fs::write(&path, NGINX_MAP).unwrap();

        let map = MapLoader::new()
            .file(&path)
            .text("extra", "- name: deploy_app\n  depends_on: [web_config]\n")
            .load()
            .unwrap();

        assert_eq!(map.len(), 3);
        assert_eq!(map.origin_of("deploy_app"), Some("extra"));
        assert_eq!(map.providers_of("web_config").map(|p| p.len()), Some(1));
    }

    #[test]
    fn test_load_inline_directory_sorted_and_merged() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("roles/web")).unwrap();
        fs::write(
            temp.path().join("site.yml"),
            "# deltaplan: {name: generate_nginx_conf, provides: [web_config]}\n- hosts: web\n",
        )
        .unwrap();
        fs::write(
            temp.path().join("roles/web/main.yaml"),
            "# deltaplan: {name: restart_nginx, depends_on: [web_config]}\n",
        )
        .unwrap();
        fs::write(temp.path().join("README.md"), "# deltaplan: not yaml [\n").unwrap();

        let map = load_inline_directory(temp.path()).unwrap().build();
        assert_eq!(map.names().collect::<Vec<_>>(), vec!["generate_nginx_conf", "restart_nginx"]);
    }

    #[test]
    fn test_conflicting_sources_fail() {
        let err = MapLoader::new()
            .text("a.yml", "- name: x\n  provides: [l]\n")
            .text("b.yml", "- name: x\n  provides: [m]\n")
            .load()
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateOperation { .. }));
    }

    #[test]
    fn test_missing_file_is_file_system_error() {
        let err = MapLoader::new()
            .file("/definitely/not/here/operation_map.yml")
            .load()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::FileSystem { ref path, ref operation, .. }
                if path == Path::new("/definitely/not/here/operation_map.yml") && operation == "read"
        ));
    }

    #[test]
    fn test_from_settings_uses_explicit_map_paths() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("deploy")).unwrap();
        fs::write(temp.path().join("deploy/ops.yml"), NGINX_MAP).unwrap();
        // Ignored because an explicit path is configured.
        fs::write(temp.path().join("operation_map.yml"), "- name: other\n").unwrap();

        let settings = EngineSettings {
            map_paths: vec![PathBuf::from("deploy/ops.yml")],
            ..EngineSettings::default()
        };
        let loader = MapLoader::from_settings(&settings, temp.path()).unwrap();
        assert_eq!(loader.source_count(), 1);

        let map = loader.load().unwrap();
        assert!(map.contains("restart_nginx"));
        assert!(!map.contains("other"));
    }

    #[test]
    fn test_from_settings_discovers_every_map() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("playbooks")).unwrap();
        fs::write(temp.path().join("operation_map.yml"), NGINX_MAP).unwrap();
        fs::write(
            temp.path().join("playbooks/operation_map.yaml"),
            "- name: deploy_app\n  depends_on: [web_config]\n",
        )
        .unwrap();

        let map = MapLoader::from_settings(&EngineSettings::default(), temp.path())
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_from_settings_without_any_map_is_an_error() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("a/b/c/d");
        fs::create_dir_all(&nested).unwrap();

        let err = MapLoader::from_settings(&EngineSettings::default(), &nested).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_no_sources_gives_empty_map() {
        let loader = MapLoader::new();
        assert_eq!(loader.source_count(), 0);
        assert!(loader.load().unwrap().is_empty());
    }
}
