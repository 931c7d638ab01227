//! Inventory variable loading
//!
//! Variables are layered from an inventory file, then `group_vars/`, then
//! `host_vars/`; a later layer overrides an earlier one. Inventories may be
//! YAML (groups with `vars` and `children`) or INI (`[group:vars]` sections).
//! The result is one flat set: per-host scoping is left to the executor.

use crate::loader::{read_source, walk_error};
use deltaplan_core::{
    constants::{ALL_GROUP, GROUP_VARS_DIR, HOST_VARS_DIR, INVENTORIES_DIR, VARS_FILE_EXTENSIONS},
    AvailableVariables, Error, Result,
};
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Which per-target variable directory to look for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarsKind {
    Group,
    Host,
}

impl VarsKind {
    pub fn dir_name(self) -> &'static str {
        match self {
            VarsKind::Group => GROUP_VARS_DIR,
            VarsKind::Host => HOST_VARS_DIR,
        }
    }
}

/// Read the variables of an inventory file.
///
/// `.yml`/`.yaml` files are read as YAML inventories, anything else as INI.
pub fn load_inventory_variables(path: &Path) -> Result<AvailableVariables> {
    let content = read_source(path)?;
    let source_name = path.display().to_string();
    if has_vars_extension(path) {
        parse_inventory_variables(&source_name, &content)
    } else {
        parse_ini_inventory_variables(&source_name, &content)
    }
}

/// Parse a YAML inventory.
///
/// `all` is read first, then every other top-level group in document order.
/// A group's `children` are read after its own `vars`, so nested groups win.
pub fn parse_inventory_variables(source_name: &str, content: &str) -> Result<AvailableVariables> {
    let mut available = AvailableVariables::new();
    let Value::Mapping(groups) = parse_yaml(source_name, content)? else {
        return Ok(available);
    };

    if let Some(all) = groups.get(ALL_GROUP) {
        collect_group(source_name, ALL_GROUP, all, &mut available)?;
    }
    for (name, group) in &groups {
        let name = group_name(source_name, name, "top level")?;
        if name != ALL_GROUP {
            collect_group(source_name, name, group, &mut available)?;
        }
    }

    tracing::debug!(source = %source_name, count = available.len(), "loaded inventory variables");
    Ok(available)
}

fn collect_group(
    source_name: &str,
    path: &str,
    group: &Value,
    out: &mut AvailableVariables,
) -> Result<()> {
    match group.get("vars") {
        None | Some(Value::Null) => {}
        Some(Value::Mapping(vars)) => merge_mapping(source_name, vars, out)?,
        Some(_) => return Err(Error::parse(source_name, format!("'{path}.vars' must be a mapping"))),
    }

    match group.get("children") {
        None | Some(Value::Null) => {}
        Some(Value::Mapping(children)) => {
            for (name, child) in children {
                let name = group_name(source_name, name, path)?;
                collect_group(source_name, &format!("{path}.children.{name}"), child, out)?;
            }
        }
        Some(_) => {
            return Err(Error::parse(
                source_name,
                format!("'{path}.children' must be a mapping"),
            ))
        }
    }

    Ok(())
}

fn group_name<'a>(source_name: &str, key: &'a Value, parent: &str) -> Result<&'a str> {
    key.as_str().ok_or_else(|| {
        Error::parse(source_name, format!("group names under {parent} must be strings"))
    })
}

/// Parse the `[group:vars]` sections of an INI inventory.
///
/// `[all:vars]` is read first, then the remaining sections in file order.
/// Host lines and `:children` sections are skipped. Values are typed like
/// YAML scalars, so `port=80` is a number and `debug=true` a boolean.
pub fn parse_ini_inventory_variables(
    source_name: &str,
    content: &str,
) -> Result<AvailableVariables> {
    let mut sections: Vec<(String, Vec<(String, serde_json::Value)>)> = Vec::new();
    let mut current: Option<usize> = None;

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        let location = || format!("{source_name}:{}", idx + 1);

        if let Some(header) = line.strip_prefix('[') {
            let header = header
                .strip_suffix(']')
                .ok_or_else(|| Error::parse(location(), "unterminated section header"))?
                .trim();
            current = header.strip_suffix(":vars").map(|group| {
                sections.push((group.trim().to_string(), Vec::new()));
                sections.len() - 1
            });
            continue;
        }

        let Some(section) = current else {
            continue;
        };
        let (name, value) = line
            .split_once('=')
            .ok_or_else(|| Error::parse(location(), "expected 'name=value'"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::parse(location(), "variable name is empty"));
        }
        sections[section]
            .1
            .push((name.to_string(), ini_value(value.trim())));
    }

    // Stable, so the other sections keep their file order.
    sections.sort_by_key(|(group, _)| group != ALL_GROUP);

    let mut available = AvailableVariables::new();
    for (name, value) in sections.into_iter().flat_map(|(_, vars)| vars) {
        available.insert(name, value);
    }
    Ok(available)
}

fn ini_value(raw: &str) -> serde_json::Value {
    if raw.is_empty() {
        return serde_json::Value::String(String::new());
    }
    match serde_yaml::from_str::<Value>(raw) {
        Ok(value @ (Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_))) => {
            serde_json::to_value(value).unwrap_or_else(|_| raw.into())
        }
        _ => raw.into(),
    }
}

/// Read one variables file: the keys of its top-level mapping.
///
/// Files that are not a mapping, such as vault-encrypted ones, contribute
/// nothing.
pub fn load_vars_file(path: &Path) -> Result<AvailableVariables> {
    let source_name = path.display().to_string();
    let mut available = AvailableVariables::new();

    match parse_yaml(&source_name, &read_source(path)?)? {
        Value::Mapping(vars) => merge_mapping(&source_name, &vars, &mut available)?,
        Value::Null => {}
        _ => tracing::warn!(source = %source_name, "variables file is not a mapping; skipped"),
    }
    Ok(available)
}

/// Read a `group_vars` or `host_vars` location.
///
/// A file is read directly. A directory contributes `<name>.yml` files and
/// `<name>/` directories of YAML files, in name order with `all` first.
pub fn load_vars_directory(path: &Path) -> Result<AvailableVariables> {
    if path.is_file() {
        return load_vars_file(path);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).min_depth(1).max_depth(2).sort_by_file_name() {
        let entry = entry.map_err(|e| walk_error(path, e))?;
        if entry.file_type().is_file() && has_vars_extension(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files.sort_by_key(|file| !is_all_group(path, file));

    let mut available = AvailableVariables::new();
    for file in &files {
        available.merge(load_vars_file(file)?);
    }
    tracing::debug!(
        location = %path.display(),
        files = files.len(),
        count = available.len(),
        "loaded variables directory"
    );
    Ok(available)
}

fn is_all_group(root: &Path, file: &Path) -> bool {
    file.strip_prefix(root)
        .ok()
        .and_then(|relative| relative.components().next())
        .and_then(|first| Path::new(first.as_os_str()).file_stem())
        .is_some_and(|stem| stem == ALL_GROUP)
}

/// Existing `group_vars`/`host_vars` directories, lowest precedence first.
///
/// The repository root is always searched. With an inventory, the
/// directories next to it and next to its parent follow; without one,
/// `inventories/` and each `inventories/<name>/` are searched instead.
pub fn discover_vars_directories(
    repo_root: &Path,
    inventory: Option<&Path>,
    kind: VarsKind,
) -> Vec<PathBuf> {
    let name = kind.dir_name();
    let mut candidates = vec![repo_root.join(name)];

    match inventory.and_then(Path::parent) {
        Some(dir) => {
            let dir = if dir.is_absolute() {
                dir.to_path_buf()
            } else {
                repo_root.join(dir)
            };
            if let Some(parent) = dir.parent() {
                candidates.push(parent.join(name));
            }
            candidates.push(dir.join(name));
        }
        None => {
            let inventories = repo_root.join(INVENTORIES_DIR);
            candidates.push(inventories.join(name));
            candidates.extend(
                WalkDir::new(&inventories)
                    .min_depth(1)
                    .max_depth(1)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| entry.file_type().is_dir())
                    .map(|entry| entry.path().join(name)),
            );
        }
    }

    let mut found: Vec<PathBuf> = Vec::new();
    for candidate in candidates {
        if candidate.is_dir() && !found.contains(&candidate) {
            found.push(candidate);
        }
    }
    found
}

/// Collects an inventory and variable directories into one variable set
#[derive(Debug, Clone, Default)]
pub struct InventoryLoader {
    inventory: Option<PathBuf>,
    group_vars: Vec<PathBuf>,
    host_vars: Vec<PathBuf>,
    discover_root: Option<PathBuf>,
}

impl InventoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an inventory file
    pub fn inventory(mut self, path: impl Into<PathBuf>) -> Self {
        self.inventory = Some(path.into());
        self
    }

    /// Add a `group_vars` file or directory
    pub fn group_vars(mut self, path: impl Into<PathBuf>) -> Self {
        self.group_vars.push(path.into());
        self
    }

    /// Add a `host_vars` file or directory
    pub fn host_vars(mut self, path: impl Into<PathBuf>) -> Self {
        self.host_vars.push(path.into());
        self
    }

    /// Also search `repo_root` for variable directories.
    ///
    /// Discovered directories rank below explicitly added ones.
    pub fn discover(mut self, repo_root: impl Into<PathBuf>) -> Self {
        self.discover_root = Some(repo_root.into());
        self
    }

    /// Read every source, later layers overriding earlier ones
    pub fn load(&self) -> Result<AvailableVariables> {
        let mut available = AvailableVariables::new();

        if let Some(inventory) = &self.inventory {
            available.merge(load_inventory_variables(inventory)?);
        }
        for kind in [VarsKind::Group, VarsKind::Host] {
            for location in self.locations(kind) {
                available.merge(load_vars_directory(&location)?);
            }
        }

        tracing::info!(count = available.len(), "inventory variables loaded");
        Ok(available)
    }

    fn locations(&self, kind: VarsKind) -> Vec<PathBuf> {
        let mut locations = match &self.discover_root {
            Some(root) => discover_vars_directories(root, self.inventory.as_deref(), kind),
            None => Vec::new(),
        };
        let explicit = match kind {
            VarsKind::Group => &self.group_vars,
            VarsKind::Host => &self.host_vars,
        };
        for path in explicit {
            locations.retain(|existing| existing != path);
            locations.push(path.clone());
        }
        locations
    }
}

fn parse_yaml(source_name: &str, content: &str) -> Result<Value> {
    serde_yaml::from_str(content).map_err(|e| {
        let message = format!("invalid YAML: {e}");
        Error::parse_with_source(source_name, message, e)
    })
}

fn merge_mapping(source_name: &str, vars: &Mapping, out: &mut AvailableVariables) -> Result<()> {
    for (key, value) in vars {
        let Some(name) = key.as_str() else {
            return Err(Error::parse(source_name, "variable names must be strings"));
        };
        let value = serde_json::to_value(value).map_err(|e| {
            Error::parse_with_source(
                source_name,
                format!("variable '{name}' cannot be represented as JSON"),
                e,
            )
        })?;
        out.insert(name, value);
    }
    Ok(())
}

fn has_vars_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| VARS_FILE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}
