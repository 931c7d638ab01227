//! Operation map model
//!
//! An [`OperationMap`] is the merged, immutable view of every operation
//! declared across all map sources, plus the label → providers index that the
//! graph builder resolves `depends_on` references through.

use deltaplan_core::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// How an operation affects the managed hosts, as far as fast-tracking cares
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mutation {
    /// No declared state mutation
    #[default]
    None,
    /// Mutates state and must always run when selected
    Always,
    /// Mutates state, but is only needed when more than inert configuration changed
    Conditional,
}

impl Mutation {
    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(Mutation::None),
            "always" => Some(Mutation::Always),
            "conditional" => Some(Mutation::Conditional),
            _ => None,
        }
    }
}

/// A named unit of deployable work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Resource labels this operation provides
    #[serde(default)]
    pub provides: BTreeSet<String>,
    /// Resource labels this operation needs before it can run
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
    /// Operation names scheduled after this one completes
    #[serde(default)]
    pub triggers: BTreeSet<String>,
    /// Exact paths or globs, in declared order
    #[serde(default)]
    pub watch_files: Vec<String>,
    #[serde(default)]
    pub requires_vars: BTreeSet<String>,
    #[serde(default)]
    pub mutation: Mutation,
}

impl Operation {
    /// Create an operation with no relations
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            provides: BTreeSet::new(),
            depends_on: BTreeSet::new(),
            triggers: BTreeSet::new(),
            watch_files: Vec::new(),
            requires_vars: BTreeSet::new(),
            mutation: Mutation::None,
        }
    }

    pub fn with_provides<I: IntoIterator<Item = S>, S: Into<String>>(mut self, labels: I) -> Self {
        self.provides.extend(labels.into_iter().map(Into::into));
        self
    }

    pub fn with_depends_on<I: IntoIterator<Item = S>, S: Into<String>>(mut self, labels: I) -> Self {
        self.depends_on.extend(labels.into_iter().map(Into::into));
        self
    }

    pub fn with_triggers<I: IntoIterator<Item = S>, S: Into<String>>(mut self, names: I) -> Self {
        self.triggers.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_watch_files<I: IntoIterator<Item = S>, S: Into<String>>(mut self, patterns: I) -> Self {
        self.watch_files.extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn with_requires_vars<I: IntoIterator<Item = S>, S: Into<String>>(mut self, vars: I) -> Self {
        self.requires_vars.extend(vars.into_iter().map(Into::into));
        self
    }

    pub fn with_mutation(mut self, mutation: Mutation) -> Self {
        self.mutation = mutation;
        self
    }
}

/// Content hash of an operation map, independent of source order
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MapFingerprint(String);

impl MapFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First twelve hex characters, for log lines
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for MapFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The merged operation map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationMap {
    operations: BTreeMap<String, Operation>,
    providers: BTreeMap<String, BTreeSet<String>>,
    origins: BTreeMap<String, String>,
    fingerprint: MapFingerprint,
}

impl OperationMap {
    /// Create a new map builder
    pub fn builder() -> MapBuilder {
        MapBuilder::new()
    }

    /// A map with no operations
    pub fn empty() -> Self {
        MapBuilder::new().build()
    }

    /// Look up an operation by name
    pub fn get(&self, name: &str) -> Option<&Operation> {
        self.operations.get(name)
    }

    /// Look up an operation by name, failing with `UnknownOperation`
    pub fn require(&self, name: &str) -> Result<&Operation> {
        self.get(name).ok_or_else(|| Error::unknown_operation(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    /// Operations in ascending name order
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.operations.values()
    }

    /// Operation names in ascending order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Operations providing `label`; empty if nothing provides it
    pub fn providers_of(&self, label: &str) -> Option<&BTreeSet<String>> {
        self.providers.get(label)
    }

    /// The full label → providers index
    pub fn label_index(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.providers
    }

    /// Name of the source that first declared `name`
    pub fn origin_of(&self, name: &str) -> Option<&str> {
        self.origins.get(name).map(String::as_str)
    }

    pub fn fingerprint(&self) -> &MapFingerprint {
        &self.fingerprint
    }

    /// Non-fatal findings about the map
    pub fn lint(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let triggered: BTreeSet<&str> = self
            .operations
            .values()
            .flat_map(|op| op.triggers.iter().map(String::as_str))
            .collect();
        let depended: BTreeSet<&str> = self
            .operations
            .values()
            .flat_map(|op| op.depends_on.iter().map(String::as_str))
            .collect();

        for op in self.operations.values() {
            if op.watch_files.iter().any(|p| p.trim().is_empty()) {
                warnings.push(format!("operation '{}' has an empty watch_files pattern", op.name));
            }

            let reachable = !op.watch_files.is_empty()
                || triggered.contains(op.name.as_str())
                || op.provides.iter().any(|label| depended.contains(label.as_str()));
            if !reachable {
                warnings.push(format!(
                    "operation '{}' watches no files, is never triggered and provides nothing that is depended on; only a full deploy selects it",
                    op.name
                ));
            }
        }

        warnings
    }
}

/// Builder merging operations from several sources into one [`OperationMap`]
#[derive(Debug, Default)]
pub struct MapBuilder {
    operations: BTreeMap<String, Operation>,
    origins: BTreeMap<String, String>,
}

impl MapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one operation declared in `source_name`.
    ///
    /// Re-declaring an identical operation is a no-op; a different definition
    /// under the same name is a `DuplicateOperation` error.
    pub fn add(&mut self, source_name: &str, operation: Operation) -> Result<()> {
        if let Some(existing) = self.operations.get(&operation.name) {
            if *existing == operation {
                tracing::debug!(
                    operation = %operation.name,
                    source = %source_name,
                    "identical re-declaration ignored"
                );
                return Ok(());
            }
            let first = self
                .origins
                .get(&operation.name)
                .cloned()
                .unwrap_or_default();
            return Err(Error::duplicate_operation(&operation.name, first, source_name));
        }

        self.origins
            .insert(operation.name.clone(), source_name.to_string());
        self.operations.insert(operation.name.clone(), operation);
        Ok(())
    }

    /// Add every operation from one source
    pub fn add_source<I>(&mut self, source_name: &str, operations: I) -> Result<()>
    where
        I: IntoIterator<Item = Operation>,
    {
        for operation in operations {
            self.add(source_name, operation)?;
        }
        Ok(())
    }

    /// Builder-style variant of [`MapBuilder::add`]
    pub fn with(mut self, source_name: &str, operation: Operation) -> Result<Self> {
        self.add(source_name, operation)?;
        Ok(self)
    }

    /// Freeze the map, building the label index and fingerprint
    pub fn build(self) -> OperationMap {
        let mut providers: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for op in self.operations.values() {
            for label in &op.provides {
                providers
                    .entry(label.clone())
                    .or_default()
                    .insert(op.name.clone());
            }
        }

        let fingerprint = fingerprint_operations(&self.operations);

        OperationMap {
            operations: self.operations,
            providers,
            origins: self.origins,
            fingerprint,
        }
    }
}

fn fingerprint_operations(operations: &BTreeMap<String, Operation>) -> MapFingerprint {
    let mut hasher = Sha256::new();
    for op in operations.values() {
        // Serializing plain strings, sets and enums cannot fail.
        let encoded = serde_json::to_vec(op).unwrap_or_default();
        hasher.update((encoded.len() as u64).to_le_bytes());
        hasher.update(&encoded);
    }
    MapFingerprint(hex::encode(hasher.finalize()))
}
