//! Interfaces to the systems around the planner

use deltaplan_config::InventoryLoader;
use deltaplan_core::{AvailableVariables, Result};

/// Reports which files changed between two revisions
pub trait ChangeSource {
    /// Repository-relative paths changed between `from` and `to`
    fn changed_files(&self, from: &str, to: &str) -> Result<Vec<String>>;
}

/// Supplies the variables available to planned operations
pub trait VariableSource {
    fn variables(&self) -> Result<AvailableVariables>;
}

impl VariableSource for AvailableVariables {
    fn variables(&self) -> Result<AvailableVariables> {
        Ok(self.clone())
    }
}

impl VariableSource for InventoryLoader {
    fn variables(&self) -> Result<AvailableVariables> {
        self.load()
    }
}

/// A fixed change set, independent of the revisions asked for
#[derive(Debug, Clone, Default)]
pub struct StaticChanges(pub Vec<String>);

impl ChangeSource for StaticChanges {
    fn changed_files(&self, _from: &str, _to: &str) -> Result<Vec<String>> {
        Ok(self.0.clone())
    }
}
