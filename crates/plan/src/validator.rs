//! Required variable checks for a plan

use crate::resolver::ExecutionPlan;
use deltaplan_core::{AvailableVariables, Error, Result, UnmetRequirement};
use serde::Serialize;

/// Outcome of checking a plan's required variables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    unmet: Vec<UnmetRequirement>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.unmet.is_empty()
    }

    /// Failing operations in plan order, each with its sorted missing variables
    pub fn unmet(&self) -> &[UnmetRequirement] {
        &self.unmet
    }

    /// Flat `(operation, variable)` pairs
    pub fn pairs(&self) -> Vec<(&str, &str)> {
        self.unmet
            .iter()
            .flat_map(|req| {
                req.variables
                    .iter()
                    .map(move |var| (req.operation.as_str(), var.as_str()))
            })
            .collect()
    }

    /// `MissingVariables` carrying every failure, if there is any
    pub fn into_result(self) -> Result<()> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(Error::MissingVariables { unmet: self.unmet })
        }
    }
}

/// Check every planned operation against `variables`.
///
/// All failures are collected before returning. Null values count as missing.
pub fn validate(plan: &ExecutionPlan, variables: &AvailableVariables) -> ValidationReport {
    let unmet: Vec<UnmetRequirement> = plan
        .operations()
        .filter_map(|op| {
            let missing: Vec<String> = op
                .requires_vars
                .iter()
                .filter(|var| !variables.is_defined(var))
                .cloned()
                .collect();
            (!missing.is_empty()).then(|| UnmetRequirement {
                operation: op.name.clone(),
                variables: missing,
            })
        })
        .collect();

    if !unmet.is_empty() {
        tracing::debug!(failing = unmet.len(), "plan has unmet variable requirements");
    }

    ValidationReport { unmet }
}
