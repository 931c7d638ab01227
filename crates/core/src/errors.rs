use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Result type alias for deltaplan operations
pub type Result<T> = std::result::Result<T, Error>;

/// The variables one operation needs but the variable source does not define
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmetRequirement {
    /// Operation whose requirements are not satisfied
    pub operation: String,
    /// Missing variable names, sorted
    pub variables: Vec<String>,
}

impl fmt::Display for UnmetRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' needs {}", self.operation, self.variables.join(", "))
    }
}

/// Core error type for deltaplan operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An operation record is missing a required field or has a field of the wrong shape
    #[error("malformed operation {}in '{source_name}': {message}", format_record(.index, .operation))]
    MalformedOperation {
        source_name: String,
        index: Option<usize>,
        operation: Option<String>,
        message: String,
    },

    /// The same operation name was declared twice with different definitions
    #[error("operation '{name}' is declared in '{first_source}' and again with a different definition in '{second_source}'")]
    DuplicateOperation {
        name: String,
        first_source: String,
        second_source: String,
    },

    /// A `depends_on` label that no operation provides
    #[error("operation '{operation}' depends on '{label}' but no operation provides it")]
    DanglingDependency { operation: String, label: String },

    /// A `triggers` entry naming an operation that does not exist
    #[error("operation '{operation}' triggers '{target}' but that operation does not exist")]
    DanglingTrigger { operation: String, target: String },

    /// The ordering constraints between operations form a cycle
    #[error("circular ordering detected: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    /// Required variables are not defined for one or more planned operations
    #[error("missing required variables: {}", format_unmet(.unmet))]
    MissingVariables { unmet: Vec<UnmetRequirement> },

    /// An operation name that is not part of the map
    #[error("operation '{name}' is not defined in the operation map")]
    UnknownOperation { name: String },

    /// A watch pattern that cannot be compiled
    #[error("operation '{operation}' has an invalid watch pattern '{pattern}': {message}")]
    InvalidPattern {
        operation: String,
        pattern: String,
        message: String,
    },

    /// A source document could not be parsed at all
    #[error("failed to parse '{source_name}': {message}")]
    Parse {
        source_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// File system operations
    #[error("file system {operation} operation failed for '{path}': {source}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration errors
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

fn format_record(index: &Option<usize>, operation: &Option<String>) -> String {
    match (index, operation) {
        (Some(index), Some(name)) => format!("'{name}' (record {index}) "),
        (Some(index), None) => format!("at record {index} "),
        (None, Some(name)) => format!("'{name}' "),
        (None, None) => String::new(),
    }
}

fn format_unmet(unmet: &[UnmetRequirement]) -> String {
    unmet
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// Helper methods for creating errors with context
impl Error {
    /// Create a malformed operation error
    #[must_use]
    pub fn malformed(
        source_name: impl Into<String>,
        index: Option<usize>,
        operation: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::MalformedOperation {
            source_name: source_name.into(),
            index,
            operation,
            message: message.into(),
        }
    }

    /// Create a duplicate operation error
    #[must_use]
    pub fn duplicate_operation(
        name: impl Into<String>,
        first_source: impl Into<String>,
        second_source: impl Into<String>,
    ) -> Self {
        Error::DuplicateOperation {
            name: name.into(),
            first_source: first_source.into(),
            second_source: second_source.into(),
        }
    }

    /// Create a dangling dependency error
    #[must_use]
    pub fn dangling_dependency(operation: impl Into<String>, label: impl Into<String>) -> Self {
        Error::DanglingDependency {
            operation: operation.into(),
            label: label.into(),
        }
    }

    /// Create a dangling trigger error
    #[must_use]
    pub fn dangling_trigger(operation: impl Into<String>, target: impl Into<String>) -> Self {
        Error::DanglingTrigger {
            operation: operation.into(),
            target: target.into(),
        }
    }

    /// Create a cycle error from the ordered members of the cycle
    #[must_use]
    pub fn cycle(path: Vec<String>) -> Self {
        Error::Cycle { path }
    }

    /// Create an unknown operation error
    #[must_use]
    pub fn unknown_operation(name: impl Into<String>) -> Self {
        Error::UnknownOperation { name: name.into() }
    }

    /// Create an invalid watch pattern error
    #[must_use]
    pub fn invalid_pattern(
        operation: impl Into<String>,
        pattern: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::InvalidPattern {
            operation: operation.into(),
            pattern: pattern.into(),
            message: message.into(),
        }
    }

    /// Create a parse error
    #[must_use]
    pub fn parse(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Parse {
            source_name: source_name.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a parse error with a source error
    #[must_use]
    pub fn parse_with_source(
        source_name: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Error::Parse {
            source_name: source_name.into(),
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a file system error with context
    #[must_use]
    pub fn file_system(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Error::FileSystem {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    /// Whether the error describes a broken operation map.
    ///
    /// Structural errors block every kind of resolution. `MissingVariables`
    /// only blocks execution; analysis callers may still show the plan.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::MalformedOperation { .. }
                | Error::DuplicateOperation { .. }
                | Error::DanglingDependency { .. }
                | Error::DanglingTrigger { .. }
                | Error::Cycle { .. }
                | Error::InvalidPattern { .. }
        )
    }

    /// Members of the cycle, if this is a cycle error
    #[must_use]
    pub fn cycle_path(&self) -> Option<&[String]> {
        match self {
            Error::Cycle { path } => Some(path),
            _ => None,
        }
    }

    /// Unmet variable requirements, if this is a missing variables error
    #[must_use]
    pub fn unmet_requirements(&self) -> Option<&[UnmetRequirement]> {
        match self {
            Error::MissingVariables { unmet } => Some(unmet),
            _ => None,
        }
    }
}
