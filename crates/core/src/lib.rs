//! Core domain types, errors, and constants for `deltaplan`.
//!
//! - **`errors`**: the `Error` enum and `Result` alias. Every structural problem
//!   in an operation map has its own variant carrying the names a caller needs
//!   to render an actionable message.
//! - **`types`**: the validated `RepoPath` newtype and the
//!   `AvailableVariables` mapping consumed by variable validation.
//! - **`constants`**: file names, environment variable names and defaults.

pub mod constants;
pub mod errors;
pub mod types;

pub use self::{
    constants::*,
    errors::{Error, Result, UnmetRequirement},
    types::*,
};
