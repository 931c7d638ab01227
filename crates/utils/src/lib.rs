//! Shared utilities and pure functions for deltaplan
//!
//! Logging setup and file classification helpers used by the planning crates.

pub mod files;
pub mod tracing;

pub use files::*;
