//! Operation map model, loading and engine settings for deltaplan
//!
//! This crate owns everything that turns files on disk into the inputs of
//! planning: the merged [`OperationMap`], inventory variables and
//! [`EngineSettings`].

pub mod inventory;
pub mod loader;
pub mod model;
pub mod parser;
pub mod settings;

pub use inventory::{
    discover_vars_directories, load_inventory_variables, load_vars_directory, load_vars_file,
    parse_ini_inventory_variables, parse_inventory_variables, InventoryLoader, VarsKind,
};
pub use loader::{discover_map_files, load_inline_directory, DiscoveryMode, MapLoader};
pub use model::{MapBuilder, MapFingerprint, Mutation, Operation, OperationMap};
pub use parser::{extract_inline_records, parse_document};
pub use settings::{
    default_sentinel_paths, ConfigSource, EngineSettings, SettingsLoader, SettingsOverrides,
};
