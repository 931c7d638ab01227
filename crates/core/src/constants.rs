/// Constants used throughout the deltaplan codebase
// Operation map discovery
pub const MAP_FILENAMES: &[&str] = &["operation_map.yml", "operation_map.yaml"];
pub const MAP_SEARCH_SUBDIRS: &[&str] = &["ansible", "playbooks"];
pub const MAP_SEARCH_PARENT_LEVELS: usize = 3;

// Inline metadata marker inside playbook comments
pub const INLINE_METADATA_MARKER: &str = "# deltaplan:";
pub const PLAYBOOK_EXTENSIONS: &[&str] = &["yml", "yaml"];

// Inventory variable layout
pub const GROUP_VARS_DIR: &str = "group_vars";
pub const HOST_VARS_DIR: &str = "host_vars";
pub const INVENTORIES_DIR: &str = "inventories";
pub const VARS_FILE_EXTENSIONS: &[&str] = &["yml", "yaml"];
pub const ALL_GROUP: &str = "all";

// Settings
pub const SETTINGS_FILENAME: &str = ".deltaplan.json";
pub const SETTINGS_DIR_NAME: &str = "deltaplan";
pub const SETTINGS_GLOBAL_FILENAME: &str = "config.json";

// Environment variable names
pub const DELTAPLAN_LOG_VAR: &str = "DELTAPLAN_LOG";
pub const DELTAPLAN_MAP_VAR: &str = "DELTAPLAN_MAP";
pub const DELTAPLAN_FAST_TRACK_VAR: &str = "DELTAPLAN_FAST_TRACK";
pub const DELTAPLAN_CONFIG_EXTENSIONS_VAR: &str = "DELTAPLAN_CONFIG_EXTENSIONS";
pub const DELTAPLAN_GRAPH_CACHE_ENTRIES_VAR: &str = "DELTAPLAN_GRAPH_CACHE_ENTRIES";

// Extensions treated as inert configuration by the fast-track classifier
pub const DEFAULT_CONFIG_EXTENSIONS: &[&str] = &[
    "yml", "yaml", "json", "toml", "ini", "conf", "cfg", "cnf", "j2", "jinja", "jinja2",
    "properties", "env", "xml", "tmpl",
];

pub const DEFAULT_GRAPH_CACHE_ENTRIES: usize = 16;
