//! Parsing of operation map documents
//!
//! A document is YAML holding either a bare list of operation records or a
//! mapping with an `operations` (or `tasks`) list. Each record is checked
//! field by field so shape errors name the offending field.

use crate::model::{Mutation, Operation};
use deltaplan_core::{Error, Result};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeSet;

const LIST_KEYS: &[&str] = &["operations", "tasks"];

/// Parse a whole document into validated operations
pub fn parse_document(source_name: &str, content: &str) -> Result<Vec<Operation>> {
    let value: Value = serde_yaml::from_str(content).map_err(|e| {
        let message = format!("invalid YAML: {e}");
        Error::parse_with_source(source_name, message, e)
    })?;

    let records = match value {
        Value::Sequence(records) => records,
        Value::Mapping(mut root) => {
            let key = LIST_KEYS
                .iter()
                .find(|key| root.contains_key(**key))
                .ok_or_else(|| {
                    Error::parse(
                        source_name,
                        "document must be a list of operations or contain an 'operations' list",
                    )
                })?;
            match root.remove(*key) {
                Some(Value::Sequence(records)) => records,
                Some(Value::Null) => Vec::new(),
                _ => {
                    return Err(Error::parse(
                        source_name,
                        format!("'{key}' must be a list of operations"),
                    ))
                }
            }
        }
        Value::Null => return Err(Error::parse(source_name, "document is empty")),
        _ => {
            return Err(Error::parse(
                source_name,
                "document must be a list of operations or contain an 'operations' list",
            ))
        }
    };

    records
        .iter()
        .enumerate()
        .map(|(index, record)| parse_record(source_name, Some(index), record))
        .collect()
}

/// Validate a single operation record
pub fn parse_record(source_name: &str, index: Option<usize>, record: &Value) -> Result<Operation> {
    let map = match record {
        Value::Mapping(map) => map,
        _ => {
            return Err(Error::malformed(
                source_name,
                index,
                None,
                "operation record must be a mapping",
            ))
        }
    };

    let name = match map.get("name") {
        Some(Value::String(name)) if !name.trim().is_empty() => name.clone(),
        Some(Value::String(_)) => {
            return Err(Error::malformed(source_name, index, None, "'name' must not be empty"))
        }
        Some(_) => {
            return Err(Error::malformed(source_name, index, None, "'name' must be a string"))
        }
        None => {
            return Err(Error::malformed(
                source_name,
                index,
                None,
                "missing required field 'name'",
            ))
        }
    };

    let malformed = |message: String| Error::malformed(source_name, index, Some(name.clone()), message);

    let description = match map.get("description") {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text.clone()),
        Some(_) => return Err(malformed("'description' must be a string".into())),
    };

    let mutation = match map.get("mutation") {
        None | Some(Value::Null) => Mutation::None,
        Some(Value::String(text)) => Mutation::parse(text).ok_or_else(|| {
            malformed(format!(
                "'mutation' must be one of none, always, conditional (got '{text}')"
            ))
        })?,
        Some(_) => return Err(malformed("'mutation' must be a string".into())),
    };

    let watch_files = string_list(map, "watch_files").map_err(malformed)?;

    Ok(Operation {
        name: name.clone(),
        description,
        provides: string_set(map, "provides").map_err(malformed)?,
        depends_on: string_set(map, "depends_on").map_err(malformed)?,
        triggers: string_set(map, "triggers").map_err(malformed)?,
        watch_files,
        requires_vars: string_set(map, "requires_vars").map_err(malformed)?,
        mutation,
    })
}

fn string_list(map: &Mapping, field: &str) -> std::result::Result<Vec<String>, String> {
    let items = match map.get(field) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Sequence(items)) => items,
        Some(_) => return Err(format!("'{field}' must be a list of strings")),
    };

    items
        .iter()
        .map(|item| match item {
            Value::String(s) => Ok(s.clone()),
            _ => Err(format!("all items in '{field}' must be strings")),
        })
        .collect()
}

fn string_set(map: &Mapping, field: &str) -> std::result::Result<BTreeSet<String>, String> {
    let items = string_list(map, field)?;
    if items.iter().any(|item| item.trim().is_empty()) {
        return Err(format!("'{field}' must not contain empty entries"));
    }
    Ok(items.into_iter().collect())
}
