//! Inline operation metadata embedded in playbook comments
//!
//! A playbook can declare operations next to the tasks they describe:
//!
//! ```yaml
//! # deltaplan: {name: restart_nginx, depends_on: [web_config], mutation: conditional}
//! - name: Restart nginx
//!   service: {name: nginx, state: restarted}
//! ```

use super::document::parse_record;
use crate::model::Operation;
use deltaplan_core::{constants::INLINE_METADATA_MARKER, Error, Result};
use serde_yaml::Value;

/// Extract every inline operation record from a playbook's text
pub fn extract_inline_records(source_name: &str, content: &str) -> Result<Vec<Operation>> {
    let mut operations = Vec::new();

    for (line_idx, line) in content.lines().enumerate() {
        let line = line.trim();
        let Some(metadata) = line.strip_prefix(INLINE_METADATA_MARKER) else {
            continue;
        };

        let location = format!("{source_name}:{}", line_idx + 1);
        let metadata = metadata.trim();
        if metadata.is_empty() {
            return Err(Error::parse(location, "inline metadata is empty"));
        }

        let value: Value = serde_yaml::from_str(metadata).map_err(|e| {
            let message = format!("invalid inline metadata: {e}");
            Error::parse_with_source(location.clone(), message, e)
        })?;

        if !value.is_mapping() {
            return Err(Error::parse(
                location,
                "inline metadata must be a mapping",
            ));
        }

        operations.push(parse_record(&location, None, &value)?);
    }

    Ok(operations)
}
