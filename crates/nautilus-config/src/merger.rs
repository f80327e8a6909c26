//! Configuration layering
//!
//! Documents are merged before deserialization so that a later file only
//! overrides what it actually sets:
//! - objects are merged key by key, recursively
//! - `extensions` lists are merged by `id`; unknown ids are appended
//! - any other value in a later document replaces the earlier one

use crate::error::{ConfigError, Result};
use serde_json::{Map, Value};

/// Merge parsed documents, later ones winning
pub fn merge_documents(documents: Vec<Value>) -> Result<Value> {
    let mut documents = documents.into_iter();
    let mut merged = documents.next().ok_or(ConfigError::Empty)?;

    for overlay in documents {
        merge_into(&mut merged, overlay);
    }

    Ok(merged)
}

fn merge_into(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => merge_objects(base, overlay),
        (base, overlay) => *base = overlay,
    }
}

fn merge_objects(base: &mut Map<String, Value>, overlay: Map<String, Value>) {
    for (key, value) in overlay {
        let Some(slot) = base.get_mut(&key) else {
            base.insert(key, value);
            continue;
        };

        match (slot, value) {
            (Value::Array(existing), Value::Array(incoming)) if key == "extensions" => {
                merge_extensions(existing, incoming);
            }
            (slot, value) => merge_into(slot, value),
        }
    }
}

fn merge_extensions(base: &mut Vec<Value>, overlay: Vec<Value>) {
    for entry in overlay {
        let id = entry.get("id").and_then(Value::as_str).map(str::to_string);
        let existing = id.as_deref().and_then(|id| {
            base.iter_mut()
                .find(|e| e.get("id").and_then(Value::as_str) == Some(id))
        });

        match existing {
            Some(slot) => merge_into(slot, entry),
            None => base.push(entry),
        }
    }
}
