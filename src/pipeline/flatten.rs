use serde_json::{Map, Value};

use crate::record::{Record, RecordValue};

/// Top-level column holding bounding-box metadata; never emitted as a property.
pub const BBOX_COLUMN: &str = "bbox";

/// Flattens `record` into `target`, joining nested keys with `.`.
///
/// The `bbox` key and null values are only skipped when `top_level` is set, so
/// nested nulls survive as explicit `null` properties.
pub fn flatten_properties(
    record: Record,
    target: &mut Map<String, Value>,
    parent_key: &str,
    top_level: bool,
) {
    for (key, value) in record {
        if top_level && (key == BBOX_COLUMN || value.is_null()) {
            continue;
        }

        let full_key = if parent_key.is_empty() {
            key
        } else {
            format!("{parent_key}.{key}")
        };

        match value {
            RecordValue::Map(nested) => flatten_properties(nested, target, &full_key, false),
            other => {
                target.insert(full_key, other.into_json());
            }
        }
    }
}
