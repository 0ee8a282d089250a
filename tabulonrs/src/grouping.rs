//! Deterministic group identity.
//!
//! A group's id is a fast non-cryptographic hash of the outermost grouped
//! field id and the stringified group-column values at this and all outer
//! levels. Identical group-by structure over identical data always yields
//! byte-identical ids, which client-side diffing relies on. Collisions are
//! theoretically possible and not de-collided.

use serde_json::Value;
use xxhash_rust::xxh3::xxh3_64;

pub fn group_id(namespace_field_id: &str, values: &[&Value]) -> String {
    let mut key = String::from(namespace_field_id);
    for value in values {
        key.push('_');
        key.push_str(&stringify_cell(value));
    }
    format!("{:016x}", xxh3_64(key.as_bytes()))
}

pub(crate) fn stringify_cell(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identical_inputs_hash_identically() {
        let a = group_id("fld_status", &[&json!("Active"), &json!(3)]);
        let b = group_id("fld_status", &[&json!("Active"), &json!(3)]);
        assert_eq!(a, b);
    }

    #[test]
    fn values_and_namespace_distinguish_groups() {
        let base = group_id("fld_status", &[&json!("Active")]);
        assert_ne!(base, group_id("fld_status", &[&json!("Done")]));
        assert_ne!(base, group_id("fld_stage", &[&json!("Active")]));
        assert_ne!(base, group_id("fld_status", &[&json!("Active"), &json!(1)]));
    }

    #[test]
    fn null_cells_participate_in_identity() {
        let with_null = group_id("fld_status", &[&Value::Null]);
        assert_ne!(with_null, group_id("fld_status", &[&json!("null x")]));
        assert_eq!(with_null, group_id("fld_status", &[&Value::Null]));
    }
}
