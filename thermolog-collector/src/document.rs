//! Null-safe reads over parsed vendor documents.
//!
//! Vendor payloads are kept as `serde_json::Value` trees: nothing in here
//! ever fails on a missing intermediate, a lookup simply resolves to `None`.

use serde_json::Value;
use tracing::warn;

/// Walks `path` from `root`, one object key per segment.
///
/// Returns `None` as soon as a segment is missing or the current node is not
/// an object. An empty path returns the root itself.
pub fn get_path<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(root, |node, key| node.as_object()?.get(*key))
}

/// Same as [`get_path`] but starting from an optional root, so lookups
/// chained after a failed selection stay absent instead of erroring.
pub fn get_path_from<'a>(root: Option<&'a Value>, path: &[&str]) -> Option<&'a Value> {
    root.and_then(|node| get_path(node, path))
}

/// Picks the single entry of an id → object mapping.
///
/// With more than one entry the lexicographically smallest id wins and a
/// warning is logged, so the choice never depends on map iteration order.
pub fn select_single_entry<'a>(mapping: Option<&'a Value>, what: &str) -> Option<(&'a str, &'a Value)> {
    let entries = mapping?.as_object()?;
    if entries.len() > 1 {
        warn!(
            "{} {} entries found, only one is supported: using the smallest id",
            entries.len(),
            what
        );
    }
    entries
        .iter()
        .min_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(id, value)| (id.as_str(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_path_nested() {
        let doc = json!({"a": {"b": {"c": 42}}});
        assert_eq!(get_path(&doc, &["a", "b", "c"]), Some(&json!(42)));
        assert_eq!(get_path(&doc, &[]), Some(&doc));
    }

    #[test]
    fn test_get_path_missing_intermediate() {
        let doc = json!({"a": {"b": 1}});
        assert_eq!(get_path(&doc, &["a", "x", "c"]), None);
        // scalar in the middle of the path
        assert_eq!(get_path(&doc, &["a", "b", "c"]), None);
        assert_eq!(get_path(&Value::Null, &["a"]), None);
    }

    #[test]
    fn test_get_path_keeps_explicit_null() {
        let doc = json!({"a": null});
        assert_eq!(get_path(&doc, &["a"]), Some(&Value::Null));
    }

    #[test]
    fn test_select_single_entry() {
        let mapping = json!({"dev-1": {"name": "Hall"}});
        let (id, value) = select_single_entry(Some(&mapping), "thermostat").unwrap();
        assert_eq!(id, "dev-1");
        assert_eq!(value["name"], "Hall");
    }

    #[test]
    fn test_select_smallest_id_when_several() {
        let mapping = json!({"zeta": {"n": 2}, "alpha": {"n": 1}, "mid": {"n": 3}});
        let (id, value) = select_single_entry(Some(&mapping), "thermostat").unwrap();
        assert_eq!(id, "alpha");
        assert_eq!(value["n"], 1);
    }

    #[test]
    fn test_select_empty_or_absent() {
        assert!(select_single_entry(Some(&json!({})), "structure").is_none());
        assert!(select_single_entry(None, "structure").is_none());
        assert!(select_single_entry(Some(&json!([1, 2])), "structure").is_none());
    }
}
