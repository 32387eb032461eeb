//! Header/field merging.
//!
//! The protocol delivers headers for one request across several events
//! (primary + extra-info), each as a loose name/value object. These pure
//! functions fold them into one set: case-insensitive on the name,
//! last-write-wins on the value, first-seen order preserved.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Header
// ============================================================================

/// A single merged header.
///
/// Names are canonicalized to lower case at merge time so that casing
/// differences between protocol events collapse to one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Canonical (lower-cased) header name.
    pub name: String,
    /// Most recently supplied value.
    pub value: String,
}

// ============================================================================
// Merging
// ============================================================================

/// Converts a protocol name/value object into a header list.
///
/// Non-object input yields an empty list; non-string values are
/// stringified the way the wire format prints them.
#[must_use]
pub fn headers_from(raw: &Value) -> Vec<Header> {
    merge_headers(Vec::new(), raw)
}

/// Merges a protocol name/value object into an existing header set.
///
/// Case-insensitive, last-write-wins: a header supplied again (under any
/// casing) overwrites the prior value in place, keeping its original
/// position. New headers append in the object's order.
#[must_use]
pub fn merge_headers(mut current: Vec<Header>, additions: &Value) -> Vec<Header> {
    let Some(map) = additions.as_object() else {
        return current;
    };

    for (name, value) in map {
        let canonical = name.to_ascii_lowercase();
        let value = stringify(value);

        match current.iter_mut().find(|h| h.name == canonical) {
            Some(existing) => existing.value = value,
            None => current.push(Header {
                name: canonical,
                value,
            }),
        }
    }

    current
}

/// Renders a protocol value the way header values appear on the wire.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_headers_from_object() {
        let headers = headers_from(&json!({ "User-Agent": "Test", "Accept": "*/*" }));

        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].name, "user-agent");
        assert_eq!(headers[0].value, "Test");
        assert_eq!(headers[1].name, "accept");
    }

    #[test]
    fn test_headers_from_non_object() {
        assert!(headers_from(&Value::Null).is_empty());
        assert!(headers_from(&json!("not-a-map")).is_empty());
    }

    #[test]
    fn test_merge_case_insensitive_overwrite() {
        let headers = headers_from(&json!({ "Content-Type": "text/html" }));
        let merged = merge_headers(headers, &json!({ "content-type": "application/json" }));

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].name, "content-type");
        assert_eq!(merged[0].value, "application/json");
    }

    #[test]
    fn test_merge_preserves_first_seen_order() {
        let headers = headers_from(&json!({ "A": "1" }));
        let headers = merge_headers(headers, &json!({ "B": "2" }));
        let headers = merge_headers(headers, &json!({ "a": "3" }));

        let names: Vec<_> = headers.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(headers[0].value, "3");
    }

    #[test]
    fn test_merge_stringifies_non_string_values() {
        let headers = headers_from(&json!({ "Content-Length": 42 }));
        assert_eq!(headers[0].value, "42");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn header_map() -> impl Strategy<Value = Value> {
            proptest::collection::hash_map("[A-Za-z-]{1,12}", "[ -~]{0,24}", 0..8)
                .prop_map(|m| json!(m))
        }

        proptest! {
            // Merging the same set twice yields the same result as once.
            #[test]
            fn merge_is_idempotent(map in header_map()) {
                let once = headers_from(&map);
                let twice = merge_headers(once.clone(), &map);
                prop_assert_eq!(once, twice);
            }

            // Every merged name is canonical lower case.
            #[test]
            fn merged_names_are_lowercase(map in header_map()) {
                for header in headers_from(&map) {
                    prop_assert_eq!(header.name.to_ascii_lowercase(), header.name);
                }
            }
        }
    }
}
