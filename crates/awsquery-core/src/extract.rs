//! Lenient field extraction over flattened records.
//!
//! Matching tiers, first non-empty wins: exact dotted path, exact simplified
//! segment, case-insensitive substring on the simplified segment, then the
//! standard AWS identifier fallbacks derived from the source operation name.

use serde_json::Value;

use crate::case::{simplify_key, singularize, to_pascal_case};
use crate::flatten::Record;

/// Extracts scalar values for a (possibly fuzzy) field name across records.
///
/// `field_hint` is tried through the exact/segment/substring tiers; when it is
/// absent or matches nothing, the `Name`/`Id`/`Arn` fallback ladder runs, with
/// entity-qualified variants inferred from `source_operation` (for example
/// `ListClusters` contributes `ClusterName`, `ClusterId`, `ClusterArn`).
/// Nulls are dropped and duplicates removed preserving first occurrence.
pub fn extract_values(
    records: &[Record],
    field_hint: Option<&str>,
    source_operation: Option<&str>,
) -> Vec<Value> {
    if let Some(hint) = field_hint.filter(|hint| !hint.is_empty()) {
        let exact = collect(records, |path, _| path == hint);
        if !exact.is_empty() {
            return exact;
        }
        if hint.contains('.') {
            let suffix = format!(".{hint}");
            let dotted = collect(records, |path, _| path.ends_with(&suffix));
            if !dotted.is_empty() {
                return dotted;
            }
        }
        let segment = collect(records, |path, _| simplify_key(path) == hint);
        if !segment.is_empty() {
            return segment;
        }
        let needle = hint.to_ascii_lowercase();
        let substring = collect(records, |path, _| {
            simplify_key(path).to_ascii_lowercase().contains(&needle)
        });
        if !substring.is_empty() {
            return substring;
        }
        tracing::debug!(hint, "field hint matched nothing, trying standard fallbacks");
    }

    for candidate in fallback_fields(source_operation) {
        let found = collect(records, |path, _| {
            simplify_key(path).eq_ignore_ascii_case(&candidate)
        });
        if !found.is_empty() {
            return found;
        }
    }

    // Bare identifier lists ({"clusters": ["prod", ...]}) flatten to paths
    // named after the entity's plural; the entity stem recovers them.
    if let Some(entity) = source_operation.and_then(entity_from_operation) {
        let needle = entity.to_ascii_lowercase();
        let found = collect(records, |path, _| {
            simplify_key(path).to_ascii_lowercase().contains(&needle)
        });
        if !found.is_empty() {
            return found;
        }
    }
    Vec::new()
}

fn collect(records: &[Record], mut matches: impl FnMut(&str, &Value) -> bool) -> Vec<Value> {
    let mut values = Vec::new();
    let mut seen = Vec::new();
    for record in records {
        for (path, value) in record {
            if value.is_null() || !matches(path, value) {
                continue;
            }
            let fingerprint = value.to_string();
            if seen.contains(&fingerprint) {
                continue;
            }
            seen.push(fingerprint);
            values.push(value.clone());
        }
    }
    values
}

/// Standard identifier fields tried when no hint matches: plain `Name`, `Id`,
/// `Arn`, then entity-qualified forms derived from the source operation.
fn fallback_fields(source_operation: Option<&str>) -> Vec<String> {
    let mut fields = vec!["Name".to_string(), "Id".to_string(), "Arn".to_string()];
    if let Some(entity) = source_operation.and_then(entity_from_operation) {
        for suffix in ["Name", "Id", "Arn"] {
            fields.push(format!("{entity}{suffix}"));
        }
    }
    fields
}

/// Derives the singular entity from an operation name by stripping a leading
/// `List`/`Describe`/`Get` and singularizing (`ListClusters` -> `Cluster`).
pub fn entity_from_operation(operation: &str) -> Option<String> {
    let pascal = to_pascal_case(operation);
    let rest = ["List", "Describe", "Get"]
        .iter()
        .find_map(|prefix| pascal.strip_prefix(prefix))
        .unwrap_or(&pascal);
    if rest.is_empty() {
        return None;
    }
    Some(to_pascal_case(&singularize(rest)))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::flatten::records_from_response;

    use super::*;

    fn string_values(values: Vec<Value>) -> Vec<String> {
        values
            .into_iter()
            .map(|value| value.as_str().expect("string value").to_string())
            .collect()
    }

    #[test]
    fn exact_dotted_path_wins_over_segment_match() {
        let records = records_from_response(&json!({
            "Reservations": [
                {"State": {"Name": "running"}, "Name": "outer"}
            ]
        }));
        let values = extract_values(&records, Some("State.Name"), None);
        assert_eq!(string_values(values), vec!["running"]);
    }

    #[test]
    fn segment_match_reaches_nested_fields() {
        let records = records_from_response(&json!({
            "Buckets": [{"Name": "prod-backup"}, {"Name": "prod-logs"}]
        }));
        let values = extract_values(&records, Some("Name"), None);
        assert_eq!(string_values(values), vec!["prod-backup", "prod-logs"]);
    }

    #[test]
    fn substring_match_is_case_insensitive() {
        let records = records_from_response(&json!({"clusters": ["prod", "stage"]}));
        let values = extract_values(&records, Some("cluster"), None);
        assert_eq!(string_values(values), vec!["prod", "stage"]);
    }

    #[test]
    fn fallback_ladder_tries_name_first() {
        let records = records_from_response(&json!({
            "Parameters": [{"Name": "db-host", "Type": "String"}, {"Name": "db-port", "Type": "String"}]
        }));
        let values = extract_values(&records, None, Some("DescribeParameters"));
        assert_eq!(string_values(values), vec!["db-host", "db-port"]);
    }

    #[test]
    fn fallback_ladder_reaches_entity_qualified_fields() {
        let records = records_from_response(&json!({
            "Users": [{"UserName": "alice", "Path": "/"}, {"UserName": "bob", "Path": "/"}]
        }));
        let values = extract_values(&records, None, Some("ListUsers"));
        assert_eq!(string_values(values), vec!["alice", "bob"]);
    }

    #[test]
    fn drops_nulls_and_deduplicates_preserving_order() {
        let records = records_from_response(&json!({
            "Instances": [
                {"SubnetId": "subnet-b"},
                {"SubnetId": null},
                {"SubnetId": "subnet-a"},
                {"SubnetId": "subnet-b"}
            ]
        }));
        let values = extract_values(&records, Some("SubnetId"), None);
        assert_eq!(string_values(values), vec!["subnet-b", "subnet-a"]);
    }

    #[test]
    fn unmatched_hint_falls_through_to_standard_fields() {
        let records = records_from_response(&json!({
            "Things": [{"Name": "one"}, {"Name": "two"}]
        }));
        let values = extract_values(&records, Some("frobnicator"), None);
        assert_eq!(string_values(values), vec!["one", "two"]);
    }

    #[test]
    fn entity_stem_recovers_bare_identifier_lists() {
        let records = records_from_response(&json!({"clusters": ["prod", "stage"]}));
        let values = extract_values(&records, Some("clusterName"), Some("ListClusters"));
        assert_eq!(string_values(values), vec!["prod", "stage"]);
    }

    #[test]
    fn entity_inference_strips_verbs_and_singularizes() {
        assert_eq!(entity_from_operation("ListClusters").as_deref(), Some("Cluster"));
        assert_eq!(entity_from_operation("describe-instances").as_deref(), Some("Instance"));
        assert_eq!(entity_from_operation("GetPolicies").as_deref(), Some("Policy"));
        assert_eq!(entity_from_operation("List"), None);
    }

    #[test]
    fn no_match_anywhere_returns_empty() {
        let records = records_from_response(&json!({"Widgets": [{"Serial": 1}]}));
        assert!(extract_values(&records, Some("missing"), Some("ListWidgets")).is_empty());
    }
}
