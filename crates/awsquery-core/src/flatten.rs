//! Flattens untyped API responses into ordered dotted-path records.
//!
//! A record maps dotted paths (`State.Name`, `Tags.0.Value`) to scalar JSON
//! values. The flattener locates the primary list of a response and walks
//! each element depth-first: scalars become leaves, lists of scalars become
//! indexed leaves, and a list of objects splits the record into one
//! sub-record per element so that filters and rows see one entity at a time.
//! Sibling key order is preserved as discovered.

use indexmap::IndexMap;
use serde_json::Value;

/// One flattened row: dotted path -> scalar, in insertion order.
pub type Record = IndexMap<String, Value>;

/// Response keys that carry pagination or transport metadata, never data.
const METADATA_KEYS: &[&str] = &[
    "ResponseMetadata",
    "NextToken",
    "nextToken",
    "NextMarker",
    "Marker",
    "IsTruncated",
    "PaginationToken",
    "MaxResults",
];

fn is_metadata_key(key: &str) -> bool {
    METADATA_KEYS.contains(&key) || key.ends_with("Token")
}

fn is_list_of_objects(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.iter().any(Value::is_object),
        _ => false,
    }
}

/// Returns the key of the unique list-of-objects child of a response root,
/// excluding metadata keys. Zero or multiple candidates yield `None`, in which
/// case the whole root is treated as a single record.
pub fn primary_list_key(response: &Value) -> Option<&str> {
    let root = response.as_object()?;
    let mut candidates = root
        .iter()
        .filter(|(key, value)| !is_metadata_key(key) && is_list_of_objects(value))
        .map(|(key, _)| key.as_str());
    let first = candidates.next()?;
    if candidates.next().is_some() {
        return None;
    }
    Some(first)
}

/// Flattens one response object into records: the primary-list elements when
/// a unique primary list exists, else the whole (metadata-stripped) root.
pub fn records_from_response(response: &Value) -> Vec<Record> {
    let records = match response {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().flat_map(flatten_tree).collect(),
        Value::Object(root) => {
            if root.iter().all(|(key, _)| is_metadata_key(key)) {
                return Vec::new();
            }
            match primary_list_key(response) {
                Some(key) => {
                    let Some(Value::Array(items)) = root.get(key) else {
                        return Vec::new();
                    };
                    items.iter().flat_map(flatten_tree).collect()
                }
                None => {
                    let stripped = Value::Object(
                        root.iter()
                            .filter(|(key, _)| !is_metadata_key(key))
                            .map(|(key, value)| (key.clone(), value.clone()))
                            .collect(),
                    );
                    flatten_tree(&stripped)
                }
            }
        }
        scalar => flatten_tree(scalar),
    };
    records.into_iter().filter(|record| !record.is_empty()).collect()
}

/// Flattens a sequence of pages, concatenating each page's records in order.
pub fn records_from_pages(pages: &[Value]) -> Vec<Record> {
    pages.iter().flat_map(records_from_response).collect()
}

/// Flattens one tree into records keyed by dotted paths. Lists of objects
/// split into one sub-record per element; everything else merges in place.
pub fn flatten_tree(tree: &Value) -> Vec<Record> {
    let mut records = vec![Record::new()];
    expand_into(tree, "", &mut records);
    records
}

fn expand_into(value: &Value, path: &str, records: &mut Vec<Record>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = join_path(path, key);
                expand_into(child, &child_path, records);
            }
        }
        Value::Array(items) if items.iter().any(|item| item.is_object() || item.is_array()) => {
            // One sub-record per element, carrying the parent fields seen so
            // far; keys discovered after this list land in every sub-record.
            let parents = std::mem::take(records);
            for (index, item) in items.iter().enumerate() {
                let item_path = join_path(path, &index.to_string());
                let mut branch = parents.clone();
                match item {
                    Value::Object(_) | Value::Array(_) => {
                        expand_into(item, &item_path, &mut branch)
                    }
                    scalar => {
                        let leaf = join_path(&item_path, "value");
                        for record in &mut branch {
                            record.insert(leaf.clone(), scalar.clone());
                        }
                    }
                }
                records.extend(branch);
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                let leaf = join_path(path, &index.to_string());
                for record in records.iter_mut() {
                    record.insert(leaf.clone(), item.clone());
                }
            }
        }
        scalar => {
            let leaf = if path.is_empty() { "value".to_string() } else { path.to_string() };
            for record in records.iter_mut() {
                record.insert(leaf.clone(), scalar.clone());
            }
        }
    }
}

fn join_path(parent: &str, segment: &str) -> String {
    if parent.is_empty() {
        segment.to_string()
    } else {
        format!("{parent}.{segment}")
    }
}
