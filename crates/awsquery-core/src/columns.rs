//! Column selection and ordering for tabular and projected output.
//!
//! Column tokens resolve against the union of record paths using the same
//! tiers as field extraction; the output order follows the user's token
//! order. Without tokens a default set of prominent identifier columns is
//! chosen from the records themselves.

use indexmap::IndexSet;

use crate::case::simplify_key;
use crate::flatten::Record;

/// Maximum number of columns selected when the user gives no column filters.
const DEFAULT_COLUMN_LIMIT: usize = 6;

/// Share of records a path must appear in to qualify as a default column.
const DEFAULT_COLUMN_COVERAGE: f64 = 0.5;

/// Resolved column layout: full paths in output order plus display headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnPlan {
    /// Distinct simplified headers, in output order.
    pub headers: Vec<String>,
    /// Full paths backing each header, parallel to `headers`.
    pub paths: Vec<Vec<String>>,
}

impl ColumnPlan {
    fn from_groups(groups: Vec<(String, Vec<String>)>) -> Self {
        let (headers, paths) = groups.into_iter().unzip();
        Self { headers, paths }
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

/// Union of all dotted paths across records, in discovery order.
pub fn path_union(records: &[Record]) -> IndexSet<String> {
    let mut union = IndexSet::new();
    for record in records {
        for path in record.keys() {
            union.insert(path.clone());
        }
    }
    union
}

/// Resolves user column tokens to a layout, preserving token order.
///
/// Each token resolves through: exact path, exact simplified segment, then
/// case-insensitive substring of the simplified segment. Tokens that resolve
/// to nothing are reported back so the caller can warn about them.
pub fn resolve_columns(records: &[Record], tokens: &[String]) -> (ColumnPlan, Vec<String>) {
    let union = path_union(records);
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    let mut unmatched = Vec::new();

    for token in tokens {
        let matched = resolve_one(&union, token);
        if matched.is_empty() {
            unmatched.push(token.clone());
            continue;
        }
        for path in matched {
            let header = simplify_key(&path).to_string();
            match groups.iter_mut().find(|(existing, _)| *existing == header) {
                Some((_, paths)) => {
                    if !paths.contains(&path) {
                        paths.push(path);
                    }
                }
                None => groups.push((header, vec![path])),
            }
        }
    }
    (ColumnPlan::from_groups(groups), unmatched)
}

fn resolve_one(union: &IndexSet<String>, token: &str) -> Vec<String> {
    if union.contains(token) {
        return vec![token.to_string()];
    }
    if token.contains('.') {
        // Dotted tokens like `State.Name` anchor to a path suffix; indexed
        // paths such as `Instances.0.State.Name` still match.
        let suffix = format!(".{token}");
        let dotted: Vec<String> = union
            .iter()
            .filter(|path| path.ends_with(&suffix))
            .cloned()
            .collect();
        if !dotted.is_empty() {
            return dotted;
        }
    }
    let exact_segment: Vec<String> = union
        .iter()
        .filter(|path| simplify_key(path) == token)
        .cloned()
        .collect();
    if !exact_segment.is_empty() {
        return exact_segment;
    }
    let needle = token.to_ascii_lowercase();
    union
        .iter()
        .filter(|path| simplify_key(path).to_ascii_lowercase().contains(&needle))
        .cloned()
        .collect()
}

fn is_preferred_identifier(path: &str) -> bool {
    let segment = simplify_key(path);
    segment.ends_with("Name")
        || segment.ends_with("Id")
        || segment.ends_with("Arn")
        || segment.starts_with("State")
        || segment.starts_with("Status")
        || segment == "Name"
        || segment == "Id"
        || segment == "Arn"
}

/// Picks the default column set: the first few scalar paths present in at
/// least half of the records, identifier-shaped paths first.
pub fn default_columns(records: &[Record]) -> ColumnPlan {
    if records.is_empty() {
        return ColumnPlan::from_groups(Vec::new());
    }
    let union = path_union(records);
    let threshold = (records.len() as f64 * DEFAULT_COLUMN_COVERAGE).ceil() as usize;
    let common: Vec<&String> = union
        .iter()
        .filter(|path| {
            records.iter().filter(|record| record.contains_key(path.as_str())).count() >= threshold
        })
        .collect();

    let mut ordered: Vec<&String> = common
        .iter()
        .filter(|path| is_preferred_identifier(path))
        .copied()
        .collect();
    ordered.extend(common.iter().filter(|path| !is_preferred_identifier(path)).copied());

    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for path in ordered {
        if groups.len() >= DEFAULT_COLUMN_LIMIT {
            break;
        }
        let header = simplify_key(path).to_string();
        if groups.iter().any(|(existing, _)| *existing == header) {
            continue;
        }
        groups.push((header, vec![path.clone()]));
    }
    ColumnPlan::from_groups(groups)
}
