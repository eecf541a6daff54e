//! Foundational response-processing primitives shared across awsquery crates.
//!
//! Provides case normalization for service/action identifiers, flattening of
//! untyped API responses into dotted-path records, lenient field extraction,
//! and the value-filter / column-projection engine.

pub mod case;
pub mod columns;
pub mod extract;
pub mod filter;
pub mod flatten;

pub use case::{sanitize_token, simplify_key, singularize, to_kebab_case, to_pascal_case, to_snake_case};
pub use columns::{default_columns, path_union, resolve_columns, ColumnPlan};
pub use extract::{entity_from_operation, extract_values};
pub use filter::{filter_records, record_matches};
pub use flatten::{flatten_tree, primary_list_key, records_from_pages, records_from_response, Record};
