//! Drives one operation to completion: pagination, page merging, dry-run.
//!
//! Pages are fetched until the output token runs dry or the page cap is hit,
//! then merged by concatenating the operation's primary list and taking the
//! last write for scalar siblings. A dry-run call performs no I/O and yields
//! a human-readable description instead of records.

use std::sync::Arc;

use serde_json::{Map, Value};

use awsquery_catalog::OperationShape;
use awsquery_core::{flatten, primary_list_key, Record};

use crate::{AwsTransport, TransportError};

/// Default cap on pages fetched for one call.
pub const DEFAULT_MAX_PAGES: usize = 50;

/// Outcome of one fanned-out call.
#[derive(Debug, Clone, Default)]
pub struct CallOutput {
    pub records: Vec<Record>,
    /// Set instead of records when the call was a dry run.
    pub dry_run_line: Option<String>,
}

/// Executes concrete operations through a transport.
pub struct Invoker {
    transport: Arc<dyn AwsTransport>,
    max_pages: usize,
}

impl Invoker {
    pub fn new(transport: Arc<dyn AwsTransport>) -> Self {
        Self {
            transport,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Runs one call: paginate, merge, flatten. With `dry_run` no request is
    /// sent; the output carries the would-be call description instead.
    pub async fn run(
        &self,
        shape: &OperationShape,
        params: &Map<String, Value>,
        dry_run: bool,
    ) -> Result<CallOutput, TransportError> {
        if dry_run {
            return Ok(CallOutput {
                records: Vec::new(),
                dry_run_line: Some(describe_call(shape, params)),
            });
        }

        let mut pages = Vec::new();
        let mut page_params = params.clone();
        loop {
            let page = self.transport.call(shape, &page_params).await?;
            let next_token = shape.operation.pagination.as_ref().and_then(|pagination| {
                page.get(&pagination.output_token)
                    .and_then(Value::as_str)
                    .filter(|token| !token.is_empty())
                    .map(str::to_string)
            });
            pages.push(page);
            let Some(token) = next_token else { break };
            if pages.len() >= self.max_pages {
                tracing::warn!(
                    action = %shape.operation.name,
                    pages = pages.len(),
                    "stopping pagination at page cap"
                );
                break;
            }
            let pagination = shape
                .operation
                .pagination
                .as_ref()
                .filter(|pagination| !pagination.input_token.is_empty());
            match pagination {
                Some(pagination) => {
                    page_params.insert(pagination.input_token.clone(), Value::String(token));
                }
                None => break,
            }
        }
        tracing::debug!(action = %shape.operation.name, pages = pages.len(), "call complete");

        let merged = merge_pages(shape, pages);
        Ok(CallOutput {
            records: flatten::records_from_response(&merged),
            dry_run_line: None,
        })
    }
}

/// Formats a dry-run description: `service Action {Key: value, ...}`.
pub fn describe_call(shape: &OperationShape, params: &Map<String, Value>) -> String {
    let rendered: Vec<String> = params
        .iter()
        .map(|(key, value)| format!("{key}: {}", display_value(value)))
        .collect();
    format!(
        "{} {} {{{}}}",
        shape.service,
        shape.operation.name,
        rendered.join(", ")
    )
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(display_value).collect();
            format!("[{}]", parts.join(", "))
        }
        other => other.to_string(),
    }
}

/// Merges response pages: the primary list concatenates across pages, every
/// other key takes the last page's value.
fn merge_pages(shape: &OperationShape, mut pages: Vec<Value>) -> Value {
    if pages.len() <= 1 {
        return pages.pop().unwrap_or(Value::Null);
    }
    let list_key = shape
        .operation
        .output_list_key
        .clone()
        .or_else(|| pages.first().and_then(|page| primary_list_key(page).map(str::to_string)));

    let mut merged = Map::new();
    for page in pages {
        let Value::Object(entries) = page else { continue };
        for (key, value) in entries {
            let is_primary = list_key.as_deref() == Some(key.as_str());
            match (is_primary, value) {
                (true, Value::Array(mut incoming)) => match merged.get_mut(&key) {
                    Some(Value::Array(existing)) => existing.append(&mut incoming),
                    _ => {
                        merged.insert(key, Value::Array(incoming));
                    }
                },
                (_, value) => {
                    merged.insert(key, value);
                }
            }
        }
    }
    Value::Object(merged)
}
