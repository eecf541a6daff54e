//! Parameter resolution and fan-out.
//!
//! Given a target operation with unsatisfied required parameters, the
//! resolver picks source listing operations on the same service, calls them
//! (recursively when a source itself needs parameters), harvests identifier
//! values from their responses, and fans the target call out once per
//! resolved value. Every operation touched here, source listings included,
//! is checked against the policy gate first.

pub mod hint;

use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use awsquery_catalog::{CatalogError, FieldKind, InputField, OperationShape, ServiceCatalog};
use awsquery_core::{
    entity_from_operation, extract_values, filter_records, singularize, to_kebab_case, Record,
};
use awsquery_policy::PolicyGate;
use awsquery_transport::{CallOutput, Invoker, TransportError};

pub use hint::{HintParseError, ResolutionHint};

/// Hard ceiling on fanned-out calls per invocation, unless reconfigured.
pub const DEFAULT_FANOUT_CEILING: usize = 100;

/// Concurrent fan-out calls in flight at once.
pub const DEFAULT_FANOUT_PARALLELISM: usize = 8;

/// Bound on recursive source resolution (source of a source of ...).
const MAX_RESOLUTION_DEPTH: usize = 3;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("action {service}:{action} is not permitted by the security policy")]
    PolicyDenied { service: String, action: String },
    #[error("could not resolve required parameter '{parameter}' for {service}:{action}")]
    UnresolvableParameter {
        service: String,
        action: String,
        parameter: String,
    },
    #[error(
        "resolving '{parameter}' for {service}:{action} would fan out into {calls} calls, \
         above the ceiling of {ceiling}"
    )]
    FanOutExceeded {
        service: String,
        action: String,
        parameter: String,
        calls: usize,
        ceiling: usize,
    },
    #[error("fan-out task failed: {0}")]
    Task(String),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// One user command, after CLI parsing.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub service: String,
    pub action: String,
    /// Raw `-p key=value` pairs in declaration order.
    pub parameters: Vec<(String, String)>,
    /// `-i` hints, one per unresolved required parameter, in order.
    pub hints: Vec<ResolutionHint>,
    /// Filters applied to resolver source listings, not the final output.
    pub resource_filters: Vec<String>,
    pub dry_run: bool,
}

/// Concatenated result of every fanned-out call.
#[derive(Debug, Default)]
pub struct QueryOutput {
    pub records: Vec<Record>,
    /// Dry-run descriptions, in deterministic fan-out order.
    pub dry_run_lines: Vec<String>,
    /// Per-call failures that did not abort the remaining fan-out.
    pub call_failures: Vec<String>,
}

/// One fanned-out call's outcome, keeping the parameters that produced it
/// for failure reporting.
type FanOutResult = Result<(CallOutput, Map<String, Value>), (TransportError, Map<String, Value>)>;

/// Plans and executes one query against explicit collaborators.
pub struct Resolver {
    catalog: Arc<ServiceCatalog>,
    gate: Arc<PolicyGate>,
    invoker: Arc<Invoker>,
    fanout_ceiling: usize,
    parallelism: usize,
}

impl Resolver {
    pub fn new(catalog: Arc<ServiceCatalog>, gate: Arc<PolicyGate>, invoker: Arc<Invoker>) -> Self {
        Self {
            catalog,
            gate,
            invoker,
            fanout_ceiling: DEFAULT_FANOUT_CEILING,
            parallelism: DEFAULT_FANOUT_PARALLELISM,
        }
    }

    pub fn with_fanout_ceiling(mut self, ceiling: usize) -> Self {
        self.fanout_ceiling = ceiling.max(1);
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Executes one query end to end: gate, shape, resolve, fan out.
    pub async fn execute(&self, request: &QueryRequest) -> Result<QueryOutput, ResolveError> {
        if !self.gate.allows(&request.service, &request.action) {
            return Err(ResolveError::PolicyDenied {
                service: request.service.clone(),
                action: request.action.clone(),
            });
        }
        let shape = self.catalog.describe(&request.service, &request.action)?;
        let working = merge_user_parameters(&shape, &request.parameters);

        let unsatisfied: Vec<InputField> = shape
            .operation
            .required_fields()
            .filter(|field| !working.contains_key(&field.name))
            .cloned()
            .collect();

        if unsatisfied.is_empty() {
            let output = self.invoker.run(&shape, &working, request.dry_run).await?;
            return Ok(collect_outputs(vec![Ok((output, working))], &shape));
        }

        // Resolve each missing field independently, pairing hints by order.
        let mut axes: Vec<(InputField, Vec<Value>)> = Vec::new();
        for (index, field) in unsatisfied.iter().enumerate() {
            let hint = request.hints.get(index);
            let mut values = self
                .resolve_field(&shape, field, hint, &request.resource_filters, 0)
                .await?;
            let cap = hint
                .and_then(|hint| hint.limit)
                .map_or(self.fanout_ceiling, |limit| limit.min(self.fanout_ceiling));
            values.truncate(cap);
            if values.is_empty() {
                return Err(self.unresolvable(&shape, &field.name));
            }
            tracing::debug!(
                parameter = %field.name,
                values = values.len(),
                "resolved parameter values"
            );
            axes.push((field.clone(), values));
        }

        let planned: usize = axes.iter().map(|(_, values)| values.len()).product();
        if planned > self.fanout_ceiling {
            let explosive = axes
                .iter()
                .max_by_key(|(_, values)| values.len())
                .map(|(field, _)| field.name.clone())
                .unwrap_or_default();
            return Err(ResolveError::FanOutExceeded {
                service: shape.service.clone(),
                action: shape.operation.name.clone(),
                parameter: explosive,
                calls: planned,
                ceiling: self.fanout_ceiling,
            });
        }

        // Deterministic output: each axis fans out in lexical value order.
        for (_, values) in &mut axes {
            values.sort_by_key(|value| display_value(value));
        }
        let mut call_params = vec![working];
        for (field, values) in &axes {
            let mut expanded = Vec::with_capacity(call_params.len() * values.len());
            for base in &call_params {
                for value in values {
                    let mut params = base.clone();
                    params.insert(field.name.clone(), wrap_for_kind(field, value));
                    expanded.push(params);
                }
            }
            call_params = expanded;
        }

        let results = self.fan_out(&shape, call_params, request.dry_run).await?;
        Ok(collect_outputs(results, &shape))
    }

    async fn fan_out(
        &self,
        shape: &OperationShape,
        call_params: Vec<Map<String, Value>>,
        dry_run: bool,
    ) -> Result<Vec<FanOutResult>, ResolveError> {
        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let mut tasks = JoinSet::new();
        for (index, params) in call_params.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let invoker = Arc::clone(&self.invoker);
            let shape = shape.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let result = invoker.run(&shape, &params, dry_run).await;
                (index, result, params)
            });
        }
        let mut slots: Vec<Option<FanOutResult>> =
            std::iter::repeat_with(|| None).take(tasks.len()).collect();
        while let Some(joined) = tasks.join_next().await {
            let (index, result, params) =
                joined.map_err(|error| ResolveError::Task(error.to_string()))?;
            slots[index] = Some(match result {
                Ok(output) => Ok((output, params)),
                Err(error) => Err((error, params)),
            });
        }
        Ok(slots.into_iter().flatten().collect())
    }

    /// Harvests values for one unsatisfied field by trying ranked source
    /// operations until one yields something.
    async fn resolve_field(
        &self,
        shape: &OperationShape,
        field: &InputField,
        hint: Option<&ResolutionHint>,
        resource_filters: &[String],
        depth: usize,
    ) -> Result<Vec<Value>, ResolveError> {
        let candidates = self.candidate_sources(shape, field, hint);
        if candidates.is_empty() {
            return Err(self.unresolvable(shape, &field.name));
        }
        for candidate in candidates {
            if !self.gate.allows(&shape.service, &candidate) {
                tracing::debug!(
                    source = %candidate,
                    "skipping policy-denied source operation"
                );
                continue;
            }
            let records = match self
                .source_records(&shape.service, &candidate, resource_filters, depth)
                .await
            {
                Ok(records) => records,
                Err(error) => {
                    tracing::debug!(source = %candidate, %error, "source operation failed, trying next");
                    continue;
                }
            };
            let field_hint = hint
                .and_then(|hint| hint.field.as_deref())
                .unwrap_or(&field.name);
            let values = extract_values(&records, Some(field_hint), Some(&candidate));
            if !values.is_empty() {
                tracing::debug!(
                    source = %candidate,
                    parameter = %field.name,
                    values = values.len(),
                    "harvested parameter values"
                );
                return Ok(values);
            }
        }
        Err(self.unresolvable(shape, &field.name))
    }

    /// Calls one source listing, resolving its own required parameters
    /// recursively, and applies the resource filters to its records.
    fn source_records<'a>(
        &'a self,
        service: &'a str,
        action: &'a str,
        resource_filters: &'a [String],
        depth: usize,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Vec<Record>, ResolveError>> + Send + 'a>,
    > {
        Box::pin(async move {
            let shape = self.catalog.describe(service, action)?;
            let mut params = Map::new();
            for field in shape.operation.required_fields() {
                if depth >= MAX_RESOLUTION_DEPTH {
                    return Err(self.unresolvable(&shape, &field.name));
                }
                let values = self
                    .resolve_field(&shape, field, None, resource_filters, depth + 1)
                    .await?;
                let Some(first) = values.first() else {
                    return Err(self.unresolvable(&shape, &field.name));
                };
                if values.len() > 1 {
                    tracing::warn!(
                        parameter = %field.name,
                        candidates = values.len(),
                        chosen = %display_value(first),
                        "multiple values found for source parameter, using first"
                    );
                }
                params.insert(field.name.clone(), wrap_for_kind(field, first));
            }
            // Source listings always execute, even under --dry-run.
            let output = self.invoker.run(&shape, &params, false).await?;
            Ok(filter_records(output.records, resource_filters))
        })
    }

    /// Ranks candidate source operations for a field, per the hint if given.
    fn candidate_sources(
        &self,
        shape: &OperationShape,
        field: &InputField,
        hint: Option<&ResolutionHint>,
    ) -> Vec<String> {
        let operations = &shape.model.operations;
        if let Some(source) = hint.and_then(|hint| hint.source.as_deref()) {
            let needle = source.to_ascii_lowercase().replace('_', "-");
            return operations
                .iter()
                .filter(|operation| operation.name != shape.operation.name)
                .filter(|operation| to_kebab_case(&operation.name).contains(&needle))
                .map(|operation| operation.name.clone())
                .collect();
        }

        let field_entity = entity_from_field(&field.name);
        let action_entity = entity_from_operation(&shape.operation.name)
            .map(|entity| entity.to_ascii_lowercase());
        let mut candidates: Vec<&str> = operations
            .iter()
            .filter(|operation| operation.name != shape.operation.name)
            .filter(|operation| {
                operation.name.starts_with("List") || operation.name.starts_with("Describe")
            })
            .filter(|operation| operation.is_parameter_free())
            .map(|operation| operation.name.as_str())
            .collect();
        candidates.sort_by_key(|name| {
            let lowered = name.to_ascii_lowercase();
            let misses_field_entity = !field_entity
                .as_deref()
                .is_some_and(|entity| lowered.contains(entity));
            let misses_action_entity = !action_entity
                .as_deref()
                .is_some_and(|entity| lowered.contains(entity));
            (misses_field_entity, misses_action_entity, name.len(), lowered)
        });
        candidates.into_iter().map(str::to_string).collect()
    }

    fn unresolvable(&self, shape: &OperationShape, parameter: &str) -> ResolveError {
        ResolveError::UnresolvableParameter {
            service: shape.service.clone(),
            action: shape.operation.name.clone(),
            parameter: parameter.to_string(),
        }
    }
}

/// Merges `-p` pairs into a parameter map: names take the model's spelling,
/// repeated keys accumulate into lists, and scalars auto-wrap when the
/// target field is list-kind.
fn merge_user_parameters(
    shape: &OperationShape,
    parameters: &[(String, String)],
) -> Map<String, Value> {
    let mut merged = Map::new();
    for (key, raw_value) in parameters {
        let name = shape
            .operation
            .canonical_field_name(key)
            .unwrap_or(key)
            .to_string();
        let value = Value::String(raw_value.clone());
        match merged.get_mut(&name) {
            Some(Value::Array(existing)) => existing.push(value),
            Some(previous) => {
                let first = previous.take();
                *previous = Value::Array(vec![first, value]);
            }
            None => {
                merged.insert(name, value);
            }
        }
    }
    for (name, value) in merged.iter_mut() {
        let is_list_field = shape
            .operation
            .field(name)
            .is_some_and(|field| field.kind == FieldKind::List);
        if is_list_field && !value.is_array() {
            *value = Value::Array(vec![value.take()]);
        }
    }
    merged
}

fn wrap_for_kind(field: &InputField, value: &Value) -> Value {
    if field.kind == FieldKind::List {
        Value::Array(vec![value.clone()])
    } else {
        value.clone()
    }
}

/// Entity stem for ranking: parameter name minus a Name/Id/Arn suffix,
/// singularized. Generic identifiers yield nothing.
fn entity_from_field(name: &str) -> Option<String> {
    let base = ["Name", "Id", "Arn", "ARN"]
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
        .unwrap_or(name);
    if base.is_empty() {
        return None;
    }
    let singular = singularize(&base.to_ascii_lowercase());
    if singular.is_empty() || matches!(singular.as_str(), "name" | "id" | "arn") {
        return None;
    }
    Some(singular)
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn collect_outputs(results: Vec<FanOutResult>, shape: &OperationShape) -> QueryOutput {
    let mut output = QueryOutput::default();
    for result in results {
        match result {
            Ok((call, _params)) => {
                output.records.extend(call.records);
                if let Some(line) = call.dry_run_line {
                    output.dry_run_lines.push(line);
                }
            }
            Err((error, params)) => {
                let described = params
                    .iter()
                    .map(|(key, value)| format!("{key}: {}", display_value(value)))
                    .collect::<Vec<_>>()
                    .join(", ");
                output.call_failures.push(format!(
                    "{}:{} {{{described}}}: {error}",
                    shape.service, shape.operation.name
                ));
            }
        }
    }
    output
}
