//! Command orchestration: gate, resolve, filter, project, render.
//!
//! `run_command` produces the full stdout payload as a string so output is
//! atomic: nothing is printed until the whole invocation has succeeded,
//! which also keeps interrupted runs from emitting partial tables.

use std::sync::Arc;

use anyhow::Result;

use awsquery_catalog::{CatalogError, ServiceCatalog};
use awsquery_core::{default_columns, filter_records, resolve_columns, to_kebab_case};
use awsquery_policy::{PolicyError, PolicyGate};
use awsquery_resolver::{QueryRequest, ResolveError, Resolver};
use awsquery_transport::{Invoker, TransportError};

use crate::cli_args::{CliParseError, ParsedCommand};
use crate::render::{render_json, render_keys, render_table};

/// Collaborators threaded through every command, kept explicit so tests can
/// substitute a stub transport.
pub struct App {
    pub catalog: Arc<ServiceCatalog>,
    pub gate: Arc<PolicyGate>,
    pub invoker: Arc<Invoker>,
}

/// Final stdout payload plus non-fatal diagnostics for stderr.
#[derive(Debug, Default)]
pub struct RunOutput {
    pub stdout: String,
    pub warnings: Vec<String>,
}

/// Executes one parsed command against the given collaborators.
pub async fn run_command(app: &App, command: &ParsedCommand) -> Result<RunOutput> {
    let Some(service) = command.cli.service.as_deref() else {
        return Ok(RunOutput {
            stdout: list_services(app),
            warnings: Vec::new(),
        });
    };
    let Some(action) = command.cli.action.as_deref() else {
        return Ok(RunOutput {
            stdout: list_actions(app, service)?,
            warnings: Vec::new(),
        });
    };

    let resolver = Resolver::new(
        Arc::clone(&app.catalog),
        Arc::clone(&app.gate),
        Arc::clone(&app.invoker),
    )
    .with_fanout_ceiling(command.cli.max_fanout)
    .with_parallelism(command.cli.fanout_parallelism);

    let request = QueryRequest {
        service: service.to_string(),
        action: action.to_string(),
        parameters: command.parameters.clone(),
        hints: command.hints.clone(),
        resource_filters: command.resource_filters.clone(),
        dry_run: command.cli.dry_run,
    };
    let output = resolver.execute(&request).await?;
    let warnings = output.call_failures;

    if command.cli.dry_run {
        return Ok(RunOutput {
            stdout: output.dry_run_lines.join("\n"),
            warnings,
        });
    }

    let records = filter_records(output.records, &command.value_filters);

    if command.cli.keys {
        return Ok(RunOutput {
            stdout: render_keys(&records),
            warnings,
        });
    }

    let plan = if command.column_filters.is_empty() {
        None
    } else {
        let (plan, unmatched) = resolve_columns(&records, &command.column_filters);
        for token in unmatched {
            tracing::debug!(token = %token, "column filter matched no paths, dropping");
        }
        Some(plan)
    };

    let stdout = if command.cli.json {
        render_json(&records, plan.as_ref())
    } else {
        let plan = plan.unwrap_or_else(|| default_columns(&records));
        render_table(&records, &plan)
    };
    Ok(RunOutput { stdout, warnings })
}

/// Services with at least one policy-allowed operation, one per line.
fn list_services(app: &App) -> String {
    let mut visible = Vec::new();
    for service in app.catalog.list_services() {
        let Ok(operations) = app.catalog.list_operations(&service) else {
            continue;
        };
        if operations
            .iter()
            .any(|operation| app.gate.allows(&service, operation))
        {
            visible.push(service);
        }
    }
    visible.join("\n")
}

/// Policy-allowed operations for one service, kebab-cased, one per line.
fn list_actions(app: &App, service: &str) -> Result<String> {
    let operations = app.catalog.list_operations(service)?;
    let allowed: Vec<String> = operations
        .iter()
        .filter(|operation| app.gate.allows(service, operation))
        .map(|operation| to_kebab_case(operation))
        .collect();
    Ok(allowed.join("\n"))
}

/// Maps error kinds to the documented exit codes: 2 policy denial,
/// 3 unresolvable parameter, 4 SDK/catalog failure, 1 everything else.
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    if let Some(resolve) = error.downcast_ref::<ResolveError>() {
        return match resolve {
            ResolveError::PolicyDenied { .. } => 2,
            ResolveError::UnresolvableParameter { .. } | ResolveError::FanOutExceeded { .. } => 3,
            ResolveError::Catalog(_) | ResolveError::Transport(_) => 4,
            ResolveError::Task(_) => 1,
        };
    }
    if error.downcast_ref::<CatalogError>().is_some() {
        return 4;
    }
    if error.downcast_ref::<TransportError>().is_some() {
        return 4;
    }
    if error.downcast_ref::<PolicyError>().is_some() || error.downcast_ref::<CliParseError>().is_some()
    {
        return 1;
    }
    1
}
