use std::sync::Arc;

use anyhow::Context;
use clap::error::ErrorKind;
use serde_json::{Map, Value};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use awsquery_catalog::{OperationShape, ServiceCatalog, MODELS_DIR_ENV};
use awsquery_cli::{exit_code_for, parse_command_line, run_command, App, CliParseError, ParsedCommand};
use awsquery_policy::PolicyGate;
use awsquery_transport::{AwsTransport, Invoker, SigV4Transport, TransportError};

/// Exit code for an interrupted invocation (SIGINT).
const EXIT_INTERRUPTED: i32 = 130;

fn init_tracing(debug: bool) {
    let default_level = if debug { LevelFilter::DEBUG } else { LevelFilter::WARN };
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn parse_or_exit() -> ParsedCommand {
    match parse_command_line(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(CliParseError::Clap(error))
            if matches!(error.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) =>
        {
            let _ = error.print();
            std::process::exit(0);
        }
        Err(error) => {
            eprintln!("ERROR: {error}");
            std::process::exit(1);
        }
    }
}

/// Placeholder transport for service/action listing commands, which never
/// issue requests. Credential and region resolution is deferred until a
/// command actually needs the network.
struct UnconfiguredTransport;

#[async_trait::async_trait]
impl AwsTransport for UnconfiguredTransport {
    async fn call(
        &self,
        _shape: &OperationShape,
        _params: &Map<String, Value>,
    ) -> Result<Value, TransportError> {
        Err(TransportError::MissingRegion)
    }
}

async fn build_app(command: &ParsedCommand) -> anyhow::Result<App> {
    let gate = Arc::new(PolicyGate::load_default()?);
    let catalog = match std::env::var_os(MODELS_DIR_ENV) {
        Some(models_dir) => ServiceCatalog::with_models_dir(std::path::Path::new(&models_dir))?,
        None => ServiceCatalog::bundled(),
    };
    let needs_transport = command.cli.service.is_some() && command.cli.action.is_some();
    let transport: Arc<dyn AwsTransport> = if needs_transport {
        let transport =
            SigV4Transport::from_env(command.cli.region.clone(), command.cli.profile.clone())
                .await
                .context("failed to initialize AWS transport")?;
        Arc::new(transport)
    } else {
        Arc::new(UnconfiguredTransport)
    };
    let invoker = Invoker::new(transport).with_max_pages(command.cli.max_pages);
    Ok(App {
        catalog: Arc::new(catalog),
        gate,
        invoker: Arc::new(invoker),
    })
}

async fn run() -> anyhow::Result<()> {
    let command = parse_or_exit();
    init_tracing(command.cli.debug);

    let app = build_app(&command).await?;
    let output = run_command(&app, &command).await?;
    for warning in &output.warnings {
        eprintln!("ERROR: {warning}");
    }
    if !output.stdout.is_empty() {
        println!("{}", output.stdout);
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let outcome = tokio::select! {
        outcome = run() => outcome,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted.");
            std::process::exit(EXIT_INTERRUPTED);
        }
    };
    if let Err(error) = outcome {
        eprintln!("ERROR: {error:#}");
        std::process::exit(exit_code_for(&error));
    }
}
