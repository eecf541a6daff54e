//! End-to-end command scenarios against a stubbed transport.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use awsquery_catalog::{OperationShape, ServiceCatalog};
use awsquery_cli::{exit_code_for, parse_command_line, run_command, App, ParsedCommand};
use awsquery_policy::PolicyGate;
use awsquery_resolver::ResolveError;
use awsquery_transport::{AwsTransport, Invoker, TransportError};

type Responder = Box<dyn Fn(&Map<String, Value>) -> Result<Value, TransportError> + Send + Sync>;

/// Canned responses per action plus a call log.
#[derive(Default)]
struct StubApi {
    responders: HashMap<String, Responder>,
    calls: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl StubApi {
    fn new() -> Self {
        Self::default()
    }

    fn respond(mut self, action: &str, response: Value) -> Self {
        self.responders
            .insert(action.to_string(), Box::new(move |_| Ok(response.clone())));
        self
    }

    fn respond_with(
        mut self,
        action: &str,
        responder: impl Fn(&Map<String, Value>) -> Result<Value, TransportError> + Send + Sync + 'static,
    ) -> Self {
        self.responders.insert(action.to_string(), Box::new(responder));
        self
    }

    fn calls_to(&self, action: &str) -> usize {
        self.calls
            .lock()
            .expect("call log lock")
            .iter()
            .filter(|(called, _)| called == action)
            .count()
    }
}

#[async_trait]
impl AwsTransport for StubApi {
    async fn call(
        &self,
        shape: &OperationShape,
        params: &Map<String, Value>,
    ) -> Result<Value, TransportError> {
        self.calls
            .lock()
            .expect("call log lock")
            .push((shape.operation.name.clone(), params.clone()));
        match self.responders.get(&shape.operation.name) {
            Some(responder) => responder(params),
            None => Err(TransportError::Api {
                service: shape.service.clone(),
                action: shape.operation.name.clone(),
                status: 400,
                code: "NotStubbed".to_string(),
                message: "no stubbed response".to_string(),
            }),
        }
    }
}

fn app(api: &Arc<StubApi>, rules: &[&str]) -> App {
    let transport: Arc<dyn AwsTransport> = Arc::clone(api) as Arc<dyn AwsTransport>;
    App {
        catalog: Arc::new(ServiceCatalog::bundled()),
        gate: Arc::new(PolicyGate::from_rules(rules.iter().copied())),
        invoker: Arc::new(Invoker::new(transport)),
    }
}

fn read_only_rules() -> Vec<&'static str> {
    vec!["*:Describe*", "*:List*", "*:Get*"]
}

fn parse(tokens: &[&str]) -> ParsedCommand {
    parse_command_line(tokens.iter().map(|token| token.to_string())).expect("command parses")
}

fn ec2_fixture() -> Value {
    json!({
        "Reservations": [
            {"ReservationId": "r-1", "Instances": [
                {"InstanceId": "i-1", "State": {"Name": "running"}},
                {"InstanceId": "i-2", "State": {"Name": "stopped"}}
            ]},
            {"ReservationId": "r-2", "Instances": [
                {"InstanceId": "i-3", "State": {"Name": "running"}}
            ]}
        ]
    })
}

#[tokio::test]
async fn table_projects_selected_columns_per_instance() {
    let api = Arc::new(StubApi::new().respond("DescribeInstances", ec2_fixture()));
    let app = app(&api, &read_only_rules());
    let command = parse(&["ec2", "describe-instances", "--", "InstanceId", "State.Name"]);

    let output = run_command(&app, &command).await.expect("command succeeds");
    let lines: Vec<&str> = output.stdout.lines().collect();
    // Header, underline, then one row per instance in reservation order.
    assert_eq!(lines.len(), 5);
    assert!(lines[0].starts_with("InstanceId"));
    assert!(lines[2].starts_with("i-1") && lines[2].contains("running"));
    assert!(lines[3].starts_with("i-2") && lines[3].contains("stopped"));
    assert!(lines[4].starts_with("i-3") && lines[4].contains("running"));
}

#[tokio::test]
async fn value_filters_keep_only_matching_instances() {
    let api = Arc::new(StubApi::new().respond("DescribeInstances", ec2_fixture()));
    let app = app(&api, &read_only_rules());
    let command = parse(&["ec2", "describe-instances", "running", "--", "InstanceId"]);

    let output = run_command(&app, &command).await.expect("command succeeds");
    let rows: Vec<&str> = output.stdout.lines().skip(2).collect();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].starts_with("i-1"));
    assert!(rows[1].starts_with("i-3"));
    assert!(!output.stdout.contains("i-2"));
}

#[tokio::test]
async fn hinted_resolution_fans_out_per_cluster_in_lexical_order() {
    let api = Arc::new(
        StubApi::new()
            .respond("ListClusters", json!({"clusters": ["stage", "prod"]}))
            .respond_with("DescribeNodegroup", |params| {
                Ok(json!({"nodegroup": {"clusterName": params["clusterName"]}}))
            }),
    );
    let app = app(&api, &read_only_rules());
    let command = parse(&[
        "-j",
        "eks",
        "describe-nodegroup",
        "-p",
        "nodegroupName=workers",
        "-i",
        "list-clus:cluster",
    ]);

    let output = run_command(&app, &command).await.expect("command succeeds");
    let parsed: Value = serde_json::from_str(&output.stdout).expect("valid json");
    let rows = parsed.as_array().expect("array");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["nodegroup.clusterName"], json!("prod"));
    assert_eq!(rows[1]["nodegroup.clusterName"], json!("stage"));
}

#[tokio::test]
async fn json_mode_emits_filtered_records() {
    let api = Arc::new(StubApi::new().respond(
        "ListBuckets",
        json!({
            "Buckets": [
                {"Name": "prod-backup", "CreationDate": "2024-01-01"},
                {"Name": "prod-logs", "CreationDate": "2024-02-01"}
            ],
            "Owner": {"DisplayName": "me"}
        }),
    ));
    let app = app(&api, &read_only_rules());
    let command = parse(&["--json", "s3", "list-buckets", "backup"]);

    let output = run_command(&app, &command).await.expect("command succeeds");
    let parsed: Value = serde_json::from_str(&output.stdout).expect("valid json");
    let rows = parsed.as_array().expect("array");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["Name"], json!("prod-backup"));
    assert_eq!(rows[0]["CreationDate"], json!("2024-01-01"));
}

#[tokio::test]
async fn dry_run_prints_resolved_target_calls_without_issuing_them() {
    let api = Arc::new(StubApi::new().respond(
        "ListUsers",
        json!({"Users": [{"UserName": "alice"}, {"UserName": "bob"}]}),
    ));
    let app = app(&api, &read_only_rules());
    let command = parse(&["--dry-run", "iam", "list-access-keys", "-i", ":username"]);

    let output = run_command(&app, &command).await.expect("command succeeds");
    assert_eq!(
        output.stdout,
        "iam ListAccessKeys {UserName: alice}\niam ListAccessKeys {UserName: bob}"
    );
    assert_eq!(api.calls_to("ListUsers"), 1);
    assert_eq!(api.calls_to("ListAccessKeys"), 0);
}

#[tokio::test]
async fn hint_limit_caps_the_harvested_fanout() {
    let names: Vec<Value> = (0..20)
        .map(|index| json!({"Name": format!("param-{index:02}")}))
        .collect();
    let api = Arc::new(
        StubApi::new()
            .respond("DescribeParameters", json!({"Parameters": names}))
            .respond_with("GetParameters", |params| {
                Ok(json!({"Parameters": [{"Name": params["Names"][0]}]}))
            }),
    );
    let app = app(&api, &read_only_rules());
    let command = parse(&["ssm", "get-parameters", "-i", "::5"]);

    run_command(&app, &command).await.expect("command succeeds");
    assert_eq!(api.calls_to("GetParameters"), 5);
}

#[tokio::test]
async fn repeated_runs_render_byte_identical_output() {
    let api = Arc::new(
        StubApi::new()
            .respond("ListClusters", json!({"clusters": ["delta", "alpha", "bravo"]}))
            .respond_with("DescribeCluster", |params| {
                Ok(json!({"cluster": {"name": params["name"], "status": "ACTIVE"}}))
            }),
    );
    let app = app(&api, &read_only_rules());
    let command = parse(&["eks", "describe-cluster", "--", "name", "status"]);

    let first = run_command(&app, &command).await.expect("first run");
    let second = run_command(&app, &command).await.expect("second run");
    assert_eq!(first.stdout, second.stdout);
    let rows: Vec<&str> = first.stdout.lines().skip(2).collect();
    assert!(rows[0].starts_with("alpha"));
    assert!(rows[2].starts_with("delta"));
}

#[tokio::test]
async fn keys_mode_output_covers_every_projectable_path() {
    let api = Arc::new(StubApi::new().respond("DescribeInstances", ec2_fixture()));
    let app = app(&api, &read_only_rules());

    let keys_output = run_command(&app, &parse(&["-k", "ec2", "describe-instances"]))
        .await
        .expect("keys mode succeeds");
    let keys: Vec<&str> = keys_output.stdout.lines().map(str::trim).collect();
    for path in [
        "ReservationId",
        "Instances.0.InstanceId",
        "Instances.0.State.Name",
        "Instances.1.InstanceId",
    ] {
        assert!(keys.contains(&path), "keys mode missing {path}");
    }
}

#[tokio::test]
async fn policy_denial_and_unresolvable_parameters_map_to_distinct_exit_codes() {
    let api = Arc::new(StubApi::new());
    let denied = run_command(&app(&api, &read_only_rules()), &parse(&["ec2", "terminate-instances"]))
        .await
        .expect_err("mutation denied");
    assert!(matches!(
        denied.downcast_ref::<ResolveError>(),
        Some(ResolveError::PolicyDenied { .. })
    ));
    assert_eq!(exit_code_for(&denied), 2);

    // Sources for UserName are all denied, so resolution must fail closed.
    let unresolvable = run_command(
        &app(&api, &["iam:ListAccessKeys"]),
        &parse(&["iam", "list-access-keys"]),
    )
    .await
    .expect_err("unresolvable");
    assert_eq!(exit_code_for(&unresolvable), 3);
    assert!(api.calls.lock().expect("call log lock").is_empty());

    let unknown = run_command(
        &app(&api, &read_only_rules()),
        &parse(&["ec2", "describe-gadgets"]),
    )
    .await
    .expect_err("unknown action");
    assert_eq!(exit_code_for(&unknown), 4);
}

#[tokio::test]
async fn bare_invocation_lists_policy_visible_services() {
    let api = Arc::new(StubApi::new());
    let app = app(&api, &["ec2:Describe*", "s3:List*"]);
    let output = run_command(&app, &parse(&[])).await.expect("listing succeeds");
    let services: Vec<&str> = output.stdout.lines().collect();
    assert_eq!(services, vec!["ec2", "s3"]);

    let actions = run_command(&app, &parse(&["s3"])).await.expect("actions listing");
    assert_eq!(actions.stdout, "list-buckets");
}

#[tokio::test]
async fn per_value_failures_are_warnings_not_errors() {
    let api = Arc::new(
        StubApi::new()
            .respond("ListClusters", json!({"clusters": ["bad", "good"]}))
            .respond_with("DescribeCluster", |params| {
                if params["name"] == json!("bad") {
                    return Err(TransportError::Api {
                        service: "eks".to_string(),
                        action: "DescribeCluster".to_string(),
                        status: 404,
                        code: "ResourceNotFoundException".to_string(),
                        message: "no such cluster".to_string(),
                    });
                }
                Ok(json!({"cluster": {"name": "good"}}))
            }),
    );
    let app = app(&api, &read_only_rules());
    let command = parse(&["-j", "eks", "describe-cluster"]);

    let output = run_command(&app, &command).await.expect("command succeeds");
    assert_eq!(output.warnings.len(), 1);
    assert!(output.warnings[0].contains("ResourceNotFoundException"));
    let parsed: Value = serde_json::from_str(&output.stdout).expect("valid json");
    assert_eq!(parsed.as_array().expect("array").len(), 1);
}
