//! SigV4-signed HTTP dispatch for the JSON wire protocols.
//!
//! Credentials come from the standard chain via `aws-config`; each request is
//! signed with `aws-sigv4` against the service's signing name. Supported
//! protocols are awsjson 1.0/1.1 (`X-Amz-Target` POST) and rest-json (route
//! templates); anything else fails with `UnsupportedProtocol` before any
//! bytes leave the process.

use async_trait::async_trait;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_sigv4::http_request::{sign, SignableBody, SignableRequest, SigningSettings};
use aws_sigv4::sign::v4;
use serde_json::{Map, Value};

use awsquery_catalog::{OperationShape, Protocol};

use crate::retry::{is_retryable_http_error, next_backoff_ms, should_retry_status, MAX_ATTEMPTS};
use crate::{AwsTransport, TransportError};

/// Production transport: SigV4-signed reqwest calls to regional endpoints.
pub struct SigV4Transport {
    client: reqwest::Client,
    credentials: SharedCredentialsProvider,
    region: String,
    endpoint_override: Option<String>,
}

impl SigV4Transport {
    /// Resolves credentials and region through the standard chain.
    pub async fn from_env(
        region: Option<String>,
        profile: Option<String>,
    ) -> Result<Self, TransportError> {
        let mut loader = aws_config::from_env();
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }
        let config = loader.load().await;
        let region = config
            .region()
            .map(ToString::to_string)
            .ok_or(TransportError::MissingRegion)?;
        let credentials = config
            .credentials_provider()
            .ok_or_else(|| TransportError::MissingCredentials("no provider in chain".to_string()))?;
        Ok(Self::new(credentials, region))
    }

    pub fn new(credentials: SharedCredentialsProvider, region: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
            region,
            endpoint_override: None,
        }
    }

    /// Sends every request to a fixed base URL instead of the regional
    /// endpoint. Used for local endpoints and tests.
    pub fn with_endpoint_override(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint_override = Some(endpoint.into());
        self
    }

    fn endpoint(&self, shape: &OperationShape) -> String {
        match &self.endpoint_override {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!(
                "https://{}.{}.amazonaws.com",
                shape.model.endpoint_prefix, self.region
            ),
        }
    }

    fn build_request(
        &self,
        shape: &OperationShape,
        params: &Map<String, Value>,
    ) -> Result<PreparedRequest, TransportError> {
        let endpoint = self.endpoint(shape);
        match shape.model.protocol {
            Protocol::Json => {
                let json_version = shape.model.json_version.as_deref().unwrap_or("1.1");
                let target_prefix = shape.model.target_prefix.as_deref().unwrap_or_default();
                let body = serde_json::to_vec(params).map_err(|source| TransportError::Decode {
                    service: shape.service.clone(),
                    action: shape.operation.name.clone(),
                    source,
                })?;
                Ok(PreparedRequest {
                    method: "POST".to_string(),
                    url: format!("{endpoint}/"),
                    headers: vec![
                        (
                            "content-type".to_string(),
                            format!("application/x-amz-json-{json_version}"),
                        ),
                        (
                            "x-amz-target".to_string(),
                            format!("{target_prefix}.{}", shape.operation.name),
                        ),
                    ],
                    body,
                })
            }
            Protocol::RestJson => {
                let (method, template) = match &shape.operation.http {
                    Some(route) => (route.method.clone(), route.request_uri.clone()),
                    None => ("POST".to_string(), "/".to_string()),
                };
                let (path, remaining) = fill_route(&template, params);
                let mut url = format!("{endpoint}{path}");
                let mut headers = Vec::new();
                let body = if method == "GET" || method == "DELETE" {
                    let query: Vec<String> = remaining
                        .iter()
                        .map(|(key, value)| format!("{key}={}", query_value(value)))
                        .collect();
                    if !query.is_empty() {
                        let separator = if url.contains('?') { '&' } else { '?' };
                        url.push(separator);
                        url.push_str(&query.join("&"));
                    }
                    Vec::new()
                } else {
                    headers.push(("content-type".to_string(), "application/json".to_string()));
                    serde_json::to_vec(&remaining).map_err(|source| TransportError::Decode {
                        service: shape.service.clone(),
                        action: shape.operation.name.clone(),
                        source,
                    })?
                };
                Ok(PreparedRequest {
                    method,
                    url,
                    headers,
                    body,
                })
            }
            other => Err(TransportError::UnsupportedProtocol {
                service: shape.service.clone(),
                protocol: format!("{other:?}").to_ascii_lowercase(),
            }),
        }
    }

    async fn sign_request(
        &self,
        shape: &OperationShape,
        request: &mut PreparedRequest,
    ) -> Result<(), TransportError> {
        let signing_error = |message: String| TransportError::Signing {
            service: shape.service.clone(),
            action: shape.operation.name.clone(),
            message,
        };
        let credentials = self
            .credentials
            .provide_credentials()
            .await
            .map_err(|error| TransportError::MissingCredentials(error.to_string()))?;
        let identity = credentials.into();
        let signing_params = v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.region)
            .name(shape.model.signing_name())
            .time(std::time::SystemTime::now())
            .settings(SigningSettings::default())
            .build()
            .map_err(|error| signing_error(error.to_string()))?
            .into();
        let signable_headers: Vec<(&str, &str)> = request
            .headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        let signable = SignableRequest::new(
            &request.method,
            &request.url,
            signable_headers.into_iter(),
            SignableBody::Bytes(&request.body),
        )
        .map_err(|error| signing_error(error.to_string()))?;
        let (instructions, _signature) = sign(signable, &signing_params)
            .map_err(|error| signing_error(error.to_string()))?
            .into_parts();
        for (name, value) in instructions.headers() {
            request.headers.push((name.to_string(), value.to_string()));
        }
        Ok(())
    }

    async fn dispatch_once(
        &self,
        shape: &OperationShape,
        request: &PreparedRequest,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let method: reqwest::Method = request.method.parse().unwrap_or(reqwest::Method::POST);
        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }
        builder.send().await
    }
}

struct PreparedRequest {
    method: String,
    url: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

/// Substitutes `{param}` placeholders in a route template, returning the
/// rendered path and the parameters not consumed by it.
fn fill_route(template: &str, params: &Map<String, Value>) -> (String, Map<String, Value>) {
    let mut remaining = params.clone();
    let mut path = String::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        path.push_str(&rest[..open]);
        let Some(close) = rest[open..].find('}') else {
            rest = &rest[open..];
            break;
        };
        let name = &rest[open + 1..open + close];
        match remaining.shift_remove(name) {
            Some(value) => path.push_str(&query_value(&value)),
            None => {
                path.push('{');
                path.push_str(name);
                path.push('}');
            }
        }
        rest = &rest[open + close + 1..];
    }
    path.push_str(rest);
    (path, remaining)
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn api_error_parts(headers: &reqwest::header::HeaderMap, body: &str) -> (String, String) {
    let header_code = headers
        .get("x-amzn-errortype")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(&[':', '#'][..]).last().unwrap_or(value).to_string());
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let body_code = parsed.as_ref().and_then(|tree| {
        ["__type", "Code", "code"]
            .iter()
            .find_map(|key| tree.get(*key))
            .and_then(Value::as_str)
            .map(|code| code.rsplit('#').next().unwrap_or(code).to_string())
    });
    let message = parsed
        .as_ref()
        .and_then(|tree| {
            ["message", "Message"]
                .iter()
                .find_map(|key| tree.get(*key))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(200).collect());
    (
        header_code.or(body_code).unwrap_or_else(|| "UnknownError".to_string()),
        message,
    )
}

#[async_trait]
impl AwsTransport for SigV4Transport {
    async fn call(
        &self,
        shape: &OperationShape,
        params: &Map<String, Value>,
    ) -> Result<Value, TransportError> {
        let mut request = self.build_request(shape, params)?;
        self.sign_request(shape, &mut request).await?;
        tracing::debug!(
            service = %shape.service,
            action = %shape.operation.name,
            method = %request.method,
            url = %request.url,
            "dispatching request"
        );

        let mut attempt = 0;
        let response = loop {
            match self.dispatch_once(shape, &request).await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if should_retry_status(status) && attempt + 1 < MAX_ATTEMPTS {
                        tracing::debug!(status, attempt, "retrying after retryable status");
                        tokio::time::sleep(std::time::Duration::from_millis(next_backoff_ms(attempt)))
                            .await;
                        attempt += 1;
                        continue;
                    }
                    break response;
                }
                Err(error) if is_retryable_http_error(&error) && attempt + 1 < MAX_ATTEMPTS => {
                    tracing::debug!(%error, attempt, "retrying after transport error");
                    tokio::time::sleep(std::time::Duration::from_millis(next_backoff_ms(attempt)))
                        .await;
                    attempt += 1;
                }
                Err(error) => {
                    return Err(TransportError::Http {
                        service: shape.service.clone(),
                        action: shape.operation.name.clone(),
                        source: error,
                    })
                }
            }
        };

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(|source| TransportError::Http {
            service: shape.service.clone(),
            action: shape.operation.name.clone(),
            source,
        })?;
        if !status.is_success() {
            let (code, message) = api_error_parts(&headers, &body);
            return Err(TransportError::Api {
                service: shape.service.clone(),
                action: shape.operation.name.clone(),
                status: status.as_u16(),
                code,
                message,
            });
        }
        if body.trim().is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        serde_json::from_str(&body).map_err(|source| TransportError::Decode {
            service: shape.service.clone(),
            action: shape.operation.name.clone(),
            source,
        })
    }
}
