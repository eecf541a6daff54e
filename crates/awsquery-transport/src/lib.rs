//! Transport seam between the resolver and the AWS HTTP APIs.
//!
//! `AwsTransport` is the single-page call contract; `SigV4Transport` is the
//! production implementation that signs requests with SigV4 and speaks the
//! JSON wire protocols. `Invoker` drives one operation to completion:
//! pagination, page merging, and dry-run short-circuiting.

pub mod http;
pub mod invoker;
pub mod retry;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use awsquery_catalog::OperationShape;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no AWS credentials available: {0}")]
    MissingCredentials(String),
    #[error("no AWS region configured; pass --region or set AWS_REGION")]
    MissingRegion,
    #[error("service '{service}' speaks the {protocol} protocol, which this client cannot dispatch")]
    UnsupportedProtocol { service: String, protocol: String },
    #[error("failed to sign request for {service}:{action}: {message}")]
    Signing {
        service: String,
        action: String,
        message: String,
    },
    #[error("http failure calling {service}:{action}: {source}")]
    Http {
        service: String,
        action: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{service}:{action} failed with {code} (status {status}): {message}")]
    Api {
        service: String,
        action: String,
        status: u16,
        code: String,
        message: String,
    },
    #[error("invalid response payload from {service}:{action}: {source}")]
    Decode {
        service: String,
        action: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One-page call contract consumed by the invoker. Implementations submit a
/// single request with the given parameters and return the decoded response
/// tree; pagination is the invoker's job.
#[async_trait]
pub trait AwsTransport: Send + Sync {
    async fn call(
        &self,
        shape: &OperationShape,
        params: &Map<String, Value>,
    ) -> Result<Value, TransportError>;
}

pub use http::SigV4Transport;
pub use invoker::{CallOutput, Invoker};
