//! Serde schema for the bundled service model documents.
//!
//! Each document describes one service: wire protocol, endpoint and signing
//! metadata, and per-operation input fields, output root, HTTP route, and
//! pagination tokens. Documents are distilled from the AWS service model
//! JSONs at build time and shipped with the binary.

use serde::Deserialize;

use awsquery_core::to_pascal_case;

/// Wire protocol family declared by a service model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    Json,
    RestJson,
    Query,
    RestXml,
    Ec2,
}

/// Input field kind; list-typed parameters auto-wrap scalar values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldKind {
    Scalar,
    List,
    Structure,
}

/// One operation input field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InputField {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
}

/// HTTP binding for rest-style protocols; `{param}` placeholders in the
/// request URI consume like-named parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HttpRoute {
    pub method: String,
    pub request_uri: String,
}

/// Pagination token wiring for one operation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Pagination {
    pub input_token: String,
    pub output_token: String,
    #[serde(default)]
    pub limit_key: Option<String>,
}

/// One API operation: canonical name plus input/output shape summary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OperationModel {
    pub name: String,
    #[serde(default)]
    pub http: Option<HttpRoute>,
    #[serde(default)]
    pub input: Vec<InputField>,
    #[serde(default)]
    pub output_list_key: Option<String>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

impl OperationModel {
    pub fn required_fields(&self) -> impl Iterator<Item = &InputField> {
        self.input.iter().filter(|field| field.required)
    }

    /// Looks up an input field case-insensitively.
    pub fn field(&self, name: &str) -> Option<&InputField> {
        self.input
            .iter()
            .find(|field| field.name.eq_ignore_ascii_case(name))
    }

    /// Resolves a loosely-cased parameter name to the model's spelling:
    /// exact match, case-insensitive match, then PascalCase conversion.
    pub fn canonical_field_name(&self, name: &str) -> Option<&str> {
        if let Some(field) = self.input.iter().find(|field| field.name == name) {
            return Some(&field.name);
        }
        if let Some(field) = self.field(name) {
            return Some(&field.name);
        }
        let pascal = to_pascal_case(name);
        self.input
            .iter()
            .find(|field| field.name == pascal)
            .map(|field| field.name.as_str())
    }

    /// True when the operation takes no required input at all.
    pub fn is_parameter_free(&self) -> bool {
        self.required_fields().next().is_none()
    }
}

/// One service's model document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceModel {
    pub service: String,
    pub endpoint_prefix: String,
    #[serde(default)]
    pub signing_name: Option<String>,
    pub protocol: Protocol,
    pub api_version: String,
    #[serde(default)]
    pub target_prefix: Option<String>,
    #[serde(default)]
    pub json_version: Option<String>,
    pub operations: Vec<OperationModel>,
}

impl ServiceModel {
    /// Finds an operation by name in kebab, snake, or Camel form,
    /// case-insensitively.
    pub fn operation(&self, action: &str) -> Option<&OperationModel> {
        let canonical = to_pascal_case(action);
        self.operations
            .iter()
            .find(|operation| operation.name == canonical)
            .or_else(|| {
                self.operations
                    .iter()
                    .find(|operation| operation.name.eq_ignore_ascii_case(&canonical))
            })
    }

    pub fn signing_name(&self) -> &str {
        self.signing_name.as_deref().unwrap_or(&self.endpoint_prefix)
    }
}
