//! Service catalog adapter: machine-readable operation shape tables.
//!
//! Rust's AWS SDK exposes no runtime model introspection, so the catalog
//! consumes model documents distilled from the AWS service definitions:
//! bundled ones embedded in the binary, plus optional external documents
//! from a models directory.

pub mod catalog;
pub mod model;

pub use catalog::{CatalogError, OperationShape, ServiceCatalog, MODELS_DIR_ENV};
pub use model::{FieldKind, HttpRoute, InputField, OperationModel, Pagination, Protocol, ServiceModel};
