//! Service catalog: lazily parsed, cached service model lookup.
//!
//! Bundled model documents are embedded in the binary; additional documents
//! can be supplied through a models directory and override bundled entries
//! of the same service name. Parsed models are published once per service
//! and shared between concurrent readers.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::model::{OperationModel, ServiceModel};

/// Environment variable naming a directory of extra model documents.
pub const MODELS_DIR_ENV: &str = "AWSQUERY_MODELS_DIR";

const BUNDLED_MODELS: &[(&str, &str)] = &[
    ("cloudformation", include_str!("../models/cloudformation.json")),
    ("ec2", include_str!("../models/ec2.json")),
    ("eks", include_str!("../models/eks.json")),
    ("iam", include_str!("../models/iam.json")),
    ("s3", include_str!("../models/s3.json")),
    ("ssm", include_str!("../models/ssm.json")),
];

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("unknown service '{service}'")]
    UnknownService { service: String },
    #[error("unknown action '{action}' for service '{service}'")]
    UnknownAction { service: String, action: String },
    #[error("model document for '{service}' is invalid: {source}")]
    InvalidModel {
        service: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to read models directory {path}: {source}")]
    ModelsDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

enum RawModel {
    Bundled(&'static str),
    External(String),
}

impl RawModel {
    fn as_str(&self) -> &str {
        match self {
            RawModel::Bundled(text) => text,
            RawModel::External(text) => text,
        }
    }
}

/// Operation shape: the operation's model entry plus its owning service model.
#[derive(Debug, Clone)]
pub struct OperationShape {
    pub service: String,
    pub model: Arc<ServiceModel>,
    pub operation: OperationModel,
}

/// Catalog over all known service models.
pub struct ServiceCatalog {
    raw: HashMap<String, RawModel>,
    parsed: RwLock<HashMap<String, Arc<ServiceModel>>>,
}

impl ServiceCatalog {
    /// Catalog over the bundled model documents only.
    pub fn bundled() -> Self {
        let raw = BUNDLED_MODELS
            .iter()
            .map(|&(service, text)| (service.to_string(), RawModel::Bundled(text)))
            .collect();
        Self {
            raw,
            parsed: RwLock::new(HashMap::new()),
        }
    }

    /// Bundled catalog extended with `*.json` documents from a directory.
    /// External documents override bundled services of the same name.
    pub fn with_models_dir(models_dir: &Path) -> Result<Self, CatalogError> {
        let mut catalog = Self::bundled();
        let entries = std::fs::read_dir(models_dir).map_err(|source| CatalogError::ModelsDir {
            path: models_dir.display().to_string(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| CatalogError::ModelsDir {
                path: models_dir.display().to_string(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let text = std::fs::read_to_string(&path).map_err(|source| CatalogError::ModelsDir {
                path: path.display().to_string(),
                source,
            })?;
            let service = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or_default()
                .to_ascii_lowercase();
            if service.is_empty() {
                continue;
            }
            tracing::debug!(service = %service, path = %path.display(), "registered external service model");
            catalog.raw.insert(service, RawModel::External(text));
        }
        Ok(catalog)
    }

    /// All known service names, sorted.
    pub fn list_services(&self) -> Vec<String> {
        let mut services: Vec<String> = self.raw.keys().cloned().collect();
        services.sort();
        services
    }

    /// Canonical operation names for one service, sorted.
    pub fn list_operations(&self, service: &str) -> Result<Vec<String>, CatalogError> {
        let model = self.service_model(service)?;
        let mut names: Vec<String> = model
            .operations
            .iter()
            .map(|operation| operation.name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Parses (once) and returns the model for a service.
    pub fn service_model(&self, service: &str) -> Result<Arc<ServiceModel>, CatalogError> {
        let key = service.to_ascii_lowercase();
        let parsed = self.parsed.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(model) = parsed.get(&key) {
            return Ok(Arc::clone(model));
        }
        drop(parsed);
        let raw = self.raw.get(&key).ok_or_else(|| CatalogError::UnknownService {
            service: key.clone(),
        })?;
        let model: ServiceModel =
            serde_json::from_str(raw.as_str()).map_err(|source| CatalogError::InvalidModel {
                service: key.clone(),
                source,
            })?;
        let model = Arc::new(model);
        let mut parsed = self.parsed.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = parsed.entry(key).or_insert_with(|| Arc::clone(&model));
        Ok(Arc::clone(entry))
    }

    /// Looks up one operation's shape; the action may arrive in any casing.
    pub fn describe(&self, service: &str, action: &str) -> Result<OperationShape, CatalogError> {
        let model = self.service_model(service)?;
        let operation = model
            .operation(action)
            .cloned()
            .ok_or_else(|| CatalogError::UnknownAction {
                service: service.to_ascii_lowercase(),
                action: action.to_string(),
            })?;
        Ok(OperationShape {
            service: service.to_ascii_lowercase(),
            model,
            operation,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn bundled_catalog_lists_expected_services() {
        let catalog = ServiceCatalog::bundled();
        let services = catalog.list_services();
        for expected in ["cloudformation", "ec2", "eks", "iam", "s3", "ssm"] {
            assert!(services.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[test]
    fn bundled_models_all_parse() {
        let catalog = ServiceCatalog::bundled();
        for service in catalog.list_services() {
            let model = catalog.service_model(&service).expect("bundled model parses");
            assert!(!model.operations.is_empty(), "{service} has operations");
            assert_eq!(model.service, service);
        }
    }

    #[test]
    fn describe_resolves_kebab_case_actions() {
        let catalog = ServiceCatalog::bundled();
        let shape = catalog.describe("eks", "describe-nodegroup").expect("shape");
        assert_eq!(shape.operation.name, "DescribeNodegroup");
        assert_eq!(shape.operation.required_fields().count(), 2);
    }

    #[test]
    fn unknown_lookups_fail_with_typed_errors() {
        let catalog = ServiceCatalog::bundled();
        assert!(matches!(
            catalog.service_model("nonesuch"),
            Err(CatalogError::UnknownService { .. })
        ));
        assert!(matches!(
            catalog.describe("ec2", "frobnicate-instances"),
            Err(CatalogError::UnknownAction { .. })
        ));
    }

    #[test]
    fn parsed_models_are_shared_between_lookups() {
        let catalog = ServiceCatalog::bundled();
        let first = catalog.service_model("ec2").expect("model");
        let second = catalog.service_model("EC2").expect("model");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn external_models_extend_and_override_bundled_ones() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut custom = std::fs::File::create(dir.path().join("widgets.json")).expect("create");
        write!(
            custom,
            r#"{{
                "service": "widgets",
                "endpoint_prefix": "widgets",
                "protocol": "json",
                "api_version": "2024-01-01",
                "target_prefix": "Widgets",
                "json_version": "1.1",
                "operations": [{{"name": "ListWidgets", "output_list_key": "Widgets"}}]
            }}"#
        )
        .expect("write model");

        let catalog = ServiceCatalog::with_models_dir(dir.path()).expect("catalog");
        assert!(catalog.list_services().contains(&"widgets".to_string()));
        let shape = catalog.describe("widgets", "list-widgets").expect("shape");
        assert_eq!(shape.operation.output_list_key.as_deref(), Some("Widgets"));
        // Bundled services remain available alongside external ones.
        assert!(catalog.describe("s3", "list-buckets").is_ok());
    }
}
