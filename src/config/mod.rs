//! Model configuration loading and validation
//!
//! The model catalog can be declared in YAML instead of code:
//!
//! ```yaml
//! entities:
//!   - name: person
//!     table: people
//!     key: { field: id, kind: integer, generation: identity }
//!     navigations:
//!       - { name: orders, target: order, foreign_field: person_id, many: true }
//!   - name: order
//!     table: orders
//!     key: { field: id, kind: integer, generation: identity }
//! ```

use crate::core::error::{ConfigError, Result};
use crate::core::model::{EntityModel, ModelCatalog};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Declarative form of a [`ModelCatalog`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Entity models, in registration order
    #[serde(default)]
    pub entities: Vec<EntityModel>,
}

impl ModelConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound {
                path: display.clone(),
            },
            _ => ConfigError::ParseError {
                file: Some(display.clone()),
                message: e.to_string(),
            },
        })?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            file: Some(display),
            message: e.to_string(),
        })
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError {
            file: None,
            message: e.to_string(),
        })
    }

    /// Check the models are consistent with each other
    ///
    /// Entity names must be unique, every key must name a field, and every
    /// navigation must point at a declared entity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for model in &self.entities {
            if !names.insert(model.name.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "entities.name".to_string(),
                    value: model.name.clone(),
                    message: "entity declared more than once".to_string(),
                });
            }
            if model.key.field.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("{}.key.field", model.name),
                    value: model.key.field.clone(),
                    message: "key field must not be empty".to_string(),
                });
            }
        }

        for model in &self.entities {
            let mut navigations = HashSet::new();
            for navigation in &model.navigations {
                if !navigations.insert(navigation.name.as_str()) {
                    return Err(ConfigError::InvalidValue {
                        field: format!("{}.navigations.name", model.name),
                        value: navigation.name.clone(),
                        message: "navigation declared more than once".to_string(),
                    });
                }
                if !names.contains(navigation.target.as_str()) {
                    return Err(ConfigError::UnknownEntity {
                        entity_type: navigation.target.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Validate and build the catalog
    pub fn into_catalog(self) -> Result<ModelCatalog, ConfigError> {
        self.validate()?;
        Ok(self
            .entities
            .into_iter()
            .fold(ModelCatalog::new(), |catalog, model| catalog.with(model)))
    }
}

impl From<&ModelCatalog> for ModelConfig {
    fn from(catalog: &ModelCatalog) -> Self {
        Self {
            entities: catalog.models().cloned().collect(),
        }
    }
}

/// Load a YAML file straight into a catalog
pub fn load_catalog(path: impl AsRef<Path>) -> Result<ModelCatalog> {
    Ok(ModelConfig::from_yaml_file(path)?.into_catalog()?)
}
