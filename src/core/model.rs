//! Model catalog: per-entity metadata registered at startup
//!
//! The catalog answers, in O(1), the questions a session or repository asks
//! about an entity type: which table holds it, which field is its key and of
//! what kind, how keys are generated, and which navigations can be eagerly
//! loaded.

use crate::core::entity::Entity;
use crate::core::error::{ConfigError, Result};
use crate::core::field::ValueKind;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// How a session fills in a key that the caller left unset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyGeneration {
    /// The caller always supplies the key
    #[default]
    None,
    /// Integer sequence owned by the store
    Identity,
    /// Random v4 UUID
    Uuid,
}

/// Declared key of an entity type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyDefinition {
    /// Field holding the key
    pub field: String,

    /// Value kind of the key
    pub kind: ValueKind,

    #[serde(default)]
    pub generation: KeyGeneration,
}

impl Default for KeyDefinition {
    /// Integer `id`, supplied by the caller
    fn default() -> Self {
        Self {
            field: default_key_field(),
            kind: ValueKind::Integer,
            generation: KeyGeneration::None,
        }
    }
}

/// A relationship that can be eagerly loaded
///
/// Rows of `target` whose `foreign_field` equals the parent's `local_field`
/// are attached to the parent under `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Navigation {
    /// Property name the related data is attached under
    pub name: String,

    /// Entity name of the related type
    pub target: String,

    /// Field on the parent
    #[serde(default = "default_key_field")]
    pub local_field: String,

    /// Field on the related rows
    #[serde(default = "default_key_field")]
    pub foreign_field: String,

    /// Collection (`true`) or single reference (`false`)
    #[serde(default)]
    pub many: bool,
}

fn default_key_field() -> String {
    "id".to_string()
}

impl Navigation {
    /// One-to-many: `target.foreign_field` references this entity's `id`
    pub fn has_many(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            local_field: default_key_field(),
            foreign_field: foreign_field.into(),
            many: true,
        }
    }

    /// Many-to-one: this entity's `local_field` references `target.id`
    pub fn belongs_to(
        name: impl Into<String>,
        target: impl Into<String>,
        local_field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            local_field: local_field.into(),
            foreign_field: default_key_field(),
            many: false,
        }
    }

    /// Override the field on the parent side
    pub fn with_local_field(mut self, field: impl Into<String>) -> Self {
        self.local_field = field.into();
        self
    }

    /// Override the field on the related side
    pub fn with_foreign_field(mut self, field: impl Into<String>) -> Self {
        self.foreign_field = field.into();
        self
    }
}

/// Metadata of one entity type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityModel {
    /// Entity name, matches [`Entity::entity_name`]
    pub name: String,

    /// Backing table; defaults to the entity name
    #[serde(default)]
    pub table: Option<String>,

    #[serde(default)]
    pub key: KeyDefinition,

    #[serde(default)]
    pub navigations: Vec<Navigation>,
}

impl EntityModel {
    /// Start a model with an integer `id` key supplied by the caller
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            key: KeyDefinition::default(),
            navigations: Vec::new(),
        }
    }

    /// Start a model for an entity type
    pub fn of<T: Entity>() -> Self {
        Self::new(T::entity_name())
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn key(mut self, field: impl Into<String>, kind: ValueKind, generation: KeyGeneration) -> Self {
        self.key = KeyDefinition {
            field: field.into(),
            kind,
            generation,
        };
        self
    }

    pub fn navigation(mut self, navigation: Navigation) -> Self {
        self.navigations.push(navigation);
        self
    }

    /// Backing table name
    pub fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.name)
    }

    pub fn find_navigation(&self, name: &str) -> Result<&Navigation> {
        self.navigations
            .iter()
            .find(|n| n.name == name)
            .ok_or_else(|| {
                ConfigError::UnknownNavigation {
                    entity_type: self.name.clone(),
                    navigation: name.to_string(),
                }
                .into()
            })
    }

    /// Whether `field` is a navigation rather than a stored column
    pub fn is_navigation(&self, field: &str) -> bool {
        self.navigations.iter().any(|n| n.name == field)
    }
}

/// Registry of entity models, keyed by entity name
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    entities: IndexMap<String, EntityModel>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model, replacing any previous one with the same name
    pub fn register(&mut self, model: EntityModel) -> &mut Self {
        self.entities.insert(model.name.clone(), model);
        self
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, model: EntityModel) -> Self {
        self.register(model);
        self
    }

    /// Look up a model by entity name
    pub fn find(&self, entity_type: &str) -> Result<&EntityModel> {
        self.entities.get(entity_type).ok_or_else(|| {
            ConfigError::UnknownEntity {
                entity_type: entity_type.to_string(),
            }
            .into()
        })
    }

    /// Look up the model of an entity type
    pub fn model_of<T: Entity>(&self) -> Result<&EntityModel> {
        self.find(T::entity_name())
    }

    pub fn contains(&self, entity_type: &str) -> bool {
        self.entities.contains_key(entity_type)
    }

    pub fn models(&self) -> impl Iterator<Item = &EntityModel> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
