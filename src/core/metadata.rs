//! Entity and resource metadata lookups
//!
//! Two collaborators are consumed by the query layer and the state pipeline:
//!
//! - [`ClassMetadataFactory`]: identifier shape, fields and associations of an
//!   entity class (what the relational mapping knows)
//! - [`ResourceMetadataFactory`]: the operations a resource class exposes
//!
//! Both ship with a registry implementation that is filled once at startup
//! and only read afterwards.

use crate::core::error::{ArgumentError, NotFoundError, PlatformResult};
use crate::core::operation::Operation;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Storage type of an entity field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    String,
    Integer,
    Float,
    Boolean,
    Uuid,
    DateTime,
}

impl FieldType {
    /// Convert a raw identifier taken from a URI into a typed value
    pub fn parse_identifier(&self, field: &str, raw: &str) -> PlatformResult<Value> {
        let invalid = |message: &str| ArgumentError::InvalidIdentifier {
            field: field.to_string(),
            value: raw.to_string(),
            message: message.to_string(),
        };

        let value = match self {
            FieldType::String | FieldType::DateTime => Value::String(raw.to_string()),
            FieldType::Integer => raw
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| invalid("expected an integer"))?,
            FieldType::Float => raw
                .parse::<f64>()
                .map(Value::from)
                .map_err(|_| invalid("expected a number"))?,
            FieldType::Boolean => match raw {
                "true" | "1" => Value::Bool(true),
                "false" | "0" => Value::Bool(false),
                _ => return Err(invalid("expected a boolean").into()),
            },
            FieldType::Uuid => uuid::Uuid::parse_str(raw)
                .map(|id| Value::String(id.to_string()))
                .map_err(|_| invalid("expected a UUID"))?,
        };
        Ok(value)
    }
}

/// Cardinality of an association
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    ToOne,
    ToMany,
}

/// Fetch mode declared on an association
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    #[default]
    Lazy,
    Eager,
}

/// Association between two entity classes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Association {
    pub name: String,

    /// Target entity class
    pub target: String,

    pub kind: AssociationKind,

    #[serde(default)]
    pub fetch: FetchMode,

    /// To-one: local field holding the target identifier
    #[serde(default)]
    pub join_column: Option<String>,

    /// To-many: fields on the target holding this entity's identifier, one
    /// per identifier field and in the same order
    ///
    /// A single column may be written as a plain string.
    #[serde(default, deserialize_with = "one_or_many")]
    pub mapped_by: Vec<String>,

    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Columns {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Columns::deserialize(deserializer)? {
        Columns::One(column) => vec![column],
        Columns::Many(columns) => columns,
    })
}

impl Association {
    pub fn is_to_many(&self) -> bool {
        self.kind == AssociationKind::ToMany
    }
}

/// Shape of an entity identifier, as far as pagination is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierShape {
    /// One locally generated key
    Simple,
    /// The identifier is (or contains) the key of an associated entity
    ForeignKey,
    /// Several identifier fields
    Composite,
}

/// Mapping metadata of an entity class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetadata {
    pub name: String,

    /// Identifier fields, in declaration order
    pub identifier: Vec<String>,

    #[serde(default)]
    pub fields: IndexMap<String, FieldType>,

    #[serde(default)]
    pub associations: Vec<Association>,
}

impl ClassMetadata {
    pub fn new(name: impl Into<String>, identifier: &[&str]) -> Self {
        Self {
            name: name.into(),
            identifier: identifier.iter().map(|s| s.to_string()).collect(),
            fields: IndexMap::new(),
            associations: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.insert(name.into(), field_type);
        self
    }

    pub fn with_association(mut self, association: Association) -> Self {
        self.associations.push(association);
        self
    }

    pub fn association(&self, name: &str) -> Option<&Association> {
        self.associations.iter().find(|a| a.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name) || self.identifier.iter().any(|id| id == name)
    }

    pub fn field_type(&self, name: &str) -> FieldType {
        self.fields.get(name).copied().unwrap_or_default()
    }

    pub fn is_identifier_composite(&self) -> bool {
        self.identifier.len() > 1
    }

    /// Whether an identifier field is the join column of a to-one association
    pub fn contains_foreign_identifier(&self) -> bool {
        self.identifier.iter().any(|id| {
            self.associations.iter().any(|a| {
                a.kind == AssociationKind::ToOne && a.join_column.as_deref() == Some(id.as_str())
            })
        })
    }

    pub fn identifier_shape(&self) -> IdentifierShape {
        if self.is_identifier_composite() {
            IdentifierShape::Composite
        } else if self.contains_foreign_identifier() {
            IdentifierShape::ForeignKey
        } else {
            IdentifierShape::Simple
        }
    }

    pub fn has_eager_association(&self) -> bool {
        self.associations.iter().any(|a| a.fetch == FetchMode::Eager)
    }
}

/// Lookup of entity mapping metadata
pub trait ClassMetadataFactory: Send + Sync {
    fn metadata_for(&self, class: &str) -> Option<Arc<ClassMetadata>>;

    /// Like [`metadata_for`](Self::metadata_for) but a miss is an error
    fn get(&self, class: &str) -> PlatformResult<Arc<ClassMetadata>> {
        self.metadata_for(class).ok_or_else(|| {
            NotFoundError::ResourceClass {
                resource_class: class.to_string(),
            }
            .into()
        })
    }
}

/// Registry of entity mapping metadata
#[derive(Debug, Default)]
pub struct EntityMetadataRegistry {
    classes: HashMap<String, Arc<ClassMetadata>>,
}

impl EntityMetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class; a class with the same name is replaced
    pub fn register(&mut self, metadata: ClassMetadata) {
        self.classes
            .insert(metadata.name.clone(), Arc::new(metadata));
    }

    pub fn with(mut self, metadata: ClassMetadata) -> Self {
        self.register(metadata);
        self
    }

    pub fn classes(&self) -> impl Iterator<Item = &Arc<ClassMetadata>> {
        self.classes.values()
    }
}

impl ClassMetadataFactory for EntityMetadataRegistry {
    fn metadata_for(&self, class: &str) -> Option<Arc<ClassMetadata>> {
        self.classes.get(class).cloned()
    }
}

/// The operations exposed for one resource class
#[derive(Debug, Clone)]
pub struct ResourceMetadata {
    pub resource_class: String,
    pub short_name: String,
    pub path: String,
    pub operations: IndexMap<String, Arc<Operation>>,
}

impl ResourceMetadata {
    /// Look an operation up by name
    pub fn operation(&self, name: &str) -> PlatformResult<Arc<Operation>> {
        self.operations.get(name).cloned().ok_or_else(|| {
            NotFoundError::Operation {
                resource_class: self.resource_class.clone(),
                operation: name.to_string(),
            }
            .into()
        })
    }
}

/// Lookup of resource metadata by resource class
pub trait ResourceMetadataFactory: Send + Sync {
    fn create(&self, resource_class: &str) -> PlatformResult<Arc<ResourceMetadata>>;
}

/// Registry of resource metadata
#[derive(Debug, Default)]
pub struct ResourceMetadataRegistry {
    resources: HashMap<String, Arc<ResourceMetadata>>,
}

impl ResourceMetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, metadata: ResourceMetadata) {
        self.resources
            .insert(metadata.resource_class.clone(), Arc::new(metadata));
    }

    pub fn resources(&self) -> impl Iterator<Item = &Arc<ResourceMetadata>> {
        self.resources.values()
    }
}

impl ResourceMetadataFactory for ResourceMetadataRegistry {
    fn create(&self, resource_class: &str) -> PlatformResult<Arc<ResourceMetadata>> {
        self.resources.get(resource_class).cloned().ok_or_else(|| {
            NotFoundError::ResourceClass {
                resource_class: resource_class.to_string(),
            }
            .into()
        })
    }
}
