//! Configuration loading and management
//!
//! The whole platform is described by one YAML document:
//!
//! ```yaml
//! logging: { level: debug }
//! pagination: { items_per_page: 30, client_items_per_page: true }
//! eager_loading: { max_joins: 30 }
//! entities:
//!   - name: Book
//!     identifier: [id]
//!     fields: { id: integer, title: string }
//!     associations:
//!       - { name: author, target: Author, kind: to_one, join_column: author_id, fetch: eager }
//! filters:
//!   book.search: { type: search, properties: { title: ipartial } }
//! resources:
//!   - class: Book
//!     short_name: Book
//!     operations:
//!       get_collection: { method: GET, kind: collection, filters: [book.search] }
//!       get: { method: GET }
//! ```
//!
//! Every section is optional and falls back to documented defaults.

use crate::core::auth::AuthPolicy;
use crate::core::error::{ConfigError, PlatformResult};
use crate::core::metadata::{
    ClassMetadata, ClassMetadataFactory, EntityMetadataRegistry, ResourceMetadata,
    ResourceMetadataRegistry,
};
use crate::core::operation::{
    HttpMethod, Operation, OperationKind, OrderDirection, PaginationOptions,
};
use crate::core::validation::ValidationRules;
use crate::filter::{NullsComparison, SearchStrategy};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Platform-wide pagination defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub enabled: bool,
    pub client_enabled: bool,
    pub client_items_per_page: bool,
    pub client_partial: bool,
    pub items_per_page: i64,
    pub maximum_items_per_page: Option<i64>,
    pub partial: bool,
    pub page_parameter_name: String,
    pub enabled_parameter_name: String,
    pub items_per_page_parameter_name: String,
    pub partial_parameter_name: String,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            client_enabled: false,
            client_items_per_page: false,
            client_partial: false,
            items_per_page: 30,
            maximum_items_per_page: None,
            partial: false,
            page_parameter_name: "page".to_string(),
            enabled_parameter_name: "pagination".to_string(),
            items_per_page_parameter_name: "itemsPerPage".to_string(),
            partial_parameter_name: "partial".to_string(),
        }
    }
}

/// Eager loading settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EagerLoadingConfig {
    pub enabled: bool,
    /// Join every association, not only the EAGER ones
    pub force_eager: bool,
    pub max_joins: usize,
}

impl Default for EagerLoadingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            force_eager: false,
            max_joins: 30,
        }
    }
}

/// Default ordering settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderConfig {
    /// Order by identifier when an operation declares no order
    pub default_direction: Option<OrderDirection>,
    pub nulls_comparison: Option<NullsComparison>,
}

/// Priority overrides and disabled stages of one table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageOverrides {
    pub priorities: IndexMap<String, i32>,
    pub disabled: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub providers: StageOverrides,
    pub processors: StageOverrides,
    pub extensions: StageOverrides,
}

/// A configured filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterConfig {
    Search {
        properties: IndexMap<String, SearchStrategy>,
    },
    Range {
        properties: Vec<String>,
    },
    Order {
        properties: Vec<String>,
        #[serde(default)]
        nulls_comparison: Option<NullsComparison>,
        #[serde(default = "default_order_parameter")]
        parameter_name: String,
    },
    Exists {
        properties: Vec<String>,
        #[serde(default = "default_exists_parameter")]
        parameter_name: String,
    },
    /// Output property selection; not a query filter
    Property {
        #[serde(default)]
        properties: Vec<String>,
    },
}

fn default_order_parameter() -> String {
    "order".to_string()
}

fn default_exists_parameter() -> String {
    "exists".to_string()
}

/// One operation of a resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationConfig {
    pub method: HttpMethod,

    /// Defaults to `collection` for POST and `item` otherwise
    #[serde(default)]
    pub kind: Option<OperationKind>,

    #[serde(default)]
    pub path: Option<String>,

    /// `None` inherits the resource filters
    #[serde(default)]
    pub filters: Option<Vec<String>>,

    /// Field-wise override of the resource pagination options
    #[serde(default)]
    pub pagination: Option<PaginationOptions>,

    #[serde(default)]
    pub order: Option<IndexMap<String, OrderDirection>>,

    #[serde(default)]
    pub force_eager: Option<bool>,

    #[serde(default)]
    pub security: Option<String>,
    #[serde(default)]
    pub security_post_denormalize: Option<String>,
    #[serde(default)]
    pub security_post_validation: Option<String>,

    #[serde(default)]
    pub read: Option<bool>,
    #[serde(default)]
    pub deserialize: Option<bool>,
    #[serde(default)]
    pub validate: Option<bool>,
    #[serde(default)]
    pub write: Option<bool>,
    #[serde(default)]
    pub serialize: Option<bool>,

    #[serde(default)]
    pub status: Option<u16>,
}

/// One exposed resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Entity class backing the resource
    pub class: String,

    #[serde(default)]
    pub short_name: Option<String>,

    /// Defaults to `/` + lowercased short name + `s`
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default)]
    pub filters: Vec<String>,

    #[serde(default)]
    pub pagination: PaginationOptions,

    #[serde(default)]
    pub order: IndexMap<String, OrderDirection>,

    /// Default security for operations without their own
    #[serde(default)]
    pub security: Option<String>,

    pub operations: IndexMap<String, OperationConfig>,
}

fn default_formats() -> IndexMap<String, Vec<String>> {
    let mut formats = IndexMap::new();
    formats.insert("json".to_string(), vec!["application/json".to_string()]);
    formats.insert("jsonld".to_string(), vec!["application/ld+json".to_string()]);
    formats
}

/// Complete configuration of the platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Format name => MIME types, first format is the default
    #[serde(default = "default_formats")]
    pub formats: IndexMap<String, Vec<String>>,

    #[serde(default)]
    pub pagination: PaginationConfig,

    #[serde(default)]
    pub eager_loading: EagerLoadingConfig,

    #[serde(default)]
    pub order: OrderConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub entities: Vec<ClassMetadata>,

    #[serde(default)]
    pub filters: IndexMap<String, FilterConfig>,

    /// Field rules, each either a bare name or a single-key map
    /// (`[required, { length: { max: 50 } }]`)
    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub validation: ValidationRules,

    #[serde(default)]
    pub resources: Vec<ResourceConfig>,

    /// Error code => response status override (e.g. `ITEM_NOT_FOUND: 410`)
    #[serde(default)]
    pub errors: IndexMap<String, u16>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            formats: default_formats(),
            pagination: PaginationConfig::default(),
            eager_loading: EagerLoadingConfig::default(),
            order: OrderConfig::default(),
            pipeline: PipelineConfig::default(),
            entities: Vec::new(),
            filters: IndexMap::new(),
            validation: ValidationRules::default(),
            resources: Vec::new(),
            errors: IndexMap::new(),
        }
    }
}

fn merge_pagination(base: &PaginationOptions, over: &PaginationOptions) -> PaginationOptions {
    PaginationOptions {
        enabled: over.enabled.or(base.enabled),
        client_enabled: over.client_enabled.or(base.client_enabled),
        client_items_per_page: over.client_items_per_page.or(base.client_items_per_page),
        client_partial: over.client_partial.or(base.client_partial),
        items_per_page: over.items_per_page.or(base.items_per_page),
        maximum_items_per_page: over.maximum_items_per_page.or(base.maximum_items_per_page),
        partial: over.partial.or(base.partial),
        fetch_join_collection: over.fetch_join_collection.or(base.fetch_join_collection),
        use_output_walkers: over.use_output_walkers.or(base.use_output_walkers),
    }
}

fn parse_policy(policy: Option<&String>) -> PlatformResult<Option<AuthPolicy>> {
    policy.map(|p| AuthPolicy::parse_policy(p)).transpose()
}

impl PlatformConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> PlatformResult<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                file: Some(path.to_string()),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> PlatformResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Build the entity metadata registry, checking association targets
    pub fn entity_registry(&self) -> PlatformResult<EntityMetadataRegistry> {
        let mut registry = EntityMetadataRegistry::new();
        for entity in &self.entities {
            if entity.identifier.is_empty() {
                return Err(ConfigError::MissingField {
                    field: "identifier".to_string(),
                    context: format!("entity '{}'", entity.name),
                }
                .into());
            }
            for association in &entity.associations {
                let Some(target) = self.entities.iter().find(|e| e.name == association.target) else {
                    return Err(ConfigError::UnknownEntity {
                        class: association.target.clone(),
                        context: format!("association '{}.{}'", entity.name, association.name),
                    }
                    .into());
                };
                if !association.mapped_by.is_empty() && association.mapped_by.len() != entity.identifier.len() {
                    return Err(ConfigError::InvalidValue {
                        field: format!("entities.{}.associations.{}.mapped_by", entity.name, association.name),
                        value: association.mapped_by.join(", "),
                        message: format!("expected one column per identifier field ({})", entity.identifier.join(", ")),
                    }
                    .into());
                }
                if association.join_column.is_some() && target.identifier.len() != 1 {
                    return Err(ConfigError::InvalidValue {
                        field: format!("entities.{}.associations.{}.join_column", entity.name, association.name),
                        value: association.join_column.clone().unwrap_or_default(),
                        message: format!("'{}' has a composite identifier", target.name),
                    }
                    .into());
                }
            }
            registry.register(entity.clone());
        }
        Ok(registry)
    }

    /// Build the resource metadata registry
    pub fn resource_registry(
        &self,
        classes: &dyn ClassMetadataFactory,
    ) -> PlatformResult<ResourceMetadataRegistry> {
        let mut registry = ResourceMetadataRegistry::new();
        for resource in &self.resources {
            registry.register(self.resource_metadata(resource, classes)?);
        }
        Ok(registry)
    }

    fn resource_metadata(
        &self,
        resource: &ResourceConfig,
        classes: &dyn ClassMetadataFactory,
    ) -> PlatformResult<ResourceMetadata> {
        if classes.metadata_for(&resource.class).is_none() {
            return Err(ConfigError::UnknownEntity {
                class: resource.class.clone(),
                context: "resources".to_string(),
            }
            .into());
        }
        let short_name = resource.short_name.clone().ok_or_else(|| ConfigError::MissingField {
            field: "short_name".to_string(),
            context: format!("resource '{}'", resource.class),
        })?;
        let path = resource
            .path
            .clone()
            .unwrap_or_else(|| format!("/{}s", short_name.to_lowercase()));

        let mut operations = IndexMap::new();
        for (name, op) in &resource.operations {
            let kind = op.kind.unwrap_or(match op.method {
                HttpMethod::Post => OperationKind::Collection,
                _ => OperationKind::Item,
            });
            let filters: IndexSet<String> = op
                .filters
                .as_ref()
                .unwrap_or(&resource.filters)
                .iter()
                .cloned()
                .collect();
            let pagination = match &op.pagination {
                Some(over) => merge_pagination(&resource.pagination, over),
                None => resource.pagination.clone(),
            };

            let operation = Operation {
                name: name.clone(),
                resource_class: resource.class.clone(),
                short_name: short_name.clone(),
                path: op.path.clone().unwrap_or_else(|| path.clone()),
                method: op.method,
                kind,
                filters,
                pagination,
                order: op.order.clone().unwrap_or_else(|| resource.order.clone()),
                force_eager: op.force_eager,
                security: parse_policy(op.security.as_ref().or(resource.security.as_ref()))?,
                security_post_denormalize: parse_policy(op.security_post_denormalize.as_ref())?,
                security_post_validation: parse_policy(op.security_post_validation.as_ref())?,
                read: op.read,
                deserialize: op.deserialize,
                validate: op.validate,
                write: op.write,
                serialize: op.serialize,
                status: op.status,
            };
            operations.insert(name.clone(), Arc::new(operation));
        }

        Ok(ResourceMetadata {
            resource_class: resource.class.clone(),
            short_name,
            path,
            operations,
        })
    }
}
