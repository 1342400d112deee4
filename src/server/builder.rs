//! PlatformBuilder: assembles the platform from its configuration

use super::host::PlatformHost;
use super::response::ErrorMapper;
use crate::config::{FilterConfig, PlatformConfig, StageOverrides};
use crate::core::error::{ConfigError, PlatformResult};
use crate::core::metadata::{ClassMetadataFactory, ResourceMetadataRegistry};
use crate::core::priority::{PriorityTable, StageTag};
use crate::core::service::{Persister, QueryExecutor};
use crate::core::validation::{RuleValidator, Validator};
use crate::extension::{
    CollectionExtension, EagerLoadingExtension, ExtensionPipeline, FilterEagerLoadingExtension,
    FilterExtension, ItemExtension, OrderExtension, Pagination, PaginationExtension,
};
use crate::filter::{ExistsFilter, FilterRegistry, OrderFilter, QueryFilter, RangeFilter, SearchFilter};
use crate::query::HINT_NULLS_COMPARISON;
use crate::state::processor::{
    AddHeadersProcessor, CollectionSerializer, ResourceSerializer, RespondProcessor,
    SerializeProcessor, WriteProcessor,
};
use crate::state::provider::{
    AccessCheckProvider, AccessStage, BindParametersProvider, DeserializeProvider,
    NegotiateProvider, ReadProvider, ValidateProvider,
};
use crate::state::{Processor, Provider, StatePipeline};
use crate::storage::InMemoryStore;
use serde_json::Value;
use std::sync::Arc;

/// Default collection extension priorities, higher runs first
pub const COLLECTION_EXTENSION_PRIORITIES: &[(&str, i32)] = &[
    ("eager_loading", 64),
    ("filter", 32),
    ("filter_eager_loading", -17),
    ("order", -32),
    ("pagination", -64),
];

/// Default item extension priorities
pub const ITEM_EXTENSION_PRIORITIES: &[(&str, i32)] = &[("eager_loading", 64)];

fn default_priority(defaults: &[(&str, i32)], name: &str) -> i32 {
    defaults
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, priority)| *priority)
        .unwrap_or(0)
}

/// Apply configured priorities and removals, returning unknown stage names
fn apply_overrides<T>(table: &mut PriorityTable<T>, overrides: &StageOverrides) -> Vec<String> {
    let mut unknown = Vec::new();
    for (name, priority) in &overrides.priorities {
        if !table.set_priority(name, *priority) {
            unknown.push(name.clone());
        }
    }
    for name in &overrides.disabled {
        if !table.remove(name) {
            unknown.push(name.clone());
        }
    }
    unknown
}

/// Builder for a [`PlatformHost`]
///
/// Every collaborator has a default taken from the configuration; storage
/// defaults to an [`InMemoryStore`].
///
/// # Example
///
/// ```ignore
/// let host = PlatformBuilder::from_yaml_file("platform.yaml")?
///     .with_provider("audit", 85, Arc::new(AuditProvider))
///     .build()?;
/// ```
pub struct PlatformBuilder {
    config: PlatformConfig,
    executor: Option<Arc<dyn QueryExecutor>>,
    persister: Option<Arc<dyn Persister>>,
    validator: Option<Arc<dyn Validator>>,
    serializer: Option<Arc<dyn ResourceSerializer>>,
    filters: Vec<(String, Arc<dyn QueryFilter>)>,
    providers: Vec<(String, i32, Arc<dyn Provider>)>,
    processors: Vec<(String, i32, Arc<dyn Processor>)>,
    collection_extensions: Vec<(String, i32, Arc<dyn CollectionExtension>)>,
    item_extensions: Vec<(String, i32, Arc<dyn ItemExtension>)>,
}

impl PlatformBuilder {
    pub fn new(config: PlatformConfig) -> Self {
        Self {
            config,
            executor: None,
            persister: None,
            validator: None,
            serializer: None,
            filters: Vec::new(),
            providers: Vec::new(),
            processors: Vec::new(),
            collection_extensions: Vec::new(),
            item_extensions: Vec::new(),
        }
    }

    pub fn from_yaml_file(path: &str) -> PlatformResult<Self> {
        Ok(Self::new(PlatformConfig::from_yaml_file(path)?))
    }

    pub fn from_yaml_str(yaml: &str) -> PlatformResult<Self> {
        Ok(Self::new(PlatformConfig::from_yaml_str(yaml)?))
    }

    /// Use one backend for both reads and writes
    pub fn with_storage<S>(mut self, storage: Arc<S>) -> Self
    where
        S: QueryExecutor + Persister + 'static,
    {
        self.executor = Some(storage.clone());
        self.persister = Some(storage);
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn QueryExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_persister(mut self, persister: Arc<dyn Persister>) -> Self {
        self.persister = Some(persister);
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_serializer(mut self, serializer: Arc<dyn ResourceSerializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// Register a filter next to the configured ones
    pub fn with_filter(mut self, id: impl Into<String>, filter: Arc<dyn QueryFilter>) -> Self {
        self.filters.push((id.into(), filter));
        self
    }

    pub fn with_provider(mut self, name: impl Into<String>, priority: i32, provider: Arc<dyn Provider>) -> Self {
        self.providers.push((name.into(), priority, provider));
        self
    }

    pub fn with_processor(mut self, name: impl Into<String>, priority: i32, processor: Arc<dyn Processor>) -> Self {
        self.processors.push((name.into(), priority, processor));
        self
    }

    pub fn with_collection_extension(
        mut self,
        name: impl Into<String>,
        priority: i32,
        extension: Arc<dyn CollectionExtension>,
    ) -> Self {
        self.collection_extensions.push((name.into(), priority, extension));
        self
    }

    pub fn with_item_extension(
        mut self,
        name: impl Into<String>,
        priority: i32,
        extension: Arc<dyn ItemExtension>,
    ) -> Self {
        self.item_extensions.push((name.into(), priority, extension));
        self
    }

    fn filter_registry(
        &mut self,
        classes: &Arc<dyn ClassMetadataFactory>,
    ) -> FilterRegistry {
        let mut registry = FilterRegistry::new();
        for (id, filter) in &self.config.filters {
            match filter {
                FilterConfig::Search { properties } => {
                    registry.register(id, Arc::new(SearchFilter::new(classes.clone(), properties.clone())));
                }
                FilterConfig::Range { properties } => {
                    registry.register(id, Arc::new(RangeFilter::new(classes.clone(), properties.clone())));
                }
                FilterConfig::Order {
                    properties,
                    nulls_comparison,
                    parameter_name,
                } => {
                    registry.register(
                        id,
                        Arc::new(OrderFilter::new(
                            classes.clone(),
                            parameter_name.clone(),
                            properties.clone(),
                            *nulls_comparison,
                        )),
                    );
                }
                FilterConfig::Exists {
                    properties,
                    parameter_name,
                } => {
                    registry.register(
                        id,
                        Arc::new(ExistsFilter::new(classes.clone(), parameter_name.clone(), properties.clone())),
                    );
                }
                FilterConfig::Property { .. } => registry.register_unsupported(id, "property"),
            }
        }
        for (id, filter) in self.filters.drain(..) {
            registry.register(id, filter);
        }
        registry
    }

    /// Every filter enabled on an operation must be registered
    fn check_operation_filters(resources: &ResourceMetadataRegistry, filters: &FilterRegistry) -> PlatformResult<()> {
        for resource in resources.resources() {
            for operation in resource.operations.values() {
                if let Some(missing) = operation.filters.iter().find(|id| !filters.has(id)) {
                    return Err(ConfigError::UnknownFilter {
                        filter: missing.clone(),
                        operation: format!("{}.{}", resource.short_name, operation.name),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    fn extension_pipeline(
        &mut self,
        classes: &Arc<dyn ClassMetadataFactory>,
        filters: FilterRegistry,
    ) -> PlatformResult<ExtensionPipeline> {
        let eager = Arc::new(EagerLoadingExtension::new(
            classes.clone(),
            self.config.eager_loading.clone(),
        ));

        let mut collection: PriorityTable<Arc<dyn CollectionExtension>> =
            PriorityTable::new(StageTag::CollectionExtension);
        let builtin: [(&str, Arc<dyn CollectionExtension>); 5] = [
            ("eager_loading", eager.clone()),
            ("filter", Arc::new(FilterExtension::new(Arc::new(filters)))),
            (
                "filter_eager_loading",
                Arc::new(FilterEagerLoadingExtension::new(
                    classes.clone(),
                    self.config.eager_loading.clone(),
                )),
            ),
            (
                "order",
                Arc::new(OrderExtension::new(classes.clone(), self.config.order.clone())),
            ),
            (
                "pagination",
                Arc::new(PaginationExtension::new(
                    Pagination::new(self.config.pagination.clone()),
                    classes.clone(),
                )),
            ),
        ];
        for (name, extension) in builtin {
            collection.register(name, default_priority(COLLECTION_EXTENSION_PRIORITIES, name), extension)?;
        }
        for (name, priority, extension) in self.collection_extensions.drain(..) {
            collection.register(name, priority, extension)?;
        }

        let mut item: PriorityTable<Arc<dyn ItemExtension>> = PriorityTable::new(StageTag::ItemExtension);
        item.register("eager_loading", default_priority(ITEM_EXTENSION_PRIORITIES, "eager_loading"), eager)?;
        for (name, priority, extension) in self.item_extensions.drain(..) {
            item.register(name, priority, extension)?;
        }

        // one override section drives both extension tables
        let overrides = &self.config.pipeline.extensions;
        let unknown_collection = apply_overrides(&mut collection, overrides);
        let unknown_item = apply_overrides(&mut item, overrides);
        for name in unknown_collection.iter().filter(|n| unknown_item.contains(n)) {
            tracing::warn!(stage = %name, "pipeline override names an unknown extension");
        }

        Ok(ExtensionPipeline::new(collection, item))
    }

    /// Build the host
    pub fn build(mut self) -> PlatformResult<PlatformHost> {
        let classes: Arc<dyn ClassMetadataFactory> = Arc::new(self.config.entity_registry()?);
        let resources = Arc::new(self.config.resource_registry(classes.as_ref())?);

        let filters = self.filter_registry(&classes);
        Self::check_operation_filters(&resources, &filters)?;

        let store = match (&self.executor, &self.persister) {
            (Some(_), Some(_)) => None,
            _ => Some(InMemoryStore::new(classes.clone())),
        };
        let executor: Arc<dyn QueryExecutor> = match self.executor.take() {
            Some(executor) => executor,
            None => Arc::new(store.clone().ok_or_else(|| ConfigError::MissingField {
                field: "executor".to_string(),
                context: "platform builder".to_string(),
            })?),
        };
        let persister: Arc<dyn Persister> = match self.persister.take() {
            Some(persister) => persister,
            None => Arc::new(store.clone().ok_or_else(|| ConfigError::MissingField {
                field: "persister".to_string(),
                context: "platform builder".to_string(),
            })?),
        };

        let extensions = Arc::new(self.extension_pipeline(&classes, filters)?);

        let validator: Arc<dyn Validator> = match self.validator.take() {
            Some(validator) => validator,
            None => Arc::new(RuleValidator::from_rules(&self.config.validation)?),
        };
        let mut read = ReadProvider::new(extensions.clone(), executor, classes.clone());
        if let Some(nulls) = self.config.order.nulls_comparison {
            read = read.with_hint(HINT_NULLS_COMPARISON, Value::String(nulls.as_str().to_string()));
        }

        let mut providers: PriorityTable<Arc<dyn Provider>> = PriorityTable::new(StageTag::Provider);
        let builtin: [(&str, Arc<dyn Provider>); 8] = [
            ("negotiate", Arc::new(NegotiateProvider::new(self.config.formats.clone()))),
            ("bind_parameters", Arc::new(BindParametersProvider)),
            ("access_pre_read", Arc::new(AccessCheckProvider::new(AccessStage::PreRead))),
            ("read", Arc::new(read)),
            ("deserialize", Arc::new(DeserializeProvider::new(classes.clone()))),
            (
                "access_post_denormalize",
                Arc::new(AccessCheckProvider::new(AccessStage::PostDenormalize)),
            ),
            ("validate", Arc::new(ValidateProvider::new(validator))),
            (
                "access_post_validate",
                Arc::new(AccessCheckProvider::new(AccessStage::PostValidate)),
            ),
        ];
        for (name, provider) in builtin {
            providers.register(
                name,
                default_priority(crate::state::provider::DEFAULT_PRIORITIES, name),
                provider,
            )?;
        }
        for (name, priority, provider) in self.providers.drain(..) {
            providers.register(name, priority, provider)?;
        }
        for name in apply_overrides(&mut providers, &self.config.pipeline.providers) {
            tracing::warn!(stage = %name, "pipeline override names an unknown provider");
        }

        let serializer: Arc<dyn ResourceSerializer> = match self.serializer.take() {
            Some(serializer) => serializer,
            None => Arc::new(CollectionSerializer::new(
                self.config.pagination.page_parameter_name.clone(),
            )),
        };
        let mut processors: PriorityTable<Arc<dyn Processor>> = PriorityTable::new(StageTag::Processor);
        let builtin: [(&str, Arc<dyn Processor>); 4] = [
            ("respond", Arc::new(RespondProcessor)),
            ("add_headers", Arc::new(AddHeadersProcessor::new(classes.clone()))),
            ("serialize", Arc::new(SerializeProcessor::new(serializer))),
            ("write", Arc::new(WriteProcessor::new(persister))),
        ];
        for (name, processor) in builtin {
            processors.register(
                name,
                default_priority(crate::state::processor::DEFAULT_PRIORITIES, name),
                processor,
            )?;
        }
        for (name, priority, processor) in self.processors.drain(..) {
            processors.register(name, priority, processor)?;
        }
        for name in apply_overrides(&mut processors, &self.config.pipeline.processors) {
            tracing::warn!(stage = %name, "pipeline override names an unknown processor");
        }

        let pipeline = StatePipeline::new(providers, processors);
        let error_mapper = ErrorMapper::new(&self.config.errors)?;

        tracing::info!(
            resources = resources.resources().count(),
            providers = ?pipeline.provider_names(),
            processors = ?pipeline.processor_names(),
            extensions = ?extensions.collection_names(),
            "platform built"
        );

        Ok(PlatformHost::new(
            Arc::new(self.config),
            classes,
            resources,
            extensions,
            pipeline,
            error_mapper,
            store,
        ))
    }
}
