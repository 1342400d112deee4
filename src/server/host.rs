//! Transport-agnostic host
//!
//! `PlatformHost` holds everything built from configuration and runs one
//! request through the state pipeline. Exposures (see
//! [`RestExposure`](super::exposure::RestExposure)) only translate their
//! transport into a [`ResourceRequest`] and back.

use super::response::ErrorMapper;
use crate::config::PlatformConfig;
use crate::core::auth::AuthContext;
use crate::core::error::PlatformResult;
use crate::core::metadata::{ClassMetadataFactory, ResourceMetadataFactory, ResourceMetadataRegistry};
use crate::core::operation::Operation;
use crate::extension::ExtensionPipeline;
use crate::state::{ResourceRequest, ResourceResponse, StateContext, StatePipeline, UriVariables};
use crate::storage::InMemoryStore;
use std::sync::Arc;

/// Built platform state, shared across requests
pub struct PlatformHost {
    config: Arc<PlatformConfig>,
    classes: Arc<dyn ClassMetadataFactory>,
    resources: Arc<ResourceMetadataRegistry>,
    extensions: Arc<ExtensionPipeline>,
    pipeline: StatePipeline,
    error_mapper: ErrorMapper,
    store: Option<InMemoryStore>,
}

impl PlatformHost {
    pub(crate) fn new(
        config: Arc<PlatformConfig>,
        classes: Arc<dyn ClassMetadataFactory>,
        resources: Arc<ResourceMetadataRegistry>,
        extensions: Arc<ExtensionPipeline>,
        pipeline: StatePipeline,
        error_mapper: ErrorMapper,
        store: Option<InMemoryStore>,
    ) -> Self {
        Self {
            config,
            classes,
            resources,
            extensions,
            pipeline,
            error_mapper,
            store,
        }
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    pub fn classes(&self) -> &Arc<dyn ClassMetadataFactory> {
        &self.classes
    }

    pub fn resources(&self) -> &ResourceMetadataRegistry {
        &self.resources
    }

    pub fn extensions(&self) -> &ExtensionPipeline {
        &self.extensions
    }

    pub fn pipeline(&self) -> &StatePipeline {
        &self.pipeline
    }

    pub fn error_mapper(&self) -> &ErrorMapper {
        &self.error_mapper
    }

    /// The default store, when no storage was given to the builder
    pub fn in_memory_store(&self) -> Option<&InMemoryStore> {
        self.store.as_ref()
    }

    /// Resolve an operation of a resource class
    pub fn operation(&self, resource_class: &str, operation_name: &str) -> PlatformResult<Arc<Operation>> {
        self.resources.create(resource_class)?.operation(operation_name)
    }

    /// Run one request, returning errors as they are
    pub async fn try_handle(
        &self,
        resource_class: &str,
        operation_name: &str,
        uri_variables: &UriVariables,
        request: ResourceRequest,
        auth: AuthContext,
    ) -> PlatformResult<ResourceResponse> {
        let operation = self.operation(resource_class, operation_name)?;
        tracing::debug!(
            resource_class,
            operation = %operation.name,
            method = %operation.method,
            "handling request"
        );
        let mut context = StateContext::new(request, auth);
        self.pipeline.run(&operation, uri_variables, &mut context).await
    }

    /// Run one request, rendering errors through the error mapper
    pub async fn handle(
        &self,
        resource_class: &str,
        operation_name: &str,
        uri_variables: &UriVariables,
        request: ResourceRequest,
        auth: AuthContext,
    ) -> ResourceResponse {
        match self
            .try_handle(resource_class, operation_name, uri_variables, request, auth)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                let response = self.error_mapper.map(&err);
                if response.status.is_server_error() {
                    tracing::warn!(error = %err, code = err.error_code(), "request failed");
                } else {
                    tracing::debug!(error = %err, code = err.error_code(), "request rejected");
                }
                response
            }
        }
    }
}
