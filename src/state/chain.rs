//! Provider and processor middleware chains

use crate::core::error::PlatformResult;
use crate::core::operation::Operation;
use crate::core::priority::{PriorityTable, Registration};
use crate::state::{ResourceData, ResourceResponse, StateContext, UriVariables};
use async_trait::async_trait;
use axum::http::StatusCode;
use std::sync::Arc;

/// Read-side stage
///
/// A provider does its work and then calls `next` to run the stages below
/// it, or returns without calling it to short-circuit.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn provide(
        &self,
        operation: &Operation,
        uri_variables: &UriVariables,
        context: &mut StateContext,
        next: ProviderNext<'_>,
    ) -> PlatformResult<()>;
}

/// Write-side stage
///
/// A processor usually calls `next` first and then acts on the data it
/// returns, so higher-priority processors see the effect of lower ones.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(
        &self,
        data: ResourceData,
        operation: &Operation,
        uri_variables: &UriVariables,
        context: &mut StateContext,
        next: ProcessorNext<'_>,
    ) -> PlatformResult<ResourceData>;
}

/// The providers remaining below the current one
pub struct ProviderNext<'a> {
    stages: &'a [Registration<Arc<dyn Provider>>],
}

impl<'a> ProviderNext<'a> {
    pub fn new(stages: &'a [Registration<Arc<dyn Provider>>]) -> Self {
        Self { stages }
    }

    /// Run the rest of the chain
    pub async fn run(
        self,
        operation: &Operation,
        uri_variables: &UriVariables,
        context: &mut StateContext,
    ) -> PlatformResult<()> {
        let Some((stage, rest)) = self.stages.split_first() else {
            return Ok(());
        };
        tracing::debug!(provider = %stage.name, operation = %operation.name, "entering provider");
        stage
            .item
            .provide(operation, uri_variables, context, ProviderNext::new(rest))
            .await
    }
}

/// The processors remaining below the current one
pub struct ProcessorNext<'a> {
    stages: &'a [Registration<Arc<dyn Processor>>],
}

impl<'a> ProcessorNext<'a> {
    pub fn new(stages: &'a [Registration<Arc<dyn Processor>>]) -> Self {
        Self { stages }
    }

    /// Run the rest of the chain; the end of the chain returns `data` as is
    pub async fn run(
        self,
        data: ResourceData,
        operation: &Operation,
        uri_variables: &UriVariables,
        context: &mut StateContext,
    ) -> PlatformResult<ResourceData> {
        let Some((stage, rest)) = self.stages.split_first() else {
            return Ok(data);
        };
        tracing::debug!(processor = %stage.name, operation = %operation.name, "entering processor");
        stage
            .item
            .process(data, operation, uri_variables, context, ProcessorNext::new(rest))
            .await
    }
}

/// Both chains, resolved once from their priority tables
pub struct StatePipeline {
    providers: Vec<Registration<Arc<dyn Provider>>>,
    processors: Vec<Registration<Arc<dyn Processor>>>,
}

impl StatePipeline {
    pub fn new(
        providers: PriorityTable<Arc<dyn Provider>>,
        processors: PriorityTable<Arc<dyn Processor>>,
    ) -> Self {
        Self {
            providers: providers.into_sorted(),
            processors: processors.into_sorted(),
        }
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn processor_names(&self) -> Vec<&str> {
        self.processors.iter().map(|r| r.name.as_str()).collect()
    }

    /// Run providers then processors for one request
    ///
    /// A response set by a provider ends the request before any processor
    /// runs. Without a respond stage the serialized output is returned with
    /// a 200 status.
    pub async fn run(
        &self,
        operation: &Operation,
        uri_variables: &UriVariables,
        context: &mut StateContext,
    ) -> PlatformResult<ResourceResponse> {
        ProviderNext::new(&self.providers)
            .run(operation, uri_variables, context)
            .await?;
        if let Some(response) = context.response.take() {
            tracing::debug!(status = %response.status, "provider chain short-circuited");
            return Ok(response);
        }

        let data = std::mem::take(&mut context.data);
        context.data = ProcessorNext::new(&self.processors)
            .run(data, operation, uri_variables, context)
            .await?;

        Ok(context.response.take().unwrap_or_else(|| ResourceResponse {
            status: StatusCode::OK,
            headers: std::mem::take(&mut context.response_headers),
            body: context.output.take(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::AuthContext;
    use crate::core::operation::HttpMethod;
    use crate::core::priority::StageTag;
    use crate::state::ResourceRequest;
    use serde_json::json;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Step {
        name: &'static str,
        log: Log,
        short_circuit: bool,
    }

    #[async_trait]
    impl Provider for Step {
        async fn provide(
            &self,
            operation: &Operation,
            uri_variables: &UriVariables,
            context: &mut StateContext,
            next: ProviderNext<'_>,
        ) -> PlatformResult<()> {
            self.log.lock().unwrap().push(self.name.to_string());
            if self.short_circuit {
                context.response = Some(ResourceResponse::empty(StatusCode::NOT_MODIFIED));
                return Ok(());
            }
            next.run(operation, uri_variables, context).await
        }
    }

    #[async_trait]
    impl Processor for Step {
        async fn process(
            &self,
            data: ResourceData,
            operation: &Operation,
            uri_variables: &UriVariables,
            context: &mut StateContext,
            next: ProcessorNext<'_>,
        ) -> PlatformResult<ResourceData> {
            let data = next.run(data, operation, uri_variables, context).await?;
            self.log.lock().unwrap().push(self.name.to_string());
            Ok(data)
        }
    }

    fn step(name: &'static str, log: &Log, short_circuit: bool) -> Arc<Step> {
        Arc::new(Step {
            name,
            log: log.clone(),
            short_circuit,
        })
    }

    fn context() -> StateContext {
        StateContext::new(ResourceRequest::new(HttpMethod::Get), AuthContext::Anonymous)
    }

    #[tokio::test]
    async fn test_order_follows_priority_not_registration() {
        let log: Log = Arc::default();
        let mut providers: PriorityTable<Arc<dyn Provider>> = PriorityTable::new(StageTag::Provider);
        providers.register("read", 50, step("read", &log, false)).unwrap();
        providers.register("negotiate", 100, step("negotiate", &log, false)).unwrap();
        providers.register("validate", 20, step("validate", &log, false)).unwrap();

        let mut processors: PriorityTable<Arc<dyn Processor>> = PriorityTable::new(StageTag::Processor);
        processors.register("write", 100, step("write", &log, false)).unwrap();
        processors.register("respond", 400, step("respond", &log, false)).unwrap();
        processors.register("serialize", 200, step("serialize", &log, false)).unwrap();

        let pipeline = StatePipeline::new(providers, processors);
        assert_eq!(pipeline.provider_names(), vec!["negotiate", "read", "validate"]);
        assert_eq!(pipeline.processor_names(), vec!["respond", "serialize", "write"]);

        let mut ctx = context();
        ctx.output = Some(json!({ "ok": true }));
        let response = pipeline
            .run(&Operation::get("Book"), &UriVariables::new(), &mut ctx)
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, Some(json!({ "ok": true })));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["negotiate", "read", "validate", "write", "serialize", "respond"]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_skips_remaining_stages() {
        let log: Log = Arc::default();
        let mut providers: PriorityTable<Arc<dyn Provider>> = PriorityTable::new(StageTag::Provider);
        providers.register("negotiate", 100, step("negotiate", &log, true)).unwrap();
        providers.register("read", 50, step("read", &log, false)).unwrap();

        let mut processors: PriorityTable<Arc<dyn Processor>> = PriorityTable::new(StageTag::Processor);
        processors.register("respond", 400, step("respond", &log, false)).unwrap();

        let pipeline = StatePipeline::new(providers, processors);
        let response = pipeline
            .run(&Operation::get("Book"), &UriVariables::new(), &mut context())
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::NOT_MODIFIED);
        assert_eq!(*log.lock().unwrap(), vec!["negotiate"]);
    }
}
