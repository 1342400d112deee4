//! Write stage: stages the change and flushes it once

use crate::core::error::PlatformResult;
use crate::core::operation::{HttpMethod, Operation};
use crate::core::service::{Persister, UnitOfWork};
use crate::state::{Processor, ProcessorNext, ResourceData, StateContext, UriVariables};
use async_trait::async_trait;
use std::sync::Arc;

pub struct WriteProcessor {
    persister: Arc<dyn Persister>,
}

impl WriteProcessor {
    pub fn new(persister: Arc<dyn Persister>) -> Self {
        Self { persister }
    }
}

#[async_trait]
impl Processor for WriteProcessor {
    async fn process(
        &self,
        data: ResourceData,
        operation: &Operation,
        uri_variables: &UriVariables,
        context: &mut StateContext,
        next: ProcessorNext<'_>,
    ) -> PlatformResult<ResourceData> {
        let data = next.run(data, operation, uri_variables, context).await?;
        if !operation.can_write() {
            return Ok(data);
        }
        let ResourceData::Item(object) = data else {
            return Ok(data);
        };

        let mut unit = UnitOfWork::new();
        let class = operation.resource_class.clone();
        if operation.method == HttpMethod::Delete {
            unit.remove(class, object);
            self.persister.flush(unit).await?;
            tracing::debug!(operation = %operation.name, "removed item");
            return Ok(ResourceData::None);
        }

        if operation.method == HttpMethod::Post {
            unit.insert(class, object);
        } else {
            unit.persist(class, object);
        }
        let mut persisted = self.persister.flush(unit).await?;
        tracing::debug!(operation = %operation.name, "persisted item");
        Ok(match persisted.pop() {
            Some(stored) => ResourceData::Item(stored),
            None => ResourceData::None,
        })
    }
}
