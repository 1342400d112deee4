//! Respond stage: builds the final response

use crate::core::error::PlatformResult;
use crate::core::operation::{HttpMethod, Operation};
use crate::state::{
    Processor, ProcessorNext, ResourceData, ResourceResponse, StateContext, UriVariables,
};
use async_trait::async_trait;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;

/// 201 for POST, 204 for DELETE, else 200, unless the operation overrides it
pub fn default_status(operation: &Operation) -> StatusCode {
    if let Some(status) = operation.status.and_then(|s| StatusCode::from_u16(s).ok()) {
        return status;
    }
    match operation.method {
        HttpMethod::Post => StatusCode::CREATED,
        HttpMethod::Delete => StatusCode::NO_CONTENT,
        _ => StatusCode::OK,
    }
}

#[derive(Debug, Default)]
pub struct RespondProcessor;

#[async_trait]
impl Processor for RespondProcessor {
    async fn process(
        &self,
        data: ResourceData,
        operation: &Operation,
        uri_variables: &UriVariables,
        context: &mut StateContext,
        next: ProcessorNext<'_>,
    ) -> PlatformResult<ResourceData> {
        let data = next.run(data, operation, uri_variables, context).await?;

        let status = default_status(operation);
        let mut headers = std::mem::take(&mut context.response_headers);
        let body = match status {
            StatusCode::NO_CONTENT => {
                headers.remove(CONTENT_TYPE);
                None
            }
            _ => context.output.take(),
        };
        context.response = Some(ResourceResponse { status, headers, body });
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::operation::OperationKind;

    #[test]
    fn test_default_statuses() {
        let post = Operation::new("post", "Book", HttpMethod::Post, OperationKind::Collection);
        assert_eq!(default_status(&post), StatusCode::CREATED);

        let delete = Operation::new("delete", "Book", HttpMethod::Delete, OperationKind::Item);
        assert_eq!(default_status(&delete), StatusCode::NO_CONTENT);

        let mut get = Operation::get("Book");
        assert_eq!(default_status(&get), StatusCode::OK);

        get.status = Some(202);
        assert_eq!(default_status(&get), StatusCode::ACCEPTED);
    }
}
