//! Validate stage

use crate::core::error::PlatformResult;
use crate::core::operation::Operation;
use crate::core::validation::Validator;
use crate::state::{Provider, ProviderNext, StateContext, UriVariables};
use async_trait::async_trait;
use std::sync::Arc;

pub struct ValidateProvider {
    validator: Arc<dyn Validator>,
}

impl ValidateProvider {
    pub fn new(validator: Arc<dyn Validator>) -> Self {
        Self { validator }
    }
}

#[async_trait]
impl Provider for ValidateProvider {
    async fn provide(
        &self,
        operation: &Operation,
        uri_variables: &UriVariables,
        context: &mut StateContext,
        next: ProviderNext<'_>,
    ) -> PlatformResult<()> {
        if operation.can_validate() {
            if let Some(object) = context.data.as_item() {
                self.validator.validate(&operation.resource_class, object)?;
            }
        }
        next.run(operation, uri_variables, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::AuthContext;
    use crate::core::error::{PlatformError, ValidationError};
    use crate::core::operation::{HttpMethod, OperationKind};
    use crate::core::validation::{RuleValidator, ValidationRule, ValidationRules};
    use crate::state::{ResourceData, ResourceRequest};
    use indexmap::IndexMap;
    use serde_json::json;

    fn provider() -> ValidateProvider {
        let mut fields = IndexMap::new();
        fields.insert("title".to_string(), vec![ValidationRule::Required]);
        let mut rules = ValidationRules::new();
        rules.insert("Book".to_string(), fields);
        ValidateProvider::new(Arc::new(RuleValidator::from_rules(&rules).unwrap()))
    }

    #[tokio::test]
    async fn test_violations_fail_writes() {
        let op = Operation::new("post", "Book", HttpMethod::Post, OperationKind::Collection);
        let mut ctx = StateContext::new(ResourceRequest::new(HttpMethod::Post), AuthContext::Anonymous);
        ctx.data = ResourceData::Item(json!({ "year": 1965 }));

        let err = provider()
            .provide(&op, &UriVariables::new(), &mut ctx, ProviderNext::new(&[]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PlatformError::Validation(ValidationError::FieldErrors(ref v)) if v[0].field == "title"
        ));
    }

    #[tokio::test]
    async fn test_reads_are_not_validated() {
        let mut ctx = StateContext::new(ResourceRequest::new(HttpMethod::Get), AuthContext::Anonymous);
        ctx.data = ResourceData::Item(json!({ "year": 1965 }));

        assert!(
            provider()
                .provide(&Operation::get("Book"), &UriVariables::new(), &mut ctx, ProviderNext::new(&[]))
                .await
                .is_ok()
        );
    }
}
