//! Access checks around the read, deserialize and validate stages

use crate::core::auth::AuthPolicy;
use crate::core::error::{PlatformResult, RequestError};
use crate::core::operation::Operation;
use crate::state::{Provider, ProviderNext, StateContext, UriVariables};
use async_trait::async_trait;

/// When an access check runs, and which policy it evaluates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessStage {
    /// `security`, before anything is read
    PreRead,
    /// `security_post_denormalize`, against the deserialized object
    PostDenormalize,
    /// `security_post_validation`, against the validated object
    PostValidate,
}

impl AccessStage {
    fn policy<'a>(&self, operation: &'a Operation) -> Option<&'a AuthPolicy> {
        match self {
            AccessStage::PreRead => operation.security.as_ref(),
            AccessStage::PostDenormalize => operation.security_post_denormalize.as_ref(),
            AccessStage::PostValidate => operation.security_post_validation.as_ref(),
        }
    }
}

pub struct AccessCheckProvider {
    stage: AccessStage,
}

impl AccessCheckProvider {
    pub fn new(stage: AccessStage) -> Self {
        Self { stage }
    }
}

#[async_trait]
impl Provider for AccessCheckProvider {
    async fn provide(
        &self,
        operation: &Operation,
        uri_variables: &UriVariables,
        context: &mut StateContext,
        next: ProviderNext<'_>,
    ) -> PlatformResult<()> {
        if let Some(policy) = self.stage.policy(operation) {
            let object = match self.stage {
                AccessStage::PreRead => None,
                _ => context.data.as_item(),
            };
            if !policy.check(&context.auth, object) {
                tracing::debug!(stage = ?self.stage, operation = %operation.name, "access denied");
                let err = if context.auth.is_anonymous() {
                    RequestError::Unauthorized {
                        message: "Full authentication is required to access this resource.".to_string(),
                    }
                } else {
                    RequestError::Forbidden {
                        message: "Access Denied.".to_string(),
                    }
                };
                return Err(err.into());
            }
        }
        next.run(operation, uri_variables, context).await
    }
}
