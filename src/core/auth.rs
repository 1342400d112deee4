//! Access control for resource operations
//!
//! Operations carry up to three [`AuthPolicy`] values, checked by the access
//! stages of the provider chain: before the read, after the request body has
//! been denormalized, and after validation. Policies are parsed from their
//! configuration strings once, when the metadata is built.

use crate::core::error::{ConfigError, PlatformResult};
use serde_json::Value;
use uuid::Uuid;

/// Authorization context attached to a request
#[derive(Debug, Clone)]
pub enum AuthContext {
    /// Authenticated user
    User {
        user_id: Uuid,
        tenant_id: Option<Uuid>,
        roles: Vec<String>,
    },

    /// Service-to-service communication
    Service {
        service_name: String,
        tenant_id: Option<Uuid>,
    },

    /// System administrator
    Admin { admin_id: Uuid },

    /// No authentication (public access)
    Anonymous,
}

impl AuthContext {
    pub fn is_admin(&self) -> bool {
        matches!(self, AuthContext::Admin { .. })
    }

    pub fn is_service(&self) -> bool {
        matches!(self, AuthContext::Service { .. })
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, AuthContext::Anonymous)
    }

    /// Get user_id if available
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            AuthContext::User { user_id, .. } => Some(*user_id),
            _ => None,
        }
    }
}

/// Authorization policy for an operation
#[derive(Debug, Clone)]
pub enum AuthPolicy {
    /// Public access (no auth required)
    Public,

    /// Any authenticated caller
    Authenticated,

    /// The caller's user id equals the object's `field` value
    Owner { field: String },

    /// User must have one of these roles
    HasRole(Vec<String>),

    /// Service-to-service only
    ServiceOnly,

    /// Admin only
    AdminOnly,

    /// Combination of policies (AND)
    And(Vec<AuthPolicy>),

    /// Combination of policies (OR)
    Or(Vec<AuthPolicy>),

    /// Custom policy function
    Custom(fn(&AuthContext, Option<&Value>) -> bool),
}

impl AuthPolicy {
    /// Check if the auth context satisfies this policy for `object`
    ///
    /// `object` is `None` when the check runs before anything was read; an
    /// ownership policy can never be satisfied in that case.
    pub fn check(&self, context: &AuthContext, object: Option<&Value>) -> bool {
        match self {
            AuthPolicy::Public => true,

            AuthPolicy::Authenticated => !context.is_anonymous(),

            AuthPolicy::Owner { field } => {
                let (Some(user_id), Some(object)) = (context.user_id(), object) else {
                    return false;
                };
                object
                    .get(field)
                    .and_then(Value::as_str)
                    .is_some_and(|owner| owner == user_id.to_string())
            }

            AuthPolicy::HasRole(required_roles) => match context {
                AuthContext::User { roles, .. } => required_roles.iter().any(|r| roles.contains(r)),
                _ => false,
            },

            AuthPolicy::ServiceOnly => context.is_service(),

            AuthPolicy::AdminOnly => context.is_admin(),

            AuthPolicy::And(policies) => policies.iter().all(|p| p.check(context, object)),

            AuthPolicy::Or(policies) => policies.iter().any(|p| p.check(context, object)),

            AuthPolicy::Custom(f) => f(context, object),
        }
    }

    /// Parse a policy from its configuration string
    ///
    /// `a|b` is an OR of policies and `a&b` an AND (AND binds tighter).
    pub fn parse_policy(s: &str) -> PlatformResult<Self> {
        let s = s.trim();
        if s.contains('|') {
            let policies = s
                .split('|')
                .map(Self::parse_policy)
                .collect::<PlatformResult<Vec<_>>>()?;
            return Ok(AuthPolicy::Or(policies));
        }
        if s.contains('&') {
            let policies = s
                .split('&')
                .map(Self::parse_policy)
                .collect::<PlatformResult<Vec<_>>>()?;
            return Ok(AuthPolicy::And(policies));
        }

        let policy = match s {
            "public" => AuthPolicy::Public,
            "authenticated" => AuthPolicy::Authenticated,
            "owner" => AuthPolicy::Owner {
                field: "owner_id".to_string(),
            },
            "service_only" => AuthPolicy::ServiceOnly,
            "admin_only" => AuthPolicy::AdminOnly,
            s if s.starts_with("owner:") && s.len() > "owner:".len() => AuthPolicy::Owner {
                field: s["owner:".len()..].to_string(),
            },
            s if s.starts_with("role:") && s.len() > "role:".len() => {
                AuthPolicy::HasRole(vec![s["role:".len()..].to_string()])
            }
            other => {
                return Err(ConfigError::InvalidValue {
                    field: "security".to_string(),
                    value: other.to_string(),
                    message: "unknown access policy".to_string(),
                }
                .into());
            }
        };
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(roles: &[&str]) -> (Uuid, AuthContext) {
        let user_id = Uuid::new_v4();
        let ctx = AuthContext::User {
            user_id,
            tenant_id: None,
            roles: roles.iter().map(|r| r.to_string()).collect(),
        };
        (user_id, ctx)
    }

    #[test]
    fn test_policy_check() {
        let (_, user_context) = user(&["admin"]);

        assert!(AuthPolicy::Authenticated.check(&user_context, None));
        assert!(AuthPolicy::HasRole(vec!["admin".into()]).check(&user_context, None));

        let anon_context = AuthContext::Anonymous;
        assert!(AuthPolicy::Public.check(&anon_context, None));
        assert!(!AuthPolicy::Authenticated.check(&anon_context, None));
    }

    #[test]
    fn test_owner_policy_reads_object_field() {
        let (user_id, ctx) = user(&[]);
        let policy = AuthPolicy::parse_policy("owner:author_id").unwrap();

        let mine = json!({ "id": 1, "author_id": user_id.to_string() });
        let theirs = json!({ "id": 2, "author_id": Uuid::new_v4().to_string() });

        assert!(policy.check(&ctx, Some(&mine)));
        assert!(!policy.check(&ctx, Some(&theirs)));
        assert!(!policy.check(&ctx, None));
        assert!(!policy.check(&AuthContext::Anonymous, Some(&mine)));
    }

    #[test]
    fn test_policy_check_and_one_fails() {
        let (_, ctx) = user(&["viewer"]);
        let policy = AuthPolicy::And(vec![
            AuthPolicy::Authenticated,
            AuthPolicy::HasRole(vec!["admin".into()]),
        ]);
        assert!(!policy.check(&ctx, None));
    }

    #[test]
    fn test_policy_check_or_one_passes() {
        let ctx = AuthContext::Admin {
            admin_id: Uuid::new_v4(),
        };
        let policy = AuthPolicy::Or(vec![AuthPolicy::ServiceOnly, AuthPolicy::AdminOnly]);
        assert!(policy.check(&ctx, None));
    }

    #[test]
    fn test_policy_check_custom() {
        fn has_object(_ctx: &AuthContext, object: Option<&Value>) -> bool {
            object.is_some()
        }
        let policy = AuthPolicy::Custom(has_object);
        assert!(policy.check(&AuthContext::Anonymous, Some(&json!({}))));
        assert!(!policy.check(&AuthContext::Anonymous, None));
    }

    #[test]
    fn test_parse_policy_combinations() {
        match AuthPolicy::parse_policy("owner | role:manager").unwrap() {
            AuthPolicy::Or(policies) => {
                assert_eq!(policies.len(), 2);
                assert!(matches!(&policies[0], AuthPolicy::Owner { field } if field == "owner_id"));
                assert!(matches!(&policies[1], AuthPolicy::HasRole(roles) if roles == &vec!["manager".to_string()]));
            }
            other => panic!("Expected Or policy, got {:?}", other),
        }

        assert!(matches!(
            AuthPolicy::parse_policy("authenticated&role:editor").unwrap(),
            AuthPolicy::And(policies) if policies.len() == 2
        ));
    }

    #[test]
    fn test_parse_policy_unknown_is_config_error() {
        assert!(AuthPolicy::parse_policy("something_unknown").is_err());
        assert!(AuthPolicy::parse_policy("role:").is_err());
    }

    #[test]
    fn test_auth_context_accessors() {
        let ctx = AuthContext::Service {
            service_name: "svc".to_string(),
            tenant_id: Some(Uuid::new_v4()),
        };
        assert!(ctx.is_service());
        assert_eq!(ctx.user_id(), None);
        assert!(AuthContext::Anonymous.is_anonymous());
    }
}
