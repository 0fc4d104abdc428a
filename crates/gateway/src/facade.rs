//! The decision facade: `authorize(request) -> {allow|deny, reason}`,
//! wiring the identity resolver, role cache, query analyzer, and policy
//! evaluator together in a fixed five-step order.

use std::collections::BTreeMap;

use gqiam_core::{evaluate_roles, RequestContext};
use gqiam_identity::{resolve, CallerIdentity, IdentityConfig, JwtClaims};
use gqiam_role_cache::{RoleCache, RoleSource};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Unauthorized,
    BadRequest,
    Forbidden,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

pub struct AuthorizeRequest<'a> {
    pub headers: &'a BTreeMap<String, String>,
    pub query: &'a str,
    pub variables: Value,
    pub proto: String,
    pub socket_remote_addr: String,
}

pub async fn authorize<S: RoleSource>(
    identity_config: &IdentityConfig,
    verifier: Option<&gqiam_identity::TokenVerifier>,
    role_cache: &RoleCache<S>,
    request: AuthorizeRequest<'_>,
) -> Decision {
    // Step 2: Identity Resolver produces role names.
    let (role_names, caller_identity) = match resolve(identity_config, request.headers, verifier).await {
        Ok(resolved) => resolved,
        Err(error) => {
            tracing::warn!(%error, "identity resolution failed");
            return Decision::Deny(DenyReason::Unauthorized);
        }
    };

    // Step 3: cache/source resolves to `Role` objects.
    let roles = match role_cache.get_many(&role_names).await {
        Ok(roles) => gqiam_core::Role::dedupe(roles),
        Err(error) => {
            tracing::warn!(%error, "role lookup failed");
            return Decision::Deny(DenyReason::Unauthorized);
        }
    };

    // Step 4: Query Analyzer produces an `ActionResourceSet`.
    let actions = match gqiam_graphql::analyze(request.query) {
        Ok(actions) => actions,
        Err(error) => {
            tracing::warn!(%error, "query analysis failed");
            return Decision::Deny(DenyReason::BadRequest);
        }
    };

    let jwt_claims = match &caller_identity {
        CallerIdentity::Jwt { claims: JwtClaims(claims) } => Value::Object(claims.clone()),
        _ => Value::Object(Default::default()),
    };

    let ctx = RequestContext {
        proto: request.proto,
        socket_remote_addr: request.socket_remote_addr,
        headers: request.headers.clone(),
        jwt_claims,
        variables: request.variables,
        raw_query: request.query.to_string(),
    };

    // Step 5: Policy Evaluator returns a bool.
    if evaluate_roles(&actions, &roles, &ctx) {
        Decision::Allow
    } else {
        Decision::Deny(DenyReason::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gqiam_core::{Policy, Role, Statement};

    struct StaticSource(Vec<Role>);

    #[async_trait]
    impl RoleSource for StaticSource {
        async fn get_one(&self, name: &str) -> Result<Option<Role>, anyhow::Error> {
            Ok(self.0.iter().find(|r| r.name == name).cloned())
        }

        async fn get_many(&self, names: &[String]) -> Result<Vec<Role>, anyhow::Error> {
            Ok(self.0.iter().filter(|r| names.contains(&r.name)).cloned().collect())
        }
    }

    fn allow_all_role() -> Role {
        Role {
            name: "admin".to_string(),
            policies: vec![Policy {
                id: "p1".into(),
                name: "p1".into(),
                version: "1".into(),
                statements: vec![Statement {
                    sid: "s1".into(),
                    action: "*".into(),
                    effect: gqiam_core::Effect::Allow,
                    resource: "**".into(),
                    condition: None,
                }],
            }],
        }
    }

    #[tokio::test]
    async fn unauthorized_when_identity_cannot_be_resolved() {
        let identity_config = IdentityConfig::Header { header_name: "X-Roles".into() };
        let cache = RoleCache::new(StaticSource(vec![]), std::time::Duration::from_secs(300));
        let request = AuthorizeRequest {
            headers: &BTreeMap::new(),
            query: "query { ping }",
            variables: Value::Object(Default::default()),
            proto: "HTTP/1.1".into(),
            socket_remote_addr: "127.0.0.1:1".into(),
        };

        let decision = authorize(&identity_config, None, &cache, request).await;
        assert_eq!(decision, Decision::Deny(DenyReason::Unauthorized));
    }

    #[tokio::test]
    async fn bad_request_on_malformed_query() {
        let identity_config = IdentityConfig::Header { header_name: "X-Roles".into() };
        let cache = RoleCache::new(StaticSource(vec![allow_all_role()]), std::time::Duration::from_secs(300));
        let mut headers = BTreeMap::new();
        headers.insert("x-roles".to_string(), "admin".to_string());
        let request = AuthorizeRequest {
            headers: &headers,
            query: "query { ping",
            variables: Value::Object(Default::default()),
            proto: "HTTP/1.1".into(),
            socket_remote_addr: "127.0.0.1:1".into(),
        };

        let decision = authorize(&identity_config, None, &cache, request).await;
        assert_eq!(decision, Decision::Deny(DenyReason::BadRequest));
    }

    #[tokio::test]
    async fn allows_when_role_grants_every_requested_path() {
        let identity_config = IdentityConfig::Header { header_name: "X-Roles".into() };
        let cache = RoleCache::new(StaticSource(vec![allow_all_role()]), std::time::Duration::from_secs(300));
        let mut headers = BTreeMap::new();
        headers.insert("x-roles".to_string(), "admin".to_string());
        let request = AuthorizeRequest {
            headers: &headers,
            query: "query { testData { name } }",
            variables: Value::Object(Default::default()),
            proto: "HTTP/1.1".into(),
            socket_remote_addr: "127.0.0.1:1".into(),
        };

        let decision = authorize(&identity_config, None, &cache, request).await;
        assert_eq!(decision, Decision::Allow);
    }
}
