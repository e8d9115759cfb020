//! Request Authorizer
//! Mission: Gate every call on a verified bearer token
//!
//! Two event shapes are accepted, a single `authorizationToken` field and a
//! header map. Both go through [`BearerSource`] into the same verify-then-policy
//! core so the two paths can't drift apart.

use crate::auth::{
    jwt::{TokenCodec, TokenError},
    models::SessionClaims,
    policy::{AccessDecision, Effect, PolicyError, PolicyGenerator, ResourceScope},
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// The one failure the Authorizer reports outward. The enforcing router turns
/// it into a blanket deny.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Unauthorized")]
pub struct Unauthorized;

/// Internal reason an authorization attempt failed. Only ever logged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthorizeFailure {
    #[error("no authorization token present")]
    MissingToken,

    #[error("authorization token is empty")]
    EmptyToken,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Resource(#[from] PolicyError),
}

impl AuthorizeFailure {
    pub fn reason(&self) -> &'static str {
        match self {
            AuthorizeFailure::MissingToken => "missing_token",
            AuthorizeFailure::EmptyToken => "empty_token",
            AuthorizeFailure::Token(e) => e.kind(),
            AuthorizeFailure::Resource(_) => "malformed_resource",
        }
    }
}

/// Where a bearer token and the target resource come from.
pub trait BearerSource {
    /// Raw credential, with any `Bearer ` prefix already stripped.
    fn bearer_token(&self) -> Result<&str, AuthorizeFailure>;

    /// Resource identifier being authorized.
    fn resource(&self) -> &str;
}

/// Token-field event: `{"type": "TOKEN", "authorizationToken": ..., "methodArn": ...}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAuthorizerEvent {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub authorization_token: Option<String>,
    pub method_arn: String,
}

impl BearerSource for TokenAuthorizerEvent {
    fn bearer_token(&self) -> Result<&str, AuthorizeFailure> {
        let raw = self
            .authorization_token
            .as_deref()
            .ok_or(AuthorizeFailure::MissingToken)?;
        non_empty(raw.strip_prefix("Bearer ").unwrap_or(raw))
    }

    fn resource(&self) -> &str {
        &self.method_arn
    }
}

/// Header-map event: `{"headers": {...}, "methodArn": ...}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestAuthorizerEvent {
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    pub method_arn: String,
}

impl BearerSource for RequestAuthorizerEvent {
    fn bearer_token(&self) -> Result<&str, AuthorizeFailure> {
        let headers = self.headers.as_ref().ok_or(AuthorizeFailure::MissingToken)?;
        let raw = find_authorization(headers).ok_or(AuthorizeFailure::MissingToken)?;
        non_empty(strip_bearer(raw))
    }

    fn resource(&self) -> &str {
        &self.method_arn
    }
}

fn find_authorization(headers: &HashMap<String, String>) -> Option<&str> {
    headers
        .get("Authorization")
        .or_else(|| headers.get("authorization"))
        .or_else(|| {
            headers
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case("authorization"))
                .map(|(_, value)| value)
        })
        .map(String::as_str)
}

/// Strip a `Bearer ` / `bearer ` prefix if present.
pub fn strip_bearer(raw: &str) -> &str {
    raw.strip_prefix("Bearer ")
        .or_else(|| raw.strip_prefix("bearer "))
        .unwrap_or(raw)
}

fn non_empty(token: &str) -> Result<&str, AuthorizeFailure> {
    let token = token.trim();
    if token.is_empty() {
        Err(AuthorizeFailure::EmptyToken)
    } else {
        Ok(token)
    }
}

/// Shared verification-and-policy core.
#[derive(Debug, Clone)]
pub struct Authorizer {
    codec: Arc<TokenCodec>,
    scope: ResourceScope,
}

impl Authorizer {
    pub fn new(codec: Arc<TokenCodec>, scope: ResourceScope) -> Self {
        Self { codec, scope }
    }

    /// Extract and verify the token carried by `input`.
    pub fn authenticate<S: BearerSource + ?Sized>(
        &self,
        input: &S,
    ) -> Result<SessionClaims, AuthorizeFailure> {
        let token = input.bearer_token()?;
        Ok(self.codec.verify(token)?)
    }

    /// Start → ExtractToken → VerifySignatureAndClaims → {Allow, Deny}.
    ///
    /// Every failure collapses into [`Unauthorized`]; the cause is only logged.
    pub fn authorize<S: BearerSource + ?Sized>(
        &self,
        input: &S,
    ) -> Result<AccessDecision, Unauthorized> {
        self.try_authorize(input).map_err(|failure| {
            warn!(
                reason = failure.reason(),
                resource = input.resource(),
                "Authorization denied"
            );
            Unauthorized
        })
    }

    fn try_authorize<S: BearerSource + ?Sized>(
        &self,
        input: &S,
    ) -> Result<AccessDecision, AuthorizeFailure> {
        let claims = self.authenticate(input)?;

        let mut context = Map::new();
        context.insert("userId".to_string(), Value::String(claims.user_id.clone()));
        context.insert("email".to_string(), Value::String(claims.email.clone()));

        let decision = PolicyGenerator::generate(
            &claims.user_id,
            Effect::Allow,
            input.resource(),
            self.scope,
            Some(context),
        )?;

        debug!(
            principal_id = %decision.principal_id,
            scope = ?self.scope,
            "Authorization granted"
        );

        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::Subject;
    use chrono::{Duration, Utc};

    const ARN: &str = "arn:aws:execute-api:us-east-1:123:abcde/prod/GET/projects/42";

    fn codec() -> Arc<TokenCodec> {
        Arc::new(TokenCodec::new("authorizer-test-secret", Duration::days(7)).unwrap())
    }

    fn token_for(codec: &TokenCodec) -> String {
        codec
            .issue(&Subject {
                user_id: "u-42".to_string(),
                email: "ana@x.com".to_string(),
            })
            .unwrap()
            .token
    }

    fn token_event(token: Option<String>) -> TokenAuthorizerEvent {
        TokenAuthorizerEvent {
            kind: Some("TOKEN".to_string()),
            authorization_token: token,
            method_arn: ARN.to_string(),
        }
    }

    fn request_event(headers: &[(&str, String)]) -> RequestAuthorizerEvent {
        RequestAuthorizerEvent {
            headers: Some(
                headers
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
            ),
            method_arn: ARN.to_string(),
        }
    }

    #[test]
    fn test_token_variant_allows_exact_resource() {
        let codec = codec();
        let authorizer = Authorizer::new(codec.clone(), ResourceScope::Exact);
        let event = token_event(Some(format!("Bearer {}", token_for(&codec))));

        let decision = authorizer.authorize(&event).unwrap();
        assert_eq!(decision.principal_id, "u-42");
        assert_eq!(decision.effect(), Some(Effect::Allow));
        assert_eq!(decision.resources().collect::<Vec<_>>(), vec![ARN]);

        let context = decision.context.unwrap();
        assert_eq!(context["userId"], "u-42");
        assert_eq!(context["email"], "ana@x.com");
    }

    #[test]
    fn test_token_variant_accepts_unprefixed_token() {
        let codec = codec();
        let authorizer = Authorizer::new(codec.clone(), ResourceScope::Exact);
        let event = token_event(Some(token_for(&codec)));

        assert!(authorizer.authorize(&event).is_ok());
    }

    #[test]
    fn test_request_variant_widens_to_stage() {
        let codec = codec();
        let authorizer = Authorizer::new(codec.clone(), ResourceScope::StageWildcard);
        let event = request_event(&[("Authorization", format!("Bearer {}", token_for(&codec)))]);

        let decision = authorizer.authorize(&event).unwrap();
        assert_eq!(
            decision.resources().collect::<Vec<_>>(),
            vec!["arn:aws:execute-api:us-east-1:123:abcde/prod/*/*"]
        );
    }

    #[test]
    fn test_request_variant_header_casing() {
        let codec = codec();
        let authorizer = Authorizer::new(codec.clone(), ResourceScope::StageWildcard);

        let lower = request_event(&[("authorization", format!("bearer {}", token_for(&codec)))]);
        assert!(authorizer.authorize(&lower).is_ok());

        let odd = request_event(&[("AUTHORIZATION", format!("Bearer {}", token_for(&codec)))]);
        assert!(authorizer.authorize(&odd).is_ok());
    }

    #[test]
    fn test_missing_header_is_unauthorized() {
        let authorizer = Authorizer::new(codec(), ResourceScope::StageWildcard);
        let event = request_event(&[("Content-Type", "application/json".to_string())]);

        assert_eq!(
            authorizer.authenticate(&event).unwrap_err(),
            AuthorizeFailure::MissingToken
        );
        assert_eq!(authorizer.authorize(&event), Err(Unauthorized));

        let no_headers = RequestAuthorizerEvent {
            headers: None,
            method_arn: ARN.to_string(),
        };
        assert_eq!(authorizer.authorize(&no_headers), Err(Unauthorized));
    }

    #[test]
    fn test_empty_token_is_unauthorized() {
        let authorizer = Authorizer::new(codec(), ResourceScope::Exact);

        let event = token_event(Some("Bearer ".to_string()));
        assert_eq!(
            authorizer.authenticate(&event).unwrap_err(),
            AuthorizeFailure::EmptyToken
        );
        assert_eq!(authorizer.authorize(&event), Err(Unauthorized));
        assert_eq!(authorizer.authorize(&token_event(None)), Err(Unauthorized));
    }

    #[test]
    fn test_all_verify_failures_collapse() {
        let codec = codec();
        let authorizer = Authorizer::new(codec.clone(), ResourceScope::Exact);

        let expired = codec
            .issue_at(
                &Subject {
                    user_id: "u-42".to_string(),
                    email: "ana@x.com".to_string(),
                },
                Utc::now() - Duration::days(8),
            )
            .unwrap()
            .token;
        let foreign = token_for(&TokenCodec::new("other", Duration::days(7)).unwrap());

        for token in [expired, foreign, "garbage".to_string()] {
            assert_eq!(authorizer.authorize(&token_event(Some(token))), Err(Unauthorized));
        }
    }

    #[test]
    fn test_failure_reasons_are_distinguished() {
        let codec = codec();
        let authorizer = Authorizer::new(codec.clone(), ResourceScope::Exact);
        let foreign = token_for(&TokenCodec::new("other", Duration::days(7)).unwrap());

        let failure = authorizer
            .authenticate(&token_event(Some(foreign)))
            .unwrap_err();
        assert_eq!(failure.reason(), "invalid_signature");
        assert_eq!(AuthorizeFailure::MissingToken.reason(), "missing_token");
    }

    #[test]
    fn test_malformed_resource_is_unauthorized_when_widening() {
        let codec = codec();
        let authorizer = Authorizer::new(codec.clone(), ResourceScope::StageWildcard);
        let event = RequestAuthorizerEvent {
            headers: Some(HashMap::from([(
                "Authorization".to_string(),
                format!("Bearer {}", token_for(&codec)),
            )])),
            method_arn: "not-an-arn".to_string(),
        };

        assert_eq!(authorizer.authorize(&event), Err(Unauthorized));
    }

    #[test]
    fn test_event_deserialization() {
        let event: TokenAuthorizerEvent = serde_json::from_value(serde_json::json!({
            "type": "TOKEN",
            "authorizationToken": "Bearer abc",
            "methodArn": ARN
        }))
        .unwrap();
        assert_eq!(event.bearer_token().unwrap(), "abc");

        let event: RequestAuthorizerEvent = serde_json::from_value(serde_json::json!({
            "headers": null,
            "methodArn": ARN
        }))
        .unwrap();
        assert_eq!(event.bearer_token().unwrap_err(), AuthorizeFailure::MissingToken);
    }
}
