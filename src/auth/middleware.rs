//! Authentication Middleware
//! Mission: Protect API endpoints with bearer token validation

use crate::auth::{
    authorizer::{strip_bearer, Authorizer, AuthorizeFailure, BearerSource},
    models::AuthContext,
};
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

/// Adapter so axum's (case-insensitive) header map feeds the shared core.
struct HeaderBearer<'a> {
    headers: &'a HeaderMap,
    path: &'a str,
}

impl BearerSource for HeaderBearer<'_> {
    fn bearer_token(&self) -> Result<&str, AuthorizeFailure> {
        let raw = self
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthorizeFailure::MissingToken)?
            .to_str()
            .map_err(|_| AuthorizeFailure::EmptyToken)?;

        let token = strip_bearer(raw).trim();
        if token.is_empty() {
            return Err(AuthorizeFailure::EmptyToken);
        }
        Ok(token)
    }

    fn resource(&self) -> &str {
        self.path
    }
}

/// Auth middleware that validates bearer tokens
pub async fn auth_middleware(
    State(authorizer): State<Arc<Authorizer>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let source = HeaderBearer {
        headers: req.headers(),
        path: req.uri().path(),
    };

    let claims = authorizer.authenticate(&source).map_err(|failure| {
        warn!(
            reason = failure.reason(),
            path = source.path,
            "Rejected request"
        );
        match failure {
            AuthorizeFailure::MissingToken => AuthError::MissingToken,
            _ => AuthError::InvalidToken,
        }
    })?;

    // Add verified identity to request extensions so handlers can access it
    req.extensions_mut().insert(AuthContext::from(claims));

    Ok(next.run(req).await)
}

/// Extract the verified identity from a request (use after auth middleware)
pub fn extract_context(req: &Request) -> Option<&AuthContext> {
    req.extensions().get::<AuthContext>()
}

/// Auth error types
#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match self {
            AuthError::MissingToken => "Missing authorization token",
            AuthError::InvalidToken => "Invalid or expired token",
        };

        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "unauthorized", "message": message})),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;

    #[test]
    fn test_auth_error_responses() {
        let missing = AuthError::MissingToken.into_response();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let invalid_token = AuthError::InvalidToken.into_response();
        assert_eq!(invalid_token.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_header_bearer_extraction() {
        let mut headers = HeaderMap::new();
        let source = HeaderBearer {
            headers: &headers,
            path: "/api/auth/me",
        };
        assert_eq!(source.bearer_token(), Err(AuthorizeFailure::MissingToken));

        headers.insert(AUTHORIZATION, "Bearer abc.def.ghi".parse().unwrap());
        let source = HeaderBearer {
            headers: &headers,
            path: "/api/auth/me",
        };
        assert_eq!(source.bearer_token(), Ok("abc.def.ghi"));

        headers.insert(AUTHORIZATION, "Bearer ".parse().unwrap());
        let source = HeaderBearer {
            headers: &headers,
            path: "/api/auth/me",
        };
        assert_eq!(source.bearer_token(), Err(AuthorizeFailure::EmptyToken));
    }

    #[test]
    fn test_extract_context_from_request() {
        let mut req = HttpRequest::new(Body::empty());
        assert!(extract_context(&req).is_none());

        req.extensions_mut().insert(AuthContext {
            user_id: "u-1".to_string(),
            email: "ana@x.com".to_string(),
        });

        let extracted = extract_context(&req).unwrap();
        assert_eq!(extracted.user_id, "u-1");
    }
}
