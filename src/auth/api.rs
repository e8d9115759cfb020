//! Authentication API Endpoints
//! Mission: Provide registration, login, "me" and authorizer endpoints

use crate::auth::{
    authorizer::{Authorizer, RequestAuthorizerEvent, TokenAuthorizerEvent, Unauthorized},
    middleware::extract_context,
    models::{AuthResponse, LoginRequest, MeResponse, RegisterRequest},
    policy::AccessDecision,
    service::{AccountError, AccountService, FieldError},
};
use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};

/// Shared auth state
#[derive(Clone)]
pub struct AuthState {
    pub accounts: Arc<AccountService>,
    /// Backs `/api/authorizer/token` (exact resource grants)
    pub token_authorizer: Arc<Authorizer>,
    /// Backs `/api/authorizer/request` and the bearer middleware
    pub request_authorizer: Arc<Authorizer>,
}

/// Register endpoint - POST /api/auth/register
pub async fn register(
    State(state): State<AuthState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), AuthApiError> {
    let payload = account_body(payload)?;
    let accounts = state.accounts.clone();
    let resp = run_blocking(move || accounts.register(payload)).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

/// Login endpoint - POST /api/auth/login
pub async fn login(
    State(state): State<AuthState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AuthApiError> {
    let payload = account_body(payload)?;
    let accounts = state.accounts.clone();
    Ok(Json(run_blocking(move || accounts.login(payload)).await?))
}

/// Get current user info - GET /api/auth/me
pub async fn get_current_user(
    State(state): State<AuthState>,
    req: Request,
) -> Result<Json<MeResponse>, AuthApiError> {
    let user_id = extract_context(&req)
        .ok_or(AuthApiError::Unauthorized)?
        .user_id
        .clone();
    let accounts = state.accounts.clone();
    Ok(Json(run_blocking(move || accounts.me(&user_id)).await?))
}

/// Token-field authorizer - POST /api/authorizer/token
pub async fn authorize_token(
    State(state): State<AuthState>,
    event: Result<Json<TokenAuthorizerEvent>, JsonRejection>,
) -> Result<Json<AccessDecision>, AuthApiError> {
    let event = authorizer_event(event)?;
    Ok(Json(state.token_authorizer.authorize(&event)?))
}

/// Header-map authorizer - POST /api/authorizer/request
pub async fn authorize_request(
    State(state): State<AuthState>,
    event: Result<Json<RequestAuthorizerEvent>, JsonRejection>,
) -> Result<Json<AccessDecision>, AuthApiError> {
    let event = authorizer_event(event)?;
    Ok(Json(state.request_authorizer.authorize(&event)?))
}

/// Undecodable account bodies are reported like any other field error.
fn account_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AuthApiError> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        AuthApiError::Validation(vec![FieldError::new("body", rejection.body_text())])
    })
}

/// Authorizer callers only ever see the bare denial.
fn authorizer_event<T>(event: Result<Json<T>, JsonRejection>) -> Result<T, AuthApiError> {
    event.map(|Json(event)| event).map_err(|rejection| {
        warn!(reason = "bad_event", detail = %rejection.body_text(), "Authorization denied");
        AuthApiError::Unauthorized
    })
}

/// bcrypt and SQLite calls block, so keep them off the async workers.
async fn run_blocking<T, F>(f: F) -> Result<T, AuthApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, AccountError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("Account task panicked: {}", e);
            AuthApiError::InternalError
        })?
        .map_err(AuthApiError::from)
}

/// Auth API errors
#[derive(Debug)]
pub enum AuthApiError {
    Validation(Vec<FieldError>),
    InvalidCredentials,
    Unauthorized,
    UserNotFound,
    UserAlreadyExists,
    InternalError,
}

impl From<AccountError> for AuthApiError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::Validation(errors) => AuthApiError::Validation(errors),
            AccountError::DuplicateUser => AuthApiError::UserAlreadyExists,
            AccountError::InvalidCredentials => AuthApiError::InvalidCredentials,
            AccountError::NotFound => AuthApiError::UserNotFound,
            AccountError::Internal(e) => {
                error!("Account operation failed: {:#}", e);
                AuthApiError::InternalError
            }
        }
    }
}

impl From<Unauthorized> for AuthApiError {
    fn from(_: Unauthorized) -> Self {
        AuthApiError::Unauthorized
    }
}

impl IntoResponse for AuthApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AuthApiError::Validation(_) => {
                (StatusCode::BAD_REQUEST, "validation_failed", "Validation failed")
            }
            AuthApiError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                "Invalid email or password",
            ),
            AuthApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", "Unauthorized"),
            AuthApiError::UserNotFound => (StatusCode::NOT_FOUND, "not_found", "User not found"),
            AuthApiError::UserAlreadyExists => (
                StatusCode::CONFLICT,
                "duplicate_user",
                "A user with this email already exists",
            ),
            AuthApiError::InternalError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error",
            ),
        };

        let body = match self {
            AuthApiError::Validation(details) => {
                json!({"error": code, "message": message, "details": details})
            }
            _ => json!({"error": code, "message": message}),
        };

        (status, Json(body)).into_response()
    }
}
