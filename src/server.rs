//! HTTP server assembly
//! Mission: Wire config into the auth components and expose them over axum

use crate::{
    auth::{
        api as auth_api, auth_middleware,
        password::BcryptHasher,
        policy::ResourceScope,
        AccountService, AuthState, Authorizer, SqliteUserStore, TokenCodec,
    },
    config::Config,
    middleware::request_logging,
};
use anyhow::{Context, Result};
use axum::{
    middleware,
    routing::{get, post},
    Json, Router,
};
use chrono::Duration;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

/// Build the shared auth state from validated configuration.
pub fn build_state(config: &Config) -> Result<AuthState> {
    config.validate()?;

    let codec = Arc::new(
        TokenCodec::new(&config.jwt_secret, Duration::days(config.token_ttl_days))
            .context("Failed to initialize token codec")?,
    );
    let store = Arc::new(SqliteUserStore::new(&config.auth_db_path)?);
    let hasher = Arc::new(BcryptHasher::new(config.bcrypt_cost));

    info!("🔐 User store initialized at: {}", config.auth_db_path);

    if config.request_authorizer_scope == ResourceScope::StageWildcard {
        warn!("Request authorizer grants stage-wide */* access per decision");
    }

    Ok(AuthState {
        accounts: Arc::new(AccountService::new(store, hasher, codec.clone())?),
        token_authorizer: Arc::new(Authorizer::new(codec.clone(), ResourceScope::Exact)),
        request_authorizer: Arc::new(Authorizer::new(codec, config.request_authorizer_scope)),
    })
}

pub fn router(state: AuthState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/register", post(auth_api::register))
        .route("/api/auth/login", post(auth_api::login))
        .route("/api/authorizer/token", post(auth_api::authorize_token))
        .route("/api/authorizer/request", post(auth_api::authorize_request))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/auth/me", get(auth_api::get_current_user))
        .route_layer(middleware::from_fn_with_state(
            state.request_authorizer.clone(),
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(middleware::from_fn(request_logging))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health_check() -> Json<Value> {
    Json(json!({"status": "ok"}))
}
