//! Account Service
//! Mission: Registration, login and "who am I" on top of store, hasher and codec

use crate::auth::{
    jwt::TokenCodec,
    models::{AuthResponse, LoginRequest, MeResponse, PublicUser, RegisterRequest, Subject, User},
    password::PasswordHasher,
    user_store::{CredentialStore, StoreError},
};
use anyhow::Context;
use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

pub const MIN_NAME_CHARS: usize = 2;
pub const MIN_PASSWORD_CHARS: usize = 6;

/// Plaintext behind the decoy hash verified when a login email is unknown.
const DECOY_PASSWORD: &str = "decoy-password-never-issued";

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is valid");
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("validation failed")]
    Validation(Vec<FieldError>),

    #[error("a user with this email already exists")]
    DuplicateUser,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("user not found")]
    NotFound,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub struct AccountService {
    store: Arc<dyn CredentialStore>,
    hasher: Arc<dyn PasswordHasher>,
    codec: Arc<TokenCodec>,
    /// Verified against on unknown emails so both login failures cost one hash check.
    decoy_hash: String,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: Arc<dyn PasswordHasher>,
        codec: Arc<TokenCodec>,
    ) -> anyhow::Result<Self> {
        let decoy_hash = hasher
            .hash(DECOY_PASSWORD)
            .context("Failed to prepare decoy password hash")?;

        Ok(Self {
            store,
            hasher,
            codec,
            decoy_hash,
        })
    }

    pub fn register(&self, req: RegisterRequest) -> Result<AuthResponse, AccountError> {
        let name = req.name.trim();
        let mut errors = Vec::new();
        if name.chars().count() < MIN_NAME_CHARS {
            errors.push(FieldError::new(
                "name",
                format!("must be at least {} characters", MIN_NAME_CHARS),
            ));
        }
        check_email(&req.email, &mut errors);
        if req.password.chars().count() < MIN_PASSWORD_CHARS {
            errors.push(FieldError::new(
                "password",
                format!("must be at least {} characters", MIN_PASSWORD_CHARS),
            ));
        }
        if !errors.is_empty() {
            return Err(AccountError::Validation(errors));
        }

        if self.store.find_by_email(&req.email)?.is_some() {
            warn!("Registration rejected: email already registered");
            return Err(AccountError::DuplicateUser);
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            email: req.email,
            password_hash: self.hasher.hash(&req.password)?,
            created_at: now,
            updated_at: now,
            last_login: None,
        };

        // the store's unique constraint settles lookup-then-insert races
        self.store.insert(&user).map_err(|e| match e {
            StoreError::DuplicateEmail => AccountError::DuplicateUser,
            StoreError::Backend(e) => AccountError::Internal(e),
        })?;

        let token = self.issue_for(&user)?;
        info!(user_id = %user.id, "🆕 Registered user");

        Ok(AuthResponse {
            token,
            user: PublicUser::from_user(&user),
        })
    }

    pub fn login(&self, req: LoginRequest) -> Result<AuthResponse, AccountError> {
        let mut errors = Vec::new();
        check_email(&req.email, &mut errors);
        if req.password.is_empty() {
            errors.push(FieldError::new("password", "is required"));
        }
        if !errors.is_empty() {
            return Err(AccountError::Validation(errors));
        }

        // unknown email and wrong password must look the same from outside
        let Some(user) = self.store.find_by_email(&req.email)? else {
            let _ = self.hasher.verify(&req.password, &self.decoy_hash)?;
            warn!(reason = "unknown_email", "❌ Failed login attempt");
            return Err(AccountError::InvalidCredentials);
        };

        if !self.hasher.verify(&req.password, &user.password_hash)? {
            warn!(user_id = %user.id, reason = "wrong_password", "❌ Failed login attempt");
            return Err(AccountError::InvalidCredentials);
        }

        if !self.store.record_login(&user.id, Utc::now())? {
            warn!(user_id = %user.id, "User vanished before last_login could be recorded");
        }

        let token = self.issue_for(&user)?;
        info!(user_id = %user.id, "✅ Login successful");

        Ok(AuthResponse {
            token,
            user: PublicUser::from_user(&user),
        })
    }

    /// `user_id` comes from an already verified token. Tokens can outlive
    /// their user, so absence is a normal `NotFound`.
    pub fn me(&self, user_id: &str) -> Result<MeResponse, AccountError> {
        self.store
            .find_by_id(user_id)?
            .map(|user| MeResponse::from_user(&user))
            .ok_or(AccountError::NotFound)
    }

    fn issue_for(&self, user: &User) -> Result<String, AccountError> {
        self.codec
            .issue(&Subject::from_user(user))
            .map(|issued| issued.token)
            .map_err(|e| AccountError::Internal(e.into()))
    }
}

fn check_email(email: &str, errors: &mut Vec<FieldError>) {
    if !EMAIL_RE.is_match(email) {
        errors.push(FieldError::new("email", "must be a valid email address"));
    }
}
