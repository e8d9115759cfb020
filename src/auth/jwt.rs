//! JWT Token Codec
//! Mission: Issue and verify signed session tokens

use crate::auth::models::{SessionClaims, Subject, CLAIMS_VERSION};
use anyhow::{ensure, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// Default validity window for issued tokens.
pub const DEFAULT_TOKEN_TTL_DAYS: i64 = 7;

/// Token verification/issuance failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed: {0}")]
    Malformed(String),

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("failed to sign token")]
    Signing,
}

impl TokenError {
    /// Short, non-sensitive label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TokenError::Malformed(_) => "malformed",
            TokenError::InvalidSignature => "invalid_signature",
            TokenError::Expired => "expired",
            TokenError::Signing => "signing",
        }
    }
}

/// A freshly signed token together with its claims.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: SessionClaims,
}

/// HS256 token codec bound to a single signing secret.
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validity: Duration,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("validity", &self.validity)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Create a codec. An empty secret is rejected outright.
    pub fn new(secret: &str, validity: Duration) -> Result<Self> {
        ensure!(!secret.trim().is_empty(), "token signing secret must not be empty");
        ensure!(validity > Duration::zero(), "token validity must be positive");

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validity,
        })
    }

    /// Issue a token for `subject`, valid from now.
    pub fn issue(&self, subject: &Subject) -> Result<IssuedToken, TokenError> {
        self.issue_at(subject, Utc::now())
    }

    /// Issue a token as if the current time were `now`.
    pub fn issue_at(&self, subject: &Subject, now: DateTime<Utc>) -> Result<IssuedToken, TokenError> {
        let iat = now.timestamp();
        let claims = SessionClaims {
            ver: CLAIMS_VERSION,
            user_id: subject.user_id.clone(),
            email: subject.email.clone(),
            iat,
            exp: iat + self.validity.num_seconds(),
        };

        debug!(user_id = %claims.user_id, exp = claims.exp, "Issuing session token");

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|_| TokenError::Signing)?;

        Ok(IssuedToken { token, claims })
    }

    /// Verify a token against the current time.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Verify a token as if the current time were `now`.
    ///
    /// Checks run in a fixed order: signature, then expiry, then claim
    /// structure. Nothing inside the payload is looked at until the
    /// signature has verified.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, TokenError> {
        let payload = self.verify_signature(token)?;

        // exp is a signed claim, so it is trusted from here on
        if let Some(exp) = payload.get("exp").and_then(Value::as_i64) {
            if now.timestamp() >= exp {
                debug!(kind = "expired", "Token verification failed");
                return Err(TokenError::Expired);
            }
        }

        let claims = validate_structure(payload).inspect_err(|e| {
            debug!(kind = e.kind(), "Token verification failed");
        })?;

        Ok(claims)
    }

    /// Decode the payload as an open map once the HS256 signature checks out.
    /// Expiry and required-claim checks are done by hand afterwards.
    fn verify_signature(&self, token: &str) -> Result<Map<String, Value>, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        decode::<Map<String, Value>>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                let err = match e.kind() {
                    ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                        TokenError::InvalidSignature
                    }
                    other => TokenError::Malformed(format!("{:?}", other)),
                };
                debug!(kind = err.kind(), "Token verification failed");
                err
            })
    }
}

fn validate_structure(payload: Map<String, Value>) -> Result<SessionClaims, TokenError> {
    let claims: SessionClaims = serde_json::from_value(Value::Object(payload))
        .map_err(|e| TokenError::Malformed(e.to_string()))?;

    if claims.ver != CLAIMS_VERSION {
        return Err(TokenError::Malformed(format!(
            "unsupported claims version {}",
            claims.ver
        )));
    }
    if claims.user_id.trim().is_empty() {
        return Err(TokenError::Malformed("empty userId".to_string()));
    }
    if claims.email.trim().is_empty() {
        return Err(TokenError::Malformed("empty email".to_string()));
    }
    if claims.exp <= claims.iat {
        return Err(TokenError::Malformed("exp is not after iat".to_string()));
    }

    Ok(claims)
}
