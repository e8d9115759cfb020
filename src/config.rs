//! Service configuration
//!
//! Every field can come from the command line or the environment (`.env` is
//! loaded first by `main`). The signing secret has no default: startup fails
//! when it is absent or blank.

use crate::auth::{jwt::DEFAULT_TOKEN_TTL_DAYS, policy::ResourceScope};
use anyhow::{ensure, Result};
use clap::Parser;

/// Upper bound on `TOKEN_TTL_DAYS`; keeps `iat + ttl` well inside the timestamp range.
pub const MAX_TOKEN_TTL_DAYS: i64 = 3650;

#[derive(Parser, Clone)]
#[command(name = "authgate")]
#[command(about = "Stateless token authorizer and account service")]
pub struct Config {
    /// HS256 secret used to sign and verify session tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// Session token validity in days
    #[arg(long, env = "TOKEN_TTL_DAYS", default_value_t = DEFAULT_TOKEN_TTL_DAYS)]
    pub token_ttl_days: i64,

    /// SQLite database holding user accounts
    #[arg(long, env = "AUTH_DB_PATH", default_value = "authgate.db")]
    pub auth_db_path: String,

    /// Address the HTTP server binds to
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:3000")]
    pub bind_addr: String,

    /// bcrypt work factor for new password hashes
    #[arg(long, env = "BCRYPT_COST", default_value_t = bcrypt::DEFAULT_COST)]
    pub bcrypt_cost: u32,

    /// Resource scope granted by the header-map authorizer
    #[arg(
        long,
        env = "REQUEST_AUTHORIZER_SCOPE",
        value_enum,
        default_value = "stage-wildcard"
    )]
    pub request_authorizer_scope: ResourceScope,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.jwt_secret.trim().is_empty(),
            "JWT_SECRET must be set to a non-empty value"
        );
        ensure!(
            (1..=MAX_TOKEN_TTL_DAYS).contains(&self.token_ttl_days),
            "TOKEN_TTL_DAYS must be between 1 and {}",
            MAX_TOKEN_TTL_DAYS
        );
        ensure!(
            (4..=31).contains(&self.bcrypt_cost),
            "BCRYPT_COST must be between 4 and 31"
        );
        Ok(())
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl_days", &self.token_ttl_days)
            .field("auth_db_path", &self.auth_db_path)
            .field("bind_addr", &self.bind_addr)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("request_authorizer_scope", &self.request_authorizer_scope)
            .finish()
    }
}
