//! Authentication Module
//! Mission: Stateless bearer-token authorization and account management

pub mod api;
pub mod authorizer;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod policy;
pub mod service;
pub mod user_store;

pub use api::AuthState;
pub use authorizer::{Authorizer, Unauthorized};
pub use jwt::TokenCodec;
pub use middleware::auth_middleware;
pub use service::AccountService;
pub use user_store::{CredentialStore, SqliteUserStore};
