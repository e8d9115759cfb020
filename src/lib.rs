//! authgate
//!
//! Stateless bearer-token authorization: issues signed session tokens at
//! registration/login, verifies them per request and turns a verified
//! identity into an execute-api access decision.

pub mod auth;
pub mod config;
pub mod middleware;
pub mod server;
