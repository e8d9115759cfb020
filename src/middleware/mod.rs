//! HTTP middleware for observability.

pub mod logging;

pub use logging::request_logging;
