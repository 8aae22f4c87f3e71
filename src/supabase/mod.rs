//! Hosted backend services.

pub mod auth;

pub use auth::{AuthApiError, AuthClient, AuthUser};
