//! HTTP API for the marketplace, back office and staff CRM.

pub mod admin;
pub mod auth;
pub mod crm;
pub mod error;
pub mod extract;
pub mod integrations;
pub mod middleware;
pub mod properties;
pub mod routes;
pub mod staff;
pub mod status;

pub use routes::*;
