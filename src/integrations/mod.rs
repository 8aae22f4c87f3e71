//! Outbound integrations: generative listing descriptions and spreadsheet logging.

pub mod error;
pub mod gemini;
pub mod sheets;

pub use error::IntegrationError;
