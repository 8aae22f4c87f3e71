pub mod app;
pub mod cli;
pub mod config;
pub mod crm;
pub mod data;
pub mod integrations;
pub mod json;
pub mod logging;
pub mod price;
pub mod rate_limit;
pub mod state;
pub mod supabase;
pub mod utils;
pub mod web;
