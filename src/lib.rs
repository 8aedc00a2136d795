//! DDoS traffic monitor
//!
//! Library half of the service: the analysis pipeline in [`core`], the HTTP
//! handlers in [`api`] and configuration loading.

pub mod api;
pub mod config;
pub mod core;
pub mod models;
pub mod utils;
