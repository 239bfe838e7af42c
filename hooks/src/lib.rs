//! CatLoader hooks library
//!
//! Core modules for the deployment webhook service and download relay.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod logs;
pub mod models;
pub mod relay;
pub mod server;
pub mod telemetry;
pub mod utils;
pub mod webhook;
pub mod workers;
