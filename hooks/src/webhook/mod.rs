//! Webhook verification and dispatch

pub mod dispatcher;
pub mod signature;
