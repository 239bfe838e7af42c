//! Integration tests for the CatLoader hooks service

mod common;
mod test_executor;
mod test_relay_server;
mod test_webhook_server;
