//! Server state

use std::sync::Arc;

use secrecy::SecretString;

use crate::app::state::AppState;
use crate::deploy::queue::DeploymentQueue;
use crate::relay::ProgressRelay;
use crate::telemetry::Metrics;
use crate::webhook::dispatcher::Dispatcher;

/// Server state shared across handlers
pub struct ServerState {
    pub secret: SecretString,
    pub metrics: Arc<Metrics>,
    pub queue: Arc<DeploymentQueue>,
    pub dispatcher: Arc<Dispatcher>,
    pub relay: Arc<ProgressRelay>,
}

impl ServerState {
    pub fn new(secret: SecretString, app_state: &AppState) -> Self {
        Self {
            secret,
            metrics: app_state.metrics.clone(),
            queue: app_state.queue.clone(),
            dispatcher: app_state.dispatcher.clone(),
            relay: app_state.relay.clone(),
        }
    }
}
