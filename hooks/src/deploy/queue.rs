//! Per-environment serialized deployment queue

use std::collections::{HashMap, VecDeque};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::deploy::executor::Executor;
use crate::errors::DeployError;
use crate::models::deployment::{DeploymentTask, Environment};
use crate::telemetry::Metrics;

type Settlement = Result<String, DeployError>;

struct QueuedTask {
    task: DeploymentTask,
    reply: oneshot::Sender<Settlement>,
}

#[derive(Default)]
struct EnvironmentQueueState {
    running: bool,
    pending: VecDeque<QueuedTask>,
}

/// Queue status of one environment as reported by `/health`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub running: bool,
    pub queue_depth: usize,
}

/// Serializes deployments per environment.
///
/// At most one task per environment runs at a time; waiting tasks are
/// promoted strictly in arrival order. Environments never block each other.
pub struct DeploymentQueue {
    executor: Arc<dyn Executor>,
    metrics: Arc<Metrics>,
    states: Mutex<HashMap<Environment, EnvironmentQueueState>>,
}

impl DeploymentQueue {
    pub fn new(executor: Arc<dyn Executor>, metrics: Arc<Metrics>) -> Self {
        let states = Environment::ALL
            .into_iter()
            .map(|env| (env, EnvironmentQueueState::default()))
            .collect();

        Self {
            executor,
            metrics,
            states: Mutex::new(states),
        }
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    /// Queue a task. The returned handle settles when the task has run.
    pub fn submit(self: &Arc<Self>, task: DeploymentTask) -> DeploymentHandle {
        let env = task.environment();
        let (reply, settled) = oneshot::channel();
        let queued = QueuedTask { task, reply };

        let start_now = {
            let mut states = self.lock_states();
            let state = states.entry(env).or_default();
            if state.running {
                state.pending.push_back(queued);
                info!(
                    environment = %env,
                    "Deployment queued behind running task ({} waiting)",
                    state.pending.len()
                );
                None
            } else {
                state.running = true;
                Some(queued)
            }
        };

        if let Some(first) = start_now {
            let queue = Arc::clone(self);
            tokio::spawn(async move { queue.drain(env, first).await });
        }

        DeploymentHandle { settled }
    }

    /// Snapshot of every environment's queue
    pub fn snapshot(&self) -> HashMap<Environment, QueueStatus> {
        self.lock_states()
            .iter()
            .map(|(env, state)| {
                (
                    *env,
                    QueueStatus {
                        running: state.running,
                        queue_depth: state.pending.len(),
                    },
                )
            })
            .collect()
    }

    pub fn status(&self, env: Environment) -> QueueStatus {
        self.snapshot().get(&env).copied().unwrap_or(QueueStatus {
            running: false,
            queue_depth: 0,
        })
    }

    /// Run `first`, then every task queued behind it, until `env` is idle.
    async fn drain(self: Arc<Self>, env: Environment, first: QueuedTask) {
        let mut current = Some(first);
        while let Some(QueuedTask { task, reply }) = current.take() {
            let result = self.run(env, &task).await;
            // Promote before settling so a resolved handle never observes a stale slot.
            current = self.promote(env);
            // The submitter may have stopped listening; the outcome is already logged.
            let _ = reply.send(result);
        }
    }

    /// Pop the oldest pending task, or mark the environment idle.
    fn promote(&self, env: Environment) -> Option<QueuedTask> {
        let mut states = self.lock_states();
        let state = states.entry(env).or_default();
        match state.pending.pop_front() {
            Some(next) => Some(next),
            None => {
                state.running = false;
                None
            }
        }
    }

    async fn run(&self, env: Environment, task: &DeploymentTask) -> Settlement {
        self.metrics.record_deployment_started();
        let waited_ms = (Utc::now() - task.created_at).num_milliseconds().max(0);
        info!(
            environment = %env,
            branch = %task.branch,
            waited_ms,
            "Starting deployment"
        );

        // A panicking executor must still release the slot.
        let result = match AssertUnwindSafe(self.executor.execute(task))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => Err(DeployError::Panicked(panic_message(panic.as_ref()))),
        };
        match &result {
            Ok(_) => {
                self.metrics.record_deployment_succeeded();
                info!(environment = %env, branch = %task.branch, "Deployment succeeded");
            }
            Err(e) => {
                self.metrics.record_deployment_failed();
                error!(environment = %env, branch = %task.branch, "Deployment failed: {}", e);
            }
        }
        result
    }

    fn lock_states(&self) -> MutexGuard<'_, HashMap<Environment, EnvironmentQueueState>> {
        // A panic while holding the lock leaves the map itself consistent.
        self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Resolves with the task's output once its turn has completed
pub struct DeploymentHandle {
    settled: oneshot::Receiver<Settlement>,
}

impl Future for DeploymentHandle {
    type Output = Settlement;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.settled)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(DeployError::QueueClosed)))
    }
}
