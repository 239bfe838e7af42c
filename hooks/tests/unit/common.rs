//! Shared fixtures

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::Response;
use tokio::sync::mpsc;

use catloader_hooks::deploy::executor::Executor;
use catloader_hooks::errors::DeployError;
use catloader_hooks::models::deployment::DeploymentTask;

pub const SECRET: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

/// Executor that reports each task it runs and succeeds immediately
pub struct ChannelExecutor {
    tasks: mpsc::UnboundedSender<DeploymentTask>,
}

impl ChannelExecutor {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<DeploymentTask>) {
        let (tasks, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tasks }), rx)
    }
}

#[async_trait]
impl Executor for ChannelExecutor {
    async fn execute(&self, task: &DeploymentTask) -> Result<String, DeployError> {
        let _ = self.tasks.send(task.clone());
        Ok(String::new())
    }
}

/// A directory that looks like a git checkout
pub fn fake_checkout(root: &Path, name: &str) -> std::path::PathBuf {
    let repo = root.join(name);
    std::fs::create_dir_all(repo.join(".git")).unwrap();
    repo
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
