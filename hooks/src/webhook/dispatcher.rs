//! Push-event dispatcher

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::deploy::queue::DeploymentQueue;
use crate::models::deployment::DeploymentTask;

const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// Repository checkouts deployed for each configured branch
#[derive(Debug, Clone)]
pub struct RepoPaths {
    /// Checkout deployed when `main` is pushed
    pub production: PathBuf,

    /// Checkout deployed when `dev` is pushed
    pub development: PathBuf,
}

impl Default for RepoPaths {
    fn default() -> Self {
        Self {
            production: PathBuf::from("/opt/catloader"),
            development: PathBuf::from("/opt/catloader-dev"),
        }
    }
}

impl RepoPaths {
    /// Repository for `branch`, if the branch is deployable
    pub fn for_branch(&self, branch: &str) -> Option<&Path> {
        match branch {
            "main" => Some(&self.production),
            "dev" => Some(&self.development),
            _ => None,
        }
    }
}

/// Result of handling one webhook payload, returned as the response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DispatchResult {
    Accepted { branch: String, commits: usize },
    Ignored { reason: String },
    Error { message: String },
}

impl DispatchResult {
    fn error(message: impl Into<String>) -> Self {
        DispatchResult::Error {
            message: message.into(),
        }
    }
}

/// Turns verified push events into queued deployments
pub struct Dispatcher {
    repos: RepoPaths,
    queue: Arc<DeploymentQueue>,
}

impl Dispatcher {
    pub fn new(repos: RepoPaths, queue: Arc<DeploymentQueue>) -> Self {
        Self { repos, queue }
    }

    /// Handle one push payload.
    ///
    /// Returns as soon as the deployment is queued; its outcome is only
    /// visible through logs and metrics.
    pub fn handle(&self, raw_payload: &[u8]) -> DispatchResult {
        let payload: Value = match serde_json::from_slice(raw_payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Rejected webhook payload: {}", e);
                return DispatchResult::error(e.to_string());
            }
        };

        let Some(git_ref) = payload.get("ref").and_then(Value::as_str) else {
            return DispatchResult::Ignored {
                reason: "not a push event".to_string(),
            };
        };

        let branch = git_ref.strip_prefix(BRANCH_REF_PREFIX).unwrap_or(git_ref);
        let commits = payload
            .get("commits")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);

        let Some(repo_path) = self.repos.for_branch(branch) else {
            info!("Ignoring push to unconfigured branch {}", branch);
            return DispatchResult::Ignored {
                reason: format!("branch {} not configured", branch),
            };
        };

        if let Err(message) = validate_checkout(repo_path) {
            error!(branch = %branch, "{}", message);
            return DispatchResult::error(message);
        }

        let task = DeploymentTask::new(branch, repo_path);
        if let Err(e) = self.queue.executor().check(&task) {
            error!(branch = %branch, "{}", e);
            return DispatchResult::error(e.to_string());
        }

        info!(
            branch = %branch,
            environment = %task.environment(),
            "Push with {} commit(s) accepted, queueing deployment",
            commits
        );
        let handle = self.queue.submit(task);
        let detached_branch = branch.to_string();
        tokio::spawn(async move {
            match handle.await {
                Ok(_) => info!(branch = %detached_branch, "Deployment finished"),
                Err(e) => error!(branch = %detached_branch, "Deployment did not complete: {}", e),
            }
        });

        DispatchResult::Accepted {
            branch: branch.to_string(),
            commits,
        }
    }
}

fn validate_checkout(repo_path: &Path) -> Result<(), String> {
    if !repo_path.is_dir() {
        return Err(format!(
            "Repository path does not exist: {}",
            repo_path.display()
        ));
    }
    if !repo_path.join(".git").exists() {
        return Err(format!(
            "Repository path is not a git checkout: {}",
            repo_path.display()
        ));
    }
    Ok(())
}
