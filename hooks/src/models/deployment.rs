//! Deployment models

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Deployment target. Each environment has its own execution slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Prod,
    Dev,
}

impl Environment {
    pub const ALL: [Environment; 2] = [Environment::Prod, Environment::Dev];

    /// `main` deploys to production; every other accepted branch to dev.
    pub fn for_branch(branch: &str) -> Self {
        if branch == "main" {
            Environment::Prod
        } else {
            Environment::Dev
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Prod => "prod",
            Environment::Dev => "dev",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single requested deployment run for one branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentTask {
    /// Branch that was pushed
    pub branch: String,

    /// Absolute path of the checkout to deploy
    pub repo_path: PathBuf,

    /// When the push was accepted
    pub created_at: DateTime<Utc>,
}

impl DeploymentTask {
    pub fn new(branch: impl Into<String>, repo_path: impl Into<PathBuf>) -> Self {
        Self {
            branch: branch.into(),
            repo_path: repo_path.into(),
            created_at: Utc::now(),
        }
    }

    pub fn environment(&self) -> Environment {
        Environment::for_branch(&self.branch)
    }
}
