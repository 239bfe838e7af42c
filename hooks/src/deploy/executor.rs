//! Deployment script executor

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::errors::DeployError;
use crate::models::deployment::DeploymentTask;

/// Marker exported to the deploy script so it skips interactive prompts
pub const AUTOMATED_MARKER_VAR: &str = "CATLOADER_AUTO_DEPLOY";

/// How long to keep collecting output once the script has exited
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Runs one deployment task to completion
#[async_trait]
pub trait Executor: Send + Sync {
    /// Cheap synchronous precondition check, run before anything is queued.
    fn check(&self, _task: &DeploymentTask) -> Result<(), DeployError> {
        Ok(())
    }

    /// Execute the task, returning the captured output on success.
    async fn execute(&self, task: &DeploymentTask) -> Result<String, DeployError>;
}

/// Executor options
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Script location relative to the repository root
    pub script: PathBuf,

    /// Wall-clock limit for one deployment
    pub timeout: Duration,

    /// Time between the graceful and the forced kill
    pub kill_grace: Duration,

    /// Mirror script output to the service's own stdout/stderr
    pub mirror_output: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            script: PathBuf::from("scripts/deploy.sh"),
            timeout: Duration::from_secs(600), // 10 minutes
            kill_grace: Duration::from_secs(10),
            mirror_output: true,
        }
    }
}

/// Executes `<repo>/scripts/deploy.sh` as a child process
pub struct ScriptExecutor {
    options: ExecutorOptions,
}

impl ScriptExecutor {
    pub fn new(options: ExecutorOptions) -> Self {
        Self { options }
    }

    pub fn script_path(&self, task: &DeploymentTask) -> PathBuf {
        task.repo_path.join(&self.options.script)
    }
}

#[async_trait]
impl Executor for ScriptExecutor {
    fn check(&self, task: &DeploymentTask) -> Result<(), DeployError> {
        let script = self.script_path(task);
        if !script.is_file() {
            return Err(DeployError::ScriptNotFound(script.display().to_string()));
        }
        Ok(())
    }

    async fn execute(&self, task: &DeploymentTask) -> Result<String, DeployError> {
        self.check(task)?;
        let script = self.script_path(task);

        info!(
            branch = %task.branch,
            environment = %task.environment(),
            "Running deploy script: {}",
            script.display()
        );

        let mut child = Command::new(&script)
            .current_dir(&task.repo_path)
            .env(AUTOMATED_MARKER_VAR, "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(DeployError::SpawnError)?;

        // Both pumps feed one channel so the buffer keeps arrival order.
        let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        if let Some(stdout) = child.stdout.take() {
            let mirror = self.options.mirror_output.then(tokio::io::stdout);
            tokio::spawn(pump(stdout, mirror, chunk_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            let mirror = self.options.mirror_output.then(tokio::io::stderr);
            tokio::spawn(pump(stderr, mirror, chunk_tx.clone()));
        }
        drop(chunk_tx);

        let status = tokio::select! {
            status = child.wait() => status.map_err(DeployError::SpawnError)?,
            _ = tokio::time::sleep(self.options.timeout) => {
                warn!(
                    branch = %task.branch,
                    "Deployment exceeded {:?}, terminating",
                    self.options.timeout
                );
                terminate(&mut child, self.options.kill_grace).await;
                return Err(DeployError::DeployTimeout(self.options.timeout));
            }
        };

        let mut output = Vec::new();
        let drain = async {
            while let Some(chunk) = chunk_rx.recv().await {
                output.extend_from_slice(&chunk);
            }
        };
        if tokio::time::timeout(OUTPUT_DRAIN_GRACE, drain).await.is_err() {
            // Background processes started by the script still hold the pipes.
            debug!("Deploy output still open after script exit, not waiting further");
        }
        let output = String::from_utf8_lossy(&output).into_owned();

        settle(status, output)
    }
}

fn settle(status: ExitStatus, output: String) -> Result<String, DeployError> {
    if status.success() {
        Ok(output)
    } else {
        Err(DeployError::DeployFailed {
            exit_code: status.code(),
        })
    }
}

async fn pump<R, W>(mut reader: R, mut mirror: Option<W>, chunks: mpsc::UnboundedSender<Vec<u8>>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if let Some(out) = mirror.as_mut() {
                    let _ = out.write_all(&buf[..n]).await;
                    let _ = out.flush().await;
                }
                if chunks.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!("Deploy output stream closed: {}", e);
                break;
            }
        }
    }
}

/// Graceful signal first, forced kill once `grace` has passed.
async fn terminate(child: &mut Child, grace: Duration) {
    send_graceful_stop(child);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(_) => debug!("Deploy script exited after graceful stop"),
        Err(_) => {
            warn!("Deploy script still running after {:?}, killing", grace);
            if let Err(e) = child.kill().await {
                error!("Failed to kill deploy script: {}", e);
            }
        }
    }
}

#[cfg(unix)]
fn send_graceful_stop(child: &Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            warn!("Failed to send SIGTERM to deploy script: {}", e);
        }
    }
}

#[cfg(not(unix))]
fn send_graceful_stop(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        warn!("Failed to stop deploy script: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_script_is_reported_before_spawn() {
        let tmp = tempfile::tempdir().unwrap();
        let executor = ScriptExecutor::new(ExecutorOptions::default());
        let task = DeploymentTask::new("main", tmp.path());

        let err = executor.check(&task).unwrap_err();
        assert!(matches!(err, DeployError::ScriptNotFound(_)));
    }

    #[test]
    fn test_default_options() {
        let options = ExecutorOptions::default();
        assert_eq!(options.timeout, Duration::from_secs(600));
        assert_eq!(options.kill_grace, Duration::from_secs(10));
        assert_eq!(options.script, PathBuf::from("scripts/deploy.sh"));
    }
}
