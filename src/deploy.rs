//! Bounded execution of the external deployment program.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::DeployConfig;

/// Maximum size for captured output before truncation (1MB)
pub const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

const TRUNCATION_MARKER: &str = "\n... (output truncated)";

/// Result of a single deployment attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentOutcome {
    Success { stdout: String },
    /// `exit_code` is `None` when the process was ended by a signal.
    Failure {
        exit_code: Option<i32>,
        stderr: String,
    },
    TimedOut,
    LaunchError(String),
}

impl DeploymentOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DeploymentOutcome::Success { .. })
    }
}

/// Runs the deployment program as `<shell> <script>` under a hard timeout.
#[derive(Debug, Clone)]
pub struct DeploymentExecutor {
    shell: String,
    timeout: Duration,
}

impl DeploymentExecutor {
    pub fn new(shell: impl Into<String>, timeout: Duration) -> Self {
        Self {
            shell: shell.into(),
            timeout,
        }
    }

    pub fn from_config(config: &DeployConfig) -> Self {
        Self::new(config.shell.clone(), config.deploy_timeout())
    }

    /// Run the deployment program and wait for it, at most `timeout`.
    ///
    /// The child is always reaped before this returns: on timeout its process
    /// group is killed and the child waited for.
    pub async fn run(&self, command: &Path) -> DeploymentOutcome {
        let deployment_id = Uuid::now_v7();
        let started = Instant::now();
        info!(
            "Deployment {} starting: {} {}",
            deployment_id,
            self.shell,
            command.display()
        );

        let outcome = self.execute(command).await;
        let elapsed_ms = started.elapsed().as_millis();

        match &outcome {
            DeploymentOutcome::Success { stdout } => {
                info!(
                    "Deployment {} succeeded in {} ms",
                    deployment_id, elapsed_ms
                );
                info!("Deployment {} output:\n{}", deployment_id, stdout);
            }
            DeploymentOutcome::Failure { exit_code, stderr } => {
                match exit_code {
                    Some(code) => error!(
                        "Deployment {} failed with exit code {} after {} ms",
                        deployment_id, code, elapsed_ms
                    ),
                    None => error!(
                        "Deployment {} was terminated by a signal after {} ms",
                        deployment_id, elapsed_ms
                    ),
                }
                error!("Deployment {} stderr:\n{}", deployment_id, stderr);
            }
            DeploymentOutcome::TimedOut => {
                error!(
                    "Deployment {} timed out after {} seconds and was killed",
                    deployment_id,
                    self.timeout.as_secs_f64()
                );
            }
            DeploymentOutcome::LaunchError(message) => {
                error!("Deployment {} could not be started: {}", deployment_id, message);
            }
        }

        outcome
    }

    async fn execute(&self, command: &Path) -> DeploymentOutcome {
        let mut cmd = Command::new(&self.shell);
        cmd.arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a timeout can take down everything the script started.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return DeploymentOutcome::LaunchError(format!(
                    "failed to spawn '{}': {}",
                    self.shell, e
                ));
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let result = timeout(self.timeout, async {
            let (stdout, stderr, status) =
                tokio::join!(read_pipe(stdout), read_pipe(stderr), child.wait());
            status.map(|status| (stdout, stderr, status))
        })
        .await;

        match result {
            Ok(Ok((stdout, stderr, status))) => outcome_from_exit(status, stdout, stderr),
            Ok(Err(e)) => {
                // wait() itself failed, make sure nothing lingers
                terminate(&mut child).await;
                DeploymentOutcome::LaunchError(format!(
                    "failed to wait for deployment process: {}",
                    e
                ))
            }
            Err(_) => {
                terminate(&mut child).await;
                DeploymentOutcome::TimedOut
            }
        }
    }
}

/// SIGKILL the child's whole process group, then kill and reap the child itself.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            let pgid = Pid::from_raw(pid as i32);
            if let Err(e) = killpg(pgid, Signal::SIGKILL) {
                warn!("Failed to kill deployment process group {}: {}", pid, e);
            }
        }
    }

    if let Err(e) = child.kill().await {
        warn!("Failed to kill deployment process: {}", e);
    }
}

fn outcome_from_exit(status: ExitStatus, stdout: String, stderr: String) -> DeploymentOutcome {
    if status.success() {
        DeploymentOutcome::Success { stdout }
    } else {
        DeploymentOutcome::Failure {
            exit_code: status.code(),
            stderr,
        }
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let Some(mut pipe) = pipe else {
        return String::new();
    };
    let mut buf = Vec::new();
    if let Err(e) = pipe.read_to_end(&mut buf).await {
        warn!("Failed to read deployment output: {}", e);
    }
    truncate_output(String::from_utf8_lossy(&buf).into_owned())
}

/// Caps output at `MAX_OUTPUT_SIZE` bytes on a char boundary.
fn truncate_output(mut output: String) -> String {
    if output.len() > MAX_OUTPUT_SIZE {
        let mut cut = MAX_OUTPUT_SIZE;
        while !output.is_char_boundary(cut) {
            cut -= 1;
        }
        output.truncate(cut);
        output.push_str(TRUNCATION_MARKER);
    }
    output
}
