//! Per-host script pipeline: the production [`AssetDeployer`].
//!
//! For every host the pipeline is strictly ordered: create scratch dir →
//! write scripts → forward as root → validation → cleanup. Cleanup is
//! best-effort; a host where the forward script succeeded but cleanup failed
//! still counts as a success, and scripts are written with overwrite
//! semantics so leftovers from an earlier attempt never break a re-deploy.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use remedy_core::{Asset, DeploymentId, Patch};
use remedy_transport::{
    ConnectionPool, ExecOptions, RemoteExecutor, SessionLease, TransportError,
};
use tracing::{debug, info, warn};

use crate::types::{AssetDeployer, HostDeployOutcome};

/// Deadline for housekeeping commands (mkdir, rm).
const HOUSEKEEPING_TIMEOUT: Duration = Duration::from_secs(30);

/// Applies a patch to one host over a pooled session.
pub struct ScriptDeployer {
    pool: Arc<ConnectionPool>,
    executor: RemoteExecutor,
    command_timeout: Duration,
}

impl ScriptDeployer {
    /// Creates a deployer with the given per-command timeout.
    #[must_use]
    pub fn new(pool: Arc<ConnectionPool>, executor: RemoteExecutor, command_timeout: Duration) -> Self {
        Self {
            pool,
            executor,
            command_timeout,
        }
    }

    /// Scratch directory used on the remote host for one deployment.
    #[must_use]
    pub fn scratch_dir(deployment_id: &DeploymentId) -> String {
        format!("/tmp/remedy-{deployment_id}")
    }

    async fn apply(
        &self,
        deployment_id: &DeploymentId,
        patch: &Patch,
        asset: &Asset,
    ) -> Result<HostDeployOutcome, TransportError> {
        let lease = self.pool.acquire_write(asset).await?;

        let scratch = Self::scratch_dir(deployment_id);
        let forward_path = format!("{scratch}/forward.sh");
        let validate_path = format!("{scratch}/validate.sh");

        let mkdir = self
            .executor
            .execute_command(
                &lease,
                &format!("mkdir -p {scratch} && chmod 700 {scratch}"),
                &ExecOptions::new().with_timeout(HOUSEKEEPING_TIMEOUT),
            )
            .await?;
        if !mkdir.ok() {
            return Ok(HostDeployOutcome::failure(format!(
                "failed to prepare scratch directory: {}",
                mkdir.stderr
            )));
        }

        self.executor
            .write_file(&lease, &forward_path, patch.forward_script.as_bytes(), 0o700)
            .await?;
        if let Some(validation) = &patch.validation_script {
            self.executor
                .write_file(&lease, &validate_path, validation.as_bytes(), 0o700)
                .await?;
        }

        let forward = self
            .executor
            .execute_command(
                &lease,
                &format!("bash {forward_path}"),
                &ExecOptions::new()
                    .with_sudo(true)
                    .with_timeout(self.command_timeout),
            )
            .await?;

        let mut success = forward.ok();
        let mut message = None;

        if forward.timed_out {
            message = Some(format!(
                "forward script timed out after {}s",
                self.command_timeout.as_secs()
            ));
        } else if !forward.ok() {
            message = Some(format!("forward script exited {}", forward.exit_code));
        } else if patch.validation_script.is_some() {
            let validation = self
                .executor
                .execute_command(
                    &lease,
                    &format!("bash {validate_path}"),
                    &ExecOptions::new()
                        .with_sudo(true)
                        .with_timeout(self.command_timeout),
                )
                .await?;
            if !validation.ok() {
                success = false;
                message = Some(format!("validation script exited {}", validation.exit_code));
            }
        }

        self.cleanup(&lease, &scratch).await;

        debug!(
            host = %asset.id,
            deployment_id = %deployment_id,
            success,
            "host pipeline finished"
        );

        Ok(HostDeployOutcome {
            success,
            stdout: forward.stdout,
            stderr: forward.stderr,
            message,
        })
    }

    async fn cleanup(&self, lease: &SessionLease, scratch: &str) {
        let result = self
            .executor
            .execute_command(
                lease,
                &format!("rm -rf {scratch}"),
                &ExecOptions::new()
                    .with_sudo(true)
                    .with_timeout(HOUSEKEEPING_TIMEOUT),
            )
            .await;
        match result {
            Ok(outcome) if outcome.ok() => {}
            Ok(outcome) => warn!(
                host = %lease.asset_id(),
                exit_code = outcome.exit_code,
                "scratch cleanup failed, leaving files behind"
            ),
            Err(e) => warn!(host = %lease.asset_id(), error = %e, "scratch cleanup errored"),
        }
    }
}

impl std::fmt::Debug for ScriptDeployer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptDeployer")
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AssetDeployer for ScriptDeployer {
    async fn deploy(
        &self,
        deployment_id: &DeploymentId,
        patch: &Patch,
        asset: &Asset,
    ) -> HostDeployOutcome {
        info!(host = %asset.id, deployment_id = %deployment_id, "deploying patch to host");
        match self.apply(deployment_id, patch, asset).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(host = %asset.id, error = %e, "host deployment failed at transport level");
                // A broken session must not be reused by the next operation.
                if matches!(e, TransportError::ConnectionLost { .. }) {
                    self.pool.evict(&asset.id).await;
                }
                HostDeployOutcome::failure(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remedy_core::ConnectionParams;
    use remedy_transport::{
        Credential, MemoryConnector, PoolConfig, StaticSecretProvider,
    };

    fn asset(id: &str) -> Asset {
        Asset::new(id, id, "10.0.0.1").with_connection(ConnectionParams::new("deploy", "ref"))
    }

    fn deployer_over(connector: MemoryConnector) -> ScriptDeployer {
        let secrets =
            StaticSecretProvider::new().with_credential("ref", Credential::password("pw"));
        let pool = Arc::new(ConnectionPool::new(
            Arc::new(connector),
            Arc::new(secrets),
            PoolConfig::default(),
        ));
        ScriptDeployer::new(pool, RemoteExecutor::new(), Duration::from_secs(300))
    }

    #[tokio::test]
    async fn pipeline_runs_in_order() {
        let connector = MemoryConnector::new();
        let recorder = connector.clone();
        let deployer = deployer_over(connector);
        let deployment_id = DeploymentId::new();
        let patch = Patch::new("p1", "echo ok")
            .with_validation_script("test -f /etc/passwd")
            .approved();

        let outcome = deployer.deploy(&deployment_id, &patch, &asset("h1")).await;
        assert!(outcome.success);

        let commands = recorder.commands_for("h1");
        assert!(commands[0].starts_with("mkdir -p /tmp/remedy-"));
        assert!(commands[1].contains("sudo -n bash") && commands[1].contains("forward.sh"));
        assert!(commands[2].contains("validate.sh"));
        assert!(commands[3].contains("rm -rf /tmp/remedy-"));

        let files = recorder.written_files();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.mode == 0o700));
    }

    #[tokio::test]
    async fn validation_is_skipped_when_forward_fails() {
        let connector = MemoryConnector::new();
        connector.fail_command(None, "forward.sh", 1, "", "apply failed");
        let recorder = connector.clone();
        let deployer = deployer_over(connector);
        let patch = Patch::new("p1", "exit 1")
            .with_validation_script("echo validate")
            .approved();

        let outcome = deployer.deploy(&DeploymentId::new(), &patch, &asset("h1")).await;
        assert!(!outcome.success);
        assert!(outcome.message.as_deref().is_some_and(|m| m.contains("exited 1")));

        let commands = recorder.commands_for("h1");
        assert!(!commands.iter().any(|c| c.contains("validate.sh") && c.contains("bash")));
    }

    #[tokio::test]
    async fn validation_failure_fails_the_host() {
        let connector = MemoryConnector::new();
        connector.fail_command(None, "validate.sh", 3, "", "still vulnerable");
        let deployer = deployer_over(connector);
        let patch = Patch::new("p1", "echo ok")
            .with_validation_script("exit 3")
            .approved();

        let outcome = deployer.deploy(&DeploymentId::new(), &patch, &asset("h1")).await;
        assert!(!outcome.success);
        assert!(outcome.message.as_deref().is_some_and(|m| m.contains("validation")));
    }

    #[tokio::test]
    async fn cleanup_failure_does_not_fail_the_host() {
        let connector = MemoryConnector::new();
        connector.fail_command(None, "rm -rf", 1, "", "device busy");
        let deployer = deployer_over(connector);
        let patch = Patch::new("p1", "echo ok").approved();

        let outcome = deployer.deploy(&DeploymentId::new(), &patch, &asset("h1")).await;
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn redeploy_after_cleanup_failure_overwrites_leftovers() {
        let connector = MemoryConnector::new();
        connector.fail_command(None, "rm -rf", 1, "", "device busy");
        let recorder = connector.clone();
        let deployer = deployer_over(connector);
        let patch = Patch::new("p1", "echo ok").approved();
        let deployment_id = DeploymentId::new();

        let first = deployer.deploy(&deployment_id, &patch, &asset("h1")).await;
        let second = deployer.deploy(&deployment_id, &patch, &asset("h1")).await;
        assert!(first.success && second.success);

        // Both attempts wrote the script; neither crashed on leftovers.
        let forwards = recorder
            .written_files()
            .iter()
            .filter(|f| f.path.ends_with("forward.sh"))
            .count();
        assert_eq!(forwards, 2);
    }

    #[tokio::test]
    async fn connection_failure_becomes_failed_outcome() {
        let connector = MemoryConnector::new();
        connector.refuse_connections("h1");
        let deployer = deployer_over(connector);
        let patch = Patch::new("p1", "echo ok").approved();

        let outcome = deployer.deploy(&DeploymentId::new(), &patch, &asset("h1")).await;
        assert!(!outcome.success);
        assert!(outcome
            .message
            .as_deref()
            .is_some_and(|m| m.contains("connection lost")));
    }
}
