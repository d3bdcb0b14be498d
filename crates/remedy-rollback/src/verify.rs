//! Post-rollback verification.
//!
//! Three checks, driven by patch metadata:
//!
//! 1. Service state: `systemctl is-active <service_name>` must report active.
//! 2. Package version: the installed version must contain
//!    `previous_version`. A mismatch is recorded and warned about but does
//!    not invalidate the rollback.
//! 3. Liveness: a final echo over the session.

use std::time::Duration;

use remedy_core::Patch;
use remedy_transport::{ExecOptions, RemoteExecutor, Result, SessionLease};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One verification check result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationCheck {
    /// Check name (`service_health`, `package_version`, `connectivity`).
    pub check: String,
    /// Whether the check passed.
    pub passed: bool,
    /// Human-readable detail.
    pub message: String,
}

/// Aggregated verification result for one asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Overall verdict. Package-version mismatches warn without failing.
    pub success: bool,
    /// Individual checks in execution order.
    pub checks: Vec<VerificationCheck>,
}

/// Runs the verification suite against a host that finished its reverse
/// script.
///
/// # Errors
///
/// Returns a transport error only when the session breaks mid-check;
/// failing checks are reported in the result.
pub async fn verify_rollback(
    executor: &RemoteExecutor,
    lease: &SessionLease,
    patch: &Patch,
    timeout: Duration,
) -> Result<VerificationReport> {
    let mut checks = Vec::new();
    let mut success = true;

    if let Some(service) = patch.service_name() {
        let opts = ExecOptions::new().with_sudo(true).with_timeout(timeout);
        let outcome = executor
            .execute_command(lease, &format!("systemctl is-active {service}"), &opts)
            .await?;
        let active = outcome.ok();
        checks.push(VerificationCheck {
            check: "service_health".to_string(),
            passed: active,
            message: format!(
                "service {service} is {}",
                if active { "active" } else { "not active" }
            ),
        });
        if !active {
            success = false;
        }
    }

    if success {
        if let (Some(package), Some(previous)) = (patch.package_name(), patch.previous_version()) {
            let opts = ExecOptions::new().with_sudo(true).with_timeout(timeout);
            let outcome = executor
                .execute_command(
                    lease,
                    &format!("dpkg -l | grep {package} || rpm -q {package}"),
                    &opts,
                )
                .await?;
            let matches = outcome.stdout.contains(previous);
            checks.push(VerificationCheck {
                check: "package_version".to_string(),
                passed: matches,
                message: format!(
                    "package {package} version {} expected {previous}",
                    if matches { "matches" } else { "does not match" }
                ),
            });
            if !matches {
                // Version drift after a successful reverse script is worth a
                // warning, not a failed rollback.
                warn!(
                    host = %lease.asset_id(),
                    package,
                    expected = previous,
                    "package version mismatch after rollback"
                );
            }
        }
    }

    if success {
        let alive = executor.ping(lease, timeout).await;
        checks.push(VerificationCheck {
            check: "connectivity".to_string(),
            passed: alive,
            message: if alive {
                "host liveness verified".to_string()
            } else {
                "host unreachable during verification".to_string()
            },
        });
        if !alive {
            success = false;
        }
    }

    debug!(host = %lease.asset_id(), success, checks = checks.len(), "rollback verification finished");
    Ok(VerificationReport { success, checks })
}

#[cfg(test)]
mod tests {
    use super::*;
    use remedy_core::{Asset, ConnectionParams, patch::{META_PACKAGE_NAME, META_PREVIOUS_VERSION, META_SERVICE_NAME}};
    use remedy_transport::{
        ConnectionPool, Credential, MemoryConnector, PoolConfig, StaticSecretProvider,
    };
    use std::sync::Arc;

    fn asset(id: &str) -> Asset {
        Asset::new(id, id, "10.0.0.1").with_connection(ConnectionParams::new("deploy", "ref"))
    }

    fn pool_with(connector: MemoryConnector) -> Arc<ConnectionPool> {
        let secrets =
            StaticSecretProvider::new().with_credential("ref", Credential::password("pw"));
        Arc::new(ConnectionPool::new(
            Arc::new(connector),
            Arc::new(secrets),
            PoolConfig::default(),
        ))
    }

    fn patch_with_meta() -> Patch {
        Patch::new("p1", "echo ok")
            .with_reverse_script("echo rb")
            .with_metadata(META_SERVICE_NAME, "nginx")
            .with_metadata(META_PACKAGE_NAME, "openssl")
            .with_metadata(META_PREVIOUS_VERSION, "3.0.2")
            .approved()
    }

    #[tokio::test]
    async fn all_checks_pass_on_healthy_host() {
        let connector = MemoryConnector::new();
        connector.respond(None, "dpkg -l", "ii openssl 3.0.2-0ubuntu1");
        let pool = pool_with(connector);
        let executor = RemoteExecutor::new();

        let lease = pool.acquire_write(&asset("h1")).await;
        assert!(lease.is_ok());
        if let Ok(lease) = lease {
            let report = verify_rollback(&executor, &lease, &patch_with_meta(), Duration::from_secs(5)).await;
            assert!(report.as_ref().is_ok_and(|r| r.success));
            assert_eq!(report.map(|r| r.checks.len()).unwrap_or_default(), 3);
        }
    }

    #[tokio::test]
    async fn inactive_service_fails_verification() {
        let connector = MemoryConnector::new();
        connector.fail_command(None, "systemctl is-active", 3, "inactive", "");
        let pool = pool_with(connector);
        let executor = RemoteExecutor::new();

        let lease = pool.acquire_write(&asset("h1")).await;
        assert!(lease.is_ok());
        if let Ok(lease) = lease {
            let report = verify_rollback(&executor, &lease, &patch_with_meta(), Duration::from_secs(5)).await;
            assert!(report.as_ref().is_ok_and(|r| !r.success));
            let failed = report
                .ok()
                .and_then(|r| r.checks.into_iter().find(|c| !c.passed));
            assert_eq!(failed.map(|c| c.check), Some("service_health".to_string()));
        }
    }

    #[tokio::test]
    async fn version_mismatch_warns_but_passes() {
        let connector = MemoryConnector::new();
        connector.respond(None, "dpkg -l", "ii openssl 3.0.7-1");
        let pool = pool_with(connector);
        let executor = RemoteExecutor::new();

        let lease = pool.acquire_write(&asset("h1")).await;
        assert!(lease.is_ok());
        if let Ok(lease) = lease {
            let report = verify_rollback(&executor, &lease, &patch_with_meta(), Duration::from_secs(5)).await;
            assert!(report.as_ref().is_ok_and(|r| r.success));
            let version_check = report
                .ok()
                .and_then(|r| r.checks.into_iter().find(|c| c.check == "package_version"));
            assert_eq!(version_check.map(|c| c.passed), Some(false));
        }
    }

    #[tokio::test]
    async fn patch_without_metadata_only_checks_liveness() {
        let connector = MemoryConnector::new();
        let pool = pool_with(connector);
        let executor = RemoteExecutor::new();
        let patch = Patch::new("p1", "echo ok").with_reverse_script("echo rb").approved();

        let lease = pool.acquire_write(&asset("h1")).await;
        assert!(lease.is_ok());
        if let Ok(lease) = lease {
            let report = verify_rollback(&executor, &lease, &patch, Duration::from_secs(5)).await;
            assert!(report.as_ref().is_ok_and(|r| r.success));
            assert_eq!(report.map(|r| r.checks.len()).unwrap_or_default(), 1);
        }
    }
}
