//! One-shot command execution and file writes with structured results.
//!
//! The executor never throws on remote non-zero exit: the exit code is data.
//! Only infrastructure failures (connection loss, authentication) surface as
//! errors, and a timed-out command is reported through
//! [`CommandOutcome::timed_out`] so strategies can tally it like any other
//! per-host failure.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::pool::SessionLease;

/// Marker appended to captured output that exceeded the byte cap.
pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// Default per-stream output cap in bytes.
pub const DEFAULT_OUTPUT_CAP: usize = 16 * 1024;

/// Options for a single remote command.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Run the command under `sudo -n`.
    pub sudo: bool,
    /// Wall-clock deadline for the command.
    pub timeout: Duration,
    /// Bytes fed to the remote stdin, if any.
    pub stdin: Option<Vec<u8>>,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            sudo: false,
            timeout: Duration::from_secs(300),
            stdin: None,
        }
    }
}

impl ExecOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables sudo.
    #[must_use]
    pub const fn with_sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    /// Sets the command timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets stdin bytes.
    #[must_use]
    pub fn with_stdin(mut self, stdin: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }
}

/// Structured result of one remote command.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    /// Remote exit code; `-1` when unavailable (timeout, closed channel).
    pub exit_code: i32,
    /// Captured stdout, capped with [`TRUNCATION_MARKER`] on overflow.
    pub stdout: String,
    /// Captured stderr, capped with [`TRUNCATION_MARKER`] on overflow.
    pub stderr: String,
    /// Wall-clock duration of the invocation.
    pub duration: Duration,
    /// True when the command exceeded its deadline.
    pub timed_out: bool,
}

impl CommandOutcome {
    /// True when the command exited zero within its deadline.
    #[must_use]
    pub const fn ok(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// Executes commands and file writes against leased sessions.
#[derive(Debug, Clone)]
pub struct RemoteExecutor {
    /// Per-stream output cap in bytes.
    output_cap: usize,
}

impl Default for RemoteExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteExecutor {
    /// Creates an executor with the default output cap.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            output_cap: DEFAULT_OUTPUT_CAP,
        }
    }

    /// Creates an executor with a custom per-stream output cap.
    #[must_use]
    pub const fn with_output_cap(output_cap: usize) -> Self {
        Self { output_cap }
    }

    /// Executes one command on the leased session.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::TransportError`] only for infrastructure failures.
    /// Non-zero exit and deadline expiry are reported in the outcome.
    pub async fn execute_command(
        &self,
        session: &SessionLease,
        command: &str,
        opts: &ExecOptions,
    ) -> Result<CommandOutcome> {
        let full_command = if opts.sudo {
            format!("sudo -n {command}")
        } else {
            command.to_string()
        };

        debug!(
            host = %session.asset_id(),
            sudo = opts.sudo,
            timeout_secs = opts.timeout.as_secs(),
            "executing remote command"
        );

        let started = Utc::now();
        let raw = tokio::time::timeout(
            opts.timeout,
            session.transport().exec(&full_command, opts.stdin.as_deref()),
        )
        .await;
        let duration = (Utc::now() - started)
            .to_std()
            .unwrap_or(Duration::ZERO);

        match raw {
            Ok(Ok(output)) => {
                let outcome = CommandOutcome {
                    exit_code: output.exit_code,
                    stdout: self.cap_output(&output.stdout),
                    stderr: self.cap_output(&output.stderr),
                    duration,
                    timed_out: false,
                };
                debug!(
                    host = %session.asset_id(),
                    exit_code = outcome.exit_code,
                    duration_ms = duration.as_millis(),
                    "remote command completed"
                );
                Ok(outcome)
            }
            Ok(Err(e)) => Err(e),
            Err(_elapsed) => {
                warn!(
                    host = %session.asset_id(),
                    timeout_secs = opts.timeout.as_secs(),
                    "remote command timed out"
                );
                Ok(CommandOutcome {
                    exit_code: -1,
                    stdout: String::new(),
                    stderr: String::new(),
                    duration,
                    timed_out: true,
                })
            }
        }
    }

    /// Writes `content` to `remote_path` atomically and chmods it to `mode`.
    pub async fn write_file(
        &self,
        session: &SessionLease,
        remote_path: &str,
        content: &[u8],
        mode: u32,
    ) -> Result<()> {
        debug!(
            host = %session.asset_id(),
            path = remote_path,
            bytes = content.len(),
            mode = format_args!("{mode:o}"),
            "writing remote file"
        );
        session
            .transport()
            .write_file(remote_path, content, mode)
            .await
    }

    /// Cheap liveness check: `echo` over the session with a short deadline.
    pub async fn ping(&self, session: &SessionLease, timeout: Duration) -> bool {
        let opts = ExecOptions::new().with_timeout(timeout);
        match self.execute_command(session, "echo remedy-ping", &opts).await {
            Ok(outcome) => outcome.ok(),
            Err(_) => false,
        }
    }

    fn cap_output(&self, bytes: &[u8]) -> String {
        let text = String::from_utf8_lossy(bytes);
        if text.len() <= self.output_cap {
            return text.into_owned();
        }
        // Cut on a char boundary, then mark the surplus.
        let mut cut = self.output_cap;
        while cut > 0 && !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}{TRUNCATION_MARKER}", &text[..cut])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryConnector;
    use crate::pool::{ConnectionPool, PoolConfig};
    use crate::secrets::{Credential, StaticSecretProvider};
    use remedy_core::{Asset, ConnectionParams};
    use std::sync::Arc;

    fn test_asset(id: &str) -> Asset {
        Asset::new(id, id, format!("10.0.0.{}", id.len()))
            .with_connection(ConnectionParams::new("deploy", "ref"))
    }

    fn pool_with(connector: MemoryConnector) -> ConnectionPool {
        let secrets =
            StaticSecretProvider::new().with_credential("ref", Credential::password("pw"));
        ConnectionPool::new(Arc::new(connector), Arc::new(secrets), PoolConfig::default())
    }

    mod execute_command {
        use super::*;

        #[tokio::test]
        async fn zero_exit_is_ok() {
            let connector = MemoryConnector::new();
            let pool = pool_with(connector);
            let executor = RemoteExecutor::new();
            let asset = test_asset("h1");

            let lease = pool.acquire_write(&asset).await;
            assert!(lease.is_ok());
            if let Ok(lease) = lease {
                let outcome = executor
                    .execute_command(&lease, "echo hello", &ExecOptions::new())
                    .await;
                assert!(outcome.as_ref().is_ok_and(|o| o.ok()));
                assert_eq!(outcome.as_ref().map(|o| o.exit_code).ok(), Some(0));
            }
        }

        #[tokio::test]
        async fn nonzero_exit_is_data_not_error() {
            let connector = MemoryConnector::new();
            connector.fail_command(None, "badcmd", 2, "", "not found");
            let pool = pool_with(connector);
            let executor = RemoteExecutor::new();
            let asset = test_asset("h1");

            let lease = pool.acquire_write(&asset).await;
            assert!(lease.is_ok());
            if let Ok(lease) = lease {
                let outcome = executor
                    .execute_command(&lease, "badcmd --now", &ExecOptions::new())
                    .await;
                assert!(outcome.is_ok());
                if let Ok(outcome) = outcome {
                    assert!(!outcome.ok());
                    assert_eq!(outcome.exit_code, 2);
                    assert_eq!(outcome.stderr, "not found");
                    assert!(!outcome.timed_out);
                }
            }
        }

        #[tokio::test]
        async fn sudo_prefixes_the_command() {
            let connector = MemoryConnector::new();
            let recorder = connector.clone();
            let pool = pool_with(connector);
            let executor = RemoteExecutor::new();
            let asset = test_asset("h1");

            let lease = pool.acquire_write(&asset).await;
            assert!(lease.is_ok());
            if let Ok(lease) = lease {
                let opts = ExecOptions::new().with_sudo(true);
                let _ = executor.execute_command(&lease, "systemctl restart nginx", &opts).await;
            }

            let commands = recorder.executed_commands();
            assert!(commands
                .iter()
                .any(|(_, cmd)| cmd == "sudo -n systemctl restart nginx"));
        }

        #[tokio::test]
        async fn deadline_expiry_reports_timed_out() {
            let connector = MemoryConnector::new();
            connector.delay_command(None, "slow-apply", Duration::from_millis(200));
            let pool = pool_with(connector);
            let executor = RemoteExecutor::new();
            let asset = test_asset("h1");

            let lease = pool.acquire_write(&asset).await;
            assert!(lease.is_ok());
            if let Ok(lease) = lease {
                let opts = ExecOptions::new().with_timeout(Duration::from_millis(20));
                let outcome = executor.execute_command(&lease, "slow-apply", &opts).await;
                assert!(outcome.is_ok());
                if let Ok(outcome) = outcome {
                    assert!(outcome.timed_out);
                    assert!(!outcome.ok());
                    assert_eq!(outcome.exit_code, -1);
                }
            }
        }
    }

    mod output_capping {
        use super::*;

        #[test]
        fn short_output_is_untouched() {
            let executor = RemoteExecutor::with_output_cap(64);
            let capped = executor.cap_output(b"hello world");
            assert_eq!(capped, "hello world");
        }

        #[test]
        fn long_output_is_truncated_with_marker() {
            let executor = RemoteExecutor::with_output_cap(8);
            let capped = executor.cap_output(b"0123456789abcdef");
            assert_eq!(capped, format!("01234567{TRUNCATION_MARKER}"));
        }

        #[test]
        fn truncation_respects_char_boundaries() {
            let executor = RemoteExecutor::with_output_cap(5);
            // "héllo" is six bytes; byte 5 falls inside nothing, but byte 2
            // of "é" would if the cap landed there.
            let capped = executor.cap_output("hé\u{e9}llo".as_bytes());
            assert!(capped.ends_with(TRUNCATION_MARKER));
        }
    }

    mod ping {
        use super::*;

        #[tokio::test]
        async fn ping_succeeds_on_healthy_host() {
            let connector = MemoryConnector::new();
            let pool = pool_with(connector);
            let executor = RemoteExecutor::new();
            let asset = test_asset("h1");

            let lease = pool.acquire_read(&asset).await;
            assert!(lease.is_ok());
            if let Ok(lease) = lease {
                assert!(executor.ping(&lease, Duration::from_secs(1)).await);
            }
        }

        #[tokio::test]
        async fn ping_fails_when_echo_fails() {
            let connector = MemoryConnector::new();
            connector.fail_command(None, "echo remedy-ping", 1, "", "dead");
            let pool = pool_with(connector);
            let executor = RemoteExecutor::new();
            let asset = test_asset("h1");

            let lease = pool.acquire_read(&asset).await;
            assert!(lease.is_ok());
            if let Ok(lease) = lease {
                assert!(!executor.ping(&lease, Duration::from_secs(1)).await);
            }
        }
    }
}
