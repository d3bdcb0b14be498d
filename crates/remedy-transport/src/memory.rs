//! In-process transport backend with scriptable responses.
//!
//! Commands succeed with empty output by default; tests register
//! [`CommandRule`]s to shape exit codes, output, and latency per host or
//! per command substring. Every executed command and written file is
//! recorded for assertions.
//!
//! Besides tests, this backend is the template for an agent transport: any
//! channel that can run a command and write a file satisfies
//! [`Transport`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use remedy_core::{Asset, AssetId};

use crate::error::{Result, TransportError};
use crate::secrets::Credential;
use crate::transport::{Connector, RawOutput, Transport};

/// A scripted response for commands matching a substring.
#[derive(Debug, Clone)]
pub struct CommandRule {
    /// Restrict the rule to one host, or apply everywhere.
    pub host: Option<AssetId>,
    /// Substring the command must contain.
    pub needle: String,
    /// Exit code to report.
    pub exit_code: i32,
    /// Stdout to report.
    pub stdout: String,
    /// Stderr to report.
    pub stderr: String,
    /// Simulated execution latency.
    pub delay: Duration,
}

/// One recorded file write.
#[derive(Debug, Clone)]
pub struct WrittenFile {
    /// Host the file was written on.
    pub host: AssetId,
    /// Remote path.
    pub path: String,
    /// Content bytes.
    pub content: Vec<u8>,
    /// File mode.
    pub mode: u32,
}

#[derive(Default)]
struct MemoryState {
    rules: Mutex<Vec<CommandRule>>,
    refuse: Mutex<HashSet<AssetId>>,
    commands: Mutex<Vec<(AssetId, String)>>,
    files: Mutex<Vec<WrittenFile>>,
    dials: Mutex<Vec<AssetId>>,
}

/// Connector handing out in-process transports.
///
/// Cloning shares the underlying state, so a test can keep one handle for
/// scripting and assertions while the pool owns another.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    state: Arc<MemoryState>,
}

impl MemoryConnector {
    /// Creates a connector where every command succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a failing response for commands containing `needle`.
    pub fn fail_command(
        &self,
        host: Option<&str>,
        needle: &str,
        exit_code: i32,
        stdout: &str,
        stderr: &str,
    ) {
        self.state.rules.lock().push(CommandRule {
            host: host.map(AssetId::new),
            needle: needle.to_string(),
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            delay: Duration::ZERO,
        });
    }

    /// Registers a successful response with canned stdout.
    pub fn respond(&self, host: Option<&str>, needle: &str, stdout: &str) {
        self.state.rules.lock().push(CommandRule {
            host: host.map(AssetId::new),
            needle: needle.to_string(),
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
            delay: Duration::ZERO,
        });
    }

    /// Registers a response that takes `delay` to come back.
    pub fn delay_command(&self, host: Option<&str>, needle: &str, delay: Duration) {
        self.state.rules.lock().push(CommandRule {
            host: host.map(AssetId::new),
            needle: needle.to_string(),
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            delay,
        });
    }

    /// Makes dials to `host` fail with a connection error.
    pub fn refuse_connections(&self, host: &str) {
        self.state.refuse.lock().insert(AssetId::new(host));
    }

    /// Stops refusing dials to `host`.
    pub fn accept_connections(&self, host: &str) {
        self.state.refuse.lock().remove(&AssetId::new(host));
    }

    /// Drops all registered rules.
    pub fn clear_rules(&self) {
        self.state.rules.lock().clear();
    }

    /// Every executed command, in order, as `(host, command)` pairs.
    #[must_use]
    pub fn executed_commands(&self) -> Vec<(AssetId, String)> {
        self.state.commands.lock().clone()
    }

    /// Commands executed on one host, in order.
    #[must_use]
    pub fn commands_for(&self, host: &str) -> Vec<String> {
        let host = AssetId::new(host);
        self.state
            .commands
            .lock()
            .iter()
            .filter(|(id, _)| *id == host)
            .map(|(_, cmd)| cmd.clone())
            .collect()
    }

    /// Every recorded file write.
    #[must_use]
    pub fn written_files(&self) -> Vec<WrittenFile> {
        self.state.files.lock().clone()
    }

    /// Number of times `host` was dialed.
    #[must_use]
    pub fn dial_count(&self, host: &AssetId) -> usize {
        self.state.dials.lock().iter().filter(|h| *h == host).count()
    }
}

impl std::fmt::Debug for MemoryConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConnector")
            .field("rules", &self.state.rules.lock().len())
            .field("commands", &self.state.commands.lock().len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, asset: &Asset, _credential: &Credential) -> Result<Arc<dyn Transport>> {
        if self.state.refuse.lock().contains(&asset.id) {
            return Err(TransportError::connection_lost(
                asset.id.to_string(),
                "connection refused",
            ));
        }
        self.state.dials.lock().push(asset.id.clone());
        Ok(Arc::new(MemoryTransport {
            host: asset.id.clone(),
            state: Arc::clone(&self.state),
        }))
    }
}

struct MemoryTransport {
    host: AssetId,
    state: Arc<MemoryState>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn exec(&self, command: &str, _stdin: Option<&[u8]>) -> Result<RawOutput> {
        if self.state.refuse.lock().contains(&self.host) {
            return Err(TransportError::connection_lost(
                self.host.to_string(),
                "connection reset",
            ));
        }

        self.state
            .commands
            .lock()
            .push((self.host.clone(), command.to_string()));

        let matched: Option<CommandRule> = {
            let rules = self.state.rules.lock();
            rules
                .iter()
                .find(|rule| {
                    command.contains(&rule.needle)
                        && rule.host.as_ref().is_none_or(|h| *h == self.host)
                })
                .cloned()
        };

        match matched {
            Some(rule) => {
                if !rule.delay.is_zero() {
                    tokio::time::sleep(rule.delay).await;
                }
                Ok(RawOutput {
                    exit_code: rule.exit_code,
                    stdout: rule.stdout.into_bytes(),
                    stderr: rule.stderr.into_bytes(),
                })
            }
            None => Ok(RawOutput::default()),
        }
    }

    async fn write_file(&self, path: &str, content: &[u8], mode: u32) -> Result<()> {
        if self.state.refuse.lock().contains(&self.host) {
            return Err(TransportError::connection_lost(
                self.host.to_string(),
                "connection reset",
            ));
        }
        self.state.files.lock().push(WrittenFile {
            host: self.host.clone(),
            path: path.to_string(),
            content: content.to_vec(),
            mode,
        });
        Ok(())
    }

    async fn close(&self) {}
}
