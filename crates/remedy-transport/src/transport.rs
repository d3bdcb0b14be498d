//! Transport capability: the minimal surface a backend must provide.
//!
//! Two backends ship in this crate: [`crate::ssh::SshConnector`] for
//! production and [`crate::memory::MemoryConnector`] for tests. An agent
//! backend speaking HTTP or gRPC fits the same pair of traits.

use async_trait::async_trait;
use remedy_core::Asset;
use std::sync::Arc;

use crate::error::Result;
use crate::secrets::Credential;

/// Raw output of one remote command, before capping or timing.
#[derive(Debug, Clone, Default)]
pub struct RawOutput {
    /// Remote exit code; `-1` when the channel closed without reporting one.
    pub exit_code: i32,
    /// Captured stdout bytes.
    pub stdout: Vec<u8>,
    /// Captured stderr bytes.
    pub stderr: Vec<u8>,
}

/// An authenticated channel to a single host.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Executes one command, optionally feeding `stdin`, and waits for exit.
    ///
    /// Non-zero exit is reported through [`RawOutput::exit_code`], not as an
    /// error. Deadlines are applied by the caller.
    async fn exec(&self, command: &str, stdin: Option<&[u8]>) -> Result<RawOutput>;

    /// Writes `content` to `path` atomically (temp file, flush, rename) and
    /// sets the file mode.
    async fn write_file(&self, path: &str, content: &[u8], mode: u32) -> Result<()>;

    /// Closes the underlying channel. Idempotent.
    async fn close(&self);
}

/// Dials transports for assets.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens an authenticated transport to `asset` using `credential`.
    async fn connect(&self, asset: &Asset, credential: &Credential) -> Result<Arc<dyn Transport>>;
}
