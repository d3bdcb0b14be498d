//! # remedy-transport
//!
//! The remote execution layer for Remedy. Everything that touches a managed
//! host goes through this crate:
//!
//! - [`RemoteExecutor`]: one-shot command execution and atomic file writes
//!   against a single host, with timeouts and bounded output capture
//! - [`ConnectionPool`]: cached authenticated sessions with per-host write
//!   exclusivity and idle eviction
//! - [`SecretProvider`]: the injected port that resolves an asset's
//!   credential reference into usable material at dial time
//! - [`SshConnector`]: the production SSH/SFTP backend
//! - [`MemoryConnector`]: an in-process backend with scriptable responses,
//!   used by tests and as the template for a future agent backend
//!
//! Remote non-zero exit is data, not an error: only infrastructure failures
//! (lost connections, authentication, dial timeouts) surface as
//! [`TransportError`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod executor;
pub mod memory;
pub mod pool;
pub mod secrets;
pub mod ssh;
pub mod transport;

// Re-export main types for convenience
pub use error::{Result, TransportError};
pub use executor::{CommandOutcome, ExecOptions, RemoteExecutor};
pub use memory::{CommandRule, MemoryConnector};
pub use pool::{ConnectionPool, PoolConfig, SessionLease};
pub use secrets::{Credential, SecretProvider, StaticSecretProvider};
pub use ssh::SshConnector;
pub use transport::{Connector, RawOutput, Transport};
