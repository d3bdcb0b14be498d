//! Secret provider port and credential material.
//!
//! Assets carry a credential *reference*; the material itself is resolved
//! per dial through the injected [`SecretProvider`] and never persisted on
//! asset objects, logged, or echoed in errors. `Credential` redacts its
//! secret fields from `Debug` output.

use async_trait::async_trait;
use remedy_core::Asset;
use std::collections::HashMap;

use crate::error::{Result, TransportError};

/// Credential material for authenticating against a host.
#[derive(Clone)]
pub enum Credential {
    /// Private-key authentication.
    KeyFile {
        /// Path to the private key on the orchestrator host.
        path: String,
        /// Optional key passphrase.
        passphrase: Option<String>,
    },
    /// Password authentication.
    Password(String),
}

impl Credential {
    /// Creates a key-file credential without a passphrase.
    #[must_use]
    pub fn key_file(path: impl Into<String>) -> Self {
        Self::KeyFile {
            path: path.into(),
            passphrase: None,
        }
    }

    /// Creates a password credential.
    #[must_use]
    pub fn password(password: impl Into<String>) -> Self {
        Self::Password(password.into())
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeyFile { path, .. } => f
                .debug_struct("Credential::KeyFile")
                .field("path", path)
                .field("passphrase", &"<redacted>")
                .finish(),
            Self::Password(_) => f.write_str("Credential::Password(<redacted>)"),
        }
    }
}

/// Port for resolving an asset's credential reference.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Resolves the credential for an asset.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::CredentialResolution`] when the reference is
    /// unknown or the backing store is unavailable. Implementations must
    /// redact secret material from error text.
    async fn resolve_credential(&self, asset: &Asset) -> Result<Credential>;
}

/// In-memory secret provider keyed by credential reference.
///
/// Used by tests and single-process setups; production deployments inject a
/// vault- or agent-backed implementation.
#[derive(Debug, Default)]
pub struct StaticSecretProvider {
    credentials: HashMap<String, Credential>,
}

impl StaticSecretProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a credential under a reference.
    #[must_use]
    pub fn with_credential(mut self, reference: impl Into<String>, credential: Credential) -> Self {
        self.credentials.insert(reference.into(), credential);
        self
    }
}

#[async_trait]
impl SecretProvider for StaticSecretProvider {
    async fn resolve_credential(&self, asset: &Asset) -> Result<Credential> {
        self.credentials
            .get(&asset.connection.credential_ref)
            .cloned()
            .ok_or_else(|| TransportError::CredentialResolution {
                host: asset.id.to_string(),
                reason: "unknown credential reference".to_string(),
            })
    }
}
