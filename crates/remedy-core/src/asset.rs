//! Deployable targets and their connection parameters.
//!
//! An asset never carries secret material. Connection parameters hold a
//! credential *reference* that the transport layer resolves through the
//! injected secret provider at dial time.

use crate::ids::AssetId;
use serde::{Deserialize, Serialize};

/// Operating system family of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    /// Linux distributions (the common case).
    #[default]
    Linux,
    /// BSD variants.
    Bsd,
    /// macOS hosts.
    Darwin,
    /// Windows hosts (deployment support is limited to agent backends).
    Windows,
    /// Anything else.
    Other,
}

/// Connection parameters for reaching an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Remote login user.
    pub user: String,
    /// SSH port.
    pub port: u16,
    /// Opaque handle into the secret provider; never a secret value.
    pub credential_ref: String,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            user: "root".to_string(),
            port: 22,
            credential_ref: String::new(),
        }
    }
}

impl ConnectionParams {
    /// Creates connection parameters for a user and credential reference.
    #[must_use]
    pub fn new(user: impl Into<String>, credential_ref: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            port: 22,
            credential_ref: credential_ref.into(),
        }
    }

    /// Sets the SSH port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// A single managed host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    /// Stable identifier.
    pub id: AssetId,
    /// Human-readable name.
    pub name: String,
    /// Reachable address (IP or hostname).
    pub address: String,
    /// Connection parameters.
    pub connection: ConnectionParams,
    /// Operating system family.
    pub os_family: OsFamily,
    /// Criticality, 1 (lab box) to 10 (crown jewels).
    pub criticality: u8,
    /// Environment tag (`dev`, `staging`, `prod`, `blue`, `green`, ...).
    pub environment: Option<String>,
    /// When set, the asset is excluded from deployments.
    pub maintenance_mode: bool,
}

impl Asset {
    /// Creates a new asset with default connection parameters.
    #[must_use]
    pub fn new(id: impl Into<AssetId>, name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: address.into(),
            connection: ConnectionParams::default(),
            os_family: OsFamily::default(),
            criticality: 1,
            environment: None,
            maintenance_mode: false,
        }
    }

    /// Sets the connection parameters.
    #[must_use]
    pub fn with_connection(mut self, connection: ConnectionParams) -> Self {
        self.connection = connection;
        self
    }

    /// Sets the criticality, clamped to 1-10.
    #[must_use]
    pub fn with_criticality(mut self, criticality: u8) -> Self {
        self.criticality = criticality.clamp(1, 10);
        self
    }

    /// Sets the environment tag.
    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Sets the maintenance-mode flag.
    #[must_use]
    pub const fn in_maintenance(mut self, maintenance: bool) -> Self {
        self.maintenance_mode = maintenance;
        self
    }

    /// Returns true if the asset can be targeted in principle: it has an
    /// address and is not in maintenance mode.
    #[must_use]
    pub fn addressable(&self) -> bool {
        !self.address.trim().is_empty() && !self.maintenance_mode
    }

    /// Returns true if the asset's environment tag equals `tag`.
    #[must_use]
    pub fn in_environment(&self, tag: &str) -> bool {
        self.environment.as_deref() == Some(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_asset_is_addressable() {
        let asset = Asset::new("h1", "host-1", "10.0.0.1");
        assert!(asset.addressable());
    }

    #[test]
    fn maintenance_mode_blocks_targeting() {
        let asset = Asset::new("h1", "host-1", "10.0.0.1").in_maintenance(true);
        assert!(!asset.addressable());
    }

    #[test]
    fn empty_address_blocks_targeting() {
        let asset = Asset::new("h1", "host-1", "  ");
        assert!(!asset.addressable());
    }

    #[test]
    fn criticality_is_clamped_to_range() {
        assert_eq!(Asset::new("h1", "n", "a").with_criticality(0).criticality, 1);
        assert_eq!(Asset::new("h1", "n", "a").with_criticality(42).criticality, 10);
    }

    #[test]
    fn environment_tag_matches() {
        let asset = Asset::new("h1", "n", "a").with_environment("green");
        assert!(asset.in_environment("green"));
        assert!(!asset.in_environment("blue"));
    }

    #[test]
    fn connection_params_never_hold_secret_values() {
        let params = ConnectionParams::new("deploy", "vault:ssh/web-01").with_port(2222);
        let json = serde_json::to_string(&params).unwrap_or_default();
        assert!(json.contains("vault:ssh/web-01"));
        assert!(!json.contains("password"));
    }
}
