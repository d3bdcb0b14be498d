//! # remedy-core
//!
//! Shared domain types for the Remedy deployment orchestration engine.
//!
//! Remedy drives an approved remediation artifact (a [`Patch`]) onto a set of
//! managed hosts ([`Asset`]s) under a rollout strategy, while monitoring
//! health and keeping the ability to reverse course. This crate holds the
//! vocabulary every other crate speaks:
//!
//! - [`Patch`], [`Asset`]: the inputs of a deployment
//! - [`Deployment`], [`DeploymentResults`], [`AssetOutcome`]: one attempt to
//!   apply one patch to an ordered asset list
//! - [`HealthSample`]: a single probe of a single host
//! - [`RollbackDecision`]: the trigger engine's verdict
//!
//! ## Example
//!
//! ```rust
//! use remedy_core::{Asset, Patch, StrategyKind};
//!
//! let patch = Patch::new("CVE-2024-31337-fix", "apt-get install -y openssl")
//!     .with_reverse_script("apt-get install -y openssl=3.0.2-0ubuntu1")
//!     .approved();
//!
//! let asset = Asset::new("web-01", "web-01.internal", "10.20.0.11");
//!
//! assert!(patch.deployable().is_ok());
//! assert!(asset.addressable());
//! assert_eq!(StrategyKind::Rolling.as_str(), "rolling");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod asset;
pub mod decision;
pub mod deployment;
pub mod health;
pub mod ids;
pub mod patch;
pub mod severity;

// Re-export main types for convenience
pub use asset::{Asset, ConnectionParams, OsFamily};
pub use decision::{RollbackDecision, RuleHit, TriggerSeverity};
pub use deployment::{
    AssetOutcome, AssetStatus, BatchLog, Deployment, DeploymentResults, DeploymentStatus,
    PhaseSummary, RollbackLog, RollbackStatus, StrategyKind,
};
pub use health::HealthSample;
pub use ids::{AssetId, DeploymentId, EventId, PatchId, RollbackId};
pub use patch::{ApprovalState, Patch, TestStatus};
pub use severity::Severity;
