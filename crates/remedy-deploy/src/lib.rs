//! # remedy-deploy
//!
//! Rollout strategy engine for Remedy. Four strategy state machines share
//! one per-host pipeline and one fan-out core:
//!
//! - **All-at-once**: every host in parallel, bounded by the concurrency cap
//! - **Rolling**: contiguous batches with waits and a failure budget
//! - **Canary**: staged percentages with monitoring and promotion gating
//! - **Blue-green**: green subset first, blue only after green fully succeeds
//!
//! The engine reports facts; it does not decide rollbacks. When a canary
//! stage fails with `rollback_on_failure`, the [`StrategyOutcome`] carries
//! the request and the deployed scope, and the coordinator drives the
//! rollback executor.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod all_at_once;
mod blue_green;
mod canary;
mod rolling;

pub mod deployer;
pub mod engine;
pub mod error;
pub mod types;

// Re-export main types for convenience
pub use deployer::ScriptDeployer;
pub use engine::StrategyEngine;
pub use error::{StrategyError, ValidationResult};
pub use types::{
    AssetDeployer, CanaryParams, HealthCheck, HostDeployOutcome, RollingParams, RolloutStrategy,
    StrategyOutcome, StrategyStatus,
};
