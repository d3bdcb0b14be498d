//! # remedy-analytics
//!
//! Deployment analytics for Remedy: an append-only in-memory history of
//! deployment and rollback events with derived statistics computed on
//! demand.
//!
//! Durability is delegated to an injected [`EventSink`]; the recorder keeps
//! a bounded sliding window in memory and caches derived queries until the
//! next mutating event invalidates them.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod recorder;
pub mod types;

// Re-export main types for convenience
pub use recorder::{AnalyticsRecorder, EventSink, NullSink};
pub use types::{
    AnalyticsEvent, DeploymentRecord, DeploymentStats, FailureAnalysis, FailureSummary,
    PatchStats, PerformanceMetrics, RecordStatus, RollbackRecord, StrategyPerformance,
    StrategyStats,
};
