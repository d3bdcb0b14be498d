//! The analytics recorder.
//!
//! Single-writer append semantics: every mutating call takes the inner
//! lock, appends or updates a record, and drops the derived-query cache.
//! Readers compute over a snapshot of the window, so a slow aggregation
//! never blocks the write path for long.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use remedy_core::{DeploymentId, PatchId, RollbackId, StrategyKind};
use tracing::{debug, info, warn};

use crate::types::{
    AnalyticsEvent, DeploymentRecord, DeploymentStats, FailureAnalysis, FailureSummary,
    PatchStats, PerformanceMetrics, RecordStatus, RollbackRecord, StrategyPerformance,
    StrategyStats,
};

/// Durable destination for analytics events.
///
/// The coordinator wires this to the persistence layer; the recorder never
/// fails a tracking call because the sink did.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Appends one event to the durable log.
    async fn append(&self, event: AnalyticsEvent);
}

/// Sink that drops every event. Useful in tests and tooling.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn append(&self, _event: AnalyticsEvent) {}
}

#[derive(Default)]
struct Inner {
    records: Vec<DeploymentRecord>,
    stats_cache: HashMap<String, DeploymentStats>,
    failure_cache: HashMap<u64, FailureAnalysis>,
    performance_cache: HashMap<u64, PerformanceMetrics>,
}

impl Inner {
    fn invalidate(&mut self) {
        self.stats_cache.clear();
        self.failure_cache.clear();
        self.performance_cache.clear();
    }
}

/// Tracks deployments and rollbacks, serving derived statistics on demand.
pub struct AnalyticsRecorder {
    inner: Mutex<Inner>,
    sink: Arc<dyn EventSink>,
    retention_days: i64,
}

impl AnalyticsRecorder {
    /// Creates a recorder with a durable sink and retention window in days.
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>, retention_days: i64) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            sink,
            retention_days: retention_days.max(1),
        }
    }

    /// Creates a recorder that keeps thirty days in memory and discards
    /// durable events.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(NullSink), 30)
    }

    /// Records a deployment start.
    pub async fn track_start(
        &self,
        deployment_id: DeploymentId,
        patch_id: PatchId,
        strategy: StrategyKind,
        asset_count: usize,
    ) {
        let record = DeploymentRecord {
            deployment_id,
            patch_id,
            strategy,
            asset_count,
            started_at: Utc::now(),
            status: RecordStatus::InProgress,
            completed_at: None,
            duration_secs: None,
            successful_assets: 0,
            failed_assets: 0,
            error: None,
            rolled_back: false,
            rollback: None,
        };

        {
            let mut inner = self.inner.lock();
            inner.records.push(record.clone());
            inner.invalidate();
        }

        info!(
            deployment_id = %deployment_id,
            strategy = %strategy,
            asset_count,
            "deployment tracking started"
        );
        self.sink.append(AnalyticsEvent::Started { record }).await;
    }

    /// Records a deployment that was rejected before execution started.
    ///
    /// The record lands directly in the failed state and only a completion
    /// event reaches the sink; rejected deployments never started.
    pub async fn track_rejected(
        &self,
        deployment_id: DeploymentId,
        patch_id: PatchId,
        strategy: StrategyKind,
        asset_count: usize,
        reason: impl Into<String>,
    ) {
        let now = Utc::now();
        let record = DeploymentRecord {
            deployment_id,
            patch_id,
            strategy,
            asset_count,
            started_at: now,
            status: RecordStatus::Failed,
            completed_at: Some(now),
            duration_secs: Some(0.0),
            successful_assets: 0,
            failed_assets: 0,
            error: Some(reason.into()),
            rolled_back: false,
            rollback: None,
        };

        {
            let mut inner = self.inner.lock();
            inner.records.push(record.clone());
            inner.invalidate();
        }

        info!(deployment_id = %deployment_id, "rejected deployment tracked");
        self.sink.append(AnalyticsEvent::Completed { record }).await;
    }

    /// Records a deployment reaching a terminal status.
    pub async fn track_completion(
        &self,
        deployment_id: &DeploymentId,
        success: bool,
        successful_assets: usize,
        failed_assets: usize,
        error: Option<String>,
    ) {
        let updated = {
            let mut inner = self.inner.lock();
            let record = inner
                .records
                .iter_mut()
                .find(|r| r.deployment_id == *deployment_id);

            let Some(record) = record else {
                warn!(deployment_id = %deployment_id, "completion for unknown deployment record");
                return;
            };

            let now = Utc::now();
            record.status = if success {
                RecordStatus::Completed
            } else {
                RecordStatus::Failed
            };
            record.completed_at = Some(now);
            record.duration_secs =
                Some((now - record.started_at).num_milliseconds() as f64 / 1000.0);
            record.successful_assets = successful_assets;
            record.failed_assets = failed_assets;
            record.error = error;
            let snapshot = record.clone();
            inner.invalidate();
            snapshot
        };

        info!(
            deployment_id = %deployment_id,
            success,
            duration_secs = updated.duration_secs,
            "deployment tracking completed"
        );
        self.sink.append(AnalyticsEvent::Completed { record: updated }).await;
    }

    /// Records a rollback against a deployment.
    pub async fn track_rollback(
        &self,
        deployment_id: &DeploymentId,
        rollback_id: RollbackId,
        reason: impl Into<String>,
        success: bool,
    ) {
        let rollback = RollbackRecord {
            rollback_id,
            reason: reason.into(),
            success,
            timestamp: Utc::now(),
        };

        {
            let mut inner = self.inner.lock();
            if let Some(record) = inner
                .records
                .iter_mut()
                .find(|r| r.deployment_id == *deployment_id)
            {
                record.rolled_back = true;
                record.rollback = Some(rollback.clone());
            } else {
                warn!(deployment_id = %deployment_id, "rollback for unknown deployment record");
            }
            inner.invalidate();
        }

        info!(
            deployment_id = %deployment_id,
            rollback_id = %rollback.rollback_id,
            success,
            "rollback tracked"
        );
        self.sink
            .append(AnalyticsEvent::RolledBack {
                deployment_id: *deployment_id,
                rollback,
            })
            .await;
    }

    /// Aggregate statistics over the trailing window.
    #[must_use]
    pub fn stats(&self, window_hours: u64, strategy: Option<StrategyKind>) -> DeploymentStats {
        let cache_key = format!(
            "{window_hours}:{}",
            strategy.map_or("all", StrategyKind::as_str)
        );

        let mut inner = self.inner.lock();
        if let Some(cached) = inner.stats_cache.get(&cache_key) {
            debug!(cache_key, "stats served from cache");
            return cached.clone();
        }

        let cutoff = Utc::now() - ChronoDuration::hours(window_hours as i64);
        let records: Vec<&DeploymentRecord> = inner
            .records
            .iter()
            .filter(|r| r.started_at > cutoff)
            .filter(|r| strategy.is_none_or(|s| r.strategy == s))
            .collect();

        let total = records.len();
        let completed = records.iter().filter(|r| r.status == RecordStatus::Completed).count();
        let failed = records.iter().filter(|r| r.status == RecordStatus::Failed).count();
        let in_progress = records.iter().filter(|r| r.status == RecordStatus::InProgress).count();
        let rolled_back = records.iter().filter(|r| r.rolled_back).count();

        let rate = |count: usize| {
            if total == 0 { 0.0 } else { count as f64 / total as f64 * 100.0 }
        };

        let mut by_strategy: HashMap<String, StrategyStats> = HashMap::new();
        for record in &records {
            let entry = by_strategy.entry(record.strategy.as_str().to_string()).or_default();
            entry.total += 1;
            match record.status {
                RecordStatus::Completed => entry.completed += 1,
                RecordStatus::Failed => entry.failed += 1,
                RecordStatus::InProgress => {}
            }
            if record.rolled_back {
                entry.rolled_back += 1;
            }
        }
        for entry in by_strategy.values_mut() {
            entry.success_rate = if entry.total == 0 {
                0.0
            } else {
                entry.completed as f64 / entry.total as f64 * 100.0
            };
        }

        let durations: Vec<f64> = records
            .iter()
            .filter(|r| r.status == RecordStatus::Completed)
            .filter_map(|r| r.duration_secs)
            .collect();
        let average_duration_secs = (!durations.is_empty())
            .then(|| durations.iter().sum::<f64>() / durations.len() as f64);

        let stats = DeploymentStats {
            total,
            completed,
            failed,
            in_progress,
            rolled_back,
            success_rate: rate(completed),
            failure_rate: rate(failed),
            rollback_rate: rate(rolled_back),
            by_strategy,
            average_duration_secs,
            window_hours,
        };

        inner.stats_cache.insert(cache_key, stats.clone());
        stats
    }

    /// Failure breakdown over the trailing window.
    #[must_use]
    pub fn failure_analysis(&self, window_hours: u64) -> FailureAnalysis {
        let mut inner = self.inner.lock();
        if let Some(cached) = inner.failure_cache.get(&window_hours) {
            return cached.clone();
        }

        let cutoff = Utc::now() - ChronoDuration::hours(window_hours as i64);
        let failures: Vec<&DeploymentRecord> = inner
            .records
            .iter()
            .filter(|r| r.status == RecordStatus::Failed && r.started_at > cutoff)
            .collect();

        let mut by_reason: HashMap<String, usize> = HashMap::new();
        let mut by_strategy: HashMap<String, usize> = HashMap::new();
        let mut by_patch: HashMap<String, usize> = HashMap::new();

        for record in &failures {
            let reason = match record.error.as_deref() {
                Some(e) if e.contains("validation") => "validation_failed",
                Some(e) if e.contains("cancel") => "cancelled",
                Some(_) => "asset_failure",
                None => "unknown",
            };
            *by_reason.entry(reason.to_string()).or_default() += 1;
            *by_strategy.entry(record.strategy.as_str().to_string()).or_default() += 1;
            *by_patch.entry(record.patch_id.to_string()).or_default() += 1;
        }

        let recent_failures: Vec<FailureSummary> = failures
            .iter()
            .rev()
            .take(5)
            .map(|r| FailureSummary {
                deployment_id: r.deployment_id,
                patch_id: r.patch_id.clone(),
                strategy: r.strategy,
                started_at: r.started_at,
                error: r.error.clone().unwrap_or_else(|| "unknown".to_string()),
            })
            .collect();

        let analysis = FailureAnalysis {
            total_failures: failures.len(),
            by_reason,
            by_strategy,
            by_patch,
            recent_failures,
            window_hours,
        };

        inner.failure_cache.insert(window_hours, analysis.clone());
        analysis
    }

    /// Duration and volume metrics over the trailing window.
    #[must_use]
    pub fn performance_metrics(&self, window_hours: u64) -> PerformanceMetrics {
        let mut inner = self.inner.lock();
        if let Some(cached) = inner.performance_cache.get(&window_hours) {
            return cached.clone();
        }

        let cutoff = Utc::now() - ChronoDuration::hours(window_hours as i64);
        let completed: Vec<&DeploymentRecord> = inner
            .records
            .iter()
            .filter(|r| {
                r.status == RecordStatus::Completed
                    && r.started_at > cutoff
                    && r.duration_secs.is_some()
            })
            .collect();

        if completed.is_empty() {
            let empty = PerformanceMetrics {
                window_hours,
                ..PerformanceMetrics::default()
            };
            inner.performance_cache.insert(window_hours, empty.clone());
            return empty;
        }

        let durations: Vec<f64> = completed.iter().filter_map(|r| r.duration_secs).collect();
        let total_assets: usize = completed.iter().map(|r| r.asset_count).sum();

        let mut per_strategy: HashMap<String, Vec<f64>> = HashMap::new();
        for record in &completed {
            if let Some(duration) = record.duration_secs {
                per_strategy
                    .entry(record.strategy.as_str().to_string())
                    .or_default()
                    .push(duration);
            }
        }
        let by_strategy = per_strategy
            .into_iter()
            .map(|(strategy, durations)| {
                let count = durations.len();
                let sum: f64 = durations.iter().sum();
                let min = durations.iter().copied().fold(f64::MAX, f64::min);
                let max = durations.iter().copied().fold(0.0_f64, f64::max);
                (
                    strategy,
                    StrategyPerformance {
                        count,
                        average_duration_secs: sum / count as f64,
                        min_duration_secs: min,
                        max_duration_secs: max,
                    },
                )
            })
            .collect();

        let metrics = PerformanceMetrics {
            total_deployments: completed.len(),
            average_duration_secs: durations.iter().sum::<f64>() / durations.len() as f64,
            min_duration_secs: durations.iter().copied().fold(f64::MAX, f64::min),
            max_duration_secs: durations.iter().copied().fold(0.0_f64, f64::max),
            average_assets_per_deployment: total_assets as f64 / completed.len() as f64,
            total_assets_deployed: total_assets,
            by_strategy,
            window_hours,
        };

        inner.performance_cache.insert(window_hours, metrics.clone());
        metrics
    }

    /// Aggregated counts for one patch across all its deployments.
    #[must_use]
    pub fn patch_stats(&self, patch_id: &PatchId) -> PatchStats {
        let inner = self.inner.lock();
        let deployments: Vec<&DeploymentRecord> = inner
            .records
            .iter()
            .filter(|r| r.patch_id == *patch_id)
            .collect();

        let total_assets: usize = deployments.iter().map(|r| r.asset_count).sum();
        let successful_assets: usize = deployments.iter().map(|r| r.successful_assets).sum();
        let failed_assets: usize = deployments.iter().map(|r| r.failed_assets).sum();

        PatchStats {
            patch_id: patch_id.clone(),
            total_deployments: deployments.len(),
            total_assets,
            successful_assets,
            failed_assets,
            success_rate: if total_assets == 0 {
                0.0
            } else {
                successful_assets as f64 / total_assets as f64 * 100.0
            },
            rolled_back: deployments.iter().filter(|r| r.rolled_back).count(),
        }
    }

    /// The most recent records, newest last.
    #[must_use]
    pub fn history(&self, limit: usize) -> Vec<DeploymentRecord> {
        let inner = self.inner.lock();
        let skip = inner.records.len().saturating_sub(limit);
        inner.records.iter().skip(skip).cloned().collect()
    }

    /// Drops records older than the retention window. Returns the count
    /// removed.
    pub fn clear_old_history(&self) -> usize {
        let cutoff = Utc::now() - ChronoDuration::days(self.retention_days);
        let mut inner = self.inner.lock();
        let before = inner.records.len();
        inner.records.retain(|r| r.started_at > cutoff);
        let cleared = before - inner.records.len();
        if cleared > 0 {
            inner.invalidate();
            info!(cleared, remaining = inner.records.len(), "old analytics history cleared");
        }
        cleared
    }
}

impl std::fmt::Debug for AnalyticsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsRecorder")
            .field("records", &self.inner.lock().records.len())
            .field("retention_days", &self.retention_days)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn record_one(
        recorder: &AnalyticsRecorder,
        strategy: StrategyKind,
        success: bool,
    ) -> DeploymentId {
        let id = DeploymentId::new();
        recorder
            .track_start(id, PatchId::new("p1"), strategy, 4)
            .await;
        recorder
            .track_completion(&id, success, if success { 4 } else { 1 }, if success { 0 } else { 3 }, None)
            .await;
        id
    }

    #[tokio::test]
    async fn stats_reflect_tracked_deployments() {
        let recorder = AnalyticsRecorder::in_memory();
        record_one(&recorder, StrategyKind::Rolling, true).await;
        record_one(&recorder, StrategyKind::Rolling, false).await;
        record_one(&recorder, StrategyKind::Canary, true).await;

        let stats = recorder.stats(24, None);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.failed, 1);
        assert!((stats.success_rate - 66.666).abs() < 0.1);

        let rolling = stats.by_strategy.get("rolling");
        assert_eq!(rolling.map(|s| s.total), Some(2));
    }

    #[tokio::test]
    async fn strategy_filter_narrows_stats() {
        let recorder = AnalyticsRecorder::in_memory();
        record_one(&recorder, StrategyKind::Rolling, true).await;
        record_one(&recorder, StrategyKind::Canary, true).await;

        let stats = recorder.stats(24, Some(StrategyKind::Canary));
        assert_eq!(stats.total, 1);
    }

    #[tokio::test]
    async fn cache_is_dropped_on_every_mutating_event() {
        let recorder = AnalyticsRecorder::in_memory();
        record_one(&recorder, StrategyKind::Rolling, true).await;

        let before = recorder.stats(24, None);
        assert_eq!(before.total, 1);

        // Same query again must see the new record, not the cached answer.
        record_one(&recorder, StrategyKind::Rolling, true).await;
        let after = recorder.stats(24, None);
        assert_eq!(after.total, 2);
    }

    #[tokio::test]
    async fn rollback_is_cross_linked_to_its_deployment() {
        let recorder = AnalyticsRecorder::in_memory();
        let id = record_one(&recorder, StrategyKind::Canary, false).await;
        recorder
            .track_rollback(&id, RollbackId::new(), "canary stage 2 failed", true)
            .await;

        let history = recorder.history(10);
        let record = history.iter().find(|r| r.deployment_id == id);
        assert!(record.is_some_and(|r| r.rolled_back && r.rollback.is_some()));

        let stats = recorder.stats(24, None);
        assert_eq!(stats.rolled_back, 1);
    }

    #[tokio::test]
    async fn failure_analysis_keeps_at_most_five_recent() {
        let recorder = AnalyticsRecorder::in_memory();
        for _ in 0..7 {
            let id = DeploymentId::new();
            recorder
                .track_start(id, PatchId::new("p-bad"), StrategyKind::AllAtOnce, 2)
                .await;
            recorder
                .track_completion(&id, false, 0, 2, Some("all hosts failed".to_string()))
                .await;
        }

        let analysis = recorder.failure_analysis(24);
        assert_eq!(analysis.total_failures, 7);
        assert_eq!(analysis.recent_failures.len(), 5);
        assert_eq!(analysis.by_patch.get("p-bad"), Some(&7));
        assert_eq!(analysis.by_reason.get("asset_failure"), Some(&7));
    }

    #[tokio::test]
    async fn performance_metrics_cover_completed_only() {
        let recorder = AnalyticsRecorder::in_memory();
        record_one(&recorder, StrategyKind::Rolling, true).await;
        record_one(&recorder, StrategyKind::Rolling, false).await;

        let metrics = recorder.performance_metrics(24);
        assert_eq!(metrics.total_deployments, 1);
        assert_eq!(metrics.total_assets_deployed, 4);
        assert!(metrics.by_strategy.contains_key("rolling"));
    }

    #[tokio::test]
    async fn patch_stats_aggregate_across_deployments() {
        let recorder = AnalyticsRecorder::in_memory();
        let patch = PatchId::new("p1");
        for success in [true, false] {
            let id = DeploymentId::new();
            recorder
                .track_start(id, patch.clone(), StrategyKind::Rolling, 4)
                .await;
            recorder
                .track_completion(&id, success, if success { 4 } else { 1 }, if success { 0 } else { 3 }, None)
                .await;
        }

        let stats = recorder.patch_stats(&patch);
        assert_eq!(stats.total_deployments, 2);
        assert_eq!(stats.total_assets, 8);
        assert_eq!(stats.successful_assets, 5);
        assert_eq!(stats.failed_assets, 3);
    }

    #[tokio::test]
    async fn events_reach_the_durable_sink_in_order() {
        #[derive(Default, Debug)]
        struct RecordingSink(Mutex<Vec<&'static str>>);

        #[async_trait]
        impl EventSink for RecordingSink {
            async fn append(&self, event: AnalyticsEvent) {
                let tag = match event {
                    AnalyticsEvent::Started { .. } => "started",
                    AnalyticsEvent::Completed { .. } => "completed",
                    AnalyticsEvent::RolledBack { .. } => "rolled_back",
                };
                self.0.lock().push(tag);
            }
        }

        let sink = Arc::new(RecordingSink::default());
        let recorder = AnalyticsRecorder::new(Arc::clone(&sink) as Arc<dyn EventSink>, 30);

        let id = DeploymentId::new();
        recorder
            .track_start(id, PatchId::new("p1"), StrategyKind::Canary, 2)
            .await;
        recorder.track_completion(&id, false, 1, 1, None).await;
        recorder
            .track_rollback(&id, RollbackId::new(), "trigger", true)
            .await;

        assert_eq!(*sink.0.lock(), vec!["started", "completed", "rolled_back"]);
    }
}
