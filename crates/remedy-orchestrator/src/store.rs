//! Persistence port and the in-memory reference implementation.
//!
//! The coordinator sees only this narrow interface; any durable store with
//! atomic row updates can implement it. [`MemoryStore`] is the reference
//! semantics (it enforces the deployment status state machine and stamps
//! `started_at`/`completed_at` on the transitions that define them) and it
//! backs the integration tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use remedy_core::{
    Asset, AssetId, Deployment, DeploymentId, DeploymentResults, DeploymentStatus, Patch, PatchId,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StoreError;
use crate::events::WireEvent;

/// Success/failure counters written with a status update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentCounters {
    /// Assets that completed successfully.
    pub successful: usize,
    /// Assets that failed.
    pub failed: usize,
}

/// One audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the action happened.
    pub timestamp: DateTime<Utc>,
    /// Actor that caused it (user, service, or `system`).
    pub actor: String,
    /// Action tag (`deployment.started`, `rollback.requested`, ...).
    pub action: String,
    /// Affected resource (`deployment:<id>`).
    pub resource: String,
    /// Structured detail.
    pub detail: serde_json::Value,
}

impl AuditEntry {
    /// Creates an entry stamped now.
    #[must_use]
    pub fn new(
        actor: impl Into<String>,
        action: impl Into<String>,
        resource: impl Into<String>,
        detail: serde_json::Value,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            actor: actor.into(),
            action: action.into(),
            resource: resource.into(),
            detail,
        }
    }
}

/// Repository port the coordinator persists through.
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Loads a patch by id.
    async fn load_patch(&self, id: &PatchId) -> Result<Patch, StoreError>;

    /// Loads assets by id, preserving the requested order.
    async fn load_assets_by_ids(&self, ids: &[AssetId]) -> Result<Vec<Asset>, StoreError>;

    /// Persists a new deployment row.
    async fn create_deployment(&self, draft: Deployment) -> Result<Deployment, StoreError>;

    /// Loads a deployment row.
    async fn get_deployment(&self, id: &DeploymentId) -> Result<Deployment, StoreError>;

    /// Atomically updates status, counters, results, and error message.
    ///
    /// Implementations must reject transitions the deployment state machine
    /// does not admit, stamp `started_at` on entering `in_progress`, and
    /// stamp `completed_at` on entering a terminal status.
    async fn update_deployment_status(
        &self,
        id: &DeploymentId,
        status: DeploymentStatus,
        counters: DeploymentCounters,
        results: Option<DeploymentResults>,
        error: Option<String>,
    ) -> Result<(), StoreError>;

    /// Lists deployments that are pending or in progress.
    async fn list_active_deployments(&self) -> Result<Vec<Deployment>, StoreError>;

    /// Appends a wire event to the durable event log.
    async fn append_event(&self, event: WireEvent) -> Result<(), StoreError>;

    /// Writes an audit entry.
    async fn write_audit_entry(&self, entry: AuditEntry) -> Result<(), StoreError>;
}

#[derive(Default)]
struct MemoryInner {
    patches: HashMap<PatchId, Patch>,
    assets: HashMap<AssetId, Asset>,
    deployments: HashMap<DeploymentId, Deployment>,
    events: Vec<WireEvent>,
    audit: Vec<AuditEntry>,
}

/// In-memory store used by tests and single-process setups.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store behind an [`Arc`].
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Seeds a patch.
    pub fn insert_patch(&self, patch: Patch) {
        self.inner.lock().patches.insert(patch.id.clone(), patch);
    }

    /// Seeds an asset.
    pub fn insert_asset(&self, asset: Asset) {
        self.inner.lock().assets.insert(asset.id.clone(), asset);
    }

    /// Snapshot of the event log, in append order.
    #[must_use]
    pub fn events(&self) -> Vec<WireEvent> {
        self.inner.lock().events.clone()
    }

    /// Snapshot of the audit log, in append order.
    #[must_use]
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.inner.lock().audit.clone()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MemoryStore")
            .field("patches", &inner.patches.len())
            .field("assets", &inner.assets.len())
            .field("deployments", &inner.deployments.len())
            .field("events", &inner.events.len())
            .finish()
    }
}

#[async_trait]
impl DeploymentStore for MemoryStore {
    async fn load_patch(&self, id: &PatchId) -> Result<Patch, StoreError> {
        self.inner
            .lock()
            .patches
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("patch", id))
    }

    async fn load_assets_by_ids(&self, ids: &[AssetId]) -> Result<Vec<Asset>, StoreError> {
        let inner = self.inner.lock();
        ids.iter()
            .map(|id| {
                inner
                    .assets
                    .get(id)
                    .cloned()
                    .ok_or_else(|| StoreError::not_found("asset", id))
            })
            .collect()
    }

    async fn create_deployment(&self, draft: Deployment) -> Result<Deployment, StoreError> {
        let mut inner = self.inner.lock();
        debug!(deployment_id = %draft.id, "persisting deployment draft");
        inner.deployments.insert(draft.id, draft.clone());
        Ok(draft)
    }

    async fn get_deployment(&self, id: &DeploymentId) -> Result<Deployment, StoreError> {
        self.inner
            .lock()
            .deployments
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("deployment", id))
    }

    async fn update_deployment_status(
        &self,
        id: &DeploymentId,
        status: DeploymentStatus,
        counters: DeploymentCounters,
        results: Option<DeploymentResults>,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let deployment = inner
            .deployments
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("deployment", id))?;

        if deployment.status != status && !deployment.status.can_transition_to(status) {
            return Err(StoreError::IllegalTransition {
                id: *id,
                from: deployment.status,
                to: status,
            });
        }

        if status == DeploymentStatus::InProgress && deployment.started_at.is_none() {
            deployment.started_at = Some(Utc::now());
        }
        if status.is_terminal() && deployment.completed_at.is_none() {
            deployment.completed_at = Some(Utc::now());
        }

        deployment.status = status;
        deployment.successful_assets = counters.successful;
        deployment.failed_assets = counters.failed;
        if let Some(results) = results {
            deployment.results = results;
        }
        if error.is_some() {
            deployment.error_message = error;
        }

        debug!(deployment_id = %id, status = %status, "deployment row updated");
        Ok(())
    }

    async fn list_active_deployments(&self) -> Result<Vec<Deployment>, StoreError> {
        Ok(self
            .inner
            .lock()
            .deployments
            .values()
            .filter(|d| !d.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn append_event(&self, event: WireEvent) -> Result<(), StoreError> {
        self.inner.lock().events.push(event);
        Ok(())
    }

    async fn write_audit_entry(&self, entry: AuditEntry) -> Result<(), StoreError> {
        self.inner.lock().audit.push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remedy_core::StrategyKind;

    fn draft() -> Deployment {
        Deployment::draft(
            PatchId::new("p1"),
            vec![AssetId::new("h1")],
            StrategyKind::Rolling,
            serde_json::Value::Null,
        )
    }

    #[tokio::test]
    async fn assets_load_in_requested_order() {
        let store = MemoryStore::new();
        store.insert_asset(Asset::new("h1", "one", "10.0.0.1"));
        store.insert_asset(Asset::new("h2", "two", "10.0.0.2"));

        let assets = store
            .load_assets_by_ids(&[AssetId::new("h2"), AssetId::new("h1")])
            .await;
        let names: Vec<String> = assets
            .unwrap_or_default()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["two", "one"]);
    }

    #[tokio::test]
    async fn missing_asset_fails_the_whole_load() {
        let store = MemoryStore::new();
        store.insert_asset(Asset::new("h1", "one", "10.0.0.1"));

        let result = store
            .load_assets_by_ids(&[AssetId::new("h1"), AssetId::new("ghost")])
            .await;
        assert!(matches!(result, Err(StoreError::NotFound { kind: "asset", .. })));
    }

    #[tokio::test]
    async fn status_updates_stamp_timestamps() {
        let store = MemoryStore::new();
        let deployment = store.create_deployment(draft()).await;
        assert!(deployment.is_ok());
        let id = deployment.map(|d| d.id).unwrap_or_default();

        let up = store
            .update_deployment_status(
                &id,
                DeploymentStatus::InProgress,
                DeploymentCounters::default(),
                None,
                None,
            )
            .await;
        assert!(up.is_ok());

        let up = store
            .update_deployment_status(
                &id,
                DeploymentStatus::Completed,
                DeploymentCounters { successful: 1, failed: 0 },
                None,
                None,
            )
            .await;
        assert!(up.is_ok());

        let row = store.get_deployment(&id).await.ok();
        let row = row.as_ref();
        assert!(row.is_some_and(|d| d.started_at.is_some()));
        assert!(row.is_some_and(|d| d.completed_at.is_some()));
        assert!(row.is_some_and(|d| d.started_at <= d.completed_at));
    }

    #[tokio::test]
    async fn illegal_transitions_are_rejected() {
        let store = MemoryStore::new();
        let deployment = store.create_deployment(draft()).await;
        let id = deployment.map(|d| d.id).unwrap_or_default();

        let result = store
            .update_deployment_status(
                &id,
                DeploymentStatus::Completed,
                DeploymentCounters::default(),
                None,
                None,
            )
            .await;
        assert!(matches!(result, Err(StoreError::IllegalTransition { .. })));
    }

    #[tokio::test]
    async fn active_listing_excludes_terminal_rows() {
        let store = MemoryStore::new();
        let first = store.create_deployment(draft()).await.map(|d| d.id).unwrap_or_default();
        let _second = store.create_deployment(draft()).await;

        let _ = store
            .update_deployment_status(
                &first,
                DeploymentStatus::Failed,
                DeploymentCounters::default(),
                None,
                Some("preflight rejected".to_string()),
            )
            .await;

        let active = store.list_active_deployments().await.unwrap_or_default();
        assert_eq!(active.len(), 1);
    }
}
