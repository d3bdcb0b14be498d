//! Connection pool: cached authenticated sessions keyed by asset.
//!
//! The pool enforces the per-host exclusivity rule: at most one mutating
//! operation per host at a time, while read-only probes may share a session.
//! Leases are RAII guards; dropping a lease releases the host.
//!
//! Sessions are dialed lazily on first acquire and cached until the idle TTL
//! expires, the host is evicted after an error, or the pool shuts down.
//! Credentials are resolved per dial through the injected
//! [`SecretProvider`] and never cached or logged.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use remedy_core::{Asset, AssetId};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::secrets::SecretProvider;
use crate::transport::{Connector, Transport};

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// How long an unused session stays cached.
    pub idle_ttl: Duration,
    /// Deadline for dialing a host.
    pub connect_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            idle_ttl: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Per-host pool state.
struct HostEntry {
    /// Write leases are exclusive, read leases shared.
    lease_lock: Arc<RwLock<()>>,
    /// Cached transport, dialed lazily.
    transport: tokio::sync::Mutex<Option<Arc<dyn Transport>>>,
    /// Last lease release, for idle eviction.
    last_used: parking_lot::Mutex<Instant>,
}

impl HostEntry {
    fn new() -> Self {
        Self {
            lease_lock: Arc::new(RwLock::new(())),
            transport: tokio::sync::Mutex::new(None),
            last_used: parking_lot::Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last_used.lock() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_used.lock().elapsed()
    }
}

enum LeaseGuard {
    Write(#[allow(dead_code)] OwnedRwLockWriteGuard<()>),
    Read(#[allow(dead_code)] OwnedRwLockReadGuard<()>),
}

/// A leased session against one host.
///
/// Exclusive for mutating operations, shared for reads. The host is released
/// when the lease drops.
pub struct SessionLease {
    asset_id: AssetId,
    transport: Arc<dyn Transport>,
    entry: Arc<HostEntry>,
    _guard: LeaseGuard,
}

impl SessionLease {
    /// Asset this lease belongs to.
    #[must_use]
    pub fn asset_id(&self) -> &AssetId {
        &self.asset_id
    }

    /// The underlying transport.
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.entry.touch();
    }
}

impl std::fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLease")
            .field("asset_id", &self.asset_id)
            .finish_non_exhaustive()
    }
}

/// Caches authenticated host sessions and serializes mutating access.
pub struct ConnectionPool {
    connector: Arc<dyn Connector>,
    secrets: Arc<dyn SecretProvider>,
    config: PoolConfig,
    hosts: parking_lot::Mutex<HashMap<AssetId, Arc<HostEntry>>>,
    closed: AtomicBool,
}

impl ConnectionPool {
    /// Creates a pool over a connector and secret provider.
    #[must_use]
    pub fn new(
        connector: Arc<dyn Connector>,
        secrets: Arc<dyn SecretProvider>,
        config: PoolConfig,
    ) -> Self {
        Self {
            connector,
            secrets,
            config,
            hosts: parking_lot::Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Acquires an exclusive lease for a mutating operation.
    ///
    /// Blocks until every other lease on the host is released.
    pub async fn acquire_write(&self, asset: &Asset) -> Result<SessionLease> {
        let entry = self.entry_for(&asset.id)?;
        let guard = entry.lease_lock.clone().write_owned().await;
        let transport = self.ensure_connected(&entry, asset).await?;
        Ok(SessionLease {
            asset_id: asset.id.clone(),
            transport,
            entry,
            _guard: LeaseGuard::Write(guard),
        })
    }

    /// Acquires a shared lease for a read-only probe.
    pub async fn acquire_read(&self, asset: &Asset) -> Result<SessionLease> {
        let entry = self.entry_for(&asset.id)?;
        let guard = entry.lease_lock.clone().read_owned().await;
        let transport = self.ensure_connected(&entry, asset).await?;
        Ok(SessionLease {
            asset_id: asset.id.clone(),
            transport,
            entry,
            _guard: LeaseGuard::Read(guard),
        })
    }

    /// Drops the cached session for an asset, closing its transport.
    ///
    /// Call after a transport error; the next acquire re-dials.
    pub async fn evict(&self, asset_id: &AssetId) {
        let entry = self.hosts.lock().remove(asset_id);
        if let Some(entry) = entry {
            let transport = entry.transport.lock().await.take();
            if let Some(transport) = transport {
                transport.close().await;
            }
            debug!(host = %asset_id, "evicted pooled session");
        }
    }

    /// Evicts sessions idle past the configured TTL.
    ///
    /// Entries with an active lease are left alone.
    pub async fn sweep_idle(&self) {
        let stale: Vec<(AssetId, Arc<HostEntry>)> = {
            let hosts = self.hosts.lock();
            hosts
                .iter()
                .filter(|(_, entry)| entry.idle_for() > self.config.idle_ttl)
                .map(|(id, entry)| (id.clone(), Arc::clone(entry)))
                .collect()
        };

        for (asset_id, entry) in stale {
            // A held lease means the session is in use; skip it.
            if entry.lease_lock.try_write().is_err() {
                continue;
            }
            self.evict(&asset_id).await;
        }
    }

    /// Drains and closes every cached session. Subsequent acquires fail.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let entries: Vec<Arc<HostEntry>> = {
            let mut hosts = self.hosts.lock();
            hosts.drain().map(|(_, e)| e).collect()
        };
        for entry in entries {
            let transport = entry.transport.lock().await.take();
            if let Some(transport) = transport {
                transport.close().await;
            }
        }
        info!("connection pool shut down");
    }

    /// Number of hosts with a cached entry.
    #[must_use]
    pub fn cached_hosts(&self) -> usize {
        self.hosts.lock().len()
    }

    fn entry_for(&self, asset_id: &AssetId) -> Result<Arc<HostEntry>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::PoolClosed);
        }
        let mut hosts = self.hosts.lock();
        Ok(Arc::clone(
            hosts
                .entry(asset_id.clone())
                .or_insert_with(|| Arc::new(HostEntry::new())),
        ))
    }

    async fn ensure_connected(
        &self,
        entry: &Arc<HostEntry>,
        asset: &Asset,
    ) -> Result<Arc<dyn Transport>> {
        let mut cached = entry.transport.lock().await;
        if let Some(transport) = cached.as_ref() {
            return Ok(Arc::clone(transport));
        }

        debug!(host = %asset.id, address = %asset.address, "dialing host");
        let credential = self.secrets.resolve_credential(asset).await?;

        let dial = tokio::time::timeout(
            self.config.connect_timeout,
            self.connector.connect(asset, &credential),
        )
        .await;

        match dial {
            Ok(Ok(transport)) => {
                *cached = Some(Arc::clone(&transport));
                entry.touch();
                info!(host = %asset.id, "session established");
                Ok(transport)
            }
            Ok(Err(e)) => {
                warn!(host = %asset.id, error = %e, "dial failed");
                Err(e)
            }
            Err(_elapsed) => Err(TransportError::timeout(
                asset.id.to_string(),
                self.config.connect_timeout.as_secs(),
            )),
        }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("cached_hosts", &self.cached_hosts())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
