//! StateStore — redb-backed versioned state persistence for Convoy.
//!
//! Provides typed access over deployment history, the service
//! registry, capacity snapshots, and the leader lock. All values are
//! JSON-serialized into redb's `&[u8]` value columns. The store
//! supports both on-disk and in-memory backends (the latter for
//! testing).
//!
//! Shared documents carry a `version` counter; every mutation goes
//! through a conditional put that re-reads the stored version inside
//! the write transaction and fails with
//! [`StateError::VersionConflict`] when another writer got there
//! first. The [`retry`](crate::retry) helper wraps the
//! read-modify-conditional-write loop.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::retry::retry_conditional;
use crate::tables::*;
use crate::time::{day_bucket, month_bucket};
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// How far back `recent_deployments` walks the bucket indexes.
const BUCKET_WINDOW: u64 = 3;

/// Retry budget for the store's own read-modify-write helpers.
const RMW_ATTEMPTS: u32 = 4;

/// Capacity snapshots expire 30 days after capture.
pub const CAPACITY_TTL_MS: u64 = 30 * 24 * 60 * 60 * 1000;

/// Bucket granularity for deployment history reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryBucket {
    Day,
    Month,
}

/// Thread-safe versioned state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        txn.open_table(DEPLOYMENTS_BY_DAY).map_err(map_err!(Table))?;
        txn.open_table(DEPLOYMENTS_BY_MONTH)
            .map_err(map_err!(Table))?;
        txn.open_table(REGISTRY).map_err(map_err!(Table))?;
        txn.open_table(CAPACITY).map_err(map_err!(Table))?;
        txn.open_table(LEADER).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Deployment history ─────────────────────────────────────────

    /// Append a brand-new deployment record (version must be 1) and
    /// its day/month index rows.
    pub fn put_deployment(&self, record: &DeploymentRecord) -> StateResult<()> {
        let key = record.table_key();
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let day_key = format!(
            "{}:{:020}:{}",
            record.day, record.submitted_at, record.service_name
        );
        let month_key = format!(
            "{}:{:020}:{}",
            record.month, record.submitted_at, record.service_name
        );

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            let mut by_day = txn.open_table(DEPLOYMENTS_BY_DAY).map_err(map_err!(Table))?;
            by_day
                .insert(day_key.as_str(), key.as_str())
                .map_err(map_err!(Write))?;
            let mut by_month = txn
                .open_table(DEPLOYMENTS_BY_MONTH)
                .map_err(map_err!(Table))?;
            by_month
                .insert(month_key.as_str(), key.as_str())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "deployment record stored");
        Ok(())
    }

    /// Conditionally overwrite an existing deployment record. The
    /// caller must have already incremented `record.version`; the put
    /// succeeds only if the stored version equals `version - 1`.
    pub fn put_deployment_versioned(&self, record: &DeploymentRecord) -> StateResult<()> {
        let key = record.table_key();
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
            let found = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    let stored: DeploymentRecord =
                        serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                    stored.version
                }
                None => return Err(StateError::NotFound(key)),
            };
            if found != record.version - 1 {
                return Err(StateError::VersionConflict {
                    key,
                    expected: record.version - 1,
                    found,
                });
            }
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get one deployment record by service name and submission time.
    pub fn get_deployment(
        &self,
        service_name: &str,
        submitted_at: u64,
    ) -> StateResult<DeploymentRecord> {
        let key = deployment_key(service_name, submitted_at);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))
            }
            None => Err(StateError::NotFound(key)),
        }
    }

    /// Latest deployment record for a service, newest first, or None
    /// if the service has never deployed.
    pub fn latest_deployment(&self, service_name: &str) -> StateResult<Option<DeploymentRecord>> {
        Ok(self.deployments_for_service(service_name, 1)?.into_iter().next())
    }

    /// Deployment history for one service, newest first, bounded.
    pub fn deployments_for_service(
        &self,
        service_name: &str,
        limit: usize,
    ) -> StateResult<Vec<DeploymentRecord>> {
        let lo = deployment_key(service_name, 0);
        let hi = deployment_key(service_name, u64::MAX);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table
            .range(lo.as_str()..=hi.as_str())
            .map_err(map_err!(Read))?
            .rev()
        {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: DeploymentRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(record);
            if results.len() >= limit {
                break;
            }
        }
        Ok(results)
    }

    /// Recent deployments across all services, newest first, walking
    /// the day or month index over a three-bucket window.
    pub fn recent_deployments(
        &self,
        bucket: HistoryBucket,
        limit: usize,
        now_ms: u64,
    ) -> StateResult<Vec<DeploymentRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let deployments = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();

        for back in 0..BUCKET_WINDOW {
            let prefix = match bucket {
                HistoryBucket::Day => day_bucket(now_ms, back),
                HistoryBucket::Month => month_bucket(now_ms, back as u32),
            };
            let lo = format!("{prefix}:");
            let hi = format!("{prefix};"); // ';' sorts just after ':'
            let index = match bucket {
                HistoryBucket::Day => txn.open_table(DEPLOYMENTS_BY_DAY),
                HistoryBucket::Month => txn.open_table(DEPLOYMENTS_BY_MONTH),
            }
            .map_err(map_err!(Table))?;

            for entry in index
                .range(lo.as_str()..hi.as_str())
                .map_err(map_err!(Read))?
                .rev()
            {
                let (_, primary) = entry.map_err(map_err!(Read))?;
                if let Some(guard) = deployments
                    .get(primary.value())
                    .map_err(map_err!(Read))?
                {
                    let record: DeploymentRecord =
                        serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                    results.push(record);
                }
                if results.len() >= limit {
                    return Ok(results);
                }
            }
        }
        Ok(results)
    }

    /// Whether any deployment in the recent window is still running.
    pub fn is_deploy_running(&self, now_ms: u64) -> StateResult<bool> {
        let recent = self.recent_deployments(HistoryBucket::Day, 50, now_ms)?;
        Ok(recent.iter().any(|d| d.status == DeploymentStatus::Running))
    }

    /// Read-modify-conditional-write one deployment record, retrying
    /// on version conflicts. The mutator sees the freshly read record;
    /// the version bump happens here.
    pub fn update_deployment<F>(
        &self,
        service_name: &str,
        submitted_at: u64,
        mut mutate: F,
    ) -> StateResult<DeploymentRecord>
    where
        F: FnMut(&mut DeploymentRecord),
    {
        let key = deployment_key(service_name, submitted_at);
        retry_conditional(&key, RMW_ATTEMPTS, || {
            let mut record = self.get_deployment(service_name, submitted_at)?;
            mutate(&mut record);
            record.version += 1;
            self.put_deployment_versioned(&record)?;
            Ok(record)
        })
    }

    /// Set a record's status (and failure reason), version-conditioned.
    pub fn set_deployment_status(
        &self,
        service_name: &str,
        submitted_at: u64,
        status: DeploymentStatus,
        reason: Option<&str>,
    ) -> StateResult<DeploymentRecord> {
        debug!(service = %service_name, submitted_at, ?status, "setting deployment status");
        self.update_deployment(service_name, submitted_at, |record| {
            record.status = status;
            record.failure_reason = reason.map(str::to_string);
        })
    }

    /// Persist a manually requested desired count on a record so it
    /// survives redeploys.
    pub fn set_desired_count(
        &self,
        service_name: &str,
        submitted_at: u64,
        desired_count: u64,
    ) -> StateResult<DeploymentRecord> {
        self.update_deployment(service_name, submitted_at, |record| {
            record.scaling.desired_count = desired_count;
        })
    }

    /// Record a one-off task launched against a deployment.
    pub fn append_manual_task_ref(
        &self,
        service_name: &str,
        submitted_at: u64,
        task_ref: &str,
    ) -> StateResult<DeploymentRecord> {
        self.update_deployment(service_name, submitted_at, |record| {
            record.manual_task_refs.push(task_ref.to_string());
        })
    }

    // ── Service registry ───────────────────────────────────────────

    /// The singleton service registry (empty if never written).
    pub fn registry(&self) -> StateResult<ServiceRegistry> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(REGISTRY).map_err(map_err!(Table))?;
        match table.get(REGISTRY_KEY).map_err(map_err!(Read))? {
            Some(guard) => {
                serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))
            }
            None => Ok(ServiceRegistry::default()),
        }
    }

    fn put_registry_versioned(&self, registry: &ServiceRegistry) -> StateResult<()> {
        let value = serde_json::to_vec(registry).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(REGISTRY).map_err(map_err!(Table))?;
            let found = match table.get(REGISTRY_KEY).map_err(map_err!(Read))? {
                Some(guard) => {
                    let stored: ServiceRegistry =
                        serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                    stored.version
                }
                None => 0,
            };
            if found != registry.version - 1 {
                return Err(StateError::VersionConflict {
                    key: REGISTRY_KEY.to_string(),
                    expected: registry.version - 1,
                    found,
                });
            }
            table
                .insert(REGISTRY_KEY, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Read-modify-conditional-write the registry document, retrying
    /// on version conflicts.
    pub fn update_registry<F>(&self, mut mutate: F) -> StateResult<ServiceRegistry>
    where
        F: FnMut(&mut ServiceRegistry),
    {
        retry_conditional(REGISTRY_KEY, RMW_ATTEMPTS, || {
            let mut registry = self.registry()?;
            mutate(&mut registry);
            registry.version += 1;
            self.put_registry_versioned(&registry)?;
            Ok(registry)
        })
    }

    /// Insert or replace a service's registry entry.
    pub fn upsert_registry_entry(&self, entry: &ServiceRegistryEntry) -> StateResult<()> {
        self.update_registry(|registry| {
            match registry
                .entries
                .iter_mut()
                .find(|e| e.service_name == entry.service_name)
            {
                Some(existing) => *existing = entry.clone(),
                None => registry.entries.push(entry.clone()),
            }
        })?;
        Ok(())
    }

    /// Update one service's resource reservations/limits.
    pub fn update_service_limits(
        &self,
        cluster_name: &str,
        service_name: &str,
        cpu_reservation: i64,
        cpu_limit: i64,
        memory_reservation: i64,
        memory_limit: i64,
    ) -> StateResult<()> {
        self.mutate_registry_entry(cluster_name, service_name, |entry| {
            entry.cpu_reservation = cpu_reservation;
            entry.cpu_limit = cpu_limit;
            entry.memory_reservation = memory_reservation;
            entry.memory_limit = memory_limit;
        })
    }

    /// Update one service's listener rule refs.
    pub fn update_service_listeners(
        &self,
        cluster_name: &str,
        service_name: &str,
        listener_rules: &[String],
    ) -> StateResult<()> {
        self.mutate_registry_entry(cluster_name, service_name, |entry| {
            entry.listener_rules = listener_rules.to_vec();
        })
    }

    fn mutate_registry_entry<F>(
        &self,
        cluster_name: &str,
        service_name: &str,
        mutate: F,
    ) -> StateResult<()>
    where
        F: Fn(&mut ServiceRegistryEntry),
    {
        let mut found = false;
        self.update_registry(|registry| {
            for entry in &mut registry.entries {
                if entry.cluster_name == cluster_name && entry.service_name == service_name {
                    mutate(entry);
                    found = true;
                }
            }
        })?;
        if !found {
            return Err(StateError::NotFound(format!(
                "registry entry {cluster_name}/{service_name}"
            )));
        }
        Ok(())
    }

    /// Cluster a service is registered to.
    pub fn cluster_for_service(&self, service_name: &str) -> StateResult<String> {
        self.registry()?
            .entry(service_name)
            .map(|e| e.cluster_name.clone())
            .ok_or_else(|| StateError::NotFound(format!("registry entry {service_name}")))
    }

    // ── Capacity snapshots ─────────────────────────────────────────

    /// Newest non-expired capacity snapshot, or None.
    pub fn latest_capacity(&self, now_ms: u64) -> StateResult<Option<CapacitySnapshot>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CAPACITY).map_err(map_err!(Table))?;
        for entry in table.iter().map_err(map_err!(Read))?.rev() {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let snapshot: CapacitySnapshot =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if snapshot.expires_at > now_ms {
                return Ok(Some(snapshot));
            }
        }
        Ok(None)
    }

    /// Append a capacity snapshot with the given scaling action,
    /// stamping capture time and TTL. Expired rows are pruned in the
    /// same transaction. Returns the stored snapshot.
    pub fn put_capacity(
        &self,
        mut snapshot: CapacitySnapshot,
        cluster_name: &str,
        action: Option<ScalingDirection>,
        pending_action: Option<ScalingDirection>,
        now_ms: u64,
    ) -> StateResult<CapacitySnapshot> {
        snapshot.cluster_name = cluster_name.to_string();
        snapshot.captured_at = now_ms;
        snapshot.expires_at = now_ms + CAPACITY_TTL_MS;
        snapshot.scaling = ScalingOperation {
            cluster_name: cluster_name.to_string(),
            action,
            pending_action,
        };
        let key = format!("{:020}", snapshot.captured_at);
        let value = serde_json::to_vec(&snapshot).map_err(map_err!(Serialize))?;

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(CAPACITY).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            // Prune expired lineage entries.
            let expired: Vec<String> = table
                .iter()
                .map_err(map_err!(Read))?
                .filter_map(|entry| {
                    let (k, v) = entry.ok()?;
                    let snap: CapacitySnapshot = serde_json::from_slice(v.value()).ok()?;
                    (snap.expires_at <= now_ms).then(|| k.value().to_string())
                })
                .collect();
            for k in &expired {
                table.remove(k.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(cluster = %cluster_name, ?action, ?pending_action, "capacity snapshot stored");
        Ok(snapshot)
    }

    /// Scaling history for a cluster since `since_ms`: the first
    /// applied action found, and any pending action still recorded.
    /// `(None, None)` means the cooldown window is clear.
    pub fn scaling_activity(
        &self,
        cluster_name: &str,
        since_ms: u64,
    ) -> StateResult<(Option<ScalingDirection>, Option<ScalingDirection>)> {
        let lo = format!("{since_ms:020}");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CAPACITY).map_err(map_err!(Table))?;
        for entry in table.range(lo.as_str()..).map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let snapshot: CapacitySnapshot =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if snapshot.scaling.cluster_name != cluster_name {
                continue;
            }
            if snapshot.scaling.action.is_some() {
                debug!(
                    cluster = %cluster_name,
                    action = ?snapshot.scaling.action,
                    "found scaling action inside window"
                );
                return Ok((snapshot.scaling.action, None));
            }
            if snapshot.scaling.pending_action.is_some() {
                debug!(
                    cluster = %cluster_name,
                    pending = ?snapshot.scaling.pending_action,
                    "found pending scaling action inside window"
                );
                return Ok((None, snapshot.scaling.pending_action));
            }
        }
        Ok((None, None))
    }

    // ── Leader lock ────────────────────────────────────────────────

    /// Try to take the autoscaling poller lock. Succeeds iff the row
    /// is absent or its `acquired_at` is older than `ttl_ms`. The
    /// read and write happen in one transaction, so two contenders in
    /// the same window cannot both win.
    pub fn try_acquire_leader(
        &self,
        holder_id: &str,
        now_ms: u64,
        ttl_ms: u64,
    ) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let acquired;
        {
            let mut table = txn.open_table(LEADER).map_err(map_err!(Table))?;
            let current: Option<LeaderLock> = match table
                .get(LEADER_SCOPE)
                .map_err(map_err!(Read))?
            {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                }
                None => None,
            };
            acquired = match &current {
                Some(lock) => lock.acquired_at + ttl_ms <= now_ms,
                None => true,
            };
            if acquired {
                let lock = LeaderLock {
                    holder_id: holder_id.to_string(),
                    acquired_at: now_ms,
                };
                let value = serde_json::to_vec(&lock).map_err(map_err!(Serialize))?;
                table
                    .insert(LEADER_SCOPE, value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(acquired)
    }

    /// Current leader lock row, if any.
    pub fn leader_lock(&self) -> StateResult<Option<LeaderLock>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(LEADER).map_err(map_err!(Table))?;
        match table.get(LEADER_SCOPE).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(
                serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
            )),
            None => Ok(None),
        }
    }
}
