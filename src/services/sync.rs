//! Device and position synchronization against the vendor.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::db::connection::DbPool;
use crate::error::Error;
use crate::gp51::{flatten_device_groups, Gp51Api};
use crate::models::{Device, Position};
use crate::repositories::device as device_repo;
use crate::repositories::device::ReconcileOutcome;
use crate::repositories::position as position_repo;
use crate::services::session::SessionManager;

/// Persistence seam for sync writes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SyncStore: Send + Sync {
    async fn reconcile_devices(&self, devices: &[Device]) -> Result<ReconcileOutcome, Error>;
    async fn upsert_positions(&self, positions: &[Position]) -> Result<u64, Error>;
}

/// Postgres-backed [`SyncStore`] over `gp51_devices` and `live_positions`.
pub struct PgSyncStore {
    pool: DbPool,
}

impl PgSyncStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncStore for PgSyncStore {
    async fn reconcile_devices(&self, devices: &[Device]) -> Result<ReconcileOutcome, Error> {
        device_repo::reconcile_devices(&self.pool, devices).await
    }

    async fn upsert_positions(&self, positions: &[Position]) -> Result<u64, Error> {
        position_repo::upsert_positions(&self.pool, positions)
            .await
            .map_err(Error::from)
    }
}

/// Pulls device and position state from the vendor into the local cache.
///
/// Holds the `lastquerypositiontime` cursor between pulls; the cursor only
/// advances on a successful pull, so a failed request is re-covered by the
/// next one.
pub struct DeviceSyncService {
    vendor: Arc<dyn Gp51Api>,
    sessions: Arc<SessionManager>,
    store: Arc<dyn SyncStore>,
    cursor: RwLock<Option<i64>>,
}

impl DeviceSyncService {
    pub fn new(
        vendor: Arc<dyn Gp51Api>,
        sessions: Arc<SessionManager>,
        store: Arc<dyn SyncStore>,
    ) -> Self {
        Self {
            vendor,
            sessions,
            store,
            cursor: RwLock::new(None),
        }
    }

    /// Full reconciliation pass: fetch the grouped vendor device list,
    /// flatten it, upsert on vendor ID and prune local rows the vendor no
    /// longer reports.
    pub async fn sync_devices(&self) -> Result<ReconcileOutcome, Error> {
        let token = self.sessions.require_token().await?;
        let groups = self.vendor.query_monitor_list(&token).await?;
        let devices = flatten_device_groups(&groups);
        let outcome = self.store.reconcile_devices(&devices).await?;
        tracing::info!(
            groups = groups.len(),
            upserted = outcome.upserted,
            pruned = outcome.pruned,
            "device list reconciled"
        );
        Ok(outcome)
    }

    /// Incremental position pull. Carries the cursor from the previous
    /// successful pull; `device_ids` narrows the query when given.
    pub async fn get_last_positions(
        &self,
        device_ids: Option<&[String]>,
    ) -> Result<Vec<Position>, Error> {
        let token = self.sessions.require_token().await?;
        let cursor = *self.cursor.read().await;
        let batch = self
            .vendor
            .last_position(&token, device_ids.map(<[String]>::to_vec), cursor)
            .await?;

        let received_at = Utc::now();
        let positions: Vec<Position> = batch
            .records
            .into_iter()
            .map(|record| record.into_position(received_at))
            .collect();
        if !positions.is_empty() {
            self.store.upsert_positions(&positions).await?;
        }

        if let Some(next) = batch.last_query_position_time {
            *self.cursor.write().await = Some(next);
        }
        tracing::debug!(
            records = positions.len(),
            cursor = ?batch.last_query_position_time,
            "position pull applied"
        );
        Ok(positions)
    }

    /// Cursor carried into the next `lastposition` request.
    pub async fn last_cursor(&self) -> Option<i64> {
        *self.cursor.read().await
    }
}
