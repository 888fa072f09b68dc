use sqlx::PgPool;

use crate::error::Error;
use crate::models::Device;
use crate::repositories::transaction::{begin_transaction, commit_transaction};

/// Outcome of one reconciliation pass against the vendor snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub upserted: u64,
    pub pruned: u64,
}

/// Reconciles the local device cache against a full vendor snapshot: every
/// device in the snapshot is upserted on its vendor ID, then local rows
/// absent from the snapshot are pruned. Runs in one transaction so readers
/// never observe a half-applied snapshot.
///
/// An empty snapshot empties the cache; the vendor list is authoritative.
pub async fn reconcile_devices(
    pool: &PgPool,
    devices: &[Device],
) -> Result<ReconcileOutcome, Error> {
    let mut tx = begin_transaction(pool).await?;

    let mut upserted = 0u64;
    for device in devices {
        sqlx::query(
            r#"
            INSERT INTO gp51_devices
                (device_id, name, device_type, sim_number, group_id, group_name, last_active_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT (device_id) DO UPDATE
            SET name = EXCLUDED.name,
                device_type = EXCLUDED.device_type,
                sim_number = EXCLUDED.sim_number,
                group_id = EXCLUDED.group_id,
                group_name = EXCLUDED.group_name,
                last_active_at = EXCLUDED.last_active_at,
                updated_at = NOW()
            "#,
        )
        .bind(&device.device_id)
        .bind(&device.name)
        .bind(device.device_type)
        .bind(&device.sim_number)
        .bind(device.group_id)
        .bind(&device.group_name)
        .bind(device.last_active_at)
        .execute(&mut *tx)
        .await?;
        upserted += 1;
    }

    let snapshot_ids: Vec<String> = devices.iter().map(|d| d.device_id.clone()).collect();
    let pruned = sqlx::query("DELETE FROM gp51_devices WHERE device_id <> ALL($1)")
        .bind(&snapshot_ids)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    commit_transaction(tx).await?;
    Ok(ReconcileOutcome { upserted, pruned })
}

pub async fn list_devices(pool: &PgPool) -> Result<Vec<Device>, sqlx::Error> {
    sqlx::query_as::<_, Device>(
        r#"
        SELECT device_id, name, device_type, sim_number, group_id, group_name, last_active_at
        FROM gp51_devices
        ORDER BY name, device_id
        "#,
    )
    .fetch_all(pool)
    .await
}

pub async fn find_device(pool: &PgPool, device_id: &str) -> Result<Option<Device>, sqlx::Error> {
    sqlx::query_as::<_, Device>(
        r#"
        SELECT device_id, name, device_type, sim_number, group_id, group_name, last_active_at
        FROM gp51_devices
        WHERE device_id = $1
        "#,
    )
    .bind(device_id)
    .fetch_optional(pool)
    .await
}
