use sqlx::PgPool;

use crate::models::Position;

/// Overwrites the latest-known sample for each device. The table holds one
/// row per device; the `live_positions` trigger fans each write out to feed
/// subscribers.
pub async fn upsert_positions(pool: &PgPool, positions: &[Position]) -> Result<u64, sqlx::Error> {
    let mut written = 0u64;
    for position in positions {
        sqlx::query(
            r#"
            INSERT INTO live_positions
                (device_id, latitude, longitude, speed, course, device_time, is_moving, received_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT (device_id) DO UPDATE
            SET latitude = EXCLUDED.latitude,
                longitude = EXCLUDED.longitude,
                speed = EXCLUDED.speed,
                course = EXCLUDED.course,
                device_time = EXCLUDED.device_time,
                is_moving = EXCLUDED.is_moving,
                received_at = NOW()
            "#,
        )
        .bind(&position.device_id)
        .bind(position.latitude)
        .bind(position.longitude)
        .bind(position.speed)
        .bind(position.course)
        .bind(position.device_time)
        .bind(position.is_moving)
        .execute(pool)
        .await?;
        written += 1;
    }
    Ok(written)
}

/// Latest row per device for an explicit device set; used as the initial
/// snapshot when a feed subscription starts.
pub async fn snapshot_for_devices(
    pool: &PgPool,
    device_ids: &[String],
) -> Result<Vec<Position>, sqlx::Error> {
    sqlx::query_as::<_, Position>(
        r#"
        SELECT device_id, latitude, longitude, speed, course, device_time, is_moving
        FROM live_positions
        WHERE device_id = ANY($1)
        "#,
    )
    .bind(device_ids)
    .fetch_all(pool)
    .await
}

pub async fn find_position(pool: &PgPool, device_id: &str) -> Result<Option<Position>, sqlx::Error> {
    sqlx::query_as::<_, Position>(
        r#"
        SELECT device_id, latitude, longitude, speed, course, device_time, is_moving
        FROM live_positions
        WHERE device_id = $1
        "#,
    )
    .bind(device_id)
    .fetch_optional(pool)
    .await
}
