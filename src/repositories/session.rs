use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Session;

/// Upserts the one cached vendor session for a user. `user_id` is the
/// conflict key: a fresh login replaces the previous row instead of stacking
/// sessions.
pub async fn upsert_session(pool: &PgPool, session: &Session) -> Result<Session, sqlx::Error> {
    sqlx::query_as::<_, Session>(
        r#"
        INSERT INTO gp51_sessions (user_id, username, token, expires_at, last_activity_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (user_id) DO UPDATE
        SET username = EXCLUDED.username,
            token = EXCLUDED.token,
            expires_at = EXCLUDED.expires_at,
            last_activity_at = EXCLUDED.last_activity_at
        RETURNING user_id, username, token, expires_at, last_activity_at
        "#,
    )
    .bind(session.user_id)
    .bind(&session.username)
    .bind(&session.token)
    .bind(session.expires_at)
    .bind(session.last_activity_at)
    .fetch_one(pool)
    .await
}

/// Most recent non-expired session for the user, if any.
pub async fn find_valid_session(
    pool: &PgPool,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(
        r#"
        SELECT user_id, username, token, expires_at, last_activity_at
        FROM gp51_sessions
        WHERE user_id = $1 AND expires_at > $2
        ORDER BY last_activity_at DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(now)
    .fetch_optional(pool)
    .await
}

pub async fn touch_last_activity(
    pool: &PgPool,
    user_id: Uuid,
    last_activity_at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE gp51_sessions
        SET last_activity_at = $1
        WHERE user_id = $2
        "#,
    )
    .bind(last_activity_at)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_sessions_for_user(pool: &PgPool, user_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM gp51_sessions WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await
        .map(|_| ())
}

pub async fn cleanup_expired_sessions(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM gp51_sessions WHERE expires_at <= NOW()")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
