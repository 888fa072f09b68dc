use chrono::{Duration as ChronoDuration, Utc};
use std::sync::OnceLock;
use tokio::sync::Mutex;
use uuid::Uuid;

use fleetsync::models::Session;
use fleetsync::repositories::session;

#[path = "support/mod.rs"]
mod support;

async fn integration_guard() -> tokio::sync::MutexGuard<'static, ()> {
    static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
    GUARD.get_or_init(|| Mutex::new(())).lock().await
}

async fn reset_tables(pool: &sqlx::PgPool) {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .expect("run migrations");
    sqlx::query("TRUNCATE gp51_sessions")
        .execute(pool)
        .await
        .expect("truncate gp51_sessions");
}

fn session(user_id: Uuid, token: &str, ttl_hours: i64) -> Session {
    let now = Utc::now();
    Session {
        user_id,
        username: "octopus".to_string(),
        token: token.to_string(),
        expires_at: now + ChronoDuration::hours(ttl_hours),
        last_activity_at: now,
    }
}

async fn count_sessions(pool: &sqlx::PgPool, user_id: Uuid) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM gp51_sessions WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .expect("count sessions")
}

#[tokio::test]
async fn upsert_replaces_the_session_per_user() {
    let _guard = integration_guard().await;
    let pool = support::test_pool().await;
    reset_tables(&pool).await;

    let user_id = Uuid::new_v4();
    session::upsert_session(&pool, &session(user_id, "tok-old", 23))
        .await
        .expect("first upsert");
    let replaced = session::upsert_session(&pool, &session(user_id, "tok-new", 23))
        .await
        .expect("second upsert");

    // A fresh login replaces the row instead of stacking sessions.
    assert_eq!(replaced.token, "tok-new");
    assert_eq!(count_sessions(&pool, user_id).await, 1);

    let restored = session::find_valid_session(&pool, user_id, Utc::now())
        .await
        .expect("find valid")
        .expect("session present");
    assert_eq!(restored.token, "tok-new");
    assert_eq!(restored.username, "octopus");
}

#[tokio::test]
async fn expired_sessions_are_not_restored() {
    let _guard = integration_guard().await;
    let pool = support::test_pool().await;
    reset_tables(&pool).await;

    let user_id = Uuid::new_v4();
    session::upsert_session(&pool, &session(user_id, "tok-stale", -1))
        .await
        .expect("upsert expired");

    let restored = session::find_valid_session(&pool, user_id, Utc::now())
        .await
        .expect("find valid");
    assert!(restored.is_none());

    let deleted = session::cleanup_expired_sessions(&pool)
        .await
        .expect("cleanup");
    assert_eq!(deleted, 1);
    assert_eq!(count_sessions(&pool, user_id).await, 0);
}

#[tokio::test]
async fn delete_for_user_only_touches_that_user() {
    let _guard = integration_guard().await;
    let pool = support::test_pool().await;
    reset_tables(&pool).await;

    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    session::upsert_session(&pool, &session(first, "tok-first", 23))
        .await
        .expect("upsert first");
    session::upsert_session(&pool, &session(second, "tok-second", 23))
        .await
        .expect("upsert second");

    session::delete_sessions_for_user(&pool, first)
        .await
        .expect("delete first user");

    assert_eq!(count_sessions(&pool, first).await, 0);
    assert_eq!(count_sessions(&pool, second).await, 1);
}
