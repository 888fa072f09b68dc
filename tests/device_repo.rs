use std::sync::OnceLock;
use tokio::sync::Mutex;

use fleetsync::models::Device;
use fleetsync::repositories::device;

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
    sqlx::query("TRUNCATE gp51_devices")
        .execute(pool)
        .await
        .expect("truncate gp51_devices");
}

fn vendor_device(device_id: &str, name: &str) -> Device {
    Device {
        device_id: device_id.to_string(),
        name: name.to_string(),
        device_type: Some(1),
        sim_number: Some(format!("8950-{device_id}")),
        group_id: Some(7),
        group_name: Some("North fleet".to_string()),
        last_active_at: None,
    }
}

async fn count_devices(pool: &sqlx::PgPool) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM gp51_devices")
        .fetch_one(pool)
        .await
        .expect("count devices")
}

#[tokio::test]
async fn reconcile_is_idempotent() {
    let _guard = integration_guard().await;
    let pool = support::test_pool().await;
    reset_tables(&pool).await;

    let snapshot = vec![
        vendor_device("d1", "Truck 1"),
        vendor_device("d2", "Truck 2"),
    ];

    let first = device::reconcile_devices(&pool, &snapshot)
        .await
        .expect("first reconcile");
    assert_eq!(first.upserted, 2);
    assert_eq!(first.pruned, 0);

    let second = device::reconcile_devices(&pool, &snapshot)
        .await
        .expect("second reconcile");
    assert_eq!(second.upserted, 2);
    assert_eq!(second.pruned, 0);

    // Same snapshot twice yields no duplicate rows.
    assert_eq!(count_devices(&pool).await, 2);
    let listed = device::list_devices(&pool).await.expect("list devices");
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].name, "Truck 1");
}

#[tokio::test]
async fn reconcile_prunes_vendor_removed_devices() {
    let _guard = integration_guard().await;
    let pool = support::test_pool().await;
    reset_tables(&pool).await;

    device::reconcile_devices(
        &pool,
        &[
            vendor_device("d1", "Truck 1"),
            vendor_device("d2", "Truck 2"),
        ],
    )
    .await
    .expect("initial reconcile");

    // Vendor dropped d1 and renamed d2.
    let outcome = device::reconcile_devices(&pool, &[vendor_device("d2", "Truck 2 (repainted)")])
        .await
        .expect("shrunken reconcile");
    assert_eq!(outcome.upserted, 1);
    assert_eq!(outcome.pruned, 1);

    assert!(device::find_device(&pool, "d1")
        .await
        .expect("find d1")
        .is_none());
    let d2 = device::find_device(&pool, "d2")
        .await
        .expect("find d2")
        .expect("d2 survives");
    assert_eq!(d2.name, "Truck 2 (repainted)");
    assert_eq!(count_devices(&pool).await, 1);
}

#[tokio::test]
async fn empty_snapshot_empties_the_cache() {
    let _guard = integration_guard().await;
    let pool = support::test_pool().await;
    reset_tables(&pool).await;

    device::reconcile_devices(&pool, &[vendor_device("d1", "Truck 1")])
        .await
        .expect("seed reconcile");

    let outcome = device::reconcile_devices(&pool, &[])
        .await
        .expect("empty reconcile");
    assert_eq!(outcome.upserted, 0);
    assert_eq!(outcome.pruned, 1);
    assert_eq!(count_devices(&pool).await, 0);
}
