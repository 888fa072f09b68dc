//! Change-feed subscriber for `live_positions`.
//!
//! A trigger on the table emits every written row as JSON on the
//! `live_positions` NOTIFY channel. The feed keeps the latest sample per
//! subscribed device in memory and fans updates out on a broadcast channel.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgListener;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::db::connection::DbPool;
use crate::error::Error;
use crate::models::Position;
use crate::repositories::position as position_repo;

const NOTIFY_CHANNEL: &str = "live_positions";
const BROADCAST_CAPACITY: usize = 256;
const RECONNECT_PAUSE: Duration = Duration::from_secs(1);

struct FeedTask {
    handle: JoinHandle<()>,
}

impl Drop for FeedTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Exactly one change feed is active at a time; re-subscribing replaces the
/// previous feed and discards its buffered positions, so entries from an
/// earlier device set never leak into the new subscription.
pub struct LivePositionFeed {
    pool: DbPool,
    positions: Arc<RwLock<HashMap<String, Position>>>,
    updates: broadcast::Sender<Position>,
    active: Mutex<Option<FeedTask>>,
}

impl LivePositionFeed {
    pub fn new(pool: DbPool) -> Self {
        let (updates, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            pool,
            positions: Arc::new(RwLock::new(HashMap::new())),
            updates,
            active: Mutex::new(None),
        }
    }

    /// Opens a feed for the given device set: tears down any prior feed,
    /// clears buffered positions, loads the latest-row snapshot, then applies
    /// notifications as they arrive (last write wins per device).
    ///
    /// The listener starts before the snapshot is read, so rows written in
    /// between are buffered and applied afterwards rather than lost.
    pub async fn subscribe(&self, device_ids: Vec<String>) -> Result<(), Error> {
        let mut active = self.active.lock().await;
        active.take();
        self.positions.write().await.clear();

        let mut listener = PgListener::connect_with(self.pool.as_ref()).await?;
        listener.listen(NOTIFY_CHANNEL).await?;

        let filter: Arc<HashSet<String>> = Arc::new(device_ids.iter().cloned().collect());
        let snapshot = position_repo::snapshot_for_devices(&self.pool, &device_ids).await?;
        {
            let mut map = self.positions.write().await;
            for position in snapshot {
                map.insert(position.device_id.clone(), position);
            }
        }

        let positions = Arc::clone(&self.positions);
        let updates = self.updates.clone();
        let handle = tokio::spawn(async move {
            loop {
                match listener.recv().await {
                    Ok(notification) => {
                        match serde_json::from_str::<Position>(notification.payload()) {
                            Ok(position) => {
                                let accepted = apply_update(
                                    &mut *positions.write().await,
                                    &filter,
                                    position.clone(),
                                );
                                if accepted {
                                    let _ = updates.send(position);
                                }
                            }
                            Err(err) => {
                                tracing::warn!(error = %err, "discarding malformed feed payload");
                            }
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "feed connection lost, waiting to reconnect");
                        tokio::time::sleep(RECONNECT_PAUSE).await;
                    }
                }
            }
        });

        *active = Some(FeedTask { handle });
        tracing::info!(devices = device_ids.len(), "live position feed subscribed");
        Ok(())
    }

    /// Tears down the feed and clears buffered positions.
    pub async fn unsubscribe(&self) {
        self.active.lock().await.take();
        self.positions.write().await.clear();
        tracing::info!("live position feed unsubscribed");
    }

    /// Snapshot of the latest known position per subscribed device.
    pub async fn positions(&self) -> HashMap<String, Position> {
        self.positions.read().await.clone()
    }

    pub async fn position_for(&self, device_id: &str) -> Option<Position> {
        self.positions.read().await.get(device_id).cloned()
    }

    /// Stream of accepted updates. Slow consumers observe `Lagged` and can
    /// resync from [`positions`](LivePositionFeed::positions).
    pub fn updates(&self) -> broadcast::Receiver<Position> {
        self.updates.subscribe()
    }
}

/// Applies one feed row to the buffer. Rows outside the subscribed device
/// set are dropped; rows inside it overwrite unconditionally.
fn apply_update(
    buffer: &mut HashMap<String, Position>,
    filter: &HashSet<String>,
    position: Position,
) -> bool {
    if !filter.contains(&position.device_id) {
        return false;
    }
    buffer.insert(position.device_id.clone(), position);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn position(device_id: &str, latitude: f64) -> Position {
        Position {
            device_id: device_id.to_string(),
            latitude,
            longitude: 0.0,
            speed: 0.0,
            course: 0.0,
            device_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            is_moving: false,
        }
    }

    #[test]
    fn updates_outside_the_filter_are_dropped() {
        let mut buffer = HashMap::new();
        let filter: HashSet<String> = ["d3".to_string()].into_iter().collect();

        assert!(!apply_update(&mut buffer, &filter, position("d1", 1.0)));
        assert!(apply_update(&mut buffer, &filter, position("d3", 2.0)));
        assert_eq!(buffer.len(), 1);
        assert!(buffer.contains_key("d3"));
    }

    #[test]
    fn later_updates_overwrite_per_device() {
        let mut buffer = HashMap::new();
        let filter: HashSet<String> = ["d1".to_string()].into_iter().collect();

        apply_update(&mut buffer, &filter, position("d1", 1.0));
        apply_update(&mut buffer, &filter, position("d1", 9.0));
        assert_eq!(buffer["d1"].latitude, 9.0);
    }

    #[test]
    fn feed_payload_parses_the_trigger_row_shape() {
        // row_to_json output from the live_positions trigger; the extra
        // received_at column is ignored.
        let payload = r#"{
            "device_id": "d1",
            "latitude": 1.5,
            "longitude": 2.5,
            "speed": 40.0,
            "course": 90.0,
            "device_time": "2026-08-29T12:00:00+00:00",
            "is_moving": true,
            "received_at": "2026-08-29T12:00:01+00:00"
        }"#;
        let position: Position = serde_json::from_str(payload).expect("payload parses");
        assert_eq!(position.device_id, "d1");
        assert!(position.is_moving);
    }
}
