//! Latest-known telemetry sample per device.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
/// Most recent lat/lon/speed/course sample for a device. Keyed by device ID
/// with latest-wins semantics; no history is retained in this table.
pub struct Position {
    pub device_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Speed in km/h as reported by the vendor.
    pub speed: f64,
    /// Heading in degrees from north.
    pub course: f64,
    /// Timestamp the device recorded the sample.
    pub device_time: DateTime<Utc>,
    pub is_moving: bool,
}
