//! Locally cached vendor device records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A device with no activity for this long is reported offline.
const ONLINE_WINDOW_MINUTES: i64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
/// Local cache row for one vendor-tracked GPS unit.
pub struct Device {
    /// Vendor-assigned device identifier (primary key).
    pub device_id: String,
    /// Display name shown to operators.
    pub name: String,
    /// Vendor device type code.
    pub device_type: Option<i32>,
    /// SIM card number of the tracker, when known.
    pub sim_number: Option<String>,
    /// Vendor group the device belongs to.
    pub group_id: Option<i64>,
    pub group_name: Option<String>,
    /// Last time the vendor saw the device report in.
    pub last_active_at: Option<DateTime<Utc>>,
}

impl Device {
    /// Online/offline status derived from the vendor's last-active timestamp.
    pub fn is_online(&self, now: DateTime<Utc>) -> bool {
        self.last_active_at
            .map(|seen| now - seen <= Duration::minutes(ONLINE_WINDOW_MINUTES))
            .unwrap_or(false)
    }
}
