//! Wire types for the GP51 HTTP API.
//!
//! Field names follow the vendor's all-lowercase JSON; `serde(rename)` keeps
//! the Rust side readable.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::models::{Device, Position};

/// Every vendor response carries `status` (0 = success) and, on failure, a
/// human-readable `cause`.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub status: i64,
    #[serde(default)]
    pub cause: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorListResponse {
    #[serde(default)]
    pub groups: Vec<DeviceGroup>,
}

/// One vendor device group with its member devices.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceGroup {
    #[serde(rename = "groupid")]
    pub group_id: i64,
    #[serde(rename = "groupname")]
    pub group_name: String,
    #[serde(default)]
    pub devices: Vec<MonitorDevice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorDevice {
    #[serde(rename = "deviceid")]
    pub device_id: String,
    #[serde(rename = "devicename")]
    pub device_name: String,
    #[serde(rename = "devicetype", default)]
    pub device_type: Option<i32>,
    #[serde(rename = "simnum", default)]
    pub sim_number: Option<String>,
    /// Epoch milliseconds of the device's last report, when present.
    #[serde(rename = "lastactivetime", default)]
    pub last_active_time: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LastPositionResponse {
    #[serde(default)]
    pub records: Vec<PositionRecord>,
    /// Incremental cursor to echo back on the next `lastposition` call.
    #[serde(rename = "lastquerypositiontime", default)]
    pub last_query_position_time: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PositionRecord {
    #[serde(rename = "deviceid")]
    pub device_id: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub course: f64,
    /// Epoch milliseconds of the sample.
    #[serde(rename = "updatetime", default)]
    pub update_time: Option<i64>,
    /// Vendor moving flag, 0 = stationary.
    #[serde(default)]
    pub moving: i32,
}

/// Result of a `lastposition` pull: the new samples plus the cursor to carry
/// into the next request.
#[derive(Debug, Clone)]
pub struct PositionBatch {
    pub records: Vec<PositionRecord>,
    pub last_query_position_time: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TracksResponse {
    #[serde(default)]
    pub records: Vec<TrackPoint>,
}

/// One point of a historical track (`querytracks`).
#[derive(Debug, Clone, Deserialize)]
pub struct TrackPoint {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub course: f64,
    #[serde(rename = "updatetime", default)]
    pub update_time: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TripsResponse {
    #[serde(default)]
    pub trips: Vec<Trip>,
}

/// One completed trip segment (`querytrips`).
#[derive(Debug, Clone, Deserialize)]
pub struct Trip {
    #[serde(rename = "startlat")]
    pub start_lat: f64,
    #[serde(rename = "startlon")]
    pub start_lon: f64,
    #[serde(rename = "endlat")]
    pub end_lat: f64,
    #[serde(rename = "endlon")]
    pub end_lon: f64,
    #[serde(rename = "starttime", default)]
    pub start_time: Option<i64>,
    #[serde(rename = "endtime", default)]
    pub end_time: Option<i64>,
    /// Distance covered in meters.
    #[serde(default)]
    pub distance: f64,
}

fn from_epoch_millis(millis: Option<i64>) -> Option<DateTime<Utc>> {
    millis.and_then(DateTime::from_timestamp_millis)
}

/// Flattens the vendor's grouped monitor list into cache rows, carrying the
/// owning group onto each device.
pub fn flatten_device_groups(groups: &[DeviceGroup]) -> Vec<Device> {
    groups
        .iter()
        .flat_map(|group| {
            group.devices.iter().map(move |device| Device {
                device_id: device.device_id.clone(),
                name: device.device_name.clone(),
                device_type: device.device_type,
                sim_number: device.sim_number.clone(),
                group_id: Some(group.group_id),
                group_name: Some(group.group_name.clone()),
                last_active_at: from_epoch_millis(device.last_active_time),
            })
        })
        .collect()
}

impl PositionRecord {
    /// Converts a wire record into the latest-wins cache row. Samples without
    /// a usable timestamp fall back to `received_at`.
    pub fn into_position(self, received_at: DateTime<Utc>) -> Position {
        Position {
            device_id: self.device_id,
            latitude: self.lat,
            longitude: self.lon,
            speed: self.speed,
            course: self.course,
            device_time: from_epoch_millis(self.update_time).unwrap_or(received_at),
            is_moving: self.moving != 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grouped_monitor_list_flattens_with_group_membership() {
        let groups: MonitorListResponse = serde_json::from_str(
            r#"{
                "status": 0,
                "groups": [
                    {
                        "groupid": 7,
                        "groupname": "North fleet",
                        "devices": [
                            {"deviceid": "d1", "devicename": "Truck 1", "devicetype": 1,
                             "simnum": "8950001", "lastactivetime": 1700000000000},
                            {"deviceid": "d2", "devicename": "Truck 2"}
                        ]
                    },
                    {"groupid": 8, "groupname": "South fleet", "devices": []}
                ]
            }"#,
        )
        .expect("monitor list json");

        let devices = flatten_device_groups(&groups.groups);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].device_id, "d1");
        assert_eq!(devices[0].group_name.as_deref(), Some("North fleet"));
        assert!(devices[0].last_active_at.is_some());
        assert_eq!(devices[1].device_id, "d2");
        assert_eq!(devices[1].group_id, Some(7));
        assert!(devices[1].last_active_at.is_none());
    }

    #[test]
    fn position_record_converts_epoch_millis() {
        let record: PositionRecord = serde_json::from_str(
            r#"{"deviceid": "d1", "lat": 1.5, "lon": 2.5, "speed": 42.0,
                "course": 90.0, "updatetime": 1700000000000, "moving": 1}"#,
        )
        .expect("position json");

        let received_at = Utc::now();
        let position = record.into_position(received_at);
        assert_eq!(position.device_id, "d1");
        assert!(position.is_moving);
        assert_eq!(position.device_time.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn position_record_without_timestamp_uses_received_at() {
        let record: PositionRecord =
            serde_json::from_str(r#"{"deviceid": "d1", "lat": 0.0, "lon": 0.0}"#)
                .expect("position json");

        let received_at = Utc::now();
        let position = record.into_position(received_at);
        assert_eq!(position.device_time, received_at);
        assert!(!position.is_moving);
    }
}
