use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use crate::config::Config;
use crate::error::Error;
use crate::gp51::types::{
    DeviceGroup, Envelope, LastPositionResponse, LoginResponse, MonitorListResponse, PositionBatch,
    TrackPoint, TracksResponse, Trip, TripsResponse,
};

/// Vendor API seam. Services depend on this trait so they can be exercised
/// without a network.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Gp51Api: Send + Sync {
    /// Authenticates with an MD5 password digest and returns a bearer token.
    async fn login(&self, username: &str, password_md5: &str) -> Result<String, Error>;

    /// Fetches the grouped device list. Also doubles as the cheapest liveness
    /// probe for a token.
    async fn query_monitor_list(&self, token: &str) -> Result<Vec<DeviceGroup>, Error>;

    /// Incremental position pull. `device_ids` narrows the query; `cursor` is
    /// the `lastquerypositiontime` returned by the previous pull.
    async fn last_position(
        &self,
        token: &str,
        device_ids: Option<Vec<String>>,
        cursor: Option<i64>,
    ) -> Result<PositionBatch, Error>;

    /// Historical track points for one device over a time window.
    async fn query_tracks(
        &self,
        token: &str,
        device_id: &str,
        begin_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Vec<TrackPoint>, Error>;

    /// Completed trips for one device over a time window.
    async fn query_trips(
        &self,
        token: &str,
        device_id: &str,
        begin_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Vec<Trip>, Error>;
}

/// HTTP implementation of [`Gp51Api`]: form-encoded POSTs with the `action`
/// and `token` carried as query parameters, bounded retry on transport
/// failures.
pub struct Gp51Client {
    http: reqwest::Client,
    base_url: String,
    retry_attempts: u32,
    retry_base_delay: Duration,
}

impl Gp51Client {
    pub fn new(config: &Config) -> Result<Self, Error> {
        if config.gp51_base_url.is_empty() {
            return Err(Error::Config("GP51_BASE_URL must not be empty".to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(config.vendor_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config.gp51_base_url.clone(),
            retry_attempts: config.vendor_retry_attempts,
            retry_base_delay: config.vendor_retry_base_delay,
        })
    }

    async fn post_action<T: DeserializeOwned>(
        &self,
        action: &str,
        token: Option<&str>,
        form: &[(&str, String)],
    ) -> Result<T, Error> {
        let mut attempt = 0u32;
        let body = loop {
            let mut request = self.http.post(&self.base_url).query(&[("action", action)]);
            if let Some(token) = token {
                request = request.query(&[("token", token)]);
            }
            match request.form(form).send().await {
                Ok(response) => break response.text().await?,
                Err(err) if attempt < self.retry_attempts => {
                    attempt += 1;
                    let delay = self.retry_base_delay * 2u32.saturating_pow(attempt - 1);
                    tracing::warn!(
                        action,
                        attempt,
                        error = %err,
                        "vendor request failed, retrying after {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(Error::Transient(err)),
            }
        };
        decode(&body)
    }
}

/// Checks the vendor's `status`/`cause` envelope before deserializing the
/// payload proper.
fn decode<T: DeserializeOwned>(body: &str) -> Result<T, Error> {
    let envelope: Envelope = serde_json::from_str(body)?;
    if envelope.status != 0 {
        let cause = envelope
            .cause
            .unwrap_or_else(|| "unspecified cause".to_string());
        return Err(Error::vendor(envelope.status, cause));
    }
    Ok(serde_json::from_str(body)?)
}

fn window_param(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[async_trait]
impl Gp51Api for Gp51Client {
    async fn login(&self, username: &str, password_md5: &str) -> Result<String, Error> {
        let form = [
            ("username", username.to_string()),
            ("password", password_md5.to_string()),
        ];
        let response: LoginResponse = self.post_action("login", None, &form).await?;
        response
            .token
            .ok_or_else(|| Error::vendor(0, "login succeeded without a token"))
    }

    async fn query_monitor_list(&self, token: &str) -> Result<Vec<DeviceGroup>, Error> {
        let response: MonitorListResponse = self
            .post_action("querymonitorlist", Some(token), &[])
            .await?;
        Ok(response.groups)
    }

    async fn last_position(
        &self,
        token: &str,
        device_ids: Option<Vec<String>>,
        cursor: Option<i64>,
    ) -> Result<PositionBatch, Error> {
        let mut form = Vec::new();
        if let Some(ids) = device_ids {
            form.push(("deviceids", ids.join(",")));
        }
        if let Some(cursor) = cursor {
            form.push(("lastquerypositiontime", cursor.to_string()));
        }
        let response: LastPositionResponse =
            self.post_action("lastposition", Some(token), &form).await?;
        Ok(PositionBatch {
            records: response.records,
            last_query_position_time: response.last_query_position_time,
        })
    }

    async fn query_tracks(
        &self,
        token: &str,
        device_id: &str,
        begin_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Vec<TrackPoint>, Error> {
        let form = [
            ("deviceid", device_id.to_string()),
            ("begintime", window_param(begin_time)),
            ("endtime", window_param(end_time)),
        ];
        let response: TracksResponse = self.post_action("querytracks", Some(token), &form).await?;
        Ok(response.records)
    }

    async fn query_trips(
        &self,
        token: &str,
        device_id: &str,
        begin_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Vec<Trip>, Error> {
        let form = [
            ("deviceid", device_id.to_string()),
            ("begintime", window_param(begin_time)),
            ("endtime", window_param(end_time)),
        ];
        let response: TripsResponse = self.post_action("querytrips", Some(token), &form).await?;
        Ok(response.trips)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_nonzero_status_with_cause() {
        let err = decode::<LoginResponse>(r#"{"status": 8902, "cause": "invalid token"}"#)
            .expect_err("nonzero status");
        match err {
            Error::Vendor { status, cause } => {
                assert_eq!(status, 8902);
                assert_eq!(cause, "invalid token");
            }
            other => panic!("expected vendor error, got {other:?}"),
        }
    }

    #[test]
    fn decode_defaults_missing_cause() {
        let err = decode::<LoginResponse>(r#"{"status": 1}"#).expect_err("nonzero status");
        assert_eq!(
            err.to_string(),
            "vendor rejected request (status 1): unspecified cause"
        );
    }

    #[test]
    fn decode_passes_through_success_payload() {
        let response: LastPositionResponse = decode(
            r#"{"status": 0,
                "records": [{"deviceid": "d1", "lat": 1.0, "lon": 2.0}],
                "lastquerypositiontime": 1000}"#,
        )
        .expect("success payload");
        assert_eq!(response.records.len(), 1);
        assert_eq!(response.last_query_position_time, Some(1000));
    }

    #[test]
    fn decode_reads_track_points() {
        let response: TracksResponse = decode(
            r#"{"status": 0,
                "records": [
                    {"lat": 1.0, "lon": 2.0, "speed": 30.0, "course": 45.0,
                     "updatetime": 1700000000000},
                    {"lat": 1.1, "lon": 2.1}
                ]}"#,
        )
        .expect("tracks payload");
        assert_eq!(response.records.len(), 2);
        assert_eq!(response.records[0].update_time, Some(1_700_000_000_000));
        assert_eq!(response.records[1].speed, 0.0);
    }

    #[test]
    fn decode_reads_trips() {
        let response: TripsResponse = decode(
            r#"{"status": 0,
                "trips": [
                    {"startlat": 1.0, "startlon": 2.0, "endlat": 3.0, "endlon": 4.0,
                     "starttime": 1700000000000, "endtime": 1700003600000,
                     "distance": 42195.0}
                ]}"#,
        )
        .expect("trips payload");
        assert_eq!(response.trips.len(), 1);
        assert_eq!(response.trips[0].distance, 42195.0);
        assert_eq!(response.trips[0].end_time, Some(1_700_003_600_000));
    }

    #[test]
    fn decode_rejects_malformed_json() {
        let err = decode::<LoginResponse>("not json").expect_err("malformed body");
        assert!(matches!(err, Error::Payload(_)));
    }
}
