use anyhow::anyhow;
use std::env;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Base URL of the GP51 vendor API endpoint.
    pub gp51_base_url: String,
    /// Vendor account used by the sync daemon.
    pub gp51_username: String,
    pub gp51_password: String,
    /// Application user the cached vendor session belongs to.
    pub app_user_id: Uuid,
    /// Local session lifetime granted on login/refresh.
    pub session_ttl_hours: i64,
    /// Interval between incremental position pulls.
    pub position_poll_interval: Duration,
    /// Interval between full device reconciliation passes.
    pub device_sync_interval: Duration,
    /// Per-request timeout for vendor calls.
    pub vendor_timeout: Duration,
    /// Bounded retry for transient vendor transport failures.
    pub vendor_retry_attempts: u32,
    pub vendor_retry_base_delay: Duration,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/fleetsync".to_string());

        let gp51_base_url = env::var("GP51_BASE_URL")
            .unwrap_or_else(|_| "https://www.gps51.com/webapi".to_string());

        let gp51_username = env::var("GP51_USERNAME").unwrap_or_default();
        let gp51_password = env::var("GP51_PASSWORD").unwrap_or_default();

        let app_user_id_raw = env::var("APP_USER_ID")
            .unwrap_or_else(|_| "00000000-0000-0000-0000-000000000000".to_string());
        let app_user_id: Uuid = app_user_id_raw
            .parse()
            .map_err(|_| anyhow!("Invalid APP_USER_ID value: {}", app_user_id_raw))?;

        let session_ttl_hours = env::var("SESSION_TTL_HOURS")
            .unwrap_or_else(|_| "23".to_string())
            .parse()
            .unwrap_or(23);

        let position_poll_interval = Duration::from_secs(
            env::var("POSITION_POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
        );

        let device_sync_interval = Duration::from_secs(
            env::var("DEVICE_SYNC_INTERVAL_SECS")
                .unwrap_or_else(|_| "900".to_string())
                .parse()
                .unwrap_or(900),
        );

        let vendor_timeout = Duration::from_secs(
            env::var("GP51_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
        );

        let vendor_retry_attempts = env::var("GP51_RETRY_ATTEMPTS")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .unwrap_or(3);

        let vendor_retry_base_delay = Duration::from_millis(
            env::var("GP51_RETRY_BASE_DELAY_MS")
                .unwrap_or_else(|_| "250".to_string())
                .parse()
                .unwrap_or(250),
        );

        Ok(Config {
            database_url,
            gp51_base_url,
            gp51_username,
            gp51_password,
            app_user_id,
            session_ttl_hours,
            position_poll_interval,
            device_sync_interval,
            vendor_timeout,
            vendor_retry_attempts,
            vendor_retry_base_delay,
        })
    }
}
