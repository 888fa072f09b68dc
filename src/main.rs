use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleetsync::config::Config;
use fleetsync::db::connection::create_pool;
use fleetsync::error::Error;
use fleetsync::gp51::{Gp51Api, Gp51Client};
use fleetsync::repositories::device as device_repo;
use fleetsync::services::live_positions::LivePositionFeed;
use fleetsync::services::session::{PgSessionStore, SessionManager};
use fleetsync::services::sync::{DeviceSyncService, PgSyncStore};

/// How often the local expiry bookkeeping is extended while the daemon runs.
const SESSION_REFRESH_INTERVAL: Duration = Duration::from_secs(3600);

fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        return "<unset>".into();
    }
    let head: String = secret.chars().take(2).collect();
    format!("{head}\u{2026} ({} chars)", secret.chars().count())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fleetsync=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;
    tracing::info!(
        database_url = %config.database_url,
        gp51_base_url = %config.gp51_base_url,
        gp51_username = %config.gp51_username,
        gp51_password = %mask_secret(&config.gp51_password),
        app_user_id = %config.app_user_id,
        session_ttl_hours = config.session_ttl_hours,
        "Loaded configuration from environment/.env"
    );

    // Initialize database
    let pool = create_pool(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(pool.as_ref()).await?;

    let vendor: Arc<dyn Gp51Api> = Arc::new(Gp51Client::new(&config)?);
    let sessions = Arc::new(SessionManager::new(
        Arc::new(PgSessionStore::new(Arc::clone(&pool))),
        Arc::clone(&vendor),
        config.app_user_id,
        config.session_ttl_hours,
    ));
    sessions.initialize().await?;

    if !sessions.validate_session().await? {
        if config.gp51_username.is_empty() {
            anyhow::bail!("no valid cached vendor session and GP51_USERNAME is not set");
        }
        sessions
            .login(&config.gp51_username, &config.gp51_password)
            .await?;
    }

    let sync = Arc::new(DeviceSyncService::new(
        Arc::clone(&vendor),
        Arc::clone(&sessions),
        Arc::new(PgSyncStore::new(Arc::clone(&pool))),
    ));

    // Initial reconciliation so the feed has a device set to follow.
    let outcome = sync.sync_devices().await?;
    tracing::info!(
        upserted = outcome.upserted,
        pruned = outcome.pruned,
        "initial device reconciliation complete"
    );

    let devices = device_repo::list_devices(pool.as_ref()).await?;
    let feed = LivePositionFeed::new(Arc::clone(&pool));
    feed.subscribe(devices.iter().map(|d| d.device_id.clone()).collect())
        .await?;

    let mut updates = feed.updates();
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(position) => tracing::debug!(
                    device_id = %position.device_id,
                    latitude = position.latitude,
                    longitude = position.longitude,
                    speed = position.speed,
                    "live position update"
                ),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "live position stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let start = tokio::time::Instant::now();
    let mut device_tick = tokio::time::interval_at(
        start + config.device_sync_interval,
        config.device_sync_interval,
    );
    let mut position_tick = tokio::time::interval_at(
        start + config.position_poll_interval,
        config.position_poll_interval,
    );
    let mut refresh_tick =
        tokio::time::interval_at(start + SESSION_REFRESH_INTERVAL, SESSION_REFRESH_INTERVAL);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                break;
            }
            _ = device_tick.tick() => {
                match sync.sync_devices().await {
                    Ok(outcome) => {
                        if let Err(error) = resubscribe(&feed, &pool).await {
                            tracing::warn!(%error, "feed re-subscribe failed");
                        }
                        tracing::debug!(upserted = outcome.upserted, pruned = outcome.pruned, "device sync tick");
                    }
                    Err(error) => recover_session(&sessions, &config, error).await,
                }
            }
            _ = position_tick.tick() => {
                if let Err(error) = sync.get_last_positions(None).await {
                    recover_session(&sessions, &config, error).await;
                }
            }
            _ = refresh_tick.tick() => {
                match sessions.refresh_session().await {
                    Ok(session) => tracing::debug!(expires_at = %session.expires_at, "session expiry extended"),
                    Err(error) => tracing::warn!(%error, "session refresh failed"),
                }
            }
        }
    }

    feed.unsubscribe().await;
    Ok(())
}

/// The vendor-removed-devices case: the feed follows whatever survived the
/// last reconciliation pass.
async fn resubscribe(
    feed: &LivePositionFeed,
    pool: &fleetsync::db::connection::DbPool,
) -> Result<(), Error> {
    let devices = device_repo::list_devices(pool.as_ref()).await?;
    feed.subscribe(devices.into_iter().map(|d| d.device_id).collect())
        .await
}

/// Sync failures are logged and survived. A missing session gets a fresh
/// login; a vendor rejection means the token was invalidated vendor-side, so
/// the cached session is dropped before re-authenticating — otherwise every
/// subsequent tick would fail identically until a restart.
async fn recover_session(sessions: &SessionManager, config: &Config, error: Error) {
    tracing::warn!(%error, "sync tick failed");
    if config.gp51_username.is_empty() {
        return;
    }
    let attempt = match error {
        Error::NoSession => {
            sessions
                .login(&config.gp51_username, &config.gp51_password)
                .await
        }
        Error::Vendor { .. } => {
            sessions
                .recover_from_rejection(&config.gp51_username, &config.gp51_password)
                .await
        }
        _ => return,
    };
    if let Err(login_error) = attempt {
        tracing::warn!(error = %login_error, "re-login failed");
    }
}
