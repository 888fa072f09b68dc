//! Vendor session lifecycle: restore, validate, refresh, clear.
//!
//! One `SessionManager` instance owns the cached session for one application
//! user. It is constructed explicitly with its dependencies and handed around
//! from the composition root; there is no global instance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::connection::DbPool;
use crate::error::Error;
use crate::gp51::{self, Gp51Api};
use crate::models::Session;
use crate::repositories::session as session_repo;

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Persistence seam for cached sessions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Most recent non-expired session for the user, if any.
    async fn load_valid(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, Error>;
    async fn save(&self, session: &Session) -> Result<(), Error>;
    async fn touch(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<(), Error>;
    async fn delete(&self, user_id: Uuid) -> Result<(), Error>;
}

/// Postgres-backed [`SessionStore`] over the `gp51_sessions` table.
pub struct PgSessionStore {
    pool: DbPool,
}

impl PgSessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn load_valid(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, Error> {
        session_repo::find_valid_session(&self.pool, user_id, now)
            .await
            .map_err(Error::from)
    }

    async fn save(&self, session: &Session) -> Result<(), Error> {
        session_repo::upsert_session(&self.pool, session).await?;
        Ok(())
    }

    async fn touch(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<(), Error> {
        session_repo::touch_last_activity(&self.pool, user_id, at).await?;
        Ok(())
    }

    async fn delete(&self, user_id: Uuid) -> Result<(), Error> {
        session_repo::delete_sessions_for_user(&self.pool, user_id)
            .await
            .map_err(Error::from)
    }
}

pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    vendor: Arc<dyn Gp51Api>,
    user_id: Uuid,
    ttl: Duration,
    session: RwLock<Option<Session>>,
    initialized: AtomicBool,
    now: Clock,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        vendor: Arc<dyn Gp51Api>,
        user_id: Uuid,
        ttl_hours: i64,
    ) -> Self {
        Self {
            store,
            vendor,
            user_id,
            ttl: Duration::hours(ttl_hours),
            session: RwLock::new(None),
            initialized: AtomicBool::new(false),
            now: Arc::new(Utc::now),
        }
    }

    #[cfg(test)]
    fn with_clock(
        store: Arc<dyn SessionStore>,
        vendor: Arc<dyn Gp51Api>,
        user_id: Uuid,
        ttl_hours: i64,
        now: Clock,
    ) -> Self {
        let mut manager = Self::new(store, vendor, user_id, ttl_hours);
        manager.now = now;
        manager
    }

    /// Restores the most recent non-expired persisted session. Idempotent:
    /// subsequent calls are no-ops, even after `clear_session`.
    pub async fn initialize(&self) -> Result<(), Error> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let restored = self.store.load_valid(self.user_id, (self.now)()).await?;
        let found = restored.is_some();
        *self.session.write().await = restored;
        tracing::info!(user_id = %self.user_id, restored = found, "session manager initialized");
        Ok(())
    }

    pub async fn get_session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    /// Local bookkeeping check only; never touches the network.
    pub async fn is_session_valid(&self) -> bool {
        match self.session.read().await.as_ref() {
            Some(session) => session.is_valid((self.now)()),
            None => false,
        }
    }

    /// Token for an outgoing vendor call. Fails when there is no session or
    /// its local expiry has passed, so an invalid session is never sent to
    /// the vendor.
    pub async fn require_token(&self) -> Result<String, Error> {
        match self.session.read().await.as_ref() {
            Some(session) if session.is_valid((self.now)()) => Ok(session.token.clone()),
            _ => Err(Error::NoSession),
        }
    }

    /// Full validation: expiry short-circuit first (no network), then a
    /// `querymonitorlist` liveness probe. A vendor rejection clears the
    /// session (local and persisted) and returns `Ok(false)`; transport and
    /// persistence failures surface as errors and leave the session alone.
    pub async fn validate_session(&self) -> Result<bool, Error> {
        let Some(session) = self.get_session().await else {
            return Ok(false);
        };
        let now = (self.now)();
        if !session.is_valid(now) {
            tracing::debug!(user_id = %self.user_id, expired_at = %session.expires_at, "session expired locally");
            self.clear_session().await?;
            return Ok(false);
        }

        match self.vendor.query_monitor_list(&session.token).await {
            Ok(_) => {
                self.store.touch(self.user_id, now).await?;
                if let Some(session) = self.session.write().await.as_mut() {
                    session.last_activity_at = now;
                }
                Ok(true)
            }
            Err(Error::Vendor { status, cause }) => {
                tracing::warn!(user_id = %self.user_id, status, %cause, "vendor rejected session probe");
                self.clear_session().await?;
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Extends the local expiry by the configured TTL and re-persists.
    ///
    /// This deliberately does NOT re-authenticate with the vendor: it is a
    /// trust-on-extend policy. The vendor may expire the token on its own
    /// schedule; callers that need certainty use [`validate_session`].
    ///
    /// [`validate_session`]: SessionManager::validate_session
    pub async fn refresh_session(&self) -> Result<Session, Error> {
        let mut guard = self.session.write().await;
        let session = guard.as_mut().ok_or(Error::NoSession)?;
        let now = (self.now)();
        session.expires_at = now + self.ttl;
        session.last_activity_at = now;
        let refreshed = session.clone();
        drop(guard);

        self.store.save(&refreshed).await?;
        tracing::debug!(user_id = %self.user_id, expires_at = %refreshed.expires_at, "session refreshed");
        Ok(refreshed)
    }

    /// Overwrites the session with a freshly issued vendor token.
    pub async fn set_session_from_auth(
        &self,
        username: &str,
        token: &str,
    ) -> Result<Session, Error> {
        let now = (self.now)();
        let session = Session {
            user_id: self.user_id,
            username: username.to_string(),
            token: token.to_string(),
            expires_at: now + self.ttl,
            last_activity_at: now,
        };
        self.store.save(&session).await?;
        *self.session.write().await = Some(session.clone());
        tracing::info!(user_id = %self.user_id, username, expires_at = %session.expires_at, "session established");
        Ok(session)
    }

    /// Authenticates with the vendor (MD5 password digest) and caches the
    /// issued token.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, Error> {
        let digest = gp51::hash_password(password);
        let token = self.vendor.login(username, &digest).await?;
        self.set_session_from_auth(username, &token).await
    }

    /// Recovery path for a token the vendor invalidated mid-sync: drops the
    /// cached session before authenticating again, so the stale token is
    /// gone even when the new login fails.
    pub async fn recover_from_rejection(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Session, Error> {
        tracing::info!(user_id = %self.user_id, "re-authenticating after vendor rejection");
        self.clear_session().await?;
        self.login(username, password).await
    }

    /// Deletes the persisted session rows and resets in-memory state.
    pub async fn clear_session(&self) -> Result<(), Error> {
        self.store.delete(self.user_id).await?;
        *self.session.write().await = None;
        tracing::debug!(user_id = %self.user_id, "session cleared");
        Ok(())
    }
}
