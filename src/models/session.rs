//! Cached vendor session state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
/// A vendor-issued bearer token cached for one application user.
pub struct Session {
    /// Application user the session belongs to.
    pub user_id: Uuid,
    /// Vendor account name the token was issued for.
    pub username: String,
    /// Bearer token sent with every vendor call.
    pub token: String,
    /// Local bookkeeping expiry; checked before any vendor call.
    pub expires_at: DateTime<Utc>,
    /// Timestamp of the last successful use of the session.
    pub last_activity_at: DateTime<Utc>,
}

impl Session {
    /// Whether the session may still be sent to the vendor at `now`.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(expires_at: DateTime<Utc>) -> Session {
        Session {
            user_id: Uuid::nil(),
            username: "octopus".to_string(),
            token: "tok123".to_string(),
            expires_at,
            last_activity_at: Utc::now(),
        }
    }

    #[test]
    fn session_expiry_is_exclusive() {
        let now = Utc::now();
        assert!(session(now + Duration::hours(1)).is_valid(now));
        assert!(!session(now).is_valid(now));
        assert!(!session(now - Duration::seconds(1)).is_valid(now));
    }
}
