use thiserror::Error;

/// Error taxonomy for the GP51 integration layer.
///
/// Vendor rejections, transport failures, and persistence failures are kept
/// distinct so callers can tell "the vendor said no" apart from "the request
/// never arrived" and "the local cache is broken".
#[derive(Debug, Error)]
pub enum Error {
    /// The vendor answered with a non-zero `status` and a `cause` string.
    #[error("vendor rejected request (status {status}): {cause}")]
    Vendor { status: i64, cause: String },

    /// Transport-level failure talking to the vendor, after retries.
    #[error("transient network failure: {0}")]
    Transient(#[source] reqwest::Error),

    /// Failure reading or writing the local Postgres cache.
    #[error("persistence failure: {0}")]
    Persistence(#[from] sqlx::Error),

    /// A vendor response that did not match the expected wire shape.
    #[error("malformed vendor payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// No usable session; the caller must authenticate first.
    #[error("no active vendor session")]
    NoSession,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn vendor(status: i64, cause: impl Into<String>) -> Self {
        Error::Vendor {
            status,
            cause: cause.into(),
        }
    }

    /// Whether retrying the same call could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transient(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_error_carries_status_and_cause() {
        let err = Error::vendor(8902, "invalid token");
        assert_eq!(
            err.to_string(),
            "vendor rejected request (status 8902): invalid token"
        );
        assert!(!err.is_transient());
    }

    #[test]
    fn sqlx_errors_map_to_persistence() {
        let err: Error = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, Error::Persistence(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn json_errors_map_to_payload() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Payload(_)));
    }

    #[test]
    fn no_session_message_is_stable() {
        assert_eq!(Error::NoSession.to_string(), "no active vendor session");
    }
}
