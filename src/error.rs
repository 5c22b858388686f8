/// Error taxonomy for the confirmation batch
/// A closed set of tagged kinds so callers can match on the failure class
/// instead of parsing message strings

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The credential store could not produce a usable credential list.
    /// Fatal for the whole run.
    #[error("credential store: {0}")]
    CredentialStore(String),

    /// First 401/403 on a call; the held token may simply have aged out.
    /// Absorbed internally by the refresh-and-retry cycle.
    #[error("access token rejected by {endpoint} (status {status})")]
    AuthExpired { endpoint: String, status: u16 },

    /// The refresh attempt after a 401/403 failed. Carries both the original
    /// rejection and the reason the refresh did not produce a usable token.
    #[error("token refresh failed after status {status} on {endpoint}: {reason}")]
    RefreshFailed {
        endpoint: String,
        status: u16,
        reason: String,
    },

    /// Non-success response after the (at most one) refresh retry.
    #[error("{endpoint} returned status {status}: {body}")]
    ApiRequest {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// The response parsed but did not have the expected shape.
    #[error("unexpected response from {endpoint}: {reason}")]
    MalformedResponse { endpoint: String, reason: String },

    /// Transport-level failure.
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
