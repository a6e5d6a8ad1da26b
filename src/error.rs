//! Outcome taxonomy shared by the catalog, guide and DVR clients

use thiserror::Error;

use crate::transport::TransportError;

/// Failure of a fetch or DVR operation.
///
/// Missing fields inside individual records never surface here; such records
/// are skipped while the rest of the response is still used.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// No usable response: connection failure or a non-2xx status.
    /// Carries the status line when one was received.
    #[error("{0}")]
    Transport(String),

    /// A body arrived but did not have the expected shape
    /// (not a JSON array, missing wrapper field, not XMLTV).
    #[error("{0}")]
    ShapeMismatch(String),

    /// The response was well formed but produced zero usable records.
    #[error("{0}")]
    EmptyResult(String),

    /// The credential exchange did not yield a bearer token.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A request URL could not be built from the configured settings.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// The server answered 2xx but without the success marker it sends on
    /// accepted writes.
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl FetchError {
    /// Whether this outcome came from the transport rather than the payload.
    pub fn is_transport(&self) -> bool {
        matches!(self, FetchError::Transport(_))
    }
}

impl From<TransportError> for FetchError {
    fn from(e: TransportError) -> Self {
        FetchError::Transport(e.to_string())
    }
}
