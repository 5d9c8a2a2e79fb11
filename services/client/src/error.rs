use crate::{auth::store::StoreError, transport::TransportError};

/// Errors surfaced by the request executor and the account API.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("HTTP error! status: {status}")]
    Status { status: u16 },
    /// The request was still rejected after a successful credential renewal.
    #[error("request was rejected again after renewing the access credential")]
    Unauthorized,
    /// The credential could not be renewed; stored credentials have already been cleared.
    #[error("session expired, please sign in again")]
    SessionExpired,
    #[error("api error (code {code}): {message}")]
    Api { code: i64, message: String },
    #[error("failed to encode or decode a JSON body: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ClientError {
    /// True for errors after which the user has to sign in again.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, ClientError::Unauthorized | ClientError::SessionExpired)
    }
}
