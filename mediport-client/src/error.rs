use reqwest::StatusCode;

use crate::action::Action;

/// Errors that can happen within the mediport-client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Authentication failed or the session is not usable.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// A required field of a request is missing. Nothing was sent to the backend.
    #[error("missing required field `{field}`")]
    Validation {
        /// The name of the missing field.
        field: &'static str,
    },
    /// Role information could not be decoded or translated.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// Errors reading or writing the persisted session.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The backend responded with an unexpected, non-successful status.
    #[error("unexpected status {status}{}", suffix(.message))]
    UnexpectedStatus {
        /// The HTTP status code of the response.
        status: StatusCode,
        /// The error message from the response body, if there was one.
        message: Option<String>,
    },
    /// The same action is already in flight.
    #[error("{0} is already in progress")]
    InFlight(Action),
    /// Any error emitted from the underlying [`reqwest`] client.
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    /// Error when URL manipulation fails.
    #[error("{message}")]
    InvalidUrl {
        /// The URL error message.
        message: String,
    },
}

/// Authentication failures.
///
/// All of these are fatal to the current session attempt and are never retried.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    /// The backend rejected the credentials.
    #[error("authentication failed: {0}")]
    InvalidCredentials(String),
    /// The login response did not contain an access token.
    #[error("no authentication token received from server")]
    MissingToken,
    /// There is no authenticated session. The user must log in first.
    #[error("login required")]
    LoginRequired,
    /// The backend rejected the stored token. The session has been cleared.
    #[error("session expired, please log in again")]
    SessionExpired,
}

/// Failures decoding the role carried in an access token, or translating between roles and
/// backend role codes.
///
/// During login these are not fatal: the session is kept without a role, which denies every
/// permission check.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The token is not a decodable JWT.
    #[error("malformed token: {0}")]
    Malformed(#[from] jsonwebtoken::errors::Error),
    /// The token payload has no `rol` claim.
    #[error("token has no role claim")]
    MissingRoleClaim,
    /// The `rol` claim is not a single-character code.
    #[error(transparent)]
    InvalidRoleCode(#[from] mediport_types::role_code::InvalidRoleCode),
    /// The role code is not known to this client.
    #[error("unknown backend role code `{0}`")]
    UnknownRoleCode(mediport_types::BackendRoleCode),
    /// The role has no backend role code.
    #[error("role `{0}` has no backend role code")]
    UnmappedRole(mediport_types::Role),
}

/// Errors of a [`SessionStorage`](crate::SessionStorage) backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// IO errors reading or writing the session file.
    #[error("session storage io error: {0}")]
    Io(#[from] std::io::Error),
    /// The session file could not be (de)serialized.
    #[error("invalid session record: {0}")]
    Json(#[from] serde_json::Error),
}

fn suffix(message: &Option<String>) -> String {
    match message {
        Some(message) => format!(": {message}"),
        None => String::new(),
    }
}

/// A convenience alias that defaults our [`Error`] type.
pub type Result<T, E = Error> = std::result::Result<T, E>;
