use crate::forms::FormErrors;
use crate::models::AttendanceStatus;

#[derive(Debug, thiserror::Error)]
pub enum ClinicError {
    #[error("invalid input: {0}")]
    Validation(FormErrors),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("failed to reach the server: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to decode response: {0}")]
    Decode(serde_json::Error),

    #[error("attendance {id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        id: i64,
        from: AttendanceStatus,
        to: AttendanceStatus,
    },
    #[error("attendance {0} is not in the current list")]
    UnknownAttendance(i64),

    #[error("failed to read session file: {0}")]
    SessionRead(std::io::Error),
    #[error("failed to write session file: {0}")]
    SessionWrite(std::io::Error),
    #[error("failed to remove session file: {0}")]
    SessionClear(std::io::Error),
    #[error("failed to serialize session: {0}")]
    SessionSerialization(serde_json::Error),
    #[error("failed to deserialize session: {0}")]
    SessionDeserialization(serde_json::Error),
}

impl ClinicError {
    /// Single-field validation failure.
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FormErrors::default();
        errors.insert(field, message);
        ClinicError::Validation(errors)
    }

    /// True when the record a mutation targeted is stale on the server.
    pub fn is_stale_record(&self) -> bool {
        matches!(self, ClinicError::NotFound(_) | ClinicError::Conflict(_))
    }

    /// Message suitable for a transient user notification.
    pub fn user_message(&self) -> String {
        match self {
            ClinicError::Unauthenticated(message)
            | ClinicError::NotFound(message)
            | ClinicError::Conflict(message)
            | ClinicError::Api { message, .. } => message.clone(),
            ClinicError::Validation(errors) => errors.to_string(),
            other => other.to_string(),
        }
    }
}

pub type ClinicResult<T> = std::result::Result<T, ClinicError>;
