//! Binding diagnostics.
//!
//! None of these abort a session. They are recorded on the session, logged,
//! and the offending control or message is skipped.

use thiserror::Error;

/// A non-fatal problem observed while binding controls or routing messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    /// No registered driver accepts the control.
    #[error("no driver matches {element}")]
    DriverNotFound { element: String },

    /// An inbound message names an id with no live binding.
    #[error("no bound control with id `{id}`")]
    UnknownTargetId { id: String },

    /// A driver call returned an error or panicked.
    #[error("driver `{driver}` failed in {op} for `{id}`: {reason}")]
    DriverFault {
        driver: String,
        op: &'static str,
        id: String,
        reason: String,
    },

    /// An inbound payload is not a `{id, value}` object.
    #[error("malformed message: {reason}")]
    MalformedMessage { reason: String },

    /// The driver produced no identifier for the control.
    #[error("driver `{driver}` found no id for {element}")]
    MissingId { driver: String, element: String },

    /// Another element is already bound under the same id.
    #[error("id `{id}` is already bound to another control")]
    DuplicateId { id: String },

    /// The outbound channel refused a message.
    #[error("failed to send `{id}`: {reason}")]
    SendFailed { id: String, reason: String },

    /// The session was torn down.
    #[error("session has been torn down")]
    SessionClosed,
}

impl BindError {
    /// Short kind name for logs and reports.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DriverNotFound { .. } => "driver-not-found",
            Self::UnknownTargetId { .. } => "unknown-target",
            Self::DriverFault { .. } => "driver-fault",
            Self::MalformedMessage { .. } => "malformed",
            Self::MissingId { .. } => "missing-id",
            Self::DuplicateId { .. } => "duplicate-id",
            Self::SendFailed { .. } => "send-failed",
            Self::SessionClosed => "closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = BindError::DriverFault {
            driver: "slider".into(),
            op: "get_value",
            id: "volume".into(),
            reason: "panicked".into(),
        };
        assert_eq!(
            err.to_string(),
            "driver `slider` failed in get_value for `volume`: panicked"
        );
        assert_eq!(err.kind(), "driver-fault");
    }
}
