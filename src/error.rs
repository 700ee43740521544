//! Error types for the relay session core.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The two endpoint roles of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// The producing side.
    Source,
    /// The consuming side.
    Destination,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Endpoint::Source => "Source",
            Endpoint::Destination => "Destination",
        })
    }
}

/// Synchronous failure of a registration call.
///
/// Registration errors never change session state and never emit events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The slot for this endpoint is already occupied.
    #[error("{0} already registered")]
    DuplicateEndpoint(Endpoint),

    /// The session reached a terminal state or was deactivated.
    #[error("session is closed")]
    SessionClosed,
}

/// Terminal streaming failure, delivered through the `error` event.
///
/// The rendered messages are part of the observable contract and must not
/// change.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// The source stream raised an error while streaming.
    #[error("Source error: {0}")]
    Source(String),

    /// The destination stream raised an error.
    #[error("Destination error: {0}")]
    Destination(String),

    /// The source closed before signalling end-of-stream.
    #[error("Source disconnected before end")]
    SourceDisconnected,

    /// The destination closed before draining.
    #[error("Destination disconnected before end")]
    DestinationDisconnected,
}

/// Out-of-band error reported by a client, recorded verbatim on the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientError {
    /// HTTP status the front-end should answer with.
    pub http_status: u16,
    /// Machine-readable error name.
    pub name: String,
    /// Human-readable message.
    pub message: String,
}

impl ClientError {
    /// Build a client error record.
    pub fn new(http_status: u16, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            http_status,
            name: name.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_endpoint_messages() {
        assert_eq!(
            SessionError::DuplicateEndpoint(Endpoint::Source).to_string(),
            "Source already registered"
        );
        assert_eq!(
            SessionError::DuplicateEndpoint(Endpoint::Destination).to_string(),
            "Destination already registered"
        );
    }

    #[test]
    fn test_transfer_error_messages() {
        assert_eq!(
            TransferError::Source("blahdeblah".into()).to_string(),
            "Source error: blahdeblah"
        );
        assert_eq!(
            TransferError::Destination("broken pipe".into()).to_string(),
            "Destination error: broken pipe"
        );
        assert_eq!(
            TransferError::SourceDisconnected.to_string(),
            "Source disconnected before end"
        );
        assert_eq!(
            TransferError::DestinationDisconnected.to_string(),
            "Destination disconnected before end"
        );
    }

    #[test]
    fn test_client_error_fields() {
        let err = ClientError::new(400, "GenericError", "generic error happened");
        assert_eq!(err.http_status, 400);
        assert_eq!(err.name, "GenericError");
        assert_eq!(err.message, "generic error happened");
    }
}
