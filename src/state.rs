//! Session lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a relay session.
///
/// A session starts in [`Created`](SessionState::Created), collects its two
/// endpoints in either order, streams, and ends in exactly one terminal
/// state. Transitions happen only along the edges documented on
/// [`Session`](crate::Session); once a terminal state is reached the state
/// never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Neither endpoint attached yet.
    Created,
    /// Source attached, destination missing.
    SrcConnected,
    /// Destination attached, source missing.
    DstConnected,
    /// Both endpoints attached; bytes may be flowing.
    Streaming,
    /// Source ended and the destination drained; success.
    Finished,
    /// Deadline elapsed with neither endpoint attached.
    TimeoutNoSrcNoDst,
    /// Deadline elapsed waiting for the destination.
    TimeoutNoDst,
    /// Deadline elapsed waiting for the source.
    TimeoutNoSrc,
    /// Source stream raised an error while streaming.
    SrcError,
    /// Destination stream raised an error while streaming.
    DstError,
    /// Source closed before signalling end-of-stream.
    SrcDisconnected,
    /// Destination closed before draining.
    DstDisconnected,
    /// An out-of-band client error was registered.
    ClientError,
}

impl SessionState {
    /// Whether this state ends the session.
    pub fn is_terminal(self) -> bool {
        !matches!(
            self,
            SessionState::Created
                | SessionState::SrcConnected
                | SessionState::DstConnected
                | SessionState::Streaming
        )
    }

    /// Stable upper-snake label for logs and assertions.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Created => "CREATED",
            SessionState::SrcConnected => "SRC_CONNECTED",
            SessionState::DstConnected => "DST_CONNECTED",
            SessionState::Streaming => "STREAMING",
            SessionState::Finished => "FINISHED",
            SessionState::TimeoutNoSrcNoDst => "TIMEOUT_NO_SRC_NO_DST",
            SessionState::TimeoutNoDst => "TIMEOUT_NO_DST",
            SessionState::TimeoutNoSrc => "TIMEOUT_NO_SRC",
            SessionState::SrcError => "SRC_ERROR",
            SessionState::DstError => "DST_ERROR",
            SessionState::SrcDisconnected => "SRC_DISCONNECTED",
            SessionState::DstDisconnected => "DST_DISCONNECTED",
            SessionState::ClientError => "CLIENT_ERROR",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_classification() {
        let live = [
            SessionState::Created,
            SessionState::SrcConnected,
            SessionState::DstConnected,
            SessionState::Streaming,
        ];
        for state in live {
            assert!(!state.is_terminal(), "{state} should not be terminal");
        }

        let terminal = [
            SessionState::Finished,
            SessionState::TimeoutNoSrcNoDst,
            SessionState::TimeoutNoDst,
            SessionState::TimeoutNoSrc,
            SessionState::SrcError,
            SessionState::DstError,
            SessionState::SrcDisconnected,
            SessionState::DstDisconnected,
            SessionState::ClientError,
        ];
        for state in terminal {
            assert!(state.is_terminal(), "{state} should be terminal");
        }
    }

    #[test]
    fn test_labels() {
        assert_eq!(SessionState::Created.as_str(), "CREATED");
        assert_eq!(
            SessionState::TimeoutNoSrcNoDst.as_str(),
            "TIMEOUT_NO_SRC_NO_DST"
        );
        assert_eq!(SessionState::DstDisconnected.to_string(), "DST_DISCONNECTED");
    }
}
