//! Lifecycle events and the subscription registry behind `on`/`once`.

use crate::error::{ClientError, TransferError};
use crate::session::SessionId;
use crate::state::SessionState;
use tracing::debug;

/// The observable event kinds a session can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Successful completion.
    Finished,
    /// Deadline elapsed before streaming began.
    Timeout,
    /// Streaming failure (stream error or premature disconnect).
    Error,
    /// Out-of-band client error was registered.
    ClientError,
}

/// Point-in-time view of a session, delivered as an event payload.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Session identifier.
    pub id: SessionId,
    /// State at the instant the event fired.
    pub state: SessionState,
    /// Bytes the destination had accepted.
    pub bytes_transferred: u64,
    /// Client error record, if one was registered.
    pub client_error: Option<ClientError>,
}

/// A lifecycle event. Each session emits at most one of these, ever.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The transfer completed; the destination drained everything.
    Finished(SessionSnapshot),
    /// The deadline elapsed before both endpoints arrived.
    Timeout(SessionSnapshot),
    /// Streaming failed; see the carried [`TransferError`].
    Error(TransferError),
    /// A client error was registered; the record is on the snapshot.
    ClientError(SessionSnapshot),
}

impl SessionEvent {
    /// The kind this event dispatches under.
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::Finished(_) => EventKind::Finished,
            SessionEvent::Timeout(_) => EventKind::Timeout,
            SessionEvent::Error(_) => EventKind::Error,
            SessionEvent::ClientError(_) => EventKind::ClientError,
        }
    }
}

pub(crate) type EventHandler = Box<dyn FnMut(&SessionEvent) + Send>;

struct Registration {
    handler: EventHandler,
    once: bool,
}

/// Per-kind subscriber lists for one session.
///
/// Dispatch is synchronous: `emit` runs every matching handler to completion
/// on the calling thread before returning. Handlers registered with `once`
/// are dropped after their first call.
#[derive(Default)]
pub(crate) struct Subscribers {
    finished: Vec<Registration>,
    timeout: Vec<Registration>,
    error: Vec<Registration>,
    client_error: Vec<Registration>,
}

impl Subscribers {
    fn list_mut(&mut self, kind: EventKind) -> &mut Vec<Registration> {
        match kind {
            EventKind::Finished => &mut self.finished,
            EventKind::Timeout => &mut self.timeout,
            EventKind::Error => &mut self.error,
            EventKind::ClientError => &mut self.client_error,
        }
    }

    pub(crate) fn add(&mut self, kind: EventKind, handler: EventHandler, once: bool) {
        self.list_mut(kind).push(Registration { handler, once });
    }

    /// Run all handlers subscribed to the event's kind, in registration
    /// order. `once` handlers do not survive the call.
    pub(crate) fn emit(&mut self, event: &SessionEvent) {
        let registrations = std::mem::take(self.list_mut(event.kind()));
        debug!(kind = ?event.kind(), handlers = registrations.len(), "dispatching session event");
        let mut kept = Vec::with_capacity(registrations.len());
        for mut registration in registrations {
            (registration.handler)(event);
            if !registration.once {
                kept.push(registration);
            }
        }
        *self.list_mut(event.kind()) = kept;
    }
}
