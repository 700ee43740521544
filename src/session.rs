//! The session state machine: one source↔destination pairing from creation
//! to a single terminal outcome.
//!
//! All transitions for a session are serialized behind its internal lock;
//! concurrent signals (a deadline firing against a registration call, pipe
//! completion against `deactivate`) resolve by whoever takes the lock first,
//! and everything arriving after the terminal transition is dropped.

use crate::error::{ClientError, Endpoint, SessionError, TransferError};
use crate::events::{EventHandler, EventKind, SessionEvent, SessionSnapshot, Subscribers};
use crate::pipe::{self, PipeOutcome};
use crate::state::SessionState;
use crate::stream::{ByteSink, ByteSource};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Opaque, collision-resistant session identifier.
///
/// Backed by a v4 UUID (122 bits of entropy), so it is safe to hand to an
/// untrusted peer as the claim ticket for the other half of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// Hook invoked exactly once when the session becomes inactive.
pub(crate) type InactiveHook = Box<dyn FnOnce(SessionId) + Send>;

/// Mutable core of a session; every transition holds this lock.
struct Inner {
    state: SessionState,
    active: bool,
    source: Option<Box<dyn ByteSource>>,
    destination: Option<Box<dyn ByteSink>>,
    client_error: Option<ClientError>,
    subscribers: Subscribers,
    timer: Option<JoinHandle<()>>,
    pipe: Option<JoinHandle<()>>,
    on_inactive: Option<InactiveHook>,
}

/// One paired transfer between a source and a destination.
///
/// Created through [`crate::SessionManager::create_session`]; the caller
/// registers the two
/// endpoints as they arrive from the network, in either order, and observes
/// the outcome through [`Session::on`] subscriptions. Exactly one terminal
/// event fires per session.
pub struct Session {
    id: SessionId,
    created_at: Instant,
    deadline: Instant,
    transferred: Arc<AtomicU64>,
    runtime: Handle,
    // Self-reference handed to the pipe task; never upgraded before
    // construction completes.
    weak_self: Weak<Session>,
    inner: Mutex<Inner>,
}

impl Session {
    /// Construct a session and arm its one-shot deadline timer.
    pub(crate) fn start(
        id: SessionId,
        ttl: Duration,
        runtime: Handle,
        on_inactive: InactiveHook,
    ) -> Arc<Self> {
        let created_at = Instant::now();
        let session = Arc::new_cyclic(|weak| Self {
            id,
            created_at,
            deadline: created_at + ttl,
            transferred: Arc::new(AtomicU64::new(0)),
            runtime: runtime.clone(),
            weak_self: weak.clone(),
            inner: Mutex::new(Inner {
                state: SessionState::Created,
                active: true,
                source: None,
                destination: None,
                client_error: None,
                subscribers: Subscribers::default(),
                timer: None,
                pipe: None,
                on_inactive: Some(on_inactive),
            }),
        });

        let weak = Arc::downgrade(&session);
        let timer = runtime.spawn(async move {
            sleep(ttl).await;
            if let Some(session) = weak.upgrade() {
                session.deadline_elapsed();
            }
        });
        session.inner.lock().timer = Some(timer);
        session
    }

    /// Session identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Bytes the destination has accepted so far. Non-decreasing.
    pub fn bytes_transferred(&self) -> u64 {
        self.transferred.load(Ordering::SeqCst)
    }

    /// The client error record, if one was registered.
    pub fn client_error(&self) -> Option<ClientError> {
        self.inner.lock().client_error.clone()
    }

    /// True until the session has released its resources.
    pub fn is_active(&self) -> bool {
        self.inner.lock().active
    }

    /// When the session was created.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// When the pre-streaming deadline elapses.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Subscribe to an event kind. The handler runs synchronously in the
    /// session's serialization domain when the event fires.
    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: FnMut(&SessionEvent) + Send + 'static,
    {
        self.subscribe(kind, Box::new(handler), false);
    }

    /// Subscribe for at most one delivery.
    pub fn once<F>(&self, kind: EventKind, handler: F)
    where
        F: FnMut(&SessionEvent) + Send + 'static,
    {
        self.subscribe(kind, Box::new(handler), true);
    }

    fn subscribe(&self, kind: EventKind, handler: EventHandler, once: bool) {
        let mut inner = self.inner.lock();
        if !inner.active || inner.state.is_terminal() {
            debug!(session = %self.id, ?kind, "subscription on closed session dropped");
            return;
        }
        inner.subscribers.add(kind, handler, once);
    }

    /// Attach the producing stream.
    ///
    /// Fails with `"Source already registered"` if the slot is occupied and
    /// with [`SessionError::SessionClosed`] on an inactive session; neither
    /// failure changes state or fires events. When the destination is
    /// already attached this starts streaming.
    pub fn register_source(&self, source: impl ByteSource) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        if !inner.active || inner.state.is_terminal() {
            return Err(SessionError::SessionClosed);
        }
        match inner.state {
            SessionState::Created => {
                inner.source = Some(Box::new(source));
                inner.state = SessionState::SrcConnected;
                debug!(session = %self.id, "source registered");
                Ok(())
            }
            SessionState::DstConnected => {
                let Some(sink) = inner.destination.take() else {
                    return Err(SessionError::SessionClosed);
                };
                debug!(session = %self.id, "source registered");
                self.begin_streaming(&mut inner, Box::new(source), sink);
                Ok(())
            }
            SessionState::SrcConnected | SessionState::Streaming => {
                Err(SessionError::DuplicateEndpoint(Endpoint::Source))
            }
            // Terminal states are rejected by the guard above.
            _ => Err(SessionError::SessionClosed),
        }
    }

    /// Attach the consuming stream. Symmetric to [`Session::register_source`];
    /// the duplicate message is `"Destination already registered"`.
    pub fn register_destination(&self, destination: impl ByteSink) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        if !inner.active || inner.state.is_terminal() {
            return Err(SessionError::SessionClosed);
        }
        match inner.state {
            SessionState::Created => {
                inner.destination = Some(Box::new(destination));
                inner.state = SessionState::DstConnected;
                debug!(session = %self.id, "destination registered");
                Ok(())
            }
            SessionState::SrcConnected => {
                let Some(source) = inner.source.take() else {
                    return Err(SessionError::SessionClosed);
                };
                debug!(session = %self.id, "destination registered");
                self.begin_streaming(&mut inner, source, Box::new(destination));
                Ok(())
            }
            SessionState::DstConnected | SessionState::Streaming => {
                Err(SessionError::DuplicateEndpoint(Endpoint::Destination))
            }
            _ => Err(SessionError::SessionClosed),
        }
    }

    /// Record an out-of-band client error and end the session.
    ///
    /// Valid in any non-terminal state; ignored otherwise. The
    /// `client_error` event is dispatched and every handler runs to
    /// completion before resources are released and this call returns.
    pub fn register_client_error(&self, error: ClientError) {
        self.finish(
            move |inner| {
                inner.client_error = Some(error);
                Some(SessionState::ClientError)
            },
            SessionEvent::ClientError,
        );
    }

    /// Forcibly release resources and disarm the timer. Idempotent, valid
    /// in any state, emits nothing; the state label is left as it was.
    pub fn deactivate(&self) {
        debug!(session = %self.id, "deactivate requested");
        self.release();
    }

    /// Both endpoints present: disarm the timer and hand the streams to the
    /// pipe task. Caller holds the lock.
    fn begin_streaming(
        &self,
        inner: &mut Inner,
        source: Box<dyn ByteSource>,
        sink: Box<dyn ByteSink>,
    ) {
        inner.state = SessionState::Streaming;
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }

        let weak = self.weak_self.clone();
        let transferred = Arc::clone(&self.transferred);
        let pipe_task = self.runtime.spawn(async move {
            let outcome = pipe::run(source, sink, transferred).await;
            if let Some(session) = weak.upgrade() {
                session.complete(outcome);
            }
        });
        inner.pipe = Some(pipe_task);
        info!(session = %self.id, "both endpoints attached; streaming");
    }

    /// Map the pipe's verdict onto the terminal transition.
    fn complete(&self, outcome: PipeOutcome) {
        match outcome {
            PipeOutcome::Finished => {
                self.finish(|_| Some(SessionState::Finished), SessionEvent::Finished)
            }
            PipeOutcome::SourceError(message) => self.finish(
                |_| Some(SessionState::SrcError),
                move |_| SessionEvent::Error(TransferError::Source(message)),
            ),
            PipeOutcome::DestinationError(message) => self.finish(
                |_| Some(SessionState::DstError),
                move |_| SessionEvent::Error(TransferError::Destination(message)),
            ),
            PipeOutcome::SourceDisconnected => self.finish(
                |_| Some(SessionState::SrcDisconnected),
                |_| SessionEvent::Error(TransferError::SourceDisconnected),
            ),
            PipeOutcome::DestinationDisconnected => self.finish(
                |_| Some(SessionState::DstDisconnected),
                |_| SessionEvent::Error(TransferError::DestinationDisconnected),
            ),
        }
    }

    /// Deadline fired before streaming; the verdict names the missing
    /// endpoints. A stale fire against a streaming or finished session is a
    /// no-op.
    fn deadline_elapsed(&self) {
        let id = self.id;
        self.finish(
            move |inner| {
                let verdict = match inner.state {
                    SessionState::Created => Some(SessionState::TimeoutNoSrcNoDst),
                    SessionState::SrcConnected => Some(SessionState::TimeoutNoDst),
                    SessionState::DstConnected => Some(SessionState::TimeoutNoSrc),
                    _ => None,
                };
                if let Some(state) = verdict {
                    warn!(session = %id, verdict = %state, "session timed out");
                }
                verdict
            },
            SessionEvent::Timeout,
        );
    }

    /// The single terminal transition protocol: decide and mutate under the
    /// lock, dispatch outside it, then release resources. The state is
    /// already terminal while handlers run, so any signal racing in is
    /// dropped by the guard.
    fn finish<D, E>(&self, decide: D, make_event: E)
    where
        D: FnOnce(&mut Inner) -> Option<SessionState>,
        E: FnOnce(SessionSnapshot) -> SessionEvent,
    {
        let (event, mut subscribers) = {
            let mut inner = self.inner.lock();
            if !inner.active || inner.state.is_terminal() {
                debug!(session = %self.id, "late terminal signal ignored");
                return;
            }
            let Some(state) = decide(&mut inner) else {
                return;
            };
            inner.state = state;
            let snapshot = SessionSnapshot {
                id: self.id,
                state,
                bytes_transferred: self.transferred.load(Ordering::SeqCst),
                client_error: inner.client_error.clone(),
            };
            (
                make_event(snapshot),
                std::mem::take(&mut inner.subscribers),
            )
        };

        info!(session = %self.id, state = %self.state(), "session reached terminal state");
        subscribers.emit(&event);
        self.release();
    }

    /// Disarm the timer, drop the streams, stop the pipe, flip `active`,
    /// and notify the manager. Runs at most once.
    fn release(&self) {
        let notify = {
            let mut inner = self.inner.lock();
            if !inner.active {
                return;
            }
            inner.active = false;
            if let Some(timer) = inner.timer.take() {
                timer.abort();
            }
            if let Some(pipe) = inner.pipe.take() {
                pipe.abort();
            }
            inner.source = None;
            inner.destination = None;
            inner.subscribers = Subscribers::default();
            inner.on_inactive.take()
        };
        if let Some(notify) = notify {
            notify(self.id);
        }
        debug!(session = %self.id, "resources released");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
        if let Some(pipe) = inner.pipe.take() {
            pipe.abort();
        }
    }
}
