//! The session registry: identifier minting, lookup, and TTL-delayed reaping.

use crate::session::{Session, SessionId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::sleep;
use tracing::{debug, info};

/// Configuration for a [`SessionManager`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Deadline for a session to reach streaming, and the delay between a
    /// session becoming inactive and its removal from the index.
    pub session_ttl: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_millis(30_000),
        }
    }
}

/// Creates sessions, indexes them by identifier, and reaps them after they
/// finish.
///
/// An inactive session disappears from [`get_session`](Self::get_session)
/// the instant it becomes inactive; the TTL only delays dropping the
/// underlying record. Cloning the manager is cheap and clones share one
/// index.
///
/// Must be constructed inside a Tokio runtime: sessions arm their deadline
/// timers and reap tasks on the runtime captured here.
#[derive(Clone)]
pub struct SessionManager {
    config: ManagerConfig,
    sessions: Arc<DashMap<SessionId, Arc<Session>>>,
    runtime: Handle,
}

impl SessionManager {
    /// Create a manager with the given configuration.
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            config,
            sessions: Arc::new(DashMap::new()),
            runtime: Handle::current(),
        }
    }

    /// The configuration this manager was built with.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Mint a session with a fresh identifier and index it.
    ///
    /// The returned handle is what the creating request holds on to; the
    /// identifier travels to the remote peer, which claims the other half
    /// through [`get_session`](Self::get_session).
    pub fn create_session(&self) -> Arc<Session> {
        let id = SessionId::generate();
        let ttl = self.config.session_ttl;
        let sessions = Arc::clone(&self.sessions);
        let runtime = self.runtime.clone();
        let reap = Box::new(move |id: SessionId| {
            runtime.spawn(async move {
                sleep(ttl).await;
                if sessions.remove(&id).is_some() {
                    debug!(session = %id, "session reaped from index");
                }
            });
        });

        let session = Session::start(id, ttl, self.runtime.clone(), reap);
        self.sessions.insert(id, Arc::clone(&session));
        info!(session = %id, "session created");
        session
    }

    /// Look up a live session. Returns `None` for unknown identifiers and
    /// for sessions that have become inactive, even when their record has
    /// not been reaped yet.
    pub fn get_session(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.get(id).and_then(|entry| {
            let session = entry.value();
            session.is_active().then(|| Arc::clone(session))
        })
    }

    /// Number of live (active) sessions.
    pub fn session_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| entry.value().is_active())
            .count()
    }

    /// Deactivate every live session. Emits no events; each session is
    /// reaped after the TTL as usual.
    pub fn shutdown(&self) {
        info!("shutting down all sessions");
        for entry in self.sessions.iter() {
            entry.value().deactivate();
        }
    }
}
