//! Session core for a streaming relay.
//!
//! This crate mediates between a producing byte source and a consuming byte
//! destination that arrive asynchronously from separate network peers. A
//! [`Session`] pairs the two, pipes bytes with backpressure, counts them,
//! and guarantees exactly one terminal outcome; a [`SessionManager`] mints
//! sessions, indexes them by unguessable identifier, and reaps them after a
//! TTL once they finish.
//!
//! ## Features
//!
//! - **Out-of-order registration**: source and destination attach in either
//!   order; streaming starts when both are present
//! - **Deadline**: sessions that never reach streaming time out with a
//!   verdict naming the missing endpoints
//! - **Failure classification**: stream errors, premature disconnects, and
//!   client-reported errors each end the session with a distinct state
//! - **Synchronous events**: `on`/`once` handlers run to completion before
//!   the session releases its resources
//!
//! ## Example
//!
//! ```rust,no_run
//! use relay_session::{
//!     sink_channel, source_channel, EventKind, ManagerConfig, SessionEvent, SessionManager,
//! };
//!
//! # async fn example() {
//! let manager = SessionManager::new(ManagerConfig::default());
//!
//! // First peer arrives: mint a session and hand its id back.
//! let session = manager.create_session();
//! println!("claim ticket: {}", session.id());
//!
//! session.on(EventKind::Finished, |event| {
//!     if let SessionEvent::Finished(snapshot) = event {
//!         println!("relayed {} bytes", snapshot.bytes_transferred);
//!     }
//! });
//!
//! // Bridge the peers' bodies onto the session.
//! let (producer, source) = source_channel(64);
//! let (mut consumer, sink) = sink_channel(64);
//! session.register_source(source).unwrap();
//! session.register_destination(sink).unwrap();
//!
//! producer.data("hello").await;
//! producer.end().await;
//! let body = consumer.read_to_end().await;
//! assert_eq!(body, b"hello");
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod events;
pub mod manager;
mod pipe;
pub mod session;
pub mod state;
pub mod stream;

// Re-export main types
pub use error::{ClientError, Endpoint, SessionError, TransferError};
pub use events::{EventKind, SessionEvent, SessionSnapshot};
pub use manager::{ManagerConfig, SessionManager};
pub use session::{Session, SessionId};
pub use state::SessionState;
pub use stream::{
    sink_channel, source_channel, ByteSink, ByteSource, ChannelSink, ChannelSource, SinkFault,
    SinkHandle, SourceHandle, SourceSignal,
};
