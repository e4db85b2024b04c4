//! Status events consumed by the presentation layer
//!
//! The receive loop and session coordinator mutate plain data and publish
//! typed notifications here; whatever renders them (CLI, GUI) subscribes to
//! the channel instead of being called into directly.

use tokio::sync::mpsc;

use crate::session::SessionState;

/// One status notification from the streaming client
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The session state machine moved to a new state
    StateChanged(SessionState),
    /// The remote end acknowledged the session
    SessionStarted { session_id: String },
    /// An encoded chunk left for the remote processor
    ChunkSent {
        sequence: u64,
        bytes: usize,
        is_final: bool,
    },
    /// A processed chunk arrived and was logged/queued
    ChunkProcessed { index: usize, bytes: usize },
    /// The remote end reported an error
    ServerError { message: String },
    /// Pong received in response to a ping
    Pong,
    /// Live playback started or stopped
    LivePlayback { active: bool },
    /// The connection went away
    Disconnected { reason: String },
    /// Free-form progress line
    Log { message: String },
}

pub type EventSender = mpsc::UnboundedSender<ClientEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ClientEvent>;

/// Create the event channel shared by a client and its subscriber.
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
