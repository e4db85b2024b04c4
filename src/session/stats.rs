use serde::{Deserialize, Serialize};

use super::state::SessionState;

/// Snapshot of a streaming client's progress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Current state machine state
    pub state: SessionState,

    /// Active session identifier, if a recording has started
    pub session_id: Option<String>,

    /// Chunks successfully handed to the transport
    pub chunks_sent: usize,

    /// Processed chunks received back and logged
    pub chunks_processed: usize,

    /// Chunks waiting in the live playback queue
    pub live_queue_len: usize,

    /// Whether the live playback loop is running
    pub live_playing: bool,
}
