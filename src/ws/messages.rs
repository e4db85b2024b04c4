use serde::{Deserialize, Serialize};

/// Client → remote messages
///
/// Every message carries an explicit `type` discriminator so the remote end
/// can be implemented independently of this client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    StartSession {
        session_id: String,
    },
    StopSession {
        session_id: String,
    },
    AudioChunk {
        session_id: String,
        /// String chunk label, "chunk_{sequence}"
        chunk_id: String,
        /// Base64-encoded WAV container bytes
        audio_data: String,
        is_final: bool,
        /// Always "wav"
        format: String,
        sample_rate: u32,
        channels: u16,
        bits_per_sample: u16,
    },
    Ping {
        /// Seconds since the Unix epoch
        timestamp: f64,
    },
}

/// Remote → client messages
///
/// `audio_processed` carries no chunk identifier, so processed chunks can
/// only be consumed in arrival order; the server is expected to answer in
/// send order.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    ConnectionEstablished,
    SessionStarted {
        session_id: String,
    },
    AudioProcessed {
        /// "processing", "error", or a server-defined status
        #[serde(default)]
        status: String,
        #[serde(default)]
        message: String,
        /// Base64-encoded WAV container bytes, present once processing is done
        #[serde(default)]
        processed_audio_data: Option<String>,
    },
    Error {
        #[serde(default)]
        message: String,
    },
    Pong,
    /// Any unrecognized message type; surfaced as a log line, never fatal
    #[serde(other)]
    Unknown,
}
