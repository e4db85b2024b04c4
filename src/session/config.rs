use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a streaming session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// WebSocket endpoint of the remote audio processor
    pub server_url: String,

    /// Sample rate for capture and encoding (Hz)
    pub sample_rate: u32,

    /// Number of audio channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Duration of each transmitted chunk
    /// Default: 5 seconds
    pub chunk_duration: Duration,
}

impl SessionConfig {
    /// Target chunk size in samples (rate × duration)
    pub fn chunk_size(&self) -> usize {
        (self.sample_rate as f64 * self.chunk_duration.as_secs_f64()) as usize
    }

    /// Opaque unique token identifying one recording session
    pub fn new_session_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:5000/api/v1/streaming/ws/audio-streaming".to_string(),
            sample_rate: 16000, // 16kHz, what the remote model expects
            channels: 1,        // Mono
            chunk_duration: Duration::from_secs(5),
        }
    }
}
