use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Lifecycle state of the streaming session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Recording,
    Stopping,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Recording => "recording",
            SessionState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Gates which operations are legal given the current session state.
///
/// Every illegal trigger is rejected with an error and leaves the state
/// untouched; the connection-lost trigger is the only one accepted from any
/// state.
#[derive(Debug)]
pub struct StateMachine {
    state: SessionState,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Idle → Connecting
    pub fn begin_connect(&mut self) -> Result<()> {
        match self.state {
            SessionState::Idle => {
                self.state = SessionState::Connecting;
                Ok(())
            }
            s => bail!("Cannot connect while {}", s),
        }
    }

    /// Connecting → Connected
    pub fn connection_established(&mut self) -> Result<()> {
        match self.state {
            SessionState::Connecting => {
                self.state = SessionState::Connected;
                Ok(())
            }
            s => bail!("Unexpected connection success while {}", s),
        }
    }

    /// Any state → Idle (connection failure, remote close, or disconnect)
    pub fn connection_lost(&mut self) {
        self.state = SessionState::Idle;
    }

    /// Connected → Recording
    pub fn begin_recording(&mut self) -> Result<()> {
        match self.state {
            SessionState::Connected => {
                self.state = SessionState::Recording;
                Ok(())
            }
            s => bail!("Cannot start recording while {}", s),
        }
    }

    /// Recording → Stopping
    pub fn begin_stopping(&mut self) -> Result<()> {
        match self.state {
            SessionState::Recording => {
                self.state = SessionState::Stopping;
                Ok(())
            }
            s => bail!("Cannot stop recording while {}", s),
        }
    }

    /// Stopping → Connected (recording can then restart)
    pub fn recording_stopped(&mut self) -> Result<()> {
        match self.state {
            SessionState::Stopping => {
                self.state = SessionState::Connected;
                Ok(())
            }
            s => bail!("Unexpected stop completion while {}", s),
        }
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
