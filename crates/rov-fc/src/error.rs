use std::time::Duration;

use thiserror::Error;

use crate::link::AckResult;

#[derive(Debug, Error)]
pub enum FcError {
    #[error("cannot open link {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },

    #[error("unknown mode {mode:?}; valid modes: {}", .valid.join(", "))]
    UnknownMode { mode: String, valid: Vec<String> },

    #[error("manual control {axis}={value} outside [{min}, {max}]")]
    InvalidControlValue { axis: &'static str, value: i32, min: i32, max: i32 },

    #[error("channel {channel} outside [1, {max}]")]
    InvalidChannel { channel: i32, max: usize },

    #[error("no {command} acknowledgment within {waited:?}")]
    AckTimeout { command: &'static str, waited: Duration },

    #[error("vehicle did not {action} ({reason})")]
    ArmRefused { action: &'static str, reason: String },

    #[error("no heartbeat within {waited:?}")]
    HeartbeatTimeout { waited: Duration },

    #[error("no heartbeat seen yet; refusing to send commands")]
    NoHeartbeat,

    #[error("link error: {0}")]
    Transport(String),

    #[error("cancelled")]
    Cancelled,
}

impl FcError {
    /// Process exit code for the command line tool, one per error kind.
    pub fn exit_code(&self) -> u8 {
        match self {
            FcError::Connection { .. } => 2,
            FcError::UnknownMode { .. } => 3,
            FcError::InvalidControlValue { .. } => 4,
            FcError::InvalidChannel { .. } => 5,
            FcError::AckTimeout { .. } => 6,
            FcError::ArmRefused { .. } => 7,
            FcError::HeartbeatTimeout { .. } => 9,
            FcError::NoHeartbeat => 10,
            FcError::Transport(_) => 11,
            FcError::Cancelled => 12,
        }
    }

    pub(crate) fn arm_refused(arm: bool, reason: impl Into<String>) -> Self {
        FcError::ArmRefused {
            action: if arm { "arm" } else { "disarm" },
            reason: reason.into(),
        }
    }

    pub(crate) fn arm_ack(arm: bool, result: AckResult) -> Self {
        Self::arm_refused(arm, format!("ack {}", result))
    }
}
