use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::CallPhase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ControlAction {
    Answer,
    Reject,
    HangUp,
    Hold,
    Resume,
    ToggleMute,
    ToggleSpeaker,
    PlaceCall,
}

impl ControlAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlAction::Answer => "answer",
            ControlAction::Reject => "reject",
            ControlAction::HangUp => "hang up",
            ControlAction::Hold => "hold",
            ControlAction::Resume => "resume",
            ControlAction::ToggleMute => "mute",
            ControlAction::ToggleSpeaker => "speaker",
            ControlAction::PlaceCall => "place call",
        }
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a user action did nothing. None of these change the call state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("cannot {action} while the call is {phase}")]
    InvalidState {
        action: ControlAction,
        phase: CallPhase,
    },
    #[error("telephony refused to {action}: {message}")]
    Platform {
        action: ControlAction,
        message: String,
    },
    #[error("{0} is answer-only and cannot be called")]
    NotCallable(String),
    #[error("call manager is not running")]
    Unavailable,
}

impl ControlError {
    pub(crate) fn platform(action: ControlAction) -> impl FnOnce(anyhow::Error) -> Self {
        move |err| ControlError::Platform {
            action,
            message: format!("{err:#}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_read_naturally() {
        let err = ControlError::InvalidState {
            action: ControlAction::Hold,
            phase: CallPhase::IncomingRinging,
        };
        assert_eq!(err.to_string(), "cannot hold while the call is ringing");
    }
}
