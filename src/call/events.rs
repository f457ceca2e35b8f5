use serde::{Deserialize, Serialize};

use crate::models::CallLogEntry;

use super::{CallHandle, CallPhase, CallSession};

/// What the platform telecom layer reports. Delivered in order per handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum PlatformEvent {
    NewIncoming {
        handle: CallHandle,
        number: String,
    },
    NewOutgoing {
        handle: CallHandle,
        number: String,
    },
    StateChanged {
        handle: CallHandle,
        state: PlatformCallState,
    },
    Disconnected {
        handle: CallHandle,
        #[serde(default)]
        reason: DisconnectReason,
    },
}

impl PlatformEvent {
    pub fn handle(&self) -> &CallHandle {
        match self {
            PlatformEvent::NewIncoming { handle, .. }
            | PlatformEvent::NewOutgoing { handle, .. }
            | PlatformEvent::StateChanged { handle, .. }
            | PlatformEvent::Disconnected { handle, .. } => handle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlatformCallState {
    Ringing,
    Dialing,
    Connecting,
    Active,
    Holding,
    Disconnecting,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DisconnectReason {
    Local,
    #[default]
    Remote,
    Rejected,
    Missed,
    Busy,
    Error,
}

/// Published to observers (UI, reminder loop) after every transition.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CallEvent {
    #[serde(rename_all = "camelCase")]
    StateChanged {
        phase: CallPhase,
        session: Option<CallSession>,
    },
    /// Emitted once per call after its log entry was written (or the write
    /// was given up on, in which case `entry.id` is `None`).
    #[serde(rename_all = "camelCase")]
    SessionEnded {
        session: CallSession,
        entry: CallLogEntry,
    },
}
