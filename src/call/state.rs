use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::{
    models::{CallLogEntry, CallType, Contact},
    screening::Decision,
};

/// Opaque identifier the telecom layer uses for one call instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallHandle(String);

impl CallHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallHandle {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CallDirection {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CallPhase {
    Idle,
    IncomingScreening,
    IncomingRinging,
    OutgoingDialing,
    Active,
    Held,
    Disconnecting,
    Ended,
}

impl Default for CallPhase {
    fn default() -> Self {
        CallPhase::Idle
    }
}

impl CallPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallPhase::Idle => "idle",
            CallPhase::IncomingScreening => "screening",
            CallPhase::IncomingRinging => "ringing",
            CallPhase::OutgoingDialing => "dialing",
            CallPhase::Active => "active",
            CallPhase::Held => "on hold",
            CallPhase::Disconnecting => "disconnecting",
            CallPhase::Ended => "ended",
        }
    }

    /// A live phase blocks any new session from starting.
    pub fn is_live(&self) -> bool {
        !matches!(self, CallPhase::Idle | CallPhase::Ended)
    }
}

impl fmt::Display for CallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EndCause {
    /// Rang out or the caller gave up before anyone answered.
    Missed,
    /// Turned away by screening, or gone before screening finished.
    ScreenedOut,
    RejectedByUser,
    /// Connected and then hung up by either side.
    Completed,
    /// Outgoing call that never connected.
    Failed,
}

/// The single in-flight call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSession {
    pub session_id: String,
    pub handle: CallHandle,
    pub direction: CallDirection,
    pub remote_number: String,
    /// Resolved once during screening and kept for the session.
    pub contact: Option<Contact>,
    pub phase: CallPhase,
    pub decision: Option<Decision>,
    /// Rang although the caller is not a known contact.
    pub screened: bool,
    pub started_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub end_cause: Option<EndCause>,
    pub muted: bool,
    pub speaker_on: bool,
    #[serde(skip)]
    connected_anchor: Option<Instant>,
    #[serde(skip)]
    ended_anchor: Option<Instant>,
}

impl CallSession {
    pub fn incoming(handle: CallHandle, remote_number: String) -> Self {
        Self::begin(handle, CallDirection::Incoming, remote_number, CallPhase::IncomingScreening)
    }

    pub fn outgoing(handle: CallHandle, remote_number: String) -> Self {
        Self::begin(handle, CallDirection::Outgoing, remote_number, CallPhase::OutgoingDialing)
    }

    fn begin(
        handle: CallHandle,
        direction: CallDirection,
        remote_number: String,
        phase: CallPhase,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            handle,
            direction,
            remote_number,
            contact: None,
            phase,
            decision: None,
            screened: false,
            started_at: Utc::now(),
            connected_at: None,
            ended_at: None,
            end_cause: None,
            muted: false,
            speaker_on: false,
            connected_anchor: None,
            ended_anchor: None,
        }
    }

    pub fn was_connected(&self) -> bool {
        self.connected_anchor.is_some()
    }

    /// Name to speak or display: the contact's, or the raw number.
    pub fn display_name(&self) -> &str {
        self.contact
            .as_ref()
            .map(|c| c.name.as_str())
            .unwrap_or(&self.remote_number)
    }

    pub fn mark_connected(&mut self) {
        self.phase = CallPhase::Active;
        if self.connected_anchor.is_none() {
            self.connected_at = Some(Utc::now());
            self.connected_anchor = Some(Instant::now());
        }
    }

    pub fn mark_ended(&mut self, cause: EndCause) {
        self.phase = CallPhase::Ended;
        self.end_cause = Some(cause);
        self.ended_at = Some(Utc::now());
        self.ended_anchor = Some(Instant::now());
    }

    /// Talk time; zero if the call never connected.
    pub fn duration(&self) -> Duration {
        match (self.connected_anchor, self.ended_anchor) {
            (Some(connected), Some(ended)) => ended.saturating_duration_since(connected),
            _ => Duration::ZERO,
        }
    }

    pub fn call_type(&self) -> CallType {
        match self.direction {
            CallDirection::Outgoing => CallType::Outgoing,
            CallDirection::Incoming if self.was_connected() => CallType::Incoming,
            CallDirection::Incoming => match self.end_cause {
                Some(EndCause::ScreenedOut) | Some(EndCause::RejectedByUser) => CallType::Rejected,
                _ => CallType::Missed,
            },
        }
    }

    pub fn to_log_entry(&self) -> CallLogEntry {
        let call_type = self.call_type();
        CallLogEntry {
            id: None,
            phone_number: self.remote_number.clone(),
            contact_id: self.contact.as_ref().map(|c| c.id),
            contact_name: self.contact.as_ref().map(|c| c.name.clone()),
            contact_kind: self.contact.as_ref().map(|c| c.kind),
            call_type,
            timestamp: self.started_at,
            duration_secs: self.duration().as_secs(),
            is_read: call_type != CallType::Missed,
        }
    }
}
