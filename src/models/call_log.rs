//! Call log data models.
//!
//! `CallLogEntry` is what the call machine writes once per finished call;
//! `MissedCallRecord` is the slice of it the reminder loop cares about.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::contact::ContactKind;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CallType {
    Incoming,
    Outgoing,
    Missed,
    Rejected,
}

impl CallType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallType::Incoming => "Incoming",
            CallType::Outgoing => "Outgoing",
            CallType::Missed => "Missed",
            CallType::Rejected => "Rejected",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "Incoming" => Ok(CallType::Incoming),
            "Outgoing" => Ok(CallType::Outgoing),
            "Missed" => Ok(CallType::Missed),
            "Rejected" => Ok(CallType::Rejected),
            other => Err(anyhow!("unknown call type {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallLogEntry {
    pub id: Option<i64>,
    pub phone_number: String,
    pub contact_id: Option<i64>,
    pub contact_name: Option<String>,
    pub contact_kind: Option<ContactKind>,
    pub call_type: CallType,
    pub timestamp: DateTime<Utc>,
    pub duration_secs: u64,
    pub is_read: bool,
}

impl CallLogEntry {
    /// Unread missed calls are the only entries that can start a reminder cycle.
    pub fn is_nag_eligible(&self) -> bool {
        self.call_type == CallType::Missed && !self.is_read
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MissedCallRecord {
    pub id: i64,
    pub phone_number: String,
    pub contact_name: Option<String>,
    pub contact_kind: Option<ContactKind>,
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
}

impl MissedCallRecord {
    pub fn display_name(&self) -> &str {
        self.contact_name.as_deref().unwrap_or("someone")
    }
}
