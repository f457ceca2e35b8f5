//! Contacts as configured by the carer.
//!
//! The phone only ever deals with a handful of people. A contact's kind decides
//! whether the user may call them and whether missing their call is worth a
//! reminder.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ContactKind {
    /// Primary caregivers: callable, answered, missed calls nag.
    Carer,
    /// Friends and family: answered only, never nag.
    GreyList,
}

impl ContactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactKind::Carer => "Carer",
            ContactKind::GreyList => "GreyList",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "Carer" => Ok(ContactKind::Carer),
            "GreyList" => Ok(ContactKind::GreyList),
            other => Err(anyhow!("unknown contact kind {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: i64,
    pub name: String,
    pub phone_number: String,
    pub kind: ContactKind,
    /// Per-contact auto-answer; only honoured while the global switch is on.
    pub auto_answer: bool,
    pub priority: i32,
}

impl Contact {
    /// Grey-list contacts may ring the phone but cannot be dialled from it.
    pub fn can_call_out(&self) -> bool {
        self.kind == ContactKind::Carer
    }
}
