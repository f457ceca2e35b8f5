//! Spoken phrases. Short sentences, people named, no choices offered.

use crate::models::MissedCallRecord;

pub fn caller_announcement(caller_name: &str) -> String {
    format!("{caller_name} is calling.")
}

pub fn call_connected(contact_name: &str) -> String {
    format!("{contact_name} answered.")
}

pub fn call_ended() -> String {
    "Call ended.".to_string()
}

pub fn mute_changed(muted: bool) -> String {
    if muted { "Muted." } else { "Unmuted." }.to_string()
}

pub fn speaker_changed(on: bool) -> String {
    if on { "Speaker on." } else { "Speaker off." }.to_string()
}

/// Reminder for unread missed calls, newest first. `None` when there is
/// nothing to remind about.
pub fn missed_call_reminder(user_name: &str, unread: &[MissedCallRecord]) -> Option<String> {
    let latest = unread.first()?;
    let caller = latest.display_name();

    let text = if unread.len() == 1 {
        format!("{user_name}, you missed a call. Please call {caller} now.")
    } else {
        format!(
            "{user_name}, you have {} missed calls. The last one was from {caller}. Please call them back.",
            unread.len()
        )
    };
    Some(text)
}
