//! Capabilities the call core consumes but does not implement itself.
//!
//! Each one is injected as an `Arc<dyn …>` by the composition root so tests can
//! substitute fakes. Failures come back as `anyhow` errors; callers log them and
//! carry on rather than failing the call or the reminder cycle.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::watch;

use crate::{
    audio::Cue,
    call::CallHandle,
    models::{CallLogEntry, Contact, MissedCallRecord},
};

#[async_trait]
pub trait ContactDirectory: Send + Sync {
    /// `Ok(None)` means the number is not on the allow-list.
    async fn lookup(&self, number: &str) -> Result<Option<Contact>>;
}

#[async_trait]
pub trait CallLog: Send + Sync {
    async fn append(&self, entry: CallLogEntry) -> Result<i64>;

    /// Unread missed calls, newest first.
    async fn unread_missed(&self) -> Result<Vec<MissedCallRecord>>;

    /// Returns whether the entry existed and was unread.
    async fn mark_read(&self, id: i64) -> Result<bool>;

    async fn mark_all_missed_read(&self) -> Result<usize>;

    /// Count of unread missed calls, updated after every write.
    fn watch_unread_count(&self) -> watch::Receiver<usize>;
}

#[async_trait]
pub trait VoiceAnnouncer: Send + Sync {
    /// Resolves once the utterance has finished or was stopped.
    async fn speak(&self, text: &str) -> Result<()>;

    /// Cuts off whatever is being spoken.
    fn stop(&self);
}

#[async_trait]
pub trait SignalPlayer: Send + Sync {
    /// Starts `cue`, looping it if the cue loops, replacing anything playing.
    fn start(&self, cue: Cue) -> Result<()>;

    /// Plays `cue` once and resolves when it has finished.
    async fn play_once(&self, cue: Cue) -> Result<()>;

    fn stop(&self);
}

/// Outbound primitives of the platform telecom layer, keyed by call handle.
pub trait Telecom: Send + Sync {
    fn answer(&self, handle: &CallHandle) -> Result<()>;

    /// `silent` suppresses the platform's own missed-call notification.
    fn reject(&self, handle: &CallHandle, silent: bool) -> Result<()>;

    fn disconnect(&self, handle: &CallHandle) -> Result<()>;

    fn hold(&self, handle: &CallHandle) -> Result<()>;

    fn unhold(&self, handle: &CallHandle) -> Result<()>;

    fn set_muted(&self, handle: &CallHandle, muted: bool) -> Result<()>;

    fn set_speaker(&self, handle: &CallHandle, on: bool) -> Result<()>;

    fn place_call(&self, number: &str) -> Result<()>;
}
