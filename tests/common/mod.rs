#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, watch};

use carephone_lib::{
    audio::Cue,
    call::{CallEvent, CallHandle, CallPhase, CallSession, DisconnectReason, PlatformCallState, PlatformEvent},
    models::{CallLogEntry, CallType, Contact, ContactKind, MissedCallRecord},
    ports::{CallLog, ContactDirectory, SignalPlayer, Telecom, VoiceAnnouncer},
    settings::{CarerSettings, SettingsStore},
    utils::phone_number,
    Phone, PhoneDeps,
};

pub const TOM: &str = "07700900123";
pub const SARAH: &str = "07700900456";
pub const ANN: &str = "07700900789";
pub const STRANGER: &str = "01632960001";

pub fn contacts() -> Vec<Contact> {
    vec![
        Contact {
            id: 1,
            name: "Tom".into(),
            phone_number: TOM.into(),
            kind: ContactKind::Carer,
            auto_answer: true,
            priority: 10,
        },
        Contact {
            id: 2,
            name: "Sarah".into(),
            phone_number: SARAH.into(),
            kind: ContactKind::Carer,
            auto_answer: false,
            priority: 5,
        },
        Contact {
            id: 3,
            name: "Ann".into(),
            phone_number: ANN.into(),
            kind: ContactKind::GreyList,
            auto_answer: false,
            priority: 0,
        },
    ]
}

/// Defaults with reminders off, for tests that only look at calls.
pub fn quiet_settings() -> CarerSettings {
    CarerSettings {
        missed_call_nag_enabled: false,
        ..CarerSettings::default()
    }
}

#[derive(Default)]
pub struct FakeTelecom {
    ops: Mutex<Vec<String>>,
    pub fail: AtomicBool,
}

impl FakeTelecom {
    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    fn record(&self, op: String) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("telephony unavailable"));
        }
        self.ops.lock().unwrap().push(op);
        Ok(())
    }
}

impl Telecom for FakeTelecom {
    fn answer(&self, handle: &CallHandle) -> Result<()> {
        self.record(format!("answer {handle}"))
    }

    fn reject(&self, handle: &CallHandle, silent: bool) -> Result<()> {
        if silent {
            self.record(format!("reject {handle} silent"))
        } else {
            self.record(format!("reject {handle}"))
        }
    }

    fn disconnect(&self, handle: &CallHandle) -> Result<()> {
        self.record(format!("disconnect {handle}"))
    }

    fn hold(&self, handle: &CallHandle) -> Result<()> {
        self.record(format!("hold {handle}"))
    }

    fn unhold(&self, handle: &CallHandle) -> Result<()> {
        self.record(format!("unhold {handle}"))
    }

    fn set_muted(&self, handle: &CallHandle, muted: bool) -> Result<()> {
        self.record(format!("mute {handle} {muted}"))
    }

    fn set_speaker(&self, handle: &CallHandle, on: bool) -> Result<()> {
        self.record(format!("speaker {handle} {on}"))
    }

    fn place_call(&self, number: &str) -> Result<()> {
        self.record(format!("dial {number}"))
    }
}

pub struct FakeDirectory {
    contacts: Vec<Contact>,
}

impl FakeDirectory {
    pub fn new(contacts: Vec<Contact>) -> Self {
        Self { contacts }
    }
}

#[async_trait]
impl ContactDirectory for FakeDirectory {
    async fn lookup(&self, number: &str) -> Result<Option<Contact>> {
        Ok(self
            .contacts
            .iter()
            .find(|contact| phone_number::is_match(&contact.phone_number, number))
            .cloned())
    }
}

pub struct MemoryCallLog {
    entries: Mutex<Vec<CallLogEntry>>,
    unread: watch::Sender<usize>,
    pub fail_mark_all: AtomicBool,
}

impl MemoryCallLog {
    pub fn new() -> Self {
        let (unread, _) = watch::channel(0);
        Self {
            entries: Mutex::new(Vec::new()),
            unread,
            fail_mark_all: AtomicBool::new(false),
        }
    }

    /// Starts with one unread missed call per number, oldest first.
    pub fn with_missed(numbers: &[&str]) -> Self {
        let log = Self::new();
        {
            let mut entries = log.entries.lock().unwrap();
            for (index, number) in numbers.iter().enumerate() {
                let contact = contacts()
                    .into_iter()
                    .find(|contact| phone_number::is_match(&contact.phone_number, number));
                entries.push(CallLogEntry {
                    id: Some(index as i64 + 1),
                    phone_number: number.to_string(),
                    contact_id: contact.as_ref().map(|c| c.id),
                    contact_name: contact.as_ref().map(|c| c.name.clone()),
                    contact_kind: contact.as_ref().map(|c| c.kind),
                    call_type: CallType::Missed,
                    timestamp: Utc::now(),
                    duration_secs: 0,
                    is_read: false,
                });
            }
        }
        log.publish();
        log
    }

    pub fn entries(&self) -> Vec<CallLogEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn unread_count(&self) -> usize {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.is_nag_eligible())
            .count()
    }

    fn publish(&self) {
        let count = self.unread_count();
        self.unread.send_replace(count);
    }
}

#[async_trait]
impl CallLog for MemoryCallLog {
    async fn append(&self, mut entry: CallLogEntry) -> Result<i64> {
        let id = {
            let mut entries = self.entries.lock().unwrap();
            let id = entries.len() as i64 + 1;
            entry.id = Some(id);
            entries.push(entry);
            id
        };
        self.publish();
        Ok(id)
    }

    async fn unread_missed(&self) -> Result<Vec<MissedCallRecord>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|entry| entry.is_nag_eligible())
            .map(|entry| MissedCallRecord {
                id: entry.id.unwrap_or_default(),
                phone_number: entry.phone_number.clone(),
                contact_name: entry.contact_name.clone(),
                contact_kind: entry.contact_kind,
                timestamp: entry.timestamp,
                is_read: entry.is_read,
            })
            .collect())
    }

    async fn mark_read(&self, id: i64) -> Result<bool> {
        let changed = {
            let mut entries = self.entries.lock().unwrap();
            match entries.iter_mut().find(|entry| entry.id == Some(id)) {
                Some(entry) if !entry.is_read => {
                    entry.is_read = true;
                    true
                }
                _ => false,
            }
        };
        self.publish();
        Ok(changed)
    }

    async fn mark_all_missed_read(&self) -> Result<usize> {
        if self.fail_mark_all.load(Ordering::SeqCst) {
            return Err(anyhow!("disk full"));
        }
        let count = {
            let mut entries = self.entries.lock().unwrap();
            let mut count = 0;
            for entry in entries.iter_mut().filter(|entry| entry.is_nag_eligible()) {
                entry.is_read = true;
                count += 1;
            }
            count
        };
        self.publish();
        Ok(count)
    }

    fn watch_unread_count(&self) -> watch::Receiver<usize> {
        self.unread.subscribe()
    }
}

struct Speaking<'a>(&'a AtomicUsize);

impl Drop for Speaking<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Records every utterance. Each one takes `delay` of (virtual) time.
#[derive(Default)]
pub struct FakeVoice {
    spoken: Mutex<Vec<String>>,
    delay: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
    stops: AtomicUsize,
}

impl FakeVoice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn reminders(&self) -> Vec<String> {
        self.spoken()
            .into_iter()
            .filter(|text| text.contains("missed"))
            .collect()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceAnnouncer for FakeVoice {
    async fn speak(&self, text: &str) -> Result<()> {
        self.spoken.lock().unwrap().push(text.to_string());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let _speaking = Speaking(&self.active);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeSignal {
    played: Mutex<Vec<String>>,
}

impl FakeSignal {
    pub fn played(&self) -> Vec<String> {
        self.played.lock().unwrap().clone()
    }
}

#[async_trait]
impl SignalPlayer for FakeSignal {
    fn start(&self, cue: Cue) -> Result<()> {
        self.played.lock().unwrap().push(format!("start {cue:?}"));
        Ok(())
    }

    async fn play_once(&self, cue: Cue) -> Result<()> {
        self.played.lock().unwrap().push(format!("once {cue:?}"));
        Ok(())
    }

    fn stop(&self) {
        self.played.lock().unwrap().push("stop".into());
    }
}

pub struct Harness {
    pub phone: Phone,
    pub telecom: Arc<FakeTelecom>,
    pub log: Arc<MemoryCallLog>,
    pub voice: Arc<FakeVoice>,
    pub signal: Arc<FakeSignal>,
    pub events: broadcast::Receiver<CallEvent>,
}

/// Starts a phone on the current runtime with the standard contacts.
pub fn start(settings: CarerSettings, log: MemoryCallLog, voice: FakeVoice) -> Harness {
    let telecom = Arc::new(FakeTelecom::default());
    let log = Arc::new(log);
    let voice = Arc::new(voice);
    let signal = Arc::new(FakeSignal::default());

    let phone = Phone::start(PhoneDeps {
        telecom: telecom.clone(),
        directory: Arc::new(FakeDirectory::new(contacts())),
        call_log: log.clone(),
        voice: voice.clone(),
        signal: signal.clone(),
        settings: Arc::new(SettingsStore::in_memory(settings)),
    });
    let events = phone.calls().subscribe();

    Harness {
        phone,
        telecom,
        log,
        voice,
        signal,
        events,
    }
}

pub fn incoming(handle: &str, number: &str) -> PlatformEvent {
    PlatformEvent::NewIncoming {
        handle: handle.into(),
        number: number.into(),
    }
}

pub fn outgoing(handle: &str, number: &str) -> PlatformEvent {
    PlatformEvent::NewOutgoing {
        handle: handle.into(),
        number: number.into(),
    }
}

pub fn state(handle: &str, state: PlatformCallState) -> PlatformEvent {
    PlatformEvent::StateChanged {
        handle: handle.into(),
        state,
    }
}

pub fn disconnected(handle: &str, reason: DisconnectReason) -> PlatformEvent {
    PlatformEvent::Disconnected {
        handle: handle.into(),
        reason,
    }
}

/// Lets every task that is ready run before the test carries on.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

async fn next_event(events: &mut broadcast::Receiver<CallEvent>) -> CallEvent {
    tokio::time::timeout(Duration::from_secs(3600), events.recv())
        .await
        .expect("no call event within an hour")
        .expect("call events closed")
}

pub async fn wait_for_phase(
    events: &mut broadcast::Receiver<CallEvent>,
    wanted: CallPhase,
) -> CallSession {
    loop {
        if let CallEvent::StateChanged {
            phase,
            session: Some(session),
        } = next_event(events).await
        {
            if phase == wanted {
                return session;
            }
        }
    }
}

pub async fn wait_for_end(events: &mut broadcast::Receiver<CallEvent>) -> (CallSession, CallLogEntry) {
    loop {
        if let CallEvent::SessionEnded { session, entry } = next_event(events).await {
            return (session, entry);
        }
    }
}
