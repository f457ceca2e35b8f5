use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::{
    sync::{broadcast, watch, Mutex},
    task::JoinHandle,
};

use crate::{
    audio::{AudioFocus, Cue},
    call::{CallEvent, CallPhase, CallSession},
    models::{ContactKind, MissedCallRecord},
    ports::{CallLog, SignalPlayer, VoiceAnnouncer},
    scripts,
    settings::{CarerSettings, NagSound, SettingsStore},
    utils::{phone_number, retry_once},
};

use super::{NagCycle, NagStatus};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

const STORE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct NagDeps {
    pub call_log: Arc<dyn CallLog>,
    pub voice: Arc<dyn VoiceAnnouncer>,
    pub signal: Arc<dyn SignalPlayer>,
    pub focus: AudioFocus,
    pub settings: Arc<SettingsStore>,
}

#[derive(Default)]
struct NagState {
    cycle: NagCycle,
    ticker: Option<JoinHandle<()>>,
    /// Bumped on every arm and stop; a ticker whose generation is stale exits.
    generation: u64,
}

/// Reminds the user about unread missed calls until they are acknowledged.
///
/// At most one ticker task exists at a time and it is owned by the scheduler:
/// every stop and acknowledgement aborts it before doing anything else.
#[derive(Clone)]
pub struct NagScheduler {
    deps: NagDeps,
    state: Arc<Mutex<NagState>>,
    status: Arc<watch::Sender<NagStatus>>,
}

impl NagScheduler {
    pub fn new(deps: NagDeps) -> Self {
        let (status, _) = watch::channel(NagStatus::Stopped);
        Self {
            deps,
            state: Arc::new(Mutex::new(NagState::default())),
            status: Arc::new(status),
        }
    }

    pub async fn cycle(&self) -> NagCycle {
        self.state.lock().await.cycle.clone()
    }

    pub async fn status(&self) -> NagStatus {
        self.state.lock().await.cycle.status
    }

    pub fn subscribe_status(&self) -> watch::Receiver<NagStatus> {
        self.status.subscribe()
    }

    /// STOPPED -> ARMED. Does nothing if a cycle is already running or
    /// reminders are switched off. Returns whether a new cycle started.
    pub async fn arm(&self) -> bool {
        let settings = self.deps.settings.current();
        if !settings.missed_call_nag_enabled {
            log_debug!("missed-call reminders are off");
            return false;
        }

        let first = settings.missed_call_nag_interval.initial_delay();
        {
            let mut state = self.state.lock().await;
            if state.cycle.is_running() {
                return false;
            }

            state.generation += 1;
            state.cycle = NagCycle::armed(Utc::now());

            let scheduler = self.clone();
            let generation = state.generation;
            state.ticker = Some(tokio::spawn(async move {
                scheduler.run_ticker(generation, first).await;
            }));
        }

        log_info!("missed-call reminder armed, first in {first:?}");
        self.status.send_replace(NagStatus::Armed);
        true
    }

    /// Safe from any state, including mid-announcement.
    pub async fn stop(&self) {
        let was = {
            let mut state = self.state.lock().await;
            if let Some(ticker) = state.ticker.take() {
                ticker.abort();
            }
            state.generation += 1;
            std::mem::replace(&mut state.cycle.status, NagStatus::Stopped)
        };

        if self.deps.focus.nag_sounding() {
            self.deps.voice.stop();
            self.deps.signal.stop();
        }
        self.deps.focus.release_nag();

        if was != NagStatus::Stopped {
            log_info!("missed-call reminder stopped");
            self.status.send_replace(NagStatus::Stopped);
        }
    }

    pub async fn acknowledge(&self, id: i64) -> Result<bool> {
        let call_log = self.deps.call_log.as_ref();
        let changed = retry_once("mark missed call read", STORE_TIMEOUT, || async move {
            call_log.mark_read(id).await
        })
        .await?;
        if changed {
            log_info!("missed call {id} acknowledged");
        }
        self.stop_if_clear().await?;
        Ok(changed)
    }

    pub async fn acknowledge_all(&self) -> Result<usize> {
        self.stop().await;

        let call_log = self.deps.call_log.as_ref();
        let marked = retry_once("mark missed calls read", STORE_TIMEOUT, || async move {
            call_log.mark_all_missed_read().await
        })
        .await;

        match marked {
            Ok(count) => {
                log_info!("{count} missed calls acknowledged");
                Ok(count)
            }
            Err(err) => {
                // Still unread, so keep reminding.
                if !self.pending(&self.deps.settings.current()).await?.is_empty() {
                    self.arm().await;
                }
                Err(err)
            }
        }
    }

    /// Marks every unread missed call from `number` as read. Called when the
    /// user talks to, or dials, someone they missed.
    pub async fn acknowledge_caller(&self, number: &str) -> Result<usize> {
        let unread = self.deps.call_log.unread_missed().await?;

        let mut marked = 0;
        for record in unread
            .iter()
            .filter(|record| phone_number::is_match(&record.phone_number, number))
        {
            if self.deps.call_log.mark_read(record.id).await? {
                marked += 1;
            }
        }

        if marked > 0 {
            log_info!("{marked} missed calls from {number} dealt with");
            self.stop_if_clear().await?;
        }
        Ok(marked)
    }

    /// Follows the call log's unread count and the call machine's events for
    /// as long as both are alive.
    pub fn spawn_listener(&self, mut calls: broadcast::Receiver<CallEvent>) -> JoinHandle<()> {
        let scheduler = self.clone();
        let mut unread = self.deps.call_log.watch_unread_count();

        tokio::spawn(async move {
            if *unread.borrow_and_update() > 0 {
                scheduler.arm().await;
            }

            loop {
                tokio::select! {
                    changed = unread.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let count = *unread.borrow_and_update();
                        if count > 0 {
                            scheduler.arm().await;
                        } else {
                            scheduler.stop().await;
                        }
                    }
                    event = calls.recv() => {
                        match event {
                            Ok(CallEvent::StateChanged { phase, session: Some(session) }) => {
                                scheduler.on_call_state(phase, &session).await;
                            }
                            Ok(_) => {}
                            Err(broadcast::error::RecvError::Lagged(missed)) => {
                                log_warn!("reminder listener skipped {missed} call events");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }

            log_debug!("reminder listener finished");
        })
    }

    async fn on_call_state(&self, phase: CallPhase, session: &CallSession) {
        if !matches!(phase, CallPhase::OutgoingDialing | CallPhase::Active) {
            return;
        }
        if let Err(err) = self.acknowledge_caller(&session.remote_number).await {
            log_warn!("could not clear missed calls from {}: {err:#}", session.remote_number);
        }
    }

    async fn stop_if_clear(&self) -> Result<()> {
        if self.pending(&self.deps.settings.current()).await?.is_empty() {
            self.stop().await;
        }
        Ok(())
    }

    /// Unread missed calls the reminder should talk about, newest first.
    async fn pending(&self, settings: &CarerSettings) -> Result<Vec<MissedCallRecord>> {
        let mut unread = self.deps.call_log.unread_missed().await?;
        if settings.nag_only_carers {
            unread.retain(|record| record.contact_kind == Some(ContactKind::Carer));
        }
        Ok(unread)
    }

    async fn run_ticker(&self, generation: u64, first: Duration) {
        let mut delay = first;
        loop {
            tokio::time::sleep(delay).await;
            if !self.fire(generation).await {
                break;
            }
            delay = self
                .deps
                .settings
                .current()
                .missed_call_nag_interval
                .repeat_interval();
        }
    }

    /// One tick. Returns whether the cycle should keep going.
    async fn fire(&self, generation: u64) -> bool {
        {
            let mut state = self.state.lock().await;
            if state.generation != generation || state.cycle.status != NagStatus::Armed {
                return false;
            }
            state.cycle.status = NagStatus::Firing;
        }
        self.status.send_replace(NagStatus::Firing);

        let settings = self.deps.settings.current();
        let unread = match self.pending(&settings).await {
            Ok(unread) => unread,
            Err(err) => {
                log_warn!("could not read missed calls, trying again next time: {err:#}");
                self.finish_fire(generation, false).await;
                return true;
            }
        };

        if unread.is_empty() || !settings.missed_call_nag_enabled {
            self.retire(generation).await;
            return false;
        }

        let sounded = self.sound_reminder(generation, &settings, &unread).await;
        self.finish_fire(generation, sounded).await;
        true
    }

    async fn sound_reminder(
        &self,
        generation: u64,
        settings: &CarerSettings,
        unread: &[MissedCallRecord],
    ) -> bool {
        if settings.nag_sound == NagSound::None {
            return false;
        }
        let Some(text) = scripts::missed_call_reminder(&settings.user_name, unread) else {
            return false;
        };

        // Claim under the state lock so a stop() in between cannot be missed.
        let claimed = {
            let state = self.state.lock().await;
            if state.generation != generation || state.cycle.status != NagStatus::Firing {
                log_debug!("reminder stopped before it could sound");
                return false;
            }
            self.deps.focus.try_claim_for_nag()
        };
        let Some(token) = claimed else {
            log_info!("call in progress, reminder kept quiet");
            return false;
        };

        let chime = settings.nag_sound == NagSound::Chime;
        let sounded = tokio::select! {
            _ = token.cancelled() => {
                log_info!("reminder cut off by a call");
                false
            }
            spoken = self.play(chime, &text) => spoken,
        };

        self.deps.focus.release_nag();
        sounded
    }

    async fn play(&self, chime: bool, text: &str) -> bool {
        if chime {
            if let Err(err) = self.deps.signal.play_once(Cue::Chime).await {
                log_warn!("reminder chime failed: {err:#}");
            }
        }

        match self.deps.voice.speak(text).await {
            Ok(()) => true,
            Err(err) => {
                log_warn!("reminder announcement failed: {err:#}");
                false
            }
        }
    }

    async fn finish_fire(&self, generation: u64, sounded: bool) {
        {
            let mut state = self.state.lock().await;
            if state.generation != generation || state.cycle.status != NagStatus::Firing {
                return;
            }
            state.cycle.record_fire(Utc::now(), sounded);
        }
        self.status.send_replace(NagStatus::Armed);
    }

    /// Stop requested by the ticker itself, so it must not abort its own task.
    async fn retire(&self, generation: u64) {
        {
            let mut state = self.state.lock().await;
            if state.generation != generation {
                return;
            }
            state.ticker = None;
            state.generation += 1;
            state.cycle.status = NagStatus::Stopped;
        }
        log_info!("no unread missed calls left, reminder stopped");
        self.status.send_replace(NagStatus::Stopped);
    }
}
