use std::{collections::VecDeque, sync::Arc, time::Duration};

use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
};

use crate::{
    audio::{AudioFocus, Cue},
    models::{CallLogEntry, Contact},
    ports::{CallLog, ContactDirectory, SignalPlayer, Telecom, VoiceAnnouncer},
    screening::{self, Decision, Verdict},
    scripts,
    settings::SettingsStore,
    utils::retry_once,
};

use super::{
    CallDirection, CallEvent, CallHandle, CallPhase, CallSession, ControlAction, ControlError,
    DisconnectReason, EndCause, PlatformCallState, PlatformEvent,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

const EVENT_CAPACITY: usize = 64;
const RECENTLY_ENDED: usize = 16;
const LOG_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Collaborators the call machine drives.
#[derive(Clone)]
pub struct CallDeps {
    pub telecom: Arc<dyn Telecom>,
    pub directory: Arc<dyn ContactDirectory>,
    pub call_log: Arc<dyn CallLog>,
    pub voice: Arc<dyn VoiceAnnouncer>,
    pub signal: Arc<dyn SignalPlayer>,
    pub focus: AudioFocus,
    pub settings: Arc<SettingsStore>,
}

#[derive(Debug, Clone, Copy)]
enum TimerKind {
    RingTimeout,
    AutoAnswer,
    DisconnectGrace,
}

enum CallCommand {
    Platform(PlatformEvent),
    Screened {
        handle: CallHandle,
        contact: Option<Contact>,
        verdict: Verdict,
    },
    ContactResolved {
        handle: CallHandle,
        contact: Contact,
    },
    Timer {
        handle: CallHandle,
        kind: TimerKind,
    },
    Control {
        action: ControlAction,
        reply: oneshot::Sender<Result<(), ControlError>>,
    },
    PlaceCall {
        number: String,
        reply: oneshot::Sender<Result<(), ControlError>>,
    },
    Snapshot {
        reply: oneshot::Sender<Option<CallSession>>,
    },
}

/// Handle to the call state machine.
///
/// Every input (platform events, user actions, timers, screening results) is
/// queued to one task that owns the [`CallSession`], so they are applied one
/// at a time in arrival order. Sending never blocks the caller.
#[derive(Clone)]
pub struct CallManager {
    commands: mpsc::UnboundedSender<CallCommand>,
    events: broadcast::Sender<CallEvent>,
}

impl CallManager {
    pub fn spawn(deps: CallDeps) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let actor = CallActor {
            deps,
            commands: commands.downgrade(),
            events: events.clone(),
            session: None,
            timers: Vec::new(),
            recently_ended: VecDeque::with_capacity(RECENTLY_ENDED),
        };
        tokio::spawn(actor.run(rx));

        Self { commands, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.events.subscribe()
    }

    /// Entry point for the platform's delivery thread.
    pub fn on_platform_event(&self, event: PlatformEvent) {
        if self.commands.send(CallCommand::Platform(event)).is_err() {
            log_warn!("call manager has stopped; platform event dropped");
        }
    }

    pub async fn answer(&self) -> Result<(), ControlError> {
        self.control(ControlAction::Answer).await
    }

    pub async fn reject(&self) -> Result<(), ControlError> {
        self.control(ControlAction::Reject).await
    }

    pub async fn hang_up(&self) -> Result<(), ControlError> {
        self.control(ControlAction::HangUp).await
    }

    pub async fn hold(&self) -> Result<(), ControlError> {
        self.control(ControlAction::Hold).await
    }

    pub async fn resume(&self) -> Result<(), ControlError> {
        self.control(ControlAction::Resume).await
    }

    pub async fn toggle_mute(&self) -> Result<(), ControlError> {
        self.control(ControlAction::ToggleMute).await
    }

    pub async fn toggle_speaker(&self) -> Result<(), ControlError> {
        self.control(ControlAction::ToggleSpeaker).await
    }

    pub async fn control(&self, action: ControlAction) -> Result<(), ControlError> {
        if action == ControlAction::PlaceCall {
            return Err(ControlError::InvalidState {
                action,
                phase: self.phase().await,
            });
        }
        self.request(|reply| CallCommand::Control { action, reply })
            .await
            .unwrap_or(Err(ControlError::Unavailable))
    }

    /// Asks the platform to dial `number`. The session itself starts when the
    /// platform reports the new outgoing call.
    pub async fn place_call(&self, number: &str) -> Result<(), ControlError> {
        let number = number.to_string();
        self.request(|reply| CallCommand::PlaceCall { number, reply })
            .await
            .unwrap_or(Err(ControlError::Unavailable))
    }

    pub async fn snapshot(&self) -> Option<CallSession> {
        self.request(|reply| CallCommand::Snapshot { reply })
            .await
            .flatten()
    }

    pub async fn phase(&self) -> CallPhase {
        self.snapshot()
            .await
            .map(|session| session.phase)
            .unwrap_or_default()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> CallCommand,
    ) -> Option<T> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(make(reply)).ok()?;
        rx.await.ok()
    }
}

struct CallActor {
    deps: CallDeps,
    commands: mpsc::WeakUnboundedSender<CallCommand>,
    events: broadcast::Sender<CallEvent>,
    session: Option<CallSession>,
    timers: Vec<JoinHandle<()>>,
    recently_ended: VecDeque<CallHandle>,
}

impl CallActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<CallCommand>) {
        log_info!("call manager started");

        while let Some(command) = rx.recv().await {
            match command {
                CallCommand::Platform(event) => self.on_platform_event(event).await,
                CallCommand::Screened {
                    handle,
                    contact,
                    verdict,
                } => self.on_screened(handle, contact, verdict).await,
                CallCommand::ContactResolved { handle, contact } => {
                    self.on_contact_resolved(handle, contact)
                }
                CallCommand::Timer { handle, kind } => self.on_timer(handle, kind).await,
                CallCommand::Control { action, reply } => {
                    let result = self.on_control(action).await;
                    if let Err(err) = &result {
                        log_info!("{err}");
                    }
                    let _ = reply.send(result);
                }
                CallCommand::PlaceCall { number, reply } => {
                    let _ = reply.send(self.on_place_call(&number));
                }
                CallCommand::Snapshot { reply } => {
                    let _ = reply.send(self.session.clone());
                }
            }
        }

        self.cancel_timers();
        log_info!("call manager stopped");
    }

    fn phase(&self) -> CallPhase {
        self.session
            .as_ref()
            .map(|session| session.phase)
            .unwrap_or_default()
    }

    fn is_current(&self, handle: &CallHandle) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| &session.handle == handle)
    }

    async fn on_platform_event(&mut self, event: PlatformEvent) {
        let handle = event.handle().clone();

        if !self.is_current(&handle) {
            let new_call = matches!(
                event,
                PlatformEvent::NewIncoming { .. } | PlatformEvent::NewOutgoing { .. }
            );
            if !new_call && self.recently_ended.contains(&handle) {
                log_debug!("ignoring late {event:?} for finished call {handle}");
                return;
            }
            if let Some(session) = &self.session {
                log_warn!("dropping {event:?}: call {} is in progress", session.handle);
                return;
            }
            // The platform may reuse a handle for a later call.
            self.recently_ended.retain(|ended| ended != &handle);
            match event {
                PlatformEvent::NewIncoming { handle, number } => self.begin_incoming(handle, number),
                PlatformEvent::NewOutgoing { handle, number } => self.begin_outgoing(handle, number),
                other => log_warn!("dropping {other:?} for unknown call"),
            }
            return;
        }

        match event {
            PlatformEvent::NewIncoming { .. } | PlatformEvent::NewOutgoing { .. } => {
                log_debug!("duplicate announcement of call {handle}");
            }
            PlatformEvent::StateChanged { state, .. } => self.on_platform_state(state),
            PlatformEvent::Disconnected { reason, .. } => self.on_disconnected(reason).await,
        }
    }

    fn begin_incoming(&mut self, handle: CallHandle, number: String) {
        log_info!("incoming call {handle} from {number}, screening");
        self.session = Some(CallSession::incoming(handle.clone(), number.clone()));
        self.publish_state();

        let Some(commands) = self.commands.upgrade() else {
            return;
        };
        let directory = Arc::clone(&self.deps.directory);
        let settings = self.deps.settings.current();

        tokio::spawn(async move {
            let contact =
                screening::resolve_contact(directory.as_ref(), &number, settings.lookup_timeout())
                    .await;
            let verdict = screening::decide(&number, contact.as_ref(), &settings);
            let _ = commands.send(CallCommand::Screened {
                handle,
                contact,
                verdict,
            });
        });
    }

    fn begin_outgoing(&mut self, handle: CallHandle, number: String) {
        log_info!("outgoing call {handle} to {number}");
        self.claim_focus();
        self.session = Some(CallSession::outgoing(handle.clone(), number.clone()));
        self.publish_state();

        let Some(commands) = self.commands.upgrade() else {
            return;
        };
        let directory = Arc::clone(&self.deps.directory);
        let timeout = self.deps.settings.current().lookup_timeout();

        tokio::spawn(async move {
            if let Some(contact) =
                screening::resolve_contact(directory.as_ref(), &number, timeout).await
            {
                let _ = commands.send(CallCommand::ContactResolved { handle, contact });
            }
        });
    }

    fn on_contact_resolved(&mut self, handle: CallHandle, contact: Contact) {
        let Some(session) = self
            .session
            .as_mut()
            .filter(|session| session.handle == handle && session.contact.is_none())
        else {
            return;
        };
        session.contact = Some(contact);
        self.publish_state();
    }

    async fn on_screened(&mut self, handle: CallHandle, contact: Option<Contact>, verdict: Verdict) {
        let Some(session) = self.session.as_mut().filter(|session| {
            session.handle == handle && session.phase == CallPhase::IncomingScreening
        }) else {
            log_debug!("screening result for {handle} arrived too late");
            return;
        };

        session.contact = contact;
        session.decision = Some(verdict.decision);
        session.screened = verdict.decision == Decision::Screen;

        if verdict.decision.rings() {
            self.start_ringing(verdict.auto_answer);
            return;
        }

        let silent = verdict.decision == Decision::Silence;
        log_info!("call {handle} turned away ({:?})", verdict.decision);
        if let Err(err) = self.deps.telecom.reject(&handle, silent) {
            log_warn!("platform reject of {handle} failed: {err:#}");
        }
        self.finish(EndCause::ScreenedOut).await;
    }

    fn start_ringing(&mut self, auto_answer: bool) {
        let settings = self.deps.settings.current();

        self.set_phase(CallPhase::IncomingRinging);
        self.claim_focus();
        if let Err(err) = self.deps.signal.start(Cue::Ringtone) {
            log_warn!("ringtone unavailable: {err:#}");
        }

        if settings.announce_calls {
            let caller = self
                .session
                .as_ref()
                .and_then(|session| session.contact.as_ref())
                .map(|contact| contact.name.clone());
            if let Some(caller) = caller {
                self.announce(scripts::caller_announcement(&caller));
            }
        }

        self.schedule(settings.ring_timeout(), TimerKind::RingTimeout);
        if auto_answer {
            self.schedule(settings.auto_answer_delay(), TimerKind::AutoAnswer);
        }
    }

    async fn on_timer(&mut self, handle: CallHandle, kind: TimerKind) {
        if !self.is_current(&handle) {
            return;
        }

        match (kind, self.phase()) {
            (TimerKind::RingTimeout, CallPhase::IncomingRinging) => {
                log_info!("call {handle} rang out unanswered");
                if let Err(err) = self.deps.telecom.reject(&handle, true) {
                    log_warn!("platform reject of {handle} failed: {err:#}");
                }
                self.finish(EndCause::Missed).await;
            }
            (TimerKind::AutoAnswer, CallPhase::IncomingRinging) => {
                log_info!("auto-answering call {handle}");
                if let Err(err) = self.answer_ringing(&handle) {
                    log_warn!("auto-answer failed: {err}");
                }
            }
            (TimerKind::DisconnectGrace, CallPhase::Disconnecting) => {
                log_warn!("platform never confirmed the end of {handle}; closing it");
                let cause = self.completed_cause();
                self.finish(cause).await;
            }
            (kind, phase) => log_debug!("stale {kind:?} timer for {handle} while {phase}"),
        }
    }

    fn on_platform_state(&mut self, state: PlatformCallState) {
        match (state, self.phase()) {
            (
                PlatformCallState::Active,
                CallPhase::IncomingScreening | CallPhase::IncomingRinging | CallPhase::OutgoingDialing,
            ) => self.enter_active(),
            (PlatformCallState::Active, CallPhase::Held) => self.set_phase(CallPhase::Active),
            (PlatformCallState::Holding, CallPhase::Active) => self.set_phase(CallPhase::Held),
            (
                PlatformCallState::Disconnecting,
                CallPhase::OutgoingDialing | CallPhase::Active | CallPhase::Held,
            ) => self.begin_disconnect(),
            (PlatformCallState::Ringing | PlatformCallState::Dialing | PlatformCallState::Connecting, _)
            | (PlatformCallState::Active, CallPhase::Active)
            | (PlatformCallState::Holding, CallPhase::Held)
            | (PlatformCallState::Disconnecting, CallPhase::Disconnecting) => {}
            (state, phase) => log_debug!("ignoring platform {state:?} while {phase}"),
        }
    }

    async fn on_disconnected(&mut self, reason: DisconnectReason) {
        let cause = match self.phase() {
            // Gone before screening finished: nobody saw it ring.
            CallPhase::IncomingScreening => EndCause::ScreenedOut,
            CallPhase::IncomingRinging => match reason {
                DisconnectReason::Local | DisconnectReason::Rejected => EndCause::RejectedByUser,
                _ => EndCause::Missed,
            },
            CallPhase::OutgoingDialing => EndCause::Failed,
            CallPhase::Active | CallPhase::Held => {
                self.set_phase(CallPhase::Disconnecting);
                EndCause::Completed
            }
            CallPhase::Disconnecting => self.completed_cause(),
            CallPhase::Idle | CallPhase::Ended => return,
        };

        log_info!("call disconnected ({reason:?})");
        self.finish(cause).await;
    }

    async fn on_control(&mut self, action: ControlAction) -> Result<(), ControlError> {
        let phase = self.phase();
        let invalid = ControlError::InvalidState { action, phase };
        let Some(handle) = self.session.as_ref().map(|session| session.handle.clone()) else {
            return Err(invalid);
        };
        let telecom = Arc::clone(&self.deps.telecom);
        let refused = ControlError::platform(action);

        match (action, phase) {
            (ControlAction::Answer, CallPhase::IncomingRinging) => self.answer_ringing(&handle),
            (ControlAction::Reject, CallPhase::IncomingRinging) => {
                telecom.reject(&handle, false).map_err(refused)?;
                self.finish(EndCause::RejectedByUser).await;
                Ok(())
            }
            (
                ControlAction::HangUp,
                CallPhase::OutgoingDialing | CallPhase::Active | CallPhase::Held,
            ) => {
                telecom.disconnect(&handle).map_err(refused)?;
                self.begin_disconnect();
                Ok(())
            }
            (ControlAction::Hold, CallPhase::Active) => {
                telecom.hold(&handle).map_err(refused)?;
                self.set_phase(CallPhase::Held);
                Ok(())
            }
            (ControlAction::Resume, CallPhase::Held) => {
                telecom.unhold(&handle).map_err(refused)?;
                self.set_phase(CallPhase::Active);
                Ok(())
            }
            (ControlAction::ToggleMute, CallPhase::Active) => {
                let muted = !self.session.as_ref().is_some_and(|session| session.muted);
                telecom.set_muted(&handle, muted).map_err(refused)?;
                if let Some(session) = self.session.as_mut() {
                    session.muted = muted;
                }
                self.publish_state();
                self.announce_if_enabled(scripts::mute_changed(muted));
                Ok(())
            }
            (ControlAction::ToggleSpeaker, CallPhase::Active) => {
                let on = !self.session.as_ref().is_some_and(|session| session.speaker_on);
                telecom.set_speaker(&handle, on).map_err(refused)?;
                if let Some(session) = self.session.as_mut() {
                    session.speaker_on = on;
                }
                self.publish_state();
                self.announce_if_enabled(scripts::speaker_changed(on));
                Ok(())
            }
            _ => Err(invalid),
        }
    }

    fn on_place_call(&mut self, number: &str) -> Result<(), ControlError> {
        let phase = self.phase();
        if phase.is_live() {
            return Err(ControlError::InvalidState {
                action: ControlAction::PlaceCall,
                phase,
            });
        }

        // Focus is claimed once the platform reports the call; until then
        // only cut off a reminder that is playing.
        if self.deps.focus.interrupt_nag() {
            log_info!("dialing cuts off the missed-call reminder");
            self.deps.voice.stop();
            self.deps.signal.stop();
        }

        log_info!("dialing {number}");
        self.deps
            .telecom
            .place_call(number)
            .map_err(ControlError::platform(ControlAction::PlaceCall))
    }

    fn answer_ringing(&mut self, handle: &CallHandle) -> Result<(), ControlError> {
        self.deps
            .telecom
            .answer(handle)
            .map_err(ControlError::platform(ControlAction::Answer))?;
        self.enter_active();
        Ok(())
    }

    fn enter_active(&mut self) {
        let settings = self.deps.settings.current();

        self.cancel_timers();
        self.deps.signal.stop();
        self.claim_focus();

        let Some(session) = self.session.as_mut() else {
            return;
        };
        let first_connect = !session.was_connected();
        log_info!("call {} {} -> {}", session.handle, session.phase, CallPhase::Active);
        session.mark_connected();

        if first_connect && settings.speaker_default_on && !session.speaker_on {
            match self.deps.telecom.set_speaker(&session.handle, true) {
                Ok(()) => session.speaker_on = true,
                Err(err) => log_warn!("could not turn the speaker on: {err:#}"),
            }
        }

        let answered_by = (first_connect
            && settings.announce_calls
            && session.direction == CallDirection::Outgoing)
            .then(|| session.contact.as_ref().map(|contact| contact.name.clone()))
            .flatten();

        self.publish_state();
        if let Some(name) = answered_by {
            self.announce(scripts::call_connected(&name));
        }
    }

    fn begin_disconnect(&mut self) {
        self.set_phase(CallPhase::Disconnecting);
        let grace = self.deps.settings.current().disconnect_grace();
        self.schedule(grace, TimerKind::DisconnectGrace);
    }

    fn completed_cause(&self) -> EndCause {
        if self.session.as_ref().is_some_and(|session| session.was_connected()) {
            EndCause::Completed
        } else {
            EndCause::Failed
        }
    }

    /// ENDED: write the one log entry for this call, then fold back to IDLE.
    async fn finish(&mut self, cause: EndCause) {
        self.cancel_timers();
        let Some(mut session) = self.session.take() else {
            return;
        };

        session.mark_ended(cause);
        log_info!("call {} ended ({cause:?})", session.handle);

        self.deps.signal.stop();
        self.deps.focus.release_call();
        self.remember_ended(session.handle.clone());
        let _ = self.events.send(CallEvent::StateChanged {
            phase: CallPhase::Ended,
            session: Some(session.clone()),
        });

        let mut entry = session.to_log_entry();
        entry.id = self.record(&entry).await;

        if cause == EndCause::Completed {
            self.announce_if_enabled(scripts::call_ended());
        }

        let _ = self.events.send(CallEvent::SessionEnded { session, entry });
        self.publish_state();
    }

    async fn record(&self, entry: &CallLogEntry) -> Option<i64> {
        let call_log = self.deps.call_log.as_ref();
        let result = retry_once("call log write", LOG_WRITE_TIMEOUT, || async move {
            call_log.append(entry.clone()).await
        })
        .await;

        match result {
            Ok(id) => Some(id),
            Err(err) => {
                log_error!(
                    "call from {} at {} was not logged: {err:#}",
                    entry.phone_number,
                    entry.timestamp
                );
                None
            }
        }
    }

    fn remember_ended(&mut self, handle: CallHandle) {
        if self.recently_ended.len() == RECENTLY_ENDED {
            self.recently_ended.pop_front();
        }
        self.recently_ended.push_back(handle);
    }

    fn set_phase(&mut self, phase: CallPhase) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.phase == phase {
            return;
        }
        log_info!("call {} {} -> {}", session.handle, session.phase, phase);
        session.phase = phase;
        self.cancel_timers();
        self.publish_state();
    }

    fn publish_state(&self) {
        let event = match &self.session {
            Some(session) => CallEvent::StateChanged {
                phase: session.phase,
                session: Some(session.clone()),
            },
            None => CallEvent::StateChanged {
                phase: CallPhase::Idle,
                session: None,
            },
        };
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn claim_focus(&self) {
        if self.deps.focus.claim_for_call() {
            log_info!("call takes the speaker from the missed-call reminder");
            self.deps.voice.stop();
            self.deps.signal.stop();
        }
    }

    fn announce_if_enabled(&self, text: String) {
        if self.deps.settings.current().announce_calls {
            self.announce(text);
        }
    }

    fn announce(&self, text: String) {
        let voice = Arc::clone(&self.deps.voice);
        tokio::spawn(async move {
            if let Err(err) = voice.speak(&text).await {
                log_warn!("announcement failed: {err:#}");
            }
        });
    }

    fn schedule(&mut self, delay: Duration, kind: TimerKind) {
        let Some(handle) = self.session.as_ref().map(|session| session.handle.clone()) else {
            return;
        };
        let Some(commands) = self.commands.upgrade() else {
            return;
        };

        self.timers.push(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = commands.send(CallCommand::Timer { handle, kind });
        }));
    }

    fn cancel_timers(&mut self) {
        for timer in self.timers.drain(..) {
            timer.abort();
        }
    }
}
