//! Call handling and missed-call reminders for a simplified, carer-managed phone.
//!
//! [`Phone`] wires the pieces together: the [`call::CallManager`] owns the one
//! live call, the [`nag::NagScheduler`] keeps reminding the user about missed
//! calls, and both share the speaker through an [`audio::AudioFocus`].

pub mod audio;
pub mod bridge;
pub mod call;
pub mod db;
pub mod models;
pub mod nag;
pub mod ports;
pub mod screening;
pub mod scripts;
pub mod settings;
pub mod utils;
pub mod voice;

use std::sync::Arc;

use anyhow::Result;

use audio::AudioFocus;
use call::{CallDeps, CallManager, ControlError, PlatformEvent};
use nag::{NagDeps, NagScheduler};
use ports::{CallLog, ContactDirectory, SignalPlayer, Telecom, VoiceAnnouncer};
use settings::SettingsStore;

/// Everything the phone core needs from the outside world.
pub struct PhoneDeps {
    pub telecom: Arc<dyn Telecom>,
    pub directory: Arc<dyn ContactDirectory>,
    pub call_log: Arc<dyn CallLog>,
    pub voice: Arc<dyn VoiceAnnouncer>,
    pub signal: Arc<dyn SignalPlayer>,
    pub settings: Arc<SettingsStore>,
}

#[derive(Clone)]
pub struct Phone {
    calls: CallManager,
    nag: NagScheduler,
    focus: AudioFocus,
    directory: Arc<dyn ContactDirectory>,
    settings: Arc<SettingsStore>,
}

impl Phone {
    /// Spawns the call machine and the reminder listener on the current
    /// tokio runtime.
    pub fn start(deps: PhoneDeps) -> Self {
        let focus = AudioFocus::new();

        let calls = CallManager::spawn(CallDeps {
            telecom: deps.telecom,
            directory: Arc::clone(&deps.directory),
            call_log: Arc::clone(&deps.call_log),
            voice: Arc::clone(&deps.voice),
            signal: Arc::clone(&deps.signal),
            focus: focus.clone(),
            settings: Arc::clone(&deps.settings),
        });

        let nag = NagScheduler::new(NagDeps {
            call_log: deps.call_log,
            voice: deps.voice,
            signal: deps.signal,
            focus: focus.clone(),
            settings: Arc::clone(&deps.settings),
        });
        nag.spawn_listener(calls.subscribe());

        log::info!("phone core started");

        Self {
            calls,
            nag,
            focus,
            directory: deps.directory,
            settings: deps.settings,
        }
    }

    pub fn calls(&self) -> &CallManager {
        &self.calls
    }

    pub fn nag(&self) -> &NagScheduler {
        &self.nag
    }

    pub fn focus(&self) -> &AudioFocus {
        &self.focus
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn on_platform_event(&self, event: PlatformEvent) {
        self.calls.on_platform_event(event);
    }

    /// Dials `number` unless it belongs to an answer-only contact.
    pub async fn place_call(&self, number: &str) -> Result<(), ControlError> {
        let timeout = self.settings.current().lookup_timeout();
        if let Some(contact) =
            screening::resolve_contact(self.directory.as_ref(), number, timeout).await
        {
            if !contact.can_call_out() {
                return Err(ControlError::NotCallable(contact.name));
            }
        }
        self.calls.place_call(number).await
    }

    pub async fn acknowledge_missed_call(&self, id: i64) -> Result<bool> {
        self.nag.acknowledge(id).await
    }

    pub async fn acknowledge_all_missed_calls(&self) -> Result<usize> {
        self.nag.acknowledge_all().await
    }
}
