use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
    time::Duration,
};

/// One step of the screening policy. The order of these in
/// [`CarerSettings::screening_order`] is the precedence, first match wins.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ScreeningRule {
    AutoAnswerContact,
    KnownContact,
    AllowUnknown,
    Blocked,
    AllowListOnly,
}

pub const DEFAULT_SCREENING_ORDER: [ScreeningRule; 5] = [
    ScreeningRule::AutoAnswerContact,
    ScreeningRule::KnownContact,
    ScreeningRule::AllowUnknown,
    ScreeningRule::Blocked,
    ScreeningRule::AllowListOnly,
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum NagInterval {
    ImmediateThenMinute,
    Every2Minutes,
    Every5Minutes,
    Every10Minutes,
    Custom {
        #[serde(rename = "initialDelaySecs")]
        initial_delay_secs: u64,
        #[serde(rename = "repeatIntervalSecs")]
        repeat_interval_secs: u64,
    },
}

impl NagInterval {
    pub fn initial_delay(&self) -> Duration {
        match self {
            NagInterval::ImmediateThenMinute => Duration::from_secs(5),
            NagInterval::Every2Minutes => Duration::from_secs(120),
            NagInterval::Every5Minutes => Duration::from_secs(300),
            NagInterval::Every10Minutes => Duration::from_secs(600),
            NagInterval::Custom {
                initial_delay_secs, ..
            } => Duration::from_secs(*initial_delay_secs),
        }
    }

    pub fn repeat_interval(&self) -> Duration {
        match self {
            NagInterval::ImmediateThenMinute => Duration::from_secs(60),
            NagInterval::Every2Minutes => Duration::from_secs(120),
            NagInterval::Every5Minutes => Duration::from_secs(300),
            NagInterval::Every10Minutes => Duration::from_secs(600),
            // A zero repeat would spin the reminder loop.
            NagInterval::Custom {
                repeat_interval_secs,
                ..
            } => Duration::from_secs((*repeat_interval_secs).max(1)),
        }
    }
}

impl Default for NagInterval {
    fn default() -> Self {
        NagInterval::ImmediateThenMinute
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum NagSound {
    /// Bing-bong chime, then the spoken reminder.
    Chime,
    SpokenOnly,
    /// Reminders still run (and can be acknowledged) but make no sound.
    None,
}

impl Default for NagSound {
    fn default() -> Self {
        NagSound::Chime
    }
}

/// Everything the carer can configure that the call core reads.
///
/// Defaults are the factory-reset values: nothing is auto-answered, unknown
/// callers are silenced, reminders are on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CarerSettings {
    pub user_name: String,

    pub allow_list_only: bool,
    pub allow_unknown_numbers: bool,
    pub blocked_numbers: Vec<String>,
    pub screening_order: Vec<ScreeningRule>,
    pub lookup_timeout_ms: u64,

    pub auto_answer_enabled: bool,
    pub auto_answer_delay_secs: u64,
    pub ring_timeout_secs: u64,
    pub disconnect_grace_secs: u64,
    pub speaker_default_on: bool,
    pub announce_calls: bool,

    pub missed_call_nag_enabled: bool,
    pub missed_call_nag_interval: NagInterval,
    pub nag_only_carers: bool,
    pub nag_sound: NagSound,
}

impl Default for CarerSettings {
    fn default() -> Self {
        Self {
            user_name: "User".into(),
            allow_list_only: true,
            allow_unknown_numbers: false,
            blocked_numbers: Vec::new(),
            screening_order: DEFAULT_SCREENING_ORDER.to_vec(),
            lookup_timeout_ms: 1500,
            auto_answer_enabled: false,
            auto_answer_delay_secs: 3,
            ring_timeout_secs: 30,
            disconnect_grace_secs: 5,
            speaker_default_on: true,
            announce_calls: true,
            missed_call_nag_enabled: true,
            missed_call_nag_interval: NagInterval::default(),
            nag_only_carers: false,
            nag_sound: NagSound::default(),
        }
    }
}

impl CarerSettings {
    pub fn ring_timeout(&self) -> Duration {
        Duration::from_secs(self.ring_timeout_secs)
    }

    pub fn auto_answer_delay(&self) -> Duration {
        Duration::from_secs(self.auto_answer_delay_secs)
    }

    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_secs(self.disconnect_grace_secs)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

pub struct SettingsStore {
    path: Option<PathBuf>,
    data: RwLock<CarerSettings>,
}

impl SettingsStore {
    pub fn load(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!(
                    "Settings at {} are invalid ({err}); using defaults",
                    path.display()
                );
                CarerSettings::default()
            })
        } else {
            CarerSettings::default()
        };

        Ok(Self {
            path: Some(path),
            data: RwLock::new(data),
        })
    }

    pub fn in_memory(settings: CarerSettings) -> Self {
        Self {
            path: None,
            data: RwLock::new(settings),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn current(&self) -> CarerSettings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Swaps the settings in memory; running calls keep what they started with.
    pub fn replace(&self, settings: CarerSettings) {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = settings;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let settings: CarerSettings =
            serde_json::from_str(r#"{"userName":"Wanda","allowListOnly":false}"#).unwrap();

        assert_eq!(settings.user_name, "Wanda");
        assert!(!settings.allow_list_only);
        assert_eq!(settings.ring_timeout_secs, 30);
        assert_eq!(settings.screening_order, DEFAULT_SCREENING_ORDER.to_vec());
    }

    #[test]
    fn custom_interval_parses() {
        let settings: CarerSettings = serde_json::from_str(
            r#"{"missedCallNagInterval":{"custom":{"initialDelaySecs":0,"repeatIntervalSecs":0}}}"#,
        )
        .unwrap();

        let interval = settings.missed_call_nag_interval;
        assert_eq!(interval.initial_delay(), Duration::ZERO);
        assert_eq!(interval.repeat_interval(), Duration::from_secs(1));
    }

    #[test]
    fn missing_file_loads_defaults() {
        let store = SettingsStore::load(PathBuf::from("/nonexistent/carephone/settings.json"))
            .unwrap();
        assert_eq!(store.current(), CarerSettings::default());
    }

    #[test]
    fn replace_is_visible_to_readers() {
        let store = SettingsStore::in_memory(CarerSettings::default());
        let mut updated = store.current();
        updated.auto_answer_enabled = true;
        store.replace(updated);
        assert!(store.current().auto_answer_enabled);
    }
}
