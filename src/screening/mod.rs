//! Decides, before anything rings, what happens to an incoming call.
//!
//! [`decide`] is a pure function of the caller's number, the directory match
//! and the carer's settings. The rules run in the order given by
//! `CarerSettings::screening_order` and the first one that applies wins; if none
//! does the call is screened (rings, marked unverified).
//!
//! [`resolve_contact`] is the only asynchronous part. A lookup that errors or
//! times out counts as "no match", so a broken directory degrades to the
//! unknown-caller policy and never to ALLOW.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{
    models::Contact,
    ports::ContactDirectory,
    settings::{CarerSettings, ScreeningRule},
    utils::{phone_number, retry_once},
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Decision {
    /// Known caller: ring normally.
    Allow,
    /// Unknown caller the carer lets through: ring, flagged as unverified.
    Screen,
    /// Rejected at the platform without ringing; not a missed call.
    Silence,
    /// Blocked number, rejected outright.
    Reject,
}

impl Decision {
    pub fn rings(&self) -> bool {
        matches!(self, Decision::Allow | Decision::Screen)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub decision: Decision,
    /// The call machine answers by itself after the auto-answer delay.
    pub auto_answer: bool,
    /// Rule that matched; `None` when the fallback applied.
    pub rule: Option<ScreeningRule>,
}

pub fn decide(number: &str, contact: Option<&Contact>, settings: &CarerSettings) -> Verdict {
    for rule in &settings.screening_order {
        let decision = match rule {
            ScreeningRule::AutoAnswerContact => contact
                .filter(|c| c.auto_answer && settings.auto_answer_enabled)
                .map(|_| Decision::Allow),
            ScreeningRule::KnownContact => contact.map(|_| Decision::Allow),
            ScreeningRule::AllowUnknown => settings
                .allow_unknown_numbers
                .then_some(Decision::Screen),
            ScreeningRule::Blocked => {
                is_blocked(number, &settings.blocked_numbers).then_some(Decision::Reject)
            }
            ScreeningRule::AllowListOnly => settings.allow_list_only.then_some(Decision::Silence),
        };

        if let Some(decision) = decision {
            log_debug!("screening {number}: {rule:?} -> {decision:?}");
            return Verdict {
                decision,
                auto_answer: *rule == ScreeningRule::AutoAnswerContact,
                rule: Some(*rule),
            };
        }
    }

    log_debug!("screening {number}: no rule matched, screening");
    Verdict {
        decision: Decision::Screen,
        auto_answer: false,
        rule: None,
    }
}

fn is_blocked(number: &str, blocked: &[String]) -> bool {
    blocked
        .iter()
        .any(|entry| phone_number::is_match(number, entry))
}

/// Looks the caller up, first as dialled then normalized.
pub async fn resolve_contact(
    directory: &dyn ContactDirectory,
    number: &str,
    timeout: Duration,
) -> Option<Contact> {
    let normalized = phone_number::normalize(number);
    let normalized = normalized.as_str();

    let result = retry_once("contact lookup", timeout, || async move {
        if let Some(contact) = directory.lookup(number).await? {
            return Ok(Some(contact));
        }
        if !normalized.is_empty() && normalized != number {
            return directory.lookup(normalized).await;
        }
        Ok(None)
    })
    .await;

    match result {
        Ok(contact) => contact,
        Err(err) => {
            log_warn!("treating {number} as unknown, lookup failed: {err:#}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContactKind;
    use crate::settings::DEFAULT_SCREENING_ORDER;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn carer(auto_answer: bool) -> Contact {
        Contact {
            id: 1,
            name: "Tom".into(),
            phone_number: "07700900123".into(),
            kind: ContactKind::Carer,
            auto_answer,
            priority: 0,
        }
    }

    fn settings() -> CarerSettings {
        CarerSettings {
            auto_answer_enabled: true,
            ..CarerSettings::default()
        }
    }

    #[test]
    fn auto_answer_contact_is_allowed_and_answered() {
        let verdict = decide("07700900123", Some(&carer(true)), &settings());
        assert_eq!(verdict.decision, Decision::Allow);
        assert!(verdict.auto_answer);
    }

    #[test]
    fn auto_answer_needs_the_global_switch() {
        let mut settings = settings();
        settings.auto_answer_enabled = false;
        let verdict = decide("07700900123", Some(&carer(true)), &settings);
        assert_eq!(verdict.decision, Decision::Allow);
        assert!(!verdict.auto_answer);
        assert_eq!(verdict.rule, Some(ScreeningRule::KnownContact));
    }

    #[test]
    fn unknown_caller_in_allow_list_only_mode_is_silenced() {
        let verdict = decide("01632960001", None, &settings());
        assert_eq!(verdict.decision, Decision::Silence);
        assert!(!verdict.decision.rings());
    }

    #[test]
    fn unknown_caller_is_screened_when_allowed() {
        let mut settings = settings();
        settings.allow_unknown_numbers = true;
        assert_eq!(decide("01632960001", None, &settings).decision, Decision::Screen);
    }

    #[test]
    fn unknown_caller_without_allow_list_only_falls_back_to_screen() {
        let mut settings = settings();
        settings.allow_list_only = false;
        let verdict = decide("01632960001", None, &settings);
        assert_eq!(verdict.decision, Decision::Screen);
        assert_eq!(verdict.rule, None);
    }

    #[test]
    fn blocked_number_is_rejected_after_normalization() {
        let mut settings = settings();
        settings.blocked_numbers = vec!["+44 1632 960001".into()];
        let verdict = decide("01632 960001", None, &settings);
        assert_eq!(verdict.decision, Decision::Reject);
    }

    #[test]
    fn precedence_is_configurable() {
        let mut settings = settings();
        settings.allow_unknown_numbers = true;
        settings.blocked_numbers = vec!["01632960001".into()];
        assert_eq!(decide("01632960001", None, &settings).decision, Decision::Screen);

        settings.screening_order = vec![
            ScreeningRule::Blocked,
            ScreeningRule::AutoAnswerContact,
            ScreeningRule::KnownContact,
            ScreeningRule::AllowUnknown,
            ScreeningRule::AllowListOnly,
        ];
        assert_eq!(decide("01632960001", None, &settings).decision, Decision::Reject);
        assert_eq!(settings.screening_order.len(), DEFAULT_SCREENING_ORDER.len());
    }

    struct FlakyDirectory {
        calls: AtomicU32,
        fail_times: u32,
    }

    #[async_trait]
    impl ContactDirectory for FlakyDirectory {
        async fn lookup(&self, number: &str) -> Result<Option<Contact>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.fail_times {
                return Err(anyhow!("directory busy"));
            }
            Ok((number == "07700900123").then(|| carer(false)))
        }
    }

    #[tokio::test]
    async fn lookup_falls_back_to_normalized_number() {
        let directory = FlakyDirectory {
            calls: AtomicU32::new(0),
            fail_times: 0,
        };
        let contact =
            resolve_contact(&directory, "+44 7700 900123", Duration::from_secs(1)).await;
        assert_eq!(contact.map(|c| c.name), Some("Tom".to_string()));
    }

    #[tokio::test]
    async fn lookup_is_retried_once_then_fails_open_to_unknown() {
        let directory = FlakyDirectory {
            calls: AtomicU32::new(0),
            fail_times: 1,
        };
        assert!(resolve_contact(&directory, "07700900123", Duration::from_secs(1))
            .await
            .is_some());

        let broken = FlakyDirectory {
            calls: AtomicU32::new(0),
            fail_times: u32::MAX,
        };
        assert!(resolve_contact(&broken, "07700900123", Duration::from_secs(1))
            .await
            .is_none());
        assert_eq!(broken.calls.load(Ordering::SeqCst), 2);
    }
}
