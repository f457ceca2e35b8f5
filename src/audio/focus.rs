//! Arbitration of the shared speaker between a call and the reminder loop.
//!
//! A call always wins: claiming focus for a call cancels any reminder that is
//! currently making noise, and the reminder loop may not claim focus again until
//! the call has released it. The call machine only ever asks "is a reminder
//! sounding"; it never talks to the scheduler directly.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioOwner {
    Nobody,
    Call,
    Nag,
}

#[derive(Debug)]
struct FocusState {
    owner: AudioOwner,
    nag_token: Option<CancellationToken>,
}

#[derive(Debug, Clone)]
pub struct AudioFocus {
    inner: Arc<Mutex<FocusState>>,
}

impl Default for AudioFocus {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioFocus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FocusState {
                owner: AudioOwner::Nobody,
                nag_token: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FocusState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn owner(&self) -> AudioOwner {
        self.lock().owner
    }

    pub fn nag_sounding(&self) -> bool {
        self.owner() == AudioOwner::Nag
    }

    pub fn call_holds_focus(&self) -> bool {
        self.owner() == AudioOwner::Call
    }

    /// Takes focus for a call. Returns `true` if a reminder was cut off.
    pub fn claim_for_call(&self) -> bool {
        let mut state = self.lock();
        let preempted = state.owner == AudioOwner::Nag;
        if let Some(token) = state.nag_token.take() {
            token.cancel();
        }
        state.owner = AudioOwner::Call;
        preempted
    }

    pub fn release_call(&self) {
        let mut state = self.lock();
        if state.owner == AudioOwner::Call {
            state.owner = AudioOwner::Nobody;
        }
    }

    /// Takes focus for one reminder. The token is cancelled if a call
    /// claims focus before [`release_nag`](Self::release_nag).
    pub fn try_claim_for_nag(&self) -> Option<CancellationToken> {
        let mut state = self.lock();
        if state.owner == AudioOwner::Call {
            return None;
        }

        if let Some(previous) = state.nag_token.take() {
            previous.cancel();
        }

        let token = CancellationToken::new();
        state.owner = AudioOwner::Nag;
        state.nag_token = Some(token.clone());
        Some(token)
    }

    pub fn release_nag(&self) {
        let mut state = self.lock();
        if state.owner == AudioOwner::Nag {
            state.owner = AudioOwner::Nobody;
            if let Some(token) = state.nag_token.take() {
                token.cancel();
            }
        }
    }

    /// Cuts off a sounding reminder without taking focus. Returns `true` if
    /// one was playing.
    pub fn interrupt_nag(&self) -> bool {
        let mut state = self.lock();
        if state.owner != AudioOwner::Nag {
            return false;
        }
        if let Some(token) = state.nag_token.take() {
            token.cancel();
        }
        state.owner = AudioOwner::Nobody;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_preempts_sounding_nag() {
        let focus = AudioFocus::new();
        let token = focus.try_claim_for_nag().expect("focus is free");
        assert!(focus.nag_sounding());

        assert!(focus.claim_for_call());
        assert!(token.is_cancelled());
        assert!(focus.call_holds_focus());
    }

    #[test]
    fn nag_cannot_claim_during_call() {
        let focus = AudioFocus::new();
        assert!(!focus.claim_for_call());
        assert!(focus.try_claim_for_nag().is_none());

        focus.release_call();
        assert!(focus.try_claim_for_nag().is_some());
    }

    #[test]
    fn interrupting_a_nag_leaves_focus_free() {
        let focus = AudioFocus::new();
        assert!(!focus.interrupt_nag());

        let token = focus.try_claim_for_nag().expect("focus is free");
        assert!(focus.interrupt_nag());
        assert!(token.is_cancelled());
        assert_eq!(focus.owner(), AudioOwner::Nobody);
    }

    #[test]
    fn late_nag_release_keeps_call_focus() {
        let focus = AudioFocus::new();
        let _token = focus.try_claim_for_nag();
        focus.claim_for_call();
        focus.release_nag();
        assert_eq!(focus.owner(), AudioOwner::Call);
    }
}
