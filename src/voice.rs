use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::ports::VoiceAnnouncer;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_debug;

/// Speaks through an external text-to-speech program (`say`, `espeak-ng`, …),
/// one utterance at a time. A new utterance cuts off the previous one.
pub struct SpeechCommand {
    program: String,
    args: Vec<String>,
    current: Mutex<Option<CancellationToken>>,
}

impl SpeechCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            current: Mutex::new(None),
        }
    }

    /// The platform's usual speech program.
    pub fn system_default() -> Self {
        if cfg!(target_os = "macos") {
            Self::new("say", Vec::new())
        } else {
            Self::new("espeak-ng", vec!["-s".into(), "140".into()])
        }
    }

    fn current(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl VoiceAnnouncer for SpeechCommand {
    async fn speak(&self, text: &str) -> Result<()> {
        let token = CancellationToken::new();
        if let Some(previous) = self.current().replace(token.clone()) {
            previous.cancel();
        }

        log_debug!("speaking via {}: {text}", self.program);

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start speech program {}", self.program))?;

        tokio::select! {
            status = child.wait() => {
                let status = status.context("speech program did not run to completion")?;
                if !status.success() {
                    bail!("speech program {} exited with {status}", self.program);
                }
            }
            _ = token.cancelled() => {
                let _ = child.kill().await;
                log_debug!("speech cut off");
            }
        }

        Ok(())
    }

    fn stop(&self) {
        if let Some(token) = self.current().take() {
            token.cancel();
        }
    }
}
