pub mod focus;
pub mod tones;

#[cfg(feature = "device-audio")]
mod engine;

use anyhow::Result;
use async_trait::async_trait;
use log::info;

use crate::ports::SignalPlayer;

pub use focus::{AudioFocus, AudioOwner};
pub use tones::{Cue, ToneSequence};

#[cfg(feature = "device-audio")]
pub use engine::ToneEngine;

/// Signal player for builds without an output device; it only logs.
#[derive(Debug, Default)]
pub struct SilentPlayer;

#[async_trait]
impl SignalPlayer for SilentPlayer {
    fn start(&self, cue: Cue) -> Result<()> {
        info!("(silent) start {:?}", cue);
        Ok(())
    }

    async fn play_once(&self, cue: Cue) -> Result<()> {
        info!("(silent) play {:?}", cue);
        Ok(())
    }

    fn stop(&self) {}
}
