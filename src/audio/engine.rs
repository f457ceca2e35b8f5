use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::error;
use rodio::{OutputStream, Sink, Source};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::{self, Sender},
    Arc, Mutex,
};
use std::thread;

use super::tones::{Cue, ToneSequence};
use crate::ports::SignalPlayer;

enum AudioCommand {
    Start(Cue),
    PlayOnce(Cue),
    Stop,
    SetVolume(f32),
}

/// Plays cues on the default output device.
///
/// rodio's stream is not `Send`, so it lives on a dedicated thread and the
/// handle only sends commands to it.
pub struct ToneEngine {
    tx: Arc<Mutex<Option<Sender<AudioCommand>>>>,
    is_playing: Arc<AtomicBool>,
}

impl Default for ToneEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ToneEngine {
    pub fn new() -> Self {
        Self {
            tx: Arc::new(Mutex::new(None)),
            is_playing: Arc::new(AtomicBool::new(false)),
        }
    }

    fn ensure_thread(&self) -> Result<Sender<AudioCommand>> {
        let mut guard = self
            .tx
            .lock()
            .map_err(|e| anyhow!("audio handle poisoned: {e}"))?;
        if let Some(tx) = guard.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<AudioCommand>();
        let is_playing = Arc::clone(&self.is_playing);

        thread::Builder::new()
            .name("tone-engine".to_string())
            .spawn(move || {
                let mut _stream: Option<OutputStream> = None;
                let mut sink: Option<Sink> = None;
                let mut volume: f32 = 1.0;

                fn fresh_sink(
                    stream: &mut Option<OutputStream>,
                    sink: &mut Option<Sink>,
                    volume: f32,
                ) -> Result<(), String> {
                    if let Some(old) = sink.take() {
                        old.stop();
                    }
                    let (s, handle) = OutputStream::try_default()
                        .map_err(|e| format!("Failed to create audio output stream: {}", e))?;
                    let new_sink = Sink::try_new(&handle)
                        .map_err(|e| format!("Failed to create audio sink: {}", e))?;
                    new_sink.set_volume(volume);
                    *stream = Some(s);
                    *sink = Some(new_sink);
                    Ok(())
                }

                while let Ok(cmd) = rx.recv() {
                    let (cue, looping) = match cmd {
                        AudioCommand::Start(cue) => (cue, cue.loops()),
                        AudioCommand::PlayOnce(cue) => (cue, false),
                        AudioCommand::Stop => {
                            if let Some(s_old) = sink.take() {
                                s_old.stop();
                            }
                            _stream = None;
                            is_playing.store(false, Ordering::SeqCst);
                            continue;
                        }
                        AudioCommand::SetVolume(v) => {
                            volume = v.clamp(0.0, 1.0);
                            if let Some(ref s) = sink {
                                s.set_volume(volume);
                            }
                            continue;
                        }
                    };

                    if let Err(err) = fresh_sink(&mut _stream, &mut sink, volume) {
                        error!("{err}");
                        is_playing.store(false, Ordering::SeqCst);
                        continue;
                    }
                    if let Some(ref s) = sink {
                        if looping {
                            s.append(ToneSequence::new(cue).repeat_infinite());
                        } else {
                            s.append(ToneSequence::new(cue));
                        }
                        is_playing.store(true, Ordering::SeqCst);
                    }
                }
            })
            .map_err(|e| anyhow!("failed to spawn audio thread: {e}"))?;

        *guard = Some(tx.clone());
        Ok(tx)
    }

    fn send(&self, command: AudioCommand) -> Result<()> {
        let tx = self.ensure_thread()?;
        tx.send(command)
            .map_err(|e| anyhow!("audio thread is gone: {e}"))
    }

    pub fn set_volume(&self, volume: f32) -> Result<()> {
        self.send(AudioCommand::SetVolume(volume))
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalPlayer for ToneEngine {
    fn start(&self, cue: Cue) -> Result<()> {
        self.send(AudioCommand::Start(cue))
    }

    async fn play_once(&self, cue: Cue) -> Result<()> {
        self.send(AudioCommand::PlayOnce(cue))?;
        tokio::time::sleep(cue.duration()).await;
        Ok(())
    }

    fn stop(&self) {
        if let Ok(Some(tx)) = self.tx.lock().map(|g| g.clone()) {
            let _ = tx.send(AudioCommand::Stop);
        }
    }
}
