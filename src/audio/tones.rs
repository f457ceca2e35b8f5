use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::time::Duration;

const SAMPLE_RATE: u32 = 44100;
const AMPLITUDE: f32 = 0.3;

/// Audible cues the phone can play.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Cue {
    /// Two bells and a pause, looped while an incoming call rings.
    Ringtone,
    /// Tannoy-style bing-bong played before a missed-call reminder.
    Chime,
}

#[derive(Debug, Clone, Copy)]
struct Note {
    /// Zero is a rest.
    freq_hz: f32,
    duration_ms: u32,
}

const RINGTONE: &[Note] = &[
    Note { freq_hz: 987.77, duration_ms: 400 },
    Note { freq_hz: 0.0, duration_ms: 100 },
    Note { freq_hz: 987.77, duration_ms: 400 },
    Note { freq_hz: 0.0, duration_ms: 1600 },
];

const CHIME: &[Note] = &[
    Note { freq_hz: 659.25, duration_ms: 600 },
    Note { freq_hz: 523.25, duration_ms: 900 },
];

impl Cue {
    fn notes(&self) -> &'static [Note] {
        match self {
            Cue::Ringtone => RINGTONE,
            Cue::Chime => CHIME,
        }
    }

    pub fn loops(&self) -> bool {
        matches!(self, Cue::Ringtone)
    }

    /// Length of one pass through the cue.
    pub fn duration(&self) -> Duration {
        let total_ms: u64 = self.notes().iter().map(|n| n.duration_ms as u64).sum();
        Duration::from_millis(total_ms)
    }
}

/// Mono sample generator for a [`Cue`]; each note is a sine with a bell-like
/// decay so consecutive notes don't click.
#[derive(Debug, Clone)]
pub struct ToneSequence {
    notes: &'static [Note],
    sample_rate: u32,
    note_index: usize,
    sample_in_note: usize,
}

impl ToneSequence {
    pub fn new(cue: Cue) -> Self {
        Self {
            notes: cue.notes(),
            sample_rate: SAMPLE_RATE,
            note_index: 0,
            sample_in_note: 0,
        }
    }

    fn note_samples(&self, note: &Note) -> usize {
        (self.sample_rate as u64 * note.duration_ms as u64 / 1000) as usize
    }
}

impl Iterator for ToneSequence {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let note = *self.notes.get(self.note_index)?;
            let total = self.note_samples(&note);

            if self.sample_in_note >= total {
                self.note_index += 1;
                self.sample_in_note = 0;
                continue;
            }

            let t = self.sample_in_note as f32 / self.sample_rate as f32;
            let progress = self.sample_in_note as f32 / total as f32;
            self.sample_in_note += 1;

            if note.freq_hz <= 0.0 {
                return Some(0.0);
            }

            let envelope = (1.0 - progress).powi(2);
            return Some((2.0 * PI * note.freq_hz * t).sin() * envelope * AMPLITUDE);
        }
    }
}

#[cfg(feature = "device-audio")]
impl rodio::Source for ToneSequence {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        1 // Mono
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        let total_ms: u64 = self.notes.iter().map(|n| n.duration_ms as u64).sum();
        Some(Duration::from_millis(total_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_length_matches_cue_duration() {
        let expected = (SAMPLE_RATE as u128 * Cue::Chime.duration().as_millis() / 1000) as usize;
        assert_eq!(ToneSequence::new(Cue::Chime).count(), expected);
    }

    #[test]
    fn samples_stay_within_amplitude() {
        assert!(ToneSequence::new(Cue::Ringtone).all(|s| s.abs() <= AMPLITUDE));
    }

    #[test]
    fn only_the_ringtone_loops() {
        assert!(Cue::Ringtone.loops());
        assert!(!Cue::Chime.loops());
        assert_eq!(Cue::Ringtone.duration(), Duration::from_millis(2500));
    }
}
