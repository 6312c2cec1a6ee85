use crate::fretboard::Tuning;
use crate::pitch::{cents_off, freq_to_midi, midi_to_freq, midi_to_note_name};
use crate::types::*;
use serde::Serialize;
use std::fmt;

/// How many alternative fingerings to list after the best one.
const MAX_ALTERNATES: usize = 3;

/// Tuner readout for one accepted pitch estimate.
#[derive(Debug, Clone, Serialize)]
pub struct TunerReading {
    pub freq: f64,
    /// Fractional MIDI note number of `freq`
    pub midi: f64,
    /// Nearest semitone
    pub target_midi: i32,
    pub note: String,
    /// Distance from the nearest semitone, positive = sharp
    pub cents: f64,
    pub best: Option<FretPosition>,
    pub alternates: Vec<FretPosition>,
    pub max_fret: u8,
}

impl TunerReading {
    /// Build a readout, or None if the estimate has no pitch or is below
    /// `min_confidence`.
    pub fn from_estimate(
        estimate: &PitchEstimate,
        min_confidence: f32,
        tuning: &Tuning,
        max_fret: u8,
    ) -> Option<Self> {
        let freq = estimate.accepted(min_confidence)?;
        let midi = freq_to_midi(freq);
        let target_midi = midi.round() as i32;
        let cents = cents_off(freq, midi_to_freq(target_midi as f64));

        let mut positions = if (0..=127).contains(&target_midi) {
            tuning.positions_for(target_midi as u8, max_fret)
        } else {
            Vec::new()
        };
        let best = if positions.is_empty() {
            None
        } else {
            Some(positions.remove(0))
        };
        positions.truncate(MAX_ALTERNATES);

        Some(Self {
            freq,
            midi,
            target_midi,
            note: midi_to_note_name(target_midi as f64),
            cents,
            best,
            alternates: positions,
            max_fret,
        })
    }

    /// Needle position as a percentage of the meter width: 50 is in tune,
    /// 0 and 100 are 50 cents flat and sharp.
    pub fn needle_percent(&self) -> f64 {
        50.0 + self.cents.clamp(-50.0, 50.0)
    }

    pub fn position_text(&self) -> String {
        match self.best {
            Some(p) => p.to_string(),
            None => format!("Out of range (max fret {})", self.max_fret),
        }
    }

    pub fn alternates_text(&self) -> Option<String> {
        if self.alternates.is_empty() {
            return None;
        }
        let alts: Vec<String> = self.alternates.iter().map(|p| p.to_string()).collect();
        Some(format!("Also: {}", alts.join(" • ")))
    }
}

impl fmt::Display for TunerReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.cents >= 0.0 { "+" } else { "" };
        write!(
            f,
            "{:<4} {:>7.2} Hz  {}{:.1} cents  {}",
            self.note,
            self.freq,
            sign,
            self.cents,
            self.position_text()
        )
    }
}
