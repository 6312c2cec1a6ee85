use crate::fretboard::Tuning;
use crate::pitch::midi_to_note_name;
use crate::types::*;
use serde::Serialize;
use std::fmt;

/// A note currently on screen, with everything the highway needs to draw it.
#[derive(Debug, Clone, Serialize)]
pub struct HighwayNote {
    pub event: NoteEvent,
    /// Suggested fingering, None if out of range at the current max fret
    pub position: Option<FretPosition>,
    /// `event.time - now`; negative once the note has passed the hit line
    pub offset: f64,
    /// Within the hit window of the hit line
    pub near: bool,
    /// e.g. `E2 • D2`
    pub label: String,
}

impl HighwayNote {
    /// Lane on a 4-lane highway (E, A, D, G), if the note is playable.
    pub fn lane(&self) -> Option<usize> {
        self.position.map(|p| p.string.lane())
    }
}

/// Indices of the notes inside `[now - SECONDS_BEHIND, now + SECONDS_ON_SCREEN]`.
/// `notes` must be sorted by time.
pub fn visible_range(notes: &[NoteEvent], now: f64) -> std::ops::Range<usize> {
    let start = notes.partition_point(|n| n.time < now - SECONDS_BEHIND);
    let end = notes.partition_point(|n| n.time <= now + SECONDS_ON_SCREEN);
    start..end.max(start)
}

pub fn visible_notes(
    notes: &[NoteEvent],
    now: f64,
    hit_window: f64,
    tuning: &Tuning,
    max_fret: u8,
) -> Vec<HighwayNote> {
    notes[visible_range(notes, now)]
        .iter()
        .map(|ev| {
            let position = tuning.best_position(ev.midi, max_fret);
            let name = midi_to_note_name(ev.midi as f64);
            let label = match position {
                Some(p) => format!("{} • {}", name, p.short_label()),
                None => name,
            };
            HighwayNote {
                event: *ev,
                position,
                offset: ev.time - now,
                near: (ev.time - now).abs() <= hit_window,
                label,
            }
        })
        .collect()
}

/// The note the player should be sounding right now: the first visible note
/// within `hit_window` of `now`.
pub fn current_target(notes: &[NoteEvent], now: f64, hit_window: f64) -> Option<&NoteEvent> {
    notes[visible_range(notes, now)]
        .iter()
        .find(|ev| (ev.time - now).abs() <= hit_window)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Verdict {
    Hit {
        midi: u8,
        note: String,
    },
    Miss {
        target_midi: u8,
        /// Target name with its suggested fingering
        target: String,
        played_midi: i32,
        /// What the player actually sounded
        played: String,
    },
}

impl Verdict {
    pub fn is_hit(&self) -> bool {
        matches!(self, Verdict::Hit { .. })
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Hit { note, .. } => write!(f, "HIT  {}", note),
            Verdict::Miss { target, played, .. } => {
                write!(f, "MISS  Target {} • You {}", target, played)
            }
        }
    }
}

/// Compare the detected pitch (fractional MIDI) with the target. The pitch is
/// rounded to the nearest semitone; anything but an exact match is a miss.
pub fn evaluate(target: &NoteEvent, detected_midi: f64, tuning: &Tuning, max_fret: u8) -> Verdict {
    let played = detected_midi.round() as i32;
    if played == target.midi as i32 {
        Verdict::Hit {
            midi: target.midi,
            note: midi_to_note_name(played as f64),
        }
    } else {
        Verdict::Miss {
            target_midi: target.midi,
            target: tuning.describe(target.midi, max_fret),
            played_midi: played,
            played: midi_to_note_name(detected_midi),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fretboard::standard_bass;

    fn note(time: f64, midi: u8) -> NoteEvent {
        NoteEvent {
            time,
            duration: 0.4,
            midi,
            velocity: 0.8,
        }
    }

    fn song() -> Vec<NoteEvent> {
        vec![note(0.5, 40), note(1.0, 43), note(1.1, 45), note(3.0, 33), note(9.0, 28)]
    }

    #[test]
    fn test_visible_window() {
        let notes = song();
        let r = visible_range(&notes, 0.6);
        assert_eq!(r, 0..4, "0.4..4.6 holds the first four notes");
        // The note at 0.5 is more than 0.2s behind
        assert_eq!(visible_range(&notes, 0.75), 1..4);
        assert_eq!(visible_range(&notes, 20.0), 5..5);
    }

    #[test]
    fn test_visible_notes_labels_and_lanes() {
        let notes = song();
        let vis = visible_notes(&notes, 1.0, 0.18, &standard_bass(), 20);
        assert_eq!(vis[0].label, "G2 • G0");
        assert_eq!(vis[0].lane(), Some(3));
        assert!(vis[0].near);
        assert!(vis[1].near, "0.1s ahead is inside 180ms");
        assert!(!vis[2].near);
        assert!((vis[1].offset - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_target_is_first_near_note() {
        let notes = song();
        assert_eq!(current_target(&notes, 1.05, 0.18).unwrap().midi, 43);
        assert_eq!(current_target(&notes, 1.15, 0.18).unwrap().midi, 43);
        assert_eq!(current_target(&notes, 1.25, 0.18).unwrap().midi, 45);
        assert!(current_target(&notes, 2.0, 0.18).is_none());
    }

    #[test]
    fn test_target_window_edges() {
        let notes = vec![note(2.0, 40)];
        assert!(current_target(&notes, 1.82, 0.18).is_some());
        assert!(current_target(&notes, 1.8, 0.18).is_none());
    }

    #[test]
    fn test_hit_rounds_detected_pitch() {
        let v = evaluate(&note(0.0, 40), 40.3, &standard_bass(), 20);
        assert!(v.is_hit());
        assert_eq!(v.to_string(), "HIT  E2");
    }

    #[test]
    fn test_miss_reports_target_and_played() {
        let v = evaluate(&note(0.0, 40), 41.2, &standard_bass(), 20);
        assert_eq!(
            v,
            Verdict::Miss {
                target_midi: 40,
                target: "E2 (D string • fret 2)".into(),
                played_midi: 41,
                played: "F2".into(),
            }
        );
        assert_eq!(v.to_string(), "MISS  Target E2 (D string • fret 2) • You F2");
    }

    #[test]
    fn test_octave_error_is_a_miss() {
        assert!(!evaluate(&note(0.0, 45), 33.0, &standard_bass(), 20).is_hit());
    }
}
