//! Reduce a generic MIDI note list to something playable on a 4-string bass.

use crate::fretboard::Tuning;
use crate::types::NoteEvent;

/// Notes starting within this many seconds of a group's first note are
/// treated as one chord.
pub const SIMULTANEITY_SECS: f64 = 0.03;

/// Drop notes with no fretboard position; optionally collapse near-simultaneous
/// notes to the lowest one.
///
/// With `lowest_only`, events are sorted by `(time, midi)` and grouped greedily:
/// an event joins the current group while it is within 30 ms of the group's
/// first event. Each group contributes its lowest pitch.
pub fn filter_playable(
    events: &[NoteEvent],
    tuning: &Tuning,
    max_fret: u8,
    lowest_only: bool,
) -> Vec<NoteEvent> {
    let mut playable: Vec<NoteEvent> = events
        .iter()
        .filter(|ev| tuning.is_playable(ev.midi, max_fret))
        .copied()
        .collect();

    if !lowest_only {
        return playable;
    }

    playable.sort_by(|a, b| a.time.total_cmp(&b.time).then(a.midi.cmp(&b.midi)));

    let mut reduced: Vec<NoteEvent> = Vec::with_capacity(playable.len());
    let mut group_start: Option<f64> = None;

    for ev in playable {
        match group_start {
            Some(t0) if (ev.time - t0).abs() <= SIMULTANEITY_SECS => {
                // Sorted by (time, midi) but a later onset can still be lower
                if let Some(lowest) = reduced.last_mut() {
                    if ev.midi < lowest.midi {
                        *lowest = ev;
                    }
                }
            }
            _ => {
                group_start = Some(ev.time);
                reduced.push(ev);
            }
        }
    }

    reduced
}
