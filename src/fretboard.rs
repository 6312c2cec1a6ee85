use crate::pitch::midi_to_note_name;
use crate::types::*;
use serde::{Deserialize, Serialize};

/// Default highest fret considered playable.
pub const DEFAULT_MAX_FRET: u8 = 20;

/// Open-string pitches as MIDI note numbers, low string first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tuning {
    pub name: String,
    pub strings: [(BassString, u8); 4],
}

/// Standard 4-string bass: E1 A1 D2 G2.
pub fn standard_bass() -> Tuning {
    Tuning {
        name: "Standard EADG".to_string(),
        //         E1                   A1                   D2                   G2
        strings: [(BassString::E, 28), (BassString::A, 33), (BassString::D, 38), (BassString::G, 43)],
    }
}

impl Tuning {
    pub fn open_pitch(&self, string: BassString) -> u8 {
        self.strings
            .iter()
            .find(|(s, _)| *s == string)
            .map(|&(_, midi)| midi)
            .unwrap_or(0)
    }

    /// Every place `midi` can be fretted at or below `max_fret`, lowest fret
    /// first. Equal frets prefer the higher string (G, D, A, E) since it
    /// keeps the hand closer to where bass lines usually sit.
    pub fn positions_for(&self, midi: u8, max_fret: u8) -> Vec<FretPosition> {
        let mut positions: Vec<FretPosition> = self
            .strings
            .iter()
            .filter_map(|&(string, open)| {
                let fret = midi as i16 - open as i16;
                (0..=max_fret as i16).contains(&fret).then(|| FretPosition {
                    string,
                    fret: fret as u8,
                })
            })
            .collect();
        positions.sort_by_key(|p| (p.fret, p.string.preference_rank()));
        positions
    }

    pub fn best_position(&self, midi: u8, max_fret: u8) -> Option<FretPosition> {
        self.positions_for(midi, max_fret).into_iter().next()
    }

    pub fn is_playable(&self, midi: u8, max_fret: u8) -> bool {
        self.best_position(midi, max_fret).is_some()
    }

    /// Note name plus suggested position, e.g. `E2 (A string • fret 7)`.
    pub fn describe(&self, midi: u8, max_fret: u8) -> String {
        let name = midi_to_note_name(midi as f64);
        match self.best_position(midi, max_fret) {
            Some(p) => format!("{} ({})", name, p),
            None => name,
        }
    }
}

/// Positions on a standard-tuned bass.
pub fn positions_for(midi: u8, max_fret: u8) -> Vec<FretPosition> {
    standard_bass().positions_for(midi, max_fret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_strings() {
        let t = standard_bass();
        assert_eq!(t.open_pitch(BassString::E), 28);
        assert_eq!(t.open_pitch(BassString::G), 43);
        assert_eq!(
            positions_for(28, 20),
            vec![FretPosition { string: BassString::E, fret: 0 }]
        );
    }

    #[test]
    fn test_sorted_by_fret_then_string_preference() {
        // G2 (43): G0, D5, A10, E15
        let pos = positions_for(43, 20);
        let labels: Vec<String> = pos.iter().map(FretPosition::short_label).collect();
        assert_eq!(labels, vec!["G0", "D5", "A10", "E15"]);
    }

    #[test]
    fn test_ordering_property_across_range() {
        for midi in 20..80u8 {
            for max_fret in [0u8, 5, 12, 20, 24] {
                let pos = positions_for(midi, max_fret);
                assert!(pos.iter().all(|p| p.fret <= max_fret));
                for w in pos.windows(2) {
                    let a = (w[0].fret, w[0].string.preference_rank());
                    let b = (w[1].fret, w[1].string.preference_rank());
                    assert!(a < b, "midi {} max {}: {:?}", midi, max_fret, pos);
                }
            }
        }
    }

    #[test]
    fn test_max_fret_limits() {
        // D#3 (51): G8, D13, A18, E23
        assert_eq!(positions_for(51, 20).len(), 3);
        assert_eq!(positions_for(51, 12).len(), 1);
        assert!(positions_for(51, 7).is_empty());
    }

    #[test]
    fn test_unplayable_pitches() {
        assert!(positions_for(27, 20).is_empty(), "below open E");
        assert!(positions_for(64, 20).is_empty(), "above G string fret 20");
        assert!(!standard_bass().is_playable(100, 24));
    }

    #[test]
    fn test_describe() {
        let t = standard_bass();
        assert_eq!(t.describe(40, 20), "E2 (D string • fret 2)");
        assert_eq!(t.describe(70, 20), "A#4");
    }
}
