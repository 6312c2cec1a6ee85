//! Practice settings as one serializable struct.
//!
//! Loaded from an optional JSON file, then overridden field by field from
//! the command line. Every core call takes what it needs from here instead
//! of reading controls itself.

use crate::fretboard::DEFAULT_MAX_FRET;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

pub const MIN_SPEED: f64 = 0.25;
pub const MAX_SPEED: f64 = 2.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PracticeConfig {
    /// Highest fret a note may be mapped to
    pub max_fret: u8,
    /// Timing tolerance around the hit line, milliseconds
    pub hit_window_ms: u32,
    /// Estimates below this confidence are not treated as a played note
    pub min_confidence: f32,
    /// Drop notes that cannot be played on the bass
    pub bass_only: bool,
    /// Collapse chords to their lowest note (only with `bass_only`)
    pub lowest_only: bool,
    /// Playback rate, 1.0 = written tempo
    pub speed_factor: f64,
    /// Wrap from loop B back to loop A
    pub loop_enabled: bool,
}

impl Default for PracticeConfig {
    fn default() -> Self {
        Self {
            max_fret: DEFAULT_MAX_FRET,
            hit_window_ms: 180,
            min_confidence: 0.5,
            bass_only: true,
            lowest_only: true,
            speed_factor: 1.0,
            loop_enabled: false,
        }
    }
}

impl PracticeConfig {
    /// Load from a JSON file. Returns None if file is absent or malformed.
    pub fn load(path: &Path) -> Option<Self> {
        let data = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&data) {
            Ok(c) => {
                info!("Loaded practice config from {:?}", path);
                Some(c)
            }
            Err(e) => {
                warn!("Failed to parse config file {:?}: {}", path, e);
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        std::fs::write(path, json)?;
        info!("Practice config saved to {:?}", path);
        Ok(())
    }

    pub fn hit_window_secs(&self) -> f64 {
        self.hit_window_ms as f64 / 1000.0
    }

    /// Speed factor clamped to the supported range.
    pub fn speed(&self) -> f64 {
        clamp_speed(self.speed_factor)
    }
}

pub fn clamp_speed(speed: f64) -> f64 {
    if speed.is_nan() {
        return 1.0;
    }
    speed.clamp(MIN_SPEED, MAX_SPEED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = PracticeConfig::default();
        assert_eq!(c.max_fret, 20);
        assert!((c.hit_window_secs() - 0.18).abs() < 1e-12);
        assert!(c.bass_only && c.lowest_only);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let c: PracticeConfig = serde_json::from_str(r#"{"max_fret": 12, "speed_factor": 0.5}"#).unwrap();
        assert_eq!(c.max_fret, 12);
        assert_eq!(c.speed(), 0.5);
        assert_eq!(c.hit_window_ms, 180);
    }

    #[test]
    fn test_speed_clamped() {
        let mut c = PracticeConfig::default();
        c.speed_factor = 5.0;
        assert_eq!(c.speed(), MAX_SPEED);
        c.speed_factor = 0.0;
        assert_eq!(c.speed(), MIN_SPEED);
        assert_eq!(clamp_speed(f64::NAN), 1.0);
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("bass-coach-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("practice.json");

        let mut c = PracticeConfig::default();
        c.hit_window_ms = 120;
        c.lowest_only = false;
        c.save(&path).unwrap();

        assert_eq!(PracticeConfig::load(&path), Some(c));
        assert!(PracticeConfig::load(&dir.join("missing.json")).is_none());

        std::fs::write(&path, "{ not json").unwrap();
        assert!(PracticeConfig::load(&path).is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
