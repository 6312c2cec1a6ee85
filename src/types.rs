use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

// ─── Note data (from the MIDI decoder) ──────────────────────────────────────

/// One timed note, flattened out of whatever track it came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// Onset, seconds from the start of the file
    pub time: f64,
    /// Seconds between note-on and the matching note-off
    pub duration: f64,
    /// MIDI pitch number (60 = middle C)
    pub midi: u8,
    /// Note-on velocity normalized to 0.0–1.0
    pub velocity: f32,
}

impl NoteEvent {
    pub fn end(&self) -> f64 {
        self.time + self.duration
    }
}

impl fmt::Display for NoteEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={:>8.3}s  dur={:.3}s  midi={:>3}  vel={:.2}",
            self.time, self.duration, self.midi, self.velocity
        )
    }
}

/// Result of decoding one Standard MIDI File.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Song {
    /// All tracks' notes, sorted by (time, midi)
    pub notes: Vec<NoteEvent>,
    /// max(time + duration) over all notes, 0.0 when there are none
    pub total_duration: f64,
    /// Number of track chunks actually read
    pub track_count: usize,
    /// Pulses per quarter note from the header
    pub division: u16,
    /// The tempo used for every tick-to-seconds conversion (µs per quarter)
    pub tempo_us: u32,
}

impl Song {
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

// ─── Fretboard ──────────────────────────────────────────────────────────────

/// The four strings of a standard bass, low to high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BassString {
    E,
    A,
    D,
    G,
}

impl BassString {
    pub const ALL: [BassString; 4] = [BassString::E, BassString::A, BassString::D, BassString::G];

    /// Tie-break rank when two positions share a fret: G first, E last.
    pub fn preference_rank(self) -> u8 {
        match self {
            BassString::G => 0,
            BassString::D => 1,
            BassString::A => 2,
            BassString::E => 3,
        }
    }

    /// Highway lane, low string on the left.
    pub fn lane(self) -> usize {
        match self {
            BassString::E => 0,
            BassString::A => 1,
            BassString::D => 2,
            BassString::G => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BassString::E => "E",
            BassString::A => "A",
            BassString::D => "D",
            BassString::G => "G",
        }
    }
}

impl fmt::Display for BassString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A place on the neck where a given pitch can be played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FretPosition {
    pub string: BassString,
    pub fret: u8,
}

impl FretPosition {
    /// Compact label used on the highway, e.g. `A7`.
    pub fn short_label(&self) -> String {
        format!("{}{}", self.string, self.fret)
    }
}

impl fmt::Display for FretPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} string • fret {}", self.string, self.fret)
    }
}

// ─── Pitch ──────────────────────────────────────────────────────────────────

/// Output of one analysis frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchEstimate {
    /// Fundamental in Hz, None when the frame is silent or aperiodic
    pub freq: Option<f64>,
    /// 0.0–1.0, derived from the autocorrelation peak height
    pub confidence: f32,
    /// Frame RMS before DC removal
    pub rms: f32,
}

impl PitchEstimate {
    pub fn none(rms: f32) -> Self {
        Self {
            freq: None,
            confidence: 0.0,
            rms,
        }
    }

    /// Frequency if the estimate clears the caller's confidence threshold.
    pub fn accepted(&self, min_confidence: f32) -> Option<f64> {
        self.freq.filter(|_| self.confidence >= min_confidence)
    }
}

// ─── Audio data ─────────────────────────────────────────────────────────────

/// A chunk of audio samples from the capture device (or simulator).
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Microseconds since session start (timestamp of first sample)
    pub timestamp_us: u64,
    /// Mono f32 samples, normalized -1.0 to 1.0
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

// ─── Transport ──────────────────────────────────────────────────────────────

/// Discrete transport/UI commands, processed one at a time between ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Play,
    Pause,
    TogglePause,
    Stop,
    Restart,
    SetLoopA,
    SetLoopB,
    SetLoopEnabled(bool),
    ClearLoop,
    SetSpeed(f64),
    Quit,
}

// ─── Inter-thread messages ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum InputEvent {
    Audio(AudioChunk),
    Command(Command),
}

// ─── Session clock ──────────────────────────────────────────────────────────

/// Monotonic wall clock for the practice session.
#[derive(Clone)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    pub fn now_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Constants ──────────────────────────────────────────────────────────────

/// Samples per analysis frame pulled from the capture buffer.
pub const ANALYSIS_FRAME: usize = 4096;

/// Seconds of upcoming notes shown on the highway.
pub const SECONDS_ON_SCREEN: f64 = 4.0;

/// Seconds of already-passed notes kept visible behind the hit line.
pub const SECONDS_BEHIND: f64 = 0.2;

/// Grace period after the last note before playback stops itself.
pub const END_GRACE_SECS: f64 = 0.5;
