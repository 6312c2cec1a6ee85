use crate::pitch::midi_to_freq;
use crate::types::*;
use crossbeam_channel::Sender;
use log::{debug, info};
use std::f64::consts::TAU;
use std::thread;
use std::time::Duration;

/// Peak level of the synthetic tone.
const AMPLITUDE: f64 = 0.5;
/// Relative level of the 2nd harmonic in the synthetic tone.
const SECOND_HARMONIC: f64 = 0.3;
/// Vibrato depth (fraction of the note frequency) and rate in Hz. Without
/// it the estimator can lock onto a multiple of the period.
const VIBRATO_DEPTH: f64 = 0.006;
const VIBRATO_HZ: f64 = 5.5;
/// Attack and release ramp, seconds.
const EDGE_SECS: f64 = 0.005;
/// Each open string is held this long in the tuner demo.
const OPEN_STRING_SECS: f64 = 1.5;

/// One note of the performance, in performer seconds.
#[derive(Debug, Clone, Copy)]
struct ScheduledNote {
    start: f64,
    end: f64,
    midi: u8,
}

/// A synthetic bass player: renders a note list as audio.
///
/// Note times are divided by the speed factor, so a performer at 0.5× plays
/// the song twice as long. Rendering is driven by a sample counter, not a wall
/// clock, and the oscillator phase carries across notes and calls, so chunked
/// output is identical to rendering in one go.
pub struct Performer {
    notes: Vec<ScheduledNote>,
    sample_rate: u32,
    sample_counter: u64,
    phase: f64,
    /// Index of the newest note that has started
    cursor: usize,
}

impl Performer {
    pub fn new(notes: &[NoteEvent], speed: f64, sample_rate: u32) -> Self {
        let speed = if speed > 0.0 { speed } else { 1.0 };
        let mut scheduled: Vec<ScheduledNote> = notes
            .iter()
            .map(|n| ScheduledNote {
                start: n.time / speed,
                end: n.end() / speed,
                midi: n.midi,
            })
            .collect();
        scheduled.sort_by(|a, b| a.start.total_cmp(&b.start));
        Self {
            notes: scheduled,
            sample_rate,
            sample_counter: 0,
            phase: 0.0,
            cursor: 0,
        }
    }

    /// E, A, D, G open strings in turn, `rounds` times over.
    pub fn open_strings(rounds: usize, sample_rate: u32) -> Self {
        let cycle = BassString::ALL.len();
        let notes: Vec<NoteEvent> = (0..rounds * cycle)
            .map(|i| NoteEvent {
                time: i as f64 * OPEN_STRING_SECS,
                duration: OPEN_STRING_SECS,
                midi: 28 + 5 * (i % cycle) as u8,
                velocity: 0.8,
            })
            .collect();
        Self::new(&notes, 1.0, sample_rate)
    }

    /// Play every `n`th note (1-based) a semitone sharp.
    pub fn with_wrong_every(mut self, n: usize) -> Self {
        if n > 0 {
            for (i, note) in self.notes.iter_mut().enumerate() {
                if (i + 1) % n == 0 {
                    note.midi = note.midi.saturating_add(1);
                }
            }
        }
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Seconds of audio rendered so far.
    pub fn position_secs(&self) -> f64 {
        self.sample_counter as f64 / self.sample_rate as f64
    }

    /// Length of the performance in seconds.
    pub fn duration(&self) -> f64 {
        self.notes.iter().map(|n| n.end).fold(0.0, f64::max)
    }

    pub fn finished(&self) -> bool {
        self.position_secs() >= self.duration()
    }

    /// MIDI note sounding at performer time `t`, if any.
    pub fn sounding_at(&self, t: f64) -> Option<u8> {
        self.notes
            .iter()
            .rev()
            .find(|n| n.start <= t)
            .filter(|n| t < n.end)
            .map(|n| n.midi)
    }

    /// Render the next `n` samples.
    pub fn render(&mut self, n: usize) -> Vec<f32> {
        let sr = self.sample_rate as f64;
        let mut out = Vec::with_capacity(n);

        for _ in 0..n {
            let t = self.sample_counter as f64 / sr;
            while self.cursor + 1 < self.notes.len() && self.notes[self.cursor + 1].start <= t {
                self.cursor += 1;
            }

            let sample = match self.notes.get(self.cursor) {
                Some(note) if note.start <= t && t < note.end => {
                    let freq = midi_to_freq(note.midi as f64)
                        * (1.0 + VIBRATO_DEPTH * (TAU * VIBRATO_HZ * t).sin());
                    self.phase = (self.phase + TAU * freq / sr) % TAU;
                    let env = smoothstep((t - note.start) / EDGE_SECS)
                        * smoothstep((note.end - t) / EDGE_SECS);
                    let v = self.phase.sin() + SECOND_HARMONIC * (2.0 * self.phase).sin();
                    AMPLITUDE * env * v / (1.0 + SECOND_HARMONIC)
                }
                _ => 0.0,
            };
            out.push(sample as f32);
            self.sample_counter += 1;
        }

        out
    }
}

/// Streams a `Performer` as `InputEvent::Audio` chunks at real-time pace.
pub struct Simulator {
    clock: SessionClock,
    tx: Sender<InputEvent>,
    performer: Performer,
    /// Samples per chunk
    chunk_size: usize,
    /// Start over when the performance ends
    repeat: bool,
}

impl Simulator {
    pub fn new(clock: SessionClock, tx: Sender<InputEvent>, performer: Performer) -> Self {
        let chunk_size = (performer.sample_rate() / 100) as usize;
        Self {
            clock,
            tx,
            performer,
            chunk_size: chunk_size.max(1),
            repeat: false,
        }
    }

    /// Restart from the beginning whenever the performance runs out.
    pub fn with_repeat(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Blocks the calling thread until the performance is over (or forever with
    /// `repeat`), or until the receiver hangs up.
    pub fn run(&mut self) {
        info!(
            "Simulator starting: {:.1}s of audio at {} Hz",
            self.performer.duration(),
            self.performer.sample_rate()
        );
        let chunk_dur = Duration::from_secs_f64(self.chunk_size as f64 / self.performer.sample_rate() as f64);
        let mut chunks: u64 = 0;

        loop {
            if self.performer.finished() {
                if !self.repeat {
                    break;
                }
                debug!("Simulator: performance over, starting again");
                self.performer.sample_counter = 0;
                self.performer.cursor = 0;
            }

            let chunk = AudioChunk {
                timestamp_us: self.clock.now_us(),
                samples: self.performer.render(self.chunk_size),
                sample_rate: self.performer.sample_rate(),
            };
            if self.tx.send(InputEvent::Audio(chunk)).is_err() {
                debug!("Simulator: receiver gone");
                break;
            }
            chunks += 1;
            thread::sleep(chunk_dur);
        }

        info!("Simulator finished after {} chunks", chunks);
    }
}

/// Smooth interpolation (ease in/out), clamped to 0..1
fn smoothstep(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}
