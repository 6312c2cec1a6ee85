use crate::dsp::{compute_rms, normalized_autocorrelation, remove_dc};
use crate::types::{AudioChunk, PitchEstimate, ANALYSIS_FRAME};
use log::trace;

/// Lowest fundamental searched. Below E1 (41.2 Hz) with some room for flat tuning.
pub const MIN_FREQ: f64 = 35.0;
/// Highest fundamental searched. Covers the 20th fret of the G string.
pub const MAX_FREQ: f64 = 400.0;
/// Frames quieter than this are treated as silence.
pub const SILENCE_RMS: f32 = 0.003;

/// Monophonic fundamental estimator for bass signals.
///
/// # How it works
///
/// Normalized autocorrelation over every lag between `sr/400` and `sr/35`.
/// Normalizing each lag by the energy of its own overlap keeps long lags
/// (low notes) from being penalized for their shorter overlap, which is what
/// makes this usable down at the bottom of a bass where FFT bins are too
/// coarse and zero-crossings are fooled by strong 2nd harmonics.
///
/// The best integer lag is refined with a parabola through its neighbours,
/// giving sub-sample period resolution without oversampling.
///
/// # Buffering
///
/// Audio is pushed in whatever chunk size the capture device delivers. Only
/// the newest `ANALYSIS_FRAME` samples are kept; older audio is discarded,
/// there is no history of frames.
pub struct PitchEstimator {
    /// Newest samples, at most `frame_len`
    audio_buf: Vec<f32>,
    /// Samples per analysis frame
    pub frame_len: usize,
    /// Cached sample rate from the last chunk
    sample_rate: u32,
}

impl PitchEstimator {
    pub fn new() -> Self {
        Self {
            audio_buf: Vec::with_capacity(ANALYSIS_FRAME * 2),
            frame_len: ANALYSIS_FRAME,
            sample_rate: 44100,
        }
    }

    /// Push new audio samples into the internal buffer.
    pub fn push_audio(&mut self, chunk: &AudioChunk) {
        self.sample_rate = chunk.sample_rate;
        self.audio_buf.extend_from_slice(&chunk.samples);

        if self.audio_buf.len() > self.frame_len {
            let excess = self.audio_buf.len() - self.frame_len;
            self.audio_buf.drain(..excess);
        }
    }

    /// True once a full frame has been buffered.
    pub fn ready(&self) -> bool {
        self.audio_buf.len() >= self.frame_len
    }

    /// Estimate the pitch of the most recent frame. Until a full frame has
    /// arrived this reports no pitch.
    pub fn analyze(&self) -> PitchEstimate {
        if !self.ready() {
            return PitchEstimate::none(compute_rms(&self.audio_buf));
        }
        estimate(&self.audio_buf, self.sample_rate as f64)
    }
}

impl Default for PitchEstimator {
    fn default() -> Self {
        Self::new()
    }
}

/// Estimate the fundamental of one frame. Never fails: silence, DC, or an
/// aperiodic frame all come back as `freq: None, confidence: 0`.
pub fn estimate(samples: &[f32], sample_rate: f64) -> PitchEstimate {
    let rms = compute_rms(samples);
    if rms < SILENCE_RMS || sample_rate <= 0.0 {
        return PitchEstimate::none(rms);
    }

    let x = remove_dc(samples);

    let min_lag = ((sample_rate / MAX_FREQ).floor() as usize).max(1);
    let max_lag = ((sample_rate / MIN_FREQ).floor() as usize).min(x.len().saturating_sub(1));
    if min_lag > max_lag {
        return PitchEstimate::none(rms);
    }

    let mut best: Option<(usize, f64)> = None;
    for lag in min_lag..=max_lag {
        if let Some(corr) = normalized_autocorrelation(&x, lag) {
            if best.map_or(true, |(_, c)| corr > c) {
                best = Some((lag, corr));
            }
        }
    }

    let Some((best_lag, best_corr)) = best else {
        return PitchEstimate::none(rms);
    };

    // Neighbours for the parabola; at a search bound reuse the peak itself
    let corr_at = |lag: usize| normalized_autocorrelation(&x, lag).unwrap_or(best_corr);
    let c0 = if best_lag > min_lag { corr_at(best_lag - 1) } else { best_corr };
    let c2 = if best_lag < max_lag { corr_at(best_lag + 1) } else { best_corr };

    let denom = 2.0 * best_corr - c0 - c2;
    let shift = if denom.abs() > 1e-6 {
        (c2 - c0) / (2.0 * denom)
    } else {
        0.0
    };
    let refined_lag = best_lag as f64 + shift;

    let freq = sample_rate / refined_lag;
    let confidence = ((best_corr - 0.2) / 0.8).clamp(0.0, 1.0) as f32;

    trace!(
        "pitch: lag={} refined={:.3} corr={:.4} → {:.2} Hz conf={:.2} rms={:.4}",
        best_lag,
        refined_lag,
        best_corr,
        freq,
        confidence,
        rms
    );

    PitchEstimate {
        freq: Some(freq),
        confidence,
        rms,
    }
}

/// Hz to fractional MIDI note number. A4 = MIDI 69 = 440 Hz.
pub fn freq_to_midi(freq: f64) -> f64 {
    69.0 + 12.0 * (freq / 440.0).log2()
}

/// Fractional MIDI note number to Hz.
pub fn midi_to_freq(midi: f64) -> f64 {
    440.0 * 2.0_f64.powf((midi - 69.0) / 12.0)
}

const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Name of the nearest semitone, e.g. 40.2 → "E2".
pub fn midi_to_note_name(midi: f64) -> String {
    let m = midi.round() as i64;
    let name = NOTE_NAMES[m.rem_euclid(12) as usize];
    let octave = m.div_euclid(12) - 1;
    format!("{}{}", name, octave)
}

/// Signed distance in cents; positive means `freq` is sharp of `target_freq`.
pub fn cents_off(freq: f64, target_freq: f64) -> f64 {
    1200.0 * (freq / target_freq).log2()
}
