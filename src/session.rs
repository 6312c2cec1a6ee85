use crate::clock::{PlaybackClock, PlaybackState, TickOutcome, Transport};
use crate::config::PracticeConfig;
use crate::fretboard::{standard_bass, Tuning};
use crate::pitch::{freq_to_midi, PitchEstimator};
use crate::playable::filter_playable;
use crate::scoring::{current_target, evaluate, visible_notes, HighwayNote, Verdict};
use crate::tuner::TunerReading;
use crate::types::*;
use crossbeam_channel::{select, tick, Receiver};
use log::{debug, info, trace};
use std::time::Duration;

/// Everything the presentation layer needs for one rendered frame.
#[derive(Debug, Clone)]
pub struct PracticeFrame {
    pub state: PlaybackState,
    pub outcome: TickOutcome,
    /// Raw estimate for this frame, None until a full frame of audio arrived
    pub estimate: Option<PitchEstimate>,
    /// Readout of the last accepted pitch
    pub tuner: Option<TunerReading>,
    pub visible: Vec<HighwayNote>,
    pub target: Option<NoteEvent>,
    pub verdict: Option<Verdict>,
    pub score: Score,
}

/// Running hit/miss tally, one entry per judged target note.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Score {
    pub hits: u32,
    pub misses: u32,
}

impl Score {
    pub fn total(&self) -> u32 {
        self.hits + self.misses
    }
}

/// The practice loop: owns the song, the estimator and the playback clock,
/// and turns audio plus transport commands into `PracticeFrame`s.
///
/// Single-threaded. Audio and commands are pushed in between ticks; each
/// `tick` pulls the newest analysis frame, advances the clock, then picks the
/// target note and judges the held pitch against it.
///
/// # Pitch hold
///
/// The last accepted pitch (confidence at or above `min_confidence`) is kept
/// until a newer one replaces it. A quiet or noisy frame does not clear it.
///
/// # Scoring
///
/// A verdict is produced on every playing tick that has both a target and a
/// held pitch. The tally in `score()` counts each judged target once: as a hit
/// as soon as any verdict in its window hits, as a miss once its window has
/// passed without one. Targets heard with no pitch at all are not scored.
pub struct PracticeSession {
    config: PracticeConfig,
    tuning: Tuning,
    /// Decoded song as loaded, before any filtering
    song: Option<Song>,
    /// What the player is asked to play
    notes: Vec<NoteEvent>,
    estimator: PitchEstimator,
    clock: PlaybackClock,
    /// Fractional MIDI of the last accepted estimate
    held_midi: Option<f64>,
    held_reading: Option<TunerReading>,
    score: Score,
    /// Target being judged: onset time, and whether it has been hit yet
    judging: Option<(f64, bool)>,
    frame_count: u64,
}

impl PracticeSession {
    pub fn new(config: PracticeConfig) -> Self {
        let clock = PlaybackClock::new(0.0).with_speed(config.speed());
        let mut session = Self {
            config,
            tuning: standard_bass(),
            song: None,
            notes: Vec::new(),
            estimator: PitchEstimator::new(),
            clock,
            held_midi: None,
            held_reading: None,
            score: Score::default(),
            judging: None,
            frame_count: 0,
        };
        session.clock.set_loop_enabled(session.config.loop_enabled);
        session
    }

    pub fn config(&self) -> &PracticeConfig {
        &self.config
    }

    pub fn song(&self) -> Option<&Song> {
        self.song.as_ref()
    }

    /// The notes being practised, after the playability filter.
    pub fn notes(&self) -> &[NoteEvent] {
        &self.notes
    }

    pub fn score(&self) -> Score {
        self.score
    }

    pub fn state(&self, now: f64) -> PlaybackState {
        self.clock.state(now)
    }

    /// Replace the song. Playback stops and the loop and score are reset.
    pub fn load_song(&mut self, song: Song) {
        info!(
            "Loaded song: {} notes over {:.2}s ({} tracks)",
            song.notes.len(),
            song.total_duration,
            song.track_count
        );
        self.clock.stop();
        self.clock.clear_loop();
        self.clock.set_total_duration(song.total_duration);
        self.song = Some(song);
        self.score = Score::default();
        self.judging = None;
        self.refilter();
    }

    /// Apply new settings. The note list is rebuilt from the decoded song when
    /// a filter setting changed.
    pub fn set_config(&mut self, config: PracticeConfig, now: f64) {
        let refilter = config.max_fret != self.config.max_fret
            || config.bass_only != self.config.bass_only
            || config.lowest_only != self.config.lowest_only;
        self.clock.set_speed(config.speed(), now);
        self.clock.set_loop_enabled(config.loop_enabled);
        self.config = config;
        if refilter {
            self.refilter();
        }
    }

    fn refilter(&mut self) {
        let Some(song) = &self.song else {
            self.notes.clear();
            return;
        };
        self.notes = if self.config.bass_only {
            filter_playable(
                &song.notes,
                &self.tuning,
                self.config.max_fret,
                self.config.lowest_only,
            )
        } else {
            song.notes.clone()
        };
        debug!(
            "Practising {} of {} notes (bass_only={}, lowest_only={}, max_fret={})",
            self.notes.len(),
            song.notes.len(),
            self.config.bass_only,
            self.config.lowest_only,
            self.config.max_fret
        );
    }

    /// Apply one transport command. Returns false on `Quit`.
    pub fn handle(&mut self, command: Command, now: f64) -> bool {
        debug!("Command {:?} at {:.3}s", command, now);
        match command {
            Command::Play => {
                if self.song.is_some() {
                    // Resuming keeps the target being judged
                    if self.clock.transport() != Transport::Paused {
                        self.judging = None;
                    }
                    self.clock.play(now);
                }
            }
            Command::Pause => self.clock.pause(now),
            Command::TogglePause => self.clock.toggle_pause(now),
            Command::Stop => {
                self.clock.stop();
                self.judging = None;
            }
            Command::Restart => {
                self.clock.restart(now);
                self.judging = None;
            }
            Command::SetLoopA => self.clock.set_loop_start(now),
            Command::SetLoopB => self.clock.set_loop_end(now),
            Command::SetLoopEnabled(enabled) => {
                self.config.loop_enabled = enabled;
                self.clock.set_loop_enabled(enabled);
                info!("Loop {}", if enabled { "on" } else { "off" });
            }
            Command::ClearLoop => self.clock.clear_loop(),
            Command::SetSpeed(speed) => {
                self.clock.set_speed(speed, now);
                self.config.speed_factor = self.clock.state(now).speed_factor;
                info!("Speed {:.2}x", self.config.speed_factor);
            }
            Command::Quit => return false,
        }
        true
    }

    pub fn push_audio(&mut self, chunk: &AudioChunk) {
        self.estimator.push_audio(chunk);
    }

    /// One host-loop frame at wall-clock `now` (seconds).
    pub fn tick(&mut self, now: f64) -> PracticeFrame {
        self.frame_count += 1;

        let estimate = if self.estimator.ready() {
            let est = self.estimator.analyze();
            if let Some(reading) = TunerReading::from_estimate(
                &est,
                self.config.min_confidence,
                &self.tuning,
                self.config.max_fret,
            ) {
                self.held_midi = est.freq.map(freq_to_midi);
                self.held_reading = Some(reading);
            }
            Some(est)
        } else {
            None
        };

        let outcome = self.clock.tick(now);
        if matches!(outcome, TickOutcome::Wrapped | TickOutcome::Ended) {
            self.close_judging();
        }
        let state = self.clock.state(now);
        let t = state.timeline_seconds;
        let hit_window = self.config.hit_window_secs();

        let visible = visible_notes(&self.notes, t, hit_window, &self.tuning, self.config.max_fret);
        let target = current_target(&self.notes, t, hit_window).copied();

        let verdict = match (state.playing, target, self.held_midi) {
            (true, Some(target), Some(midi)) => {
                let v = evaluate(&target, midi, &self.tuning, self.config.max_fret);
                self.judge(&target, &v);
                Some(v)
            }
            (true, None, _) => {
                self.close_judging();
                None
            }
            _ => None,
        };

        if self.frame_count % 600 == 0 {
            debug!(
                "Session: {} frames, t={:.2}s, score {}/{}",
                self.frame_count,
                t,
                self.score.hits,
                self.score.total()
            );
        }
        if let Some(v) = &verdict {
            trace!("t={:.3}s {}", t, v);
        }

        PracticeFrame {
            state,
            outcome,
            estimate,
            tuner: self.held_reading.clone(),
            visible,
            target,
            verdict,
            score: self.score,
        }
    }

    fn judge(&mut self, target: &NoteEvent, verdict: &Verdict) {
        if self.judging.map(|(t, _)| t) != Some(target.time) {
            self.close_judging();
            self.judging = Some((target.time, false));
        }
        if let Some((_, hit)) = &mut self.judging {
            if verdict.is_hit() && !*hit {
                *hit = true;
                self.score.hits += 1;
            }
        }
    }

    /// The judged target's window is over: an unhit target becomes a miss.
    fn close_judging(&mut self) {
        if let Some((_, false)) = self.judging.take() {
            self.score.misses += 1;
        }
    }

    /// Drive the session from a channel of input events, rendering a frame
    /// every `frame_interval` until `Quit` arrives or all senders hang up.
    /// Returns the final score.
    pub fn run<F>(
        &mut self,
        input_rx: &Receiver<InputEvent>,
        clock: &SessionClock,
        frame_interval: Duration,
        mut on_frame: F,
    ) -> Score
    where
        F: FnMut(&PracticeFrame),
    {
        info!("Practice session running ({:.0} fps)", 1.0 / frame_interval.as_secs_f64());
        let ticker = tick(frame_interval);

        loop {
            select! {
                recv(input_rx) -> msg => match msg {
                    Ok(InputEvent::Audio(chunk)) => self.push_audio(&chunk),
                    Ok(InputEvent::Command(cmd)) => {
                        if !self.handle(cmd, clock.now_secs()) {
                            break;
                        }
                    }
                    Err(_) => break,
                },
                recv(ticker) -> _ => {
                    let frame = self.tick(clock.now_secs());
                    on_frame(&frame);
                }
            }
        }

        info!(
            "Practice session ended after {} frames: {} hits, {} misses",
            self.frame_count, self.score.hits, self.score.misses
        );
        self.score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::test_helpers::sine_wave;
    use crate::pitch::midi_to_freq;

    fn note(time: f64, midi: u8) -> NoteEvent {
        NoteEvent {
            time,
            duration: 0.5,
            midi,
            velocity: 0.8,
        }
    }

    fn song(notes: Vec<NoteEvent>) -> Song {
        let total_duration = notes.iter().map(|n| n.end()).fold(0.0, f64::max);
        Song {
            notes,
            total_duration,
            track_count: 1,
            division: 480,
            tempo_us: 500_000,
        }
    }

    fn tone(midi: f64) -> AudioChunk {
        AudioChunk {
            timestamp_us: 0,
            samples: sine_wave(midi_to_freq(midi), 0.5, 48000, ANALYSIS_FRAME),
            sample_rate: 48000,
        }
    }

    #[test]
    fn test_play_without_song_is_noop() {
        let mut s = PracticeSession::new(PracticeConfig::default());
        assert!(s.handle(Command::Play, 0.0));
        assert!(!s.state(1.0).playing);
        assert!(!s.handle(Command::Quit, 0.0));
    }

    #[test]
    fn test_load_song_filters_from_raw() {
        // A chord (E2 + G2) and an out-of-range high note
        let raw = song(vec![note(0.0, 43), note(0.01, 40), note(1.0, 90)]);
        let mut s = PracticeSession::new(PracticeConfig::default());
        s.load_song(raw);
        assert_eq!(s.notes().len(), 1);
        assert_eq!(s.notes()[0].midi, 40);

        let mut cfg = s.config().clone();
        cfg.lowest_only = false;
        s.set_config(cfg.clone(), 0.0);
        assert_eq!(s.notes().len(), 2);

        cfg.bass_only = false;
        s.set_config(cfg.clone(), 0.0);
        assert_eq!(s.notes().len(), 3);

        // Back to the defaults: rebuilt from the raw song, not the last list
        s.set_config(PracticeConfig::default(), 0.0);
        assert_eq!(s.notes().len(), 1);
        assert_eq!(s.song().unwrap().notes.len(), 3);
    }

    #[test]
    fn test_no_audio_means_no_estimate_or_verdict() {
        let mut s = PracticeSession::new(PracticeConfig::default());
        s.load_song(song(vec![note(0.0, 33)]));
        s.handle(Command::Play, 0.0);
        let f = s.tick(0.05);
        assert!(f.estimate.is_none());
        assert_eq!(f.target.map(|n| n.midi), Some(33));
        assert!(f.verdict.is_none());
    }

    #[test]
    fn test_hit_and_held_pitch() {
        let mut s = PracticeSession::new(PracticeConfig::default());
        s.load_song(song(vec![note(1.0, 38), note(2.0, 43)]));
        s.handle(Command::Play, 0.0);

        s.push_audio(&tone(38.0));
        let f = s.tick(1.0);
        assert!(f.verdict.as_ref().unwrap().is_hit());
        assert_eq!(f.tuner.as_ref().unwrap().target_midi, 38);

        // Silence does not clear the held pitch
        s.push_audio(&AudioChunk {
            timestamp_us: 0,
            samples: vec![0.0; ANALYSIS_FRAME],
            sample_rate: 48000,
        });
        let f = s.tick(2.0);
        assert_eq!(f.estimate.unwrap().freq, None);
        let v = f.verdict.unwrap();
        assert!(!v.is_hit(), "held D2 against target G2");
        assert_eq!(s.score(), Score { hits: 1, misses: 0 }, "G2 still in its window");

        let f = s.tick(3.1);
        assert_eq!(f.outcome, TickOutcome::Ended);
        assert_eq!(s.score(), Score { hits: 1, misses: 1 });
    }

    #[test]
    fn test_late_hit_in_window_counts() {
        let mut s = PracticeSession::new(PracticeConfig::default());
        s.load_song(song(vec![note(1.0, 38)]));
        s.handle(Command::Play, 0.0);

        // Still ringing the previous note as the window opens
        s.push_audio(&tone(33.0));
        assert!(!s.tick(0.85).verdict.unwrap().is_hit());
        s.push_audio(&tone(38.0));
        assert!(s.tick(1.0).verdict.unwrap().is_hit());
        assert!(s.tick(1.3).verdict.is_none());
        assert_eq!(s.score(), Score { hits: 1, misses: 0 });
    }

    #[test]
    fn test_missed_target_counted_when_window_passes() {
        let mut s = PracticeSession::new(PracticeConfig::default());
        s.load_song(song(vec![note(1.0, 38), note(3.0, 38)]));
        s.handle(Command::Play, 0.0);
        s.push_audio(&tone(33.0));
        s.tick(1.0);
        assert_eq!(s.score().total(), 0);
        s.tick(1.5);
        assert_eq!(s.score(), Score { hits: 0, misses: 1 });
    }

    #[test]
    fn test_each_target_tallied_once() {
        let mut s = PracticeSession::new(PracticeConfig::default());
        s.load_song(song(vec![note(1.0, 38)]));
        s.handle(Command::Play, 0.0);
        s.push_audio(&tone(38.0));
        for i in 0..5 {
            s.tick(0.9 + i as f64 * 0.04);
        }
        assert_eq!(s.score(), Score { hits: 1, misses: 0 });
    }

    #[test]
    fn test_no_verdict_while_paused() {
        let mut s = PracticeSession::new(PracticeConfig::default());
        s.load_song(song(vec![note(1.0, 38)]));
        s.handle(Command::Play, 0.0);
        s.handle(Command::Pause, 1.0);
        s.push_audio(&tone(38.0));
        let f = s.tick(3.0);
        assert!(f.state.paused);
        assert_eq!(f.target.map(|n| n.midi), Some(38));
        assert!(f.verdict.is_none());
    }

    #[test]
    fn test_resume_with_play_keeps_tally() {
        let mut s = PracticeSession::new(PracticeConfig::default());
        s.load_song(song(vec![note(1.0, 38)]));
        s.handle(Command::Play, 0.0);
        s.push_audio(&tone(38.0));
        assert!(s.tick(0.95).verdict.unwrap().is_hit());
        s.handle(Command::Pause, 0.96);
        s.handle(Command::Play, 5.0);
        assert!(s.tick(5.02).verdict.unwrap().is_hit());
        assert_eq!(s.score(), Score { hits: 1, misses: 0 });
    }

    #[test]
    fn test_miss_survives_pause_and_play() {
        let mut s = PracticeSession::new(PracticeConfig::default());
        s.load_song(song(vec![note(1.0, 38), note(3.0, 38)]));
        s.handle(Command::Play, 0.0);
        s.push_audio(&tone(33.0));
        s.tick(0.95);
        s.handle(Command::Pause, 0.96);
        s.handle(Command::Play, 5.0);
        // Timeline resumes at 0.96; 1.5 is past the window
        s.tick(5.54);
        assert_eq!(s.score(), Score { hits: 0, misses: 1 });
    }

    #[test]
    fn test_speed_command_updates_config() {
        let mut s = PracticeSession::new(PracticeConfig::default());
        s.load_song(song(vec![note(1.0, 38)]));
        s.handle(Command::SetSpeed(3.0), 0.0);
        assert_eq!(s.config().speed_factor, 2.0);
        s.handle(Command::SetLoopEnabled(true), 0.0);
        assert!(s.state(0.0).loop_enabled);
    }

    #[test]
    fn test_end_of_song_stops() {
        let mut s = PracticeSession::new(PracticeConfig::default());
        s.load_song(song(vec![note(0.0, 38)]));
        s.handle(Command::Play, 0.0);
        assert_eq!(s.tick(1.0).outcome, TickOutcome::Advanced);
        let f = s.tick(1.1);
        assert_eq!(f.outcome, TickOutcome::Ended);
        assert!(!f.state.playing);
    }
}
