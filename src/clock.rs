use crate::config::clamp_speed;
use crate::types::END_GRACE_SECS;
use log::{debug, info};
use serde::Serialize;

/// Transport state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Transport {
    Stopped,
    Playing,
    Paused,
}

/// Snapshot of everything the clock owns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlaybackState {
    /// Song position in (speed-scaled) seconds
    pub timeline_seconds: f64,
    pub playing: bool,
    pub paused: bool,
    pub speed_factor: f64,
    pub loop_start: Option<f64>,
    pub loop_end: Option<f64>,
    pub loop_enabled: bool,
}

/// What a tick did besides advancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not playing, nothing moved
    Idle,
    Advanced,
    /// Crossed loop B and jumped back to loop A
    Wrapped,
    /// Ran past the end of the song and stopped
    Ended,
}

/// Song timeline driven by a host wall clock.
///
/// While playing the position is derived, not accumulated:
/// `timeline = (now - reference) × speed`. Every command that moves the
/// timeline (resume, restart, loop wrap, speed change) does so by moving
/// `reference`, so the position never drifts and never jumps on resume.
///
/// Wall-clock time is passed in by the caller in seconds; the clock never
/// reads a system clock itself.
pub struct PlaybackClock {
    transport: Transport,
    /// Wall-clock seconds at which the timeline was (virtually) zero
    reference: f64,
    /// Position shown while stopped, held while paused
    held: f64,
    speed: f64,
    loop_start: Option<f64>,
    loop_end: Option<f64>,
    loop_enabled: bool,
    /// Length of the loaded song, for end-of-song auto-stop
    total_duration: f64,
}

impl PlaybackClock {
    pub fn new(total_duration: f64) -> Self {
        Self {
            transport: Transport::Stopped,
            reference: 0.0,
            held: 0.0,
            speed: 1.0,
            loop_start: None,
            loop_end: None,
            loop_enabled: false,
            total_duration,
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = clamp_speed(speed);
        self
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn is_playing(&self) -> bool {
        self.transport == Transport::Playing
    }

    pub fn set_total_duration(&mut self, total_duration: f64) {
        self.total_duration = total_duration;
    }

    /// Timeline position at wall-clock `now`.
    pub fn position(&self, now: f64) -> f64 {
        match self.transport {
            Transport::Playing => (now - self.reference) * self.speed,
            Transport::Paused | Transport::Stopped => self.held,
        }
    }

    pub fn state(&self, now: f64) -> PlaybackState {
        PlaybackState {
            timeline_seconds: self.position(now),
            playing: self.transport == Transport::Playing,
            paused: self.transport == Transport::Paused,
            speed_factor: self.speed,
            loop_start: self.loop_start,
            loop_end: self.loop_end,
            loop_enabled: self.loop_enabled,
        }
    }

    /// Move the playing timeline to `t` by rebasing the reference.
    fn seek(&mut self, t: f64, now: f64) {
        self.reference = now - t / self.speed;
    }

    /// Start from zero, or resume from the held position when paused.
    pub fn play(&mut self, now: f64) {
        match self.transport {
            Transport::Paused => {
                let at = self.held;
                self.seek(at, now);
                info!("Resume at {:.2}s", at);
            }
            Transport::Stopped | Transport::Playing => {
                self.held = 0.0;
                self.seek(0.0, now);
                info!("Play from start");
            }
        }
        self.transport = Transport::Playing;
    }

    pub fn pause(&mut self, now: f64) {
        if self.transport != Transport::Playing {
            return;
        }
        self.held = self.position(now);
        self.transport = Transport::Paused;
        info!("Paused at {:.2}s", self.held);
    }

    /// Space-bar behaviour: pause when playing, resume when paused.
    pub fn toggle_pause(&mut self, now: f64) {
        match self.transport {
            Transport::Playing => self.pause(now),
            Transport::Paused => self.play(now),
            Transport::Stopped => {}
        }
    }

    pub fn stop(&mut self) {
        if self.transport != Transport::Stopped {
            info!("Stopped");
        }
        self.transport = Transport::Stopped;
        self.held = 0.0;
    }

    /// Jump to loop A (or 0) without changing play/pause state.
    pub fn restart(&mut self, now: f64) {
        let t0 = self.loop_start.unwrap_or(0.0);
        match self.transport {
            Transport::Playing => self.seek(t0, now),
            Transport::Paused | Transport::Stopped => self.held = t0,
        }
        debug!("Restart at {:.2}s", t0);
    }

    /// Mark loop A at the current position. A loop B that is no longer after
    /// it is cleared.
    pub fn set_loop_start(&mut self, now: f64) {
        let a = self.position(now);
        self.loop_start = Some(a);
        if self.loop_end.is_some_and(|b| b <= a) {
            self.loop_end = None;
        }
        debug!("Loop A = {:.2}s", a);
    }

    /// Mark loop B at the current position. Loop A defaults to 0; a B that is
    /// not after A is snapped to one second past it.
    pub fn set_loop_end(&mut self, now: f64) {
        let a = *self.loop_start.get_or_insert(0.0);
        let mut b = self.position(now);
        if b <= a {
            b = a + 1.0;
        }
        self.loop_end = Some(b);
        debug!("Loop B = {:.2}s", b);
    }

    pub fn set_loop_enabled(&mut self, enabled: bool) {
        self.loop_enabled = enabled;
    }

    pub fn clear_loop(&mut self) {
        self.loop_start = None;
        self.loop_end = None;
    }

    /// Change speed, keeping the current position fixed.
    pub fn set_speed(&mut self, speed: f64, now: f64) {
        let t = self.position(now);
        self.speed = clamp_speed(speed);
        if self.transport == Transport::Playing {
            self.seek(t, now);
        }
    }

    /// Advance to wall-clock `now`: wrap at loop B, stop past the end.
    pub fn tick(&mut self, now: f64) -> TickOutcome {
        if self.transport != Transport::Playing {
            return TickOutcome::Idle;
        }
        let t = self.position(now);

        if self.loop_enabled {
            if let (Some(a), Some(b)) = (self.loop_start, self.loop_end) {
                if t >= b {
                    self.seek(a, now);
                    debug!("Loop wrap {:.2}s → {:.2}s", t, a);
                    return TickOutcome::Wrapped;
                }
            }
        }

        if t > self.total_duration + END_GRACE_SECS {
            info!("End of song at {:.2}s", t);
            self.stop();
            return TickOutcome::Ended;
        }

        TickOutcome::Advanced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_initial_state() {
        let c = PlaybackClock::new(10.0);
        let s = c.state(123.0);
        assert!(!s.playing && !s.paused);
        assert_eq!(s.timeline_seconds, 0.0);
        assert_eq!(c.transport(), Transport::Stopped);
    }

    #[test]
    fn test_play_advances_with_wall_clock() {
        let mut c = PlaybackClock::new(10.0);
        c.play(100.0);
        assert_eq!(c.tick(101.5), TickOutcome::Advanced);
        assert!(approx(c.position(101.5), 1.5));
    }

    #[test]
    fn test_speed_scales_timeline() {
        let mut c = PlaybackClock::new(10.0).with_speed(0.5);
        c.play(0.0);
        assert!(approx(c.position(2.0), 1.0));
    }

    #[test]
    fn test_pause_resume_continuity() {
        let mut c = PlaybackClock::new(10.0);
        c.play(0.0);
        c.pause(3.0);
        assert!(approx(c.position(50.0), 3.0), "held while paused");
        assert_eq!(c.tick(50.0), TickOutcome::Idle);
        c.play(50.0);
        assert!(approx(c.position(50.0), 3.0), "no jump on resume");
        assert!(approx(c.position(51.0), 4.0));
    }

    #[test]
    fn test_toggle_pause() {
        let mut c = PlaybackClock::new(10.0);
        c.toggle_pause(0.0);
        assert_eq!(c.transport(), Transport::Stopped, "toggle does nothing when stopped");
        c.play(0.0);
        c.toggle_pause(2.0);
        assert_eq!(c.transport(), Transport::Paused);
        c.toggle_pause(5.0);
        assert_eq!(c.transport(), Transport::Playing);
        assert!(approx(c.position(5.0), 2.0));
    }

    #[test]
    fn test_stop_resets() {
        let mut c = PlaybackClock::new(10.0);
        c.play(0.0);
        c.stop();
        assert_eq!(c.position(4.0), 0.0);
        c.play(0.0);
        c.pause(1.0);
        c.stop();
        c.play(10.0);
        assert!(approx(c.position(10.0), 0.0), "play after stop starts over");
    }

    #[test]
    fn test_play_while_playing_restarts_from_zero() {
        let mut c = PlaybackClock::new(10.0);
        c.play(0.0);
        c.play(5.0);
        assert!(approx(c.position(6.0), 1.0));
    }

    #[test]
    fn test_restart_goes_to_loop_start() {
        let mut c = PlaybackClock::new(10.0);
        c.play(0.0);
        c.restart(3.0);
        assert!(approx(c.position(3.0), 0.0));
        assert!(c.is_playing());

        c.set_loop_start(5.0); // A = 2.0
        c.restart(7.0);
        assert!(approx(c.position(7.0), 2.0));
    }

    #[test]
    fn test_restart_while_paused_moves_held_position() {
        let mut c = PlaybackClock::new(10.0);
        c.play(0.0);
        c.pause(4.0);
        c.restart(4.0);
        assert_eq!(c.transport(), Transport::Paused);
        assert!(approx(c.position(9.0), 0.0));
    }

    #[test]
    fn test_loop_wrap() {
        let mut c = PlaybackClock::new(10.0);
        c.play(0.0);
        c.set_loop_start(2.0);
        c.set_loop_end(4.0);
        c.set_loop_enabled(true);
        assert_eq!(c.state(4.0).loop_start, Some(2.0));
        assert_eq!(c.state(4.0).loop_end, Some(4.0));

        assert_eq!(c.tick(4.0), TickOutcome::Wrapped);
        assert!(approx(c.position(4.0), 2.0));
        assert!(approx(c.position(5.0), 3.0));
    }

    #[test]
    fn test_loop_disabled_does_not_wrap() {
        let mut c = PlaybackClock::new(10.0);
        c.play(0.0);
        c.set_loop_start(2.0);
        c.set_loop_end(4.0);
        assert_eq!(c.tick(4.5), TickOutcome::Advanced);
        assert!(approx(c.position(4.5), 4.5));
    }

    #[test]
    fn test_loop_end_before_start_snaps() {
        let mut c = PlaybackClock::new(10.0);
        c.play(0.0);
        c.set_loop_start(5.0);
        c.restart(5.0); // back to 5.0 → timeline 5.0
        c.set_loop_end(5.0);
        assert_eq!(c.state(5.0).loop_end, Some(6.0));
    }

    #[test]
    fn test_loop_end_defaults_start_to_zero() {
        let mut c = PlaybackClock::new(10.0);
        c.play(0.0);
        c.set_loop_end(3.0);
        let s = c.state(3.0);
        assert_eq!(s.loop_start, Some(0.0));
        assert_eq!(s.loop_end, Some(3.0));
    }

    #[test]
    fn test_new_loop_start_clears_stale_end() {
        let mut c = PlaybackClock::new(10.0);
        c.play(0.0);
        c.set_loop_end(2.0);
        c.set_loop_start(3.0);
        assert_eq!(c.state(3.0).loop_end, None);
        c.clear_loop();
        assert_eq!(c.state(3.0).loop_start, None);
    }

    #[test]
    fn test_end_of_song_auto_stop() {
        let mut c = PlaybackClock::new(2.0);
        c.play(0.0);
        assert_eq!(c.tick(2.5), TickOutcome::Advanced, "grace period inclusive");
        assert_eq!(c.tick(2.6), TickOutcome::Ended);
        assert_eq!(c.transport(), Transport::Stopped);
        assert_eq!(c.position(3.0), 0.0);
    }

    #[test]
    fn test_speed_change_keeps_position() {
        let mut c = PlaybackClock::new(100.0);
        c.play(0.0);
        c.set_speed(2.0, 4.0);
        assert!(approx(c.position(4.0), 4.0));
        assert!(approx(c.position(5.0), 6.0));
        c.set_speed(9.0, 5.0);
        assert_eq!(c.state(5.0).speed_factor, 2.0);
    }
}
