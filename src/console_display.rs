use crate::clock::PlaybackState;
use crate::scoring::HighwayNote;
use crate::session::PracticeFrame;
use crate::tuner::TunerReading;
use crate::types::*;
use crossbeam_channel::Receiver;
use std::io::{self, Write};

/// Character columns of the highway, hit line included.
const HIGHWAY_COLS: usize = 56;
/// Character columns of the tuner meter.
const METER_COLS: usize = 41;

/// Renders a live ASCII dashboard of the practice session.
pub struct ConsoleDisplay {
    rx: Receiver<PracticeFrame>,
    /// Draw every Nth frame received
    skip: u64,
}

impl ConsoleDisplay {
    /// `source_fps` is the rate frames arrive at, `update_hz` the redraw rate.
    pub fn new(rx: Receiver<PracticeFrame>, source_fps: u32, update_hz: u32) -> Self {
        let skip = if update_hz == 0 {
            1
        } else {
            (source_fps / update_hz).max(1) as u64
        };
        Self { rx, skip }
    }

    pub fn run(&self) {
        let mut count: u64 = 0;
        let mut stdout = io::stdout();

        for frame in self.rx.iter() {
            count += 1;
            if count % self.skip != 0 {
                continue;
            }
            // Clear screen and move cursor home
            print!("\x1b[2J\x1b[H{}", render(&frame));
            let _ = stdout.flush();
        }
    }
}

/// The whole dashboard for one frame, as text.
pub fn render(frame: &PracticeFrame) -> String {
    let mut out = String::new();
    let rule = "═".repeat(HIGHWAY_COLS + 6);
    out.push_str(&format!("╔{}\n", rule));
    out.push_str(&format!("║  BASS COACH v{}\n", env!("CARGO_PKG_VERSION")));
    out.push_str(&format!("╠{}\n", rule));

    out.push_str(&format!("║  {}\n", transport_line(&frame.state)));
    out.push_str("║\n");

    match &frame.tuner {
        Some(reading) => {
            out.push_str(&format!("║  Tuner: {}\n", reading));
            out.push_str(&format!("║         {}\n", make_meter(reading, METER_COLS)));
            if let Some(alts) = reading.alternates_text() {
                out.push_str(&format!("║         {}\n", alts));
            }
        }
        None => out.push_str("║  Tuner: --- (play a note)\n"),
    }
    if let Some(est) = &frame.estimate {
        out.push_str(&format!(
            "║         level {:.3}  confidence {:.0}%\n",
            est.rms,
            est.confidence * 100.0
        ));
    }
    out.push_str("║\n");

    if !frame.visible.is_empty() || frame.target.is_some() {
        out.push_str(&format!(
            "║  Highway ({:.1}s ahead)\n",
            SECONDS_ON_SCREEN
        ));
        for line in highway_rows(&frame.visible) {
            out.push_str(&format!("║  {}\n", line));
        }
        out.push_str("║\n");
    }

    match &frame.verdict {
        Some(v) => out.push_str(&format!("║  {}\n", v)),
        None => out.push_str("║  ---\n"),
    }
    if frame.score.total() > 0 {
        out.push_str(&format!(
            "║  Score: {} hit / {} missed\n",
            frame.score.hits, frame.score.misses
        ));
    }
    out.push_str(&format!("╚{}\n", rule));
    out
}

fn transport_line(state: &PlaybackState) -> String {
    let status = if state.playing {
        "▶ Playing"
    } else if state.paused {
        "❚❚ Paused"
    } else {
        "■ Stopped"
    };
    let mut line = format!(
        "{:<10} {:>7.2}s   speed {:.2}x",
        status, state.timeline_seconds, state.speed_factor
    );
    match (state.loop_start, state.loop_end) {
        (Some(a), Some(b)) => line.push_str(&format!(
            "   loop {:.2}s–{:.2}s {}",
            a,
            b,
            if state.loop_enabled { "on" } else { "off" }
        )),
        (Some(a), None) => line.push_str(&format!("   loop from {:.2}s", a)),
        _ => {}
    }
    line
}

/// Cents meter: `│` marks in tune, `┃` is the needle.
fn make_meter(reading: &TunerReading, width: usize) -> String {
    let centre = width / 2;
    let needle = ((reading.needle_percent() / 100.0) * (width - 1) as f64).round() as usize;
    let body: String = (0..width)
        .map(|i| {
            if i == needle {
                '┃'
            } else if i == centre {
                '│'
            } else {
                '·'
            }
        })
        .collect();
    format!("♭ [{}] ♯", body)
}

/// One text row per string, high string on top like tablature. Each note is
/// drawn as its fret number at a column proportional to its time offset.
fn highway_rows(visible: &[HighwayNote]) -> Vec<String> {
    let span = SECONDS_BEHIND + SECONDS_ON_SCREEN;
    let column = |offset: f64| -> usize {
        let x = (offset + SECONDS_BEHIND) / span * (HIGHWAY_COLS - 1) as f64;
        (x.round().max(0.0) as usize).min(HIGHWAY_COLS - 1)
    };
    let hit_col = column(0.0);

    let mut lanes: Vec<Vec<char>> = (0..BassString::ALL.len())
        .map(|_| {
            (0..HIGHWAY_COLS)
                .map(|i| if i == hit_col { '|' } else { '─' })
                .collect()
        })
        .collect();

    for note in visible {
        let (Some(lane), Some(pos)) = (note.lane(), note.position) else {
            continue;
        };
        let col = column(note.offset);
        for (k, ch) in pos.fret.to_string().chars().enumerate() {
            if let Some(cell) = lanes[lane].get_mut(col + k) {
                *cell = ch;
            }
        }
    }

    BassString::ALL
        .iter()
        .rev()
        .map(|s| format!("{} {}", s, lanes[s.lane()].iter().collect::<String>()))
        .collect()
}
