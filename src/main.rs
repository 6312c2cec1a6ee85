#[cfg(feature = "audio")]
use bass_coach::audio_input::AudioCapture;
use bass_coach::config::{clamp_speed, PracticeConfig};
use bass_coach::console_display::ConsoleDisplay;
use bass_coach::fretboard::standard_bass;
use bass_coach::library::Library;
use bass_coach::midi;
use bass_coach::pitch::midi_to_note_name;
use bass_coach::playable::filter_playable;
use bass_coach::session::{PracticeFrame, PracticeSession};
use bass_coach::simulator::{Performer, Simulator};
use bass_coach::types::*;

use clap::{Parser, Subcommand};
use crossbeam_channel::{bounded, Sender};
use log::{error, info, warn};
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// Sample rate of the synthetic performer.
const SIM_SAMPLE_RATE: u32 = 48000;
/// Speed change per `+` / `-` key press.
const SPEED_STEP: f64 = 0.1;

#[derive(Parser)]
#[command(name = "bass-coach")]
#[command(about = "Bass practice coach: MIDI note highway, live pitch detection, hit/miss scoring")]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// JSON practice settings; flags below override individual fields
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Highest fret a note may be mapped to
    #[arg(long, global = true)]
    max_fret: Option<u8>,

    /// Timing tolerance around the hit line (ms)
    #[arg(long, global = true)]
    hit_window_ms: Option<u32>,

    /// Minimum estimator confidence to count as a played note
    #[arg(long, global = true)]
    min_confidence: Option<f32>,

    /// Keep notes that cannot be played on a bass
    #[arg(long, global = true)]
    all_notes: bool,

    /// Keep every note of a chord instead of only the lowest
    #[arg(long, global = true)]
    keep_chords: bool,

    /// Playback speed factor (0.25–2.0)
    #[arg(long, global = true)]
    speed: Option<f64>,

    /// Use a synthetic bass player instead of the audio input
    #[arg(long, global = true)]
    simulate: bool,

    /// Simulator: play every Nth note a semitone sharp
    #[arg(long, global = true)]
    wrong_every: Option<usize>,

    /// Host loop rate (frames per second)
    #[arg(long, global = true, default_value_t = 60)]
    fps: u32,

    /// Console redraw rate (Hz)
    #[arg(long, global = true, default_value_t = 20)]
    display_hz: u32,

    /// Where the MIDI library lives
    #[arg(long, global = true, default_value = "./library")]
    library_dir: PathBuf,
}

#[derive(Subcommand)]
enum Cmd {
    /// Practise along with a MIDI file
    Practice {
        /// Path to a .mid / .midi file
        file: Option<PathBuf>,

        /// Play a song from the library instead of a file
        #[arg(long, conflicts_with = "file")]
        library_id: Option<String>,
    },
    /// Live tuner only
    Tuner,
    /// Print the notes of a MIDI file with their fretboard positions
    Inspect { file: PathBuf },
    /// Manage the local MIDI library
    Library {
        #[command(subcommand)]
        action: LibraryAction,
    },
}

#[derive(Subcommand)]
enum LibraryAction {
    /// Add .mid / .midi files
    Add { files: Vec<PathBuf> },
    /// List entries, newest first
    List {
        /// Only names containing this text
        #[arg(long)]
        search: Option<String>,
    },
    /// Remove one entry by id
    Rm { id: String },
    /// Remove everything
    Clear,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let config = practice_config(&cli);

    let result = match &cli.command {
        Cmd::Practice { file, library_id } => {
            practice(&cli, config, file.as_deref(), library_id.as_deref())
        }
        Cmd::Tuner => tuner(&cli, config),
        Cmd::Inspect { file } => inspect(file, &config),
        Cmd::Library { action } => library(&cli.library_dir, action),
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

/// Settings file (if any) with command-line overrides applied.
fn practice_config(cli: &Cli) -> PracticeConfig {
    let mut config = match &cli.config {
        Some(path) => PracticeConfig::load(path).unwrap_or_else(|| {
            warn!("Using default settings");
            PracticeConfig::default()
        }),
        None => PracticeConfig::default(),
    };
    if let Some(v) = cli.max_fret {
        config.max_fret = v;
    }
    if let Some(v) = cli.hit_window_ms {
        config.hit_window_ms = v;
    }
    if let Some(v) = cli.min_confidence {
        config.min_confidence = v;
    }
    if let Some(v) = cli.speed {
        config.speed_factor = clamp_speed(v);
    }
    if cli.all_notes {
        config.bass_only = false;
    }
    if cli.keep_chords {
        config.lowest_only = false;
    }
    config
}

fn read_song(path: &Path) -> Result<Song, String> {
    midi::decode_file(path).map_err(|e| format!("Could not read {:?}: {}", path, e))
}

// ─── practice / tuner ───────────────────────────────────────────────────────

fn practice(
    cli: &Cli,
    config: PracticeConfig,
    file: Option<&Path>,
    library_id: Option<&str>,
) -> Result<(), String> {
    let song = match (file, library_id) {
        (Some(path), _) => read_song(path)?,
        (None, Some(id)) => {
            let lib = Library::open(&cli.library_dir).map_err(|e| e.to_string())?;
            let name = lib.get(id).map(|e| e.name.clone()).unwrap_or_default();
            let bytes = lib.load(id).map_err(|e| e.to_string())?;
            info!("Library song: {}", name);
            midi::decode(&bytes).map_err(|e| format!("Could not read library entry {}: {}", id, e))?
        }
        (None, None) => return Err("practice needs a MIDI file or --library-id".into()),
    };

    let mut session = PracticeSession::new(config.clone());
    session.load_song(song);
    if session.notes().is_empty() {
        warn!("Nothing to play after filtering; try --all-notes or a higher --max-fret");
    }

    let mut performer = Performer::new(session.notes(), config.speed(), SIM_SAMPLE_RATE);
    if let Some(n) = cli.wrong_every {
        performer = performer.with_wrong_every(n);
    }

    info!("═══════════════════════════════════════════════");
    info!("  BASS COACH v{}", env!("CARGO_PKG_VERSION"));
    info!("  Notes: {}", session.notes().len());
    info!("  Input: {}", if cli.simulate { "SIMULATOR" } else { "AUDIO" });
    info!("  Keys: p play · space pause · s stop · r restart");
    info!("        a/b loop points · l loop · c clear loop · +/- speed · q quit");
    info!("═══════════════════════════════════════════════");

    run_session(cli, session, performer, false)
}

fn tuner(cli: &Cli, config: PracticeConfig) -> Result<(), String> {
    info!("Tuner: play a note (q + Enter to quit)");
    let session = PracticeSession::new(config);
    run_session(cli, session, Performer::open_strings(1, SIM_SAMPLE_RATE), true)
}

/// Wire up input, keyboard and display threads around the session, then run
/// it on this thread until quit.
fn run_session(
    cli: &Cli,
    mut session: PracticeSession,
    performer: Performer,
    repeat: bool,
) -> Result<(), String> {
    let clock = SessionClock::new();
    let fps = cli.fps.max(1);

    // Channel: audio + commands → session
    let (input_tx, input_rx) = bounded::<InputEvent>(4096);
    // Channel: session → display
    let (frame_tx, frame_rx) = bounded::<PracticeFrame>(8);

    let display_hz = cli.display_hz;
    thread::Builder::new()
        .name("display".into())
        .spawn(move || ConsoleDisplay::new(frame_rx, fps, display_hz).run())
        .unwrap();

    spawn_keyboard(input_tx.clone(), session.config().speed(), session.config().loop_enabled);

    if cli.simulate && session.song().is_some() {
        // The synthetic player starts right away, so playback does too
        let _ = input_tx.send(InputEvent::Command(Command::Play));
    }
    let _input = start_input(cli.simulate, performer, repeat, input_tx, &clock);

    let score = session.run(
        &input_rx,
        &clock,
        Duration::from_secs_f64(1.0 / fps as f64),
        |frame| {
            // Display is behind: skip this frame
            let _ = frame_tx.try_send(frame.clone());
        },
    );

    if score.total() > 0 {
        info!(
            "Final score: {} of {} notes hit ({:.0}%)",
            score.hits,
            score.total(),
            100.0 * score.hits as f64 / score.total() as f64
        );
    }
    Ok(())
}

/// Keeps the live capture stream alive for the session's lifetime.
struct InputGuard {
    #[cfg(feature = "audio")]
    _capture: Option<AudioCapture>,
}

fn start_input(
    simulate: bool,
    performer: Performer,
    repeat: bool,
    tx: Sender<InputEvent>,
    clock: &SessionClock,
) -> InputGuard {
    #[cfg(feature = "audio")]
    if !simulate {
        match AudioCapture::start(tx.clone(), clock.clone()) {
            Ok(capture) => {
                info!(
                    "Listening on {} at {} Hz",
                    capture.device_name(),
                    capture.sample_rate()
                );
                return InputGuard {
                    _capture: Some(capture),
                };
            }
            Err(e) => error!("Audio capture failed: {}. Falling back to simulator.", e),
        }
    }
    #[cfg(not(feature = "audio"))]
    if !simulate {
        error!("Live input requires the 'audio' feature. Falling back to simulator.");
    }

    let sim_clock = clock.clone();
    thread::Builder::new()
        .name("simulator".into())
        .spawn(move || {
            Simulator::new(sim_clock, tx, performer)
                .with_repeat(repeat)
                .run();
        })
        .unwrap();

    InputGuard {
        #[cfg(feature = "audio")]
        _capture: None,
    }
}

/// Transport keys read line by line from stdin.
struct Keys {
    speed: f64,
    loop_enabled: bool,
}

impl Keys {
    fn command_for(&mut self, key: char) -> Option<Command> {
        let cmd = match key.to_ascii_lowercase() {
            'p' => Command::Play,
            ' ' | 'k' => Command::TogglePause,
            's' => Command::Stop,
            'r' => Command::Restart,
            'a' => Command::SetLoopA,
            'b' => Command::SetLoopB,
            'c' => Command::ClearLoop,
            'l' => {
                self.loop_enabled = !self.loop_enabled;
                Command::SetLoopEnabled(self.loop_enabled)
            }
            '+' | '=' => {
                self.speed = clamp_speed(self.speed + SPEED_STEP);
                Command::SetSpeed(self.speed)
            }
            '-' => {
                self.speed = clamp_speed(self.speed - SPEED_STEP);
                Command::SetSpeed(self.speed)
            }
            'q' => Command::Quit,
            _ => return None,
        };
        Some(cmd)
    }
}

fn spawn_keyboard(tx: Sender<InputEvent>, speed: f64, loop_enabled: bool) {
    thread::Builder::new()
        .name("keyboard".into())
        .spawn(move || {
            let mut keys = Keys {
                speed,
                loop_enabled,
            };
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                for c in line.chars() {
                    let Some(cmd) = keys.command_for(c) else {
                        continue;
                    };
                    if tx.send(InputEvent::Command(cmd)).is_err() || cmd == Command::Quit {
                        return;
                    }
                }
            }
        })
        .unwrap();
}

// ─── inspect ────────────────────────────────────────────────────────────────

fn inspect(path: &Path, config: &PracticeConfig) -> Result<(), String> {
    let song = read_song(path)?;
    let tuning = standard_bass();
    let notes = if config.bass_only {
        filter_playable(&song.notes, &tuning, config.max_fret, config.lowest_only)
    } else {
        song.notes.clone()
    };

    println!("{}", path.display());
    println!(
        "  tracks {}  division {}  tempo {:.1} BPM  length {:.2}s",
        song.track_count,
        song.division,
        60_000_000.0 / song.tempo_us as f64,
        song.total_duration
    );
    println!(
        "  {} of {} notes kept (bass only: {}, lowest only: {}, max fret {})",
        notes.len(),
        song.notes.len(),
        config.bass_only,
        config.lowest_only,
        config.max_fret
    );
    for ev in &notes {
        let fingering = match tuning.best_position(ev.midi, config.max_fret) {
            Some(p) => p.to_string(),
            None => "out of range".to_string(),
        };
        println!("  {}  {:<4} {}", ev, midi_to_note_name(ev.midi as f64), fingering);
    }
    Ok(())
}

// ─── library ────────────────────────────────────────────────────────────────

fn library(dir: &Path, action: &LibraryAction) -> Result<(), String> {
    let mut lib = Library::open(dir).map_err(|e| format!("Could not open library {:?}: {}", dir, e))?;

    match action {
        LibraryAction::Add { files } => {
            for path in files {
                match lib.add_file(path) {
                    Ok(Some(id)) => println!("{}  {}", id, path.display()),
                    Ok(None) => println!("skipped  {}", path.display()),
                    Err(e) => error!("Could not add {:?}: {}", path, e),
                }
            }
        }
        LibraryAction::List { search } => {
            let entries = match search {
                Some(q) => lib.search(q),
                None => lib.list(),
            };
            if entries.is_empty() {
                println!("(library is empty)");
            }
            for e in entries {
                println!("{}  {:>8} B  {}", e.id, e.size, e.name);
            }
        }
        LibraryAction::Rm { id } => {
            if !lib.delete(id).map_err(|e| e.to_string())? {
                return Err(format!("No library entry {}", id));
            }
        }
        LibraryAction::Clear => lib.clear().map_err(|e| e.to_string())?,
    }
    Ok(())
}
