pub mod clock;
pub mod config;
pub mod console_display;
pub mod dsp;
pub mod fretboard;
pub mod library;
pub mod midi;
pub mod pitch;
pub mod playable;
pub mod scoring;
pub mod session;
pub mod simulator;
pub mod tuner;
pub mod types;

#[cfg(feature = "audio")]
pub mod audio_input;
