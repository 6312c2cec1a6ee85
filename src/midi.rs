//! Minimal Standard MIDI File decoder.
//!
//! Walks every `MTrk` chunk, collects note-on/note-off edges with their
//! absolute tick, then pairs them into [`NoteEvent`]s. Only the header magic
//! is fatal; anything else that looks wrong is skipped so a damaged file still
//! yields whatever notes could be paired.
//!
//! Tempo is tracked as a single value for the whole file: the last Set-Tempo
//! seen anywhere wins and is applied to every note after parsing. Files with
//! tempo changes therefore drift, which matches the player this was built for.

use crate::types::{NoteEvent, Song};
use byteorder::{BigEndian, ByteOrder};
use log::{debug, trace};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::Path;

const HEADER_MAGIC: &[u8; 4] = b"MThd";
const TRACK_MAGIC: &[u8; 4] = b"MTrk";
const HEADER_LEN: usize = 14;

/// 120 BPM, the SMF default when no Set-Tempo event is present.
pub const DEFAULT_TEMPO_US: u32 = 500_000;

const META: u8 = 0xFF;
const META_SET_TEMPO: u8 = 0x51;
const SYSEX: u8 = 0xF0;
const SYSEX_ESCAPE: u8 = 0xF7;
const NOTE_OFF: u8 = 0x80;
const NOTE_ON: u8 = 0x90;

#[derive(Debug)]
pub enum MidiError {
    /// The bytes are not a Standard MIDI File.
    Format(String),
    Io(io::Error),
}

impl fmt::Display for MidiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MidiError::Format(reason) => write!(f, "not a MIDI file: {}", reason),
            MidiError::Io(e) => write!(f, "read MIDI file: {}", e),
        }
    }
}

impl std::error::Error for MidiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MidiError::Io(e) => Some(e),
            MidiError::Format(_) => None,
        }
    }
}

impl From<io::Error> for MidiError {
    fn from(e: io::Error) -> Self {
        MidiError::Io(e)
    }
}

/// Which notes share an "open" slot while pairing note-ons with note-offs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenNoteScope {
    /// One slot per pitch for the whole file. A second note-on for a pitch
    /// that is still sounding (in any track) replaces the first, which is lost.
    #[default]
    Shared,
    /// One slot per (track, pitch), so unison lines in different tracks survive.
    PerTrack,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeOptions {
    pub open_notes: OpenNoteScope,
}

/// A note-on or note-off at an absolute tick.
#[derive(Debug, Clone, Copy)]
struct NoteEdge {
    track: usize,
    tick: u64,
    midi: u8,
    /// 0 for note-off (or note-on with velocity 0)
    velocity: u8,
}

/// Decode with the default (shared open-note) pairing.
pub fn decode(bytes: &[u8]) -> Result<Song, MidiError> {
    decode_with(bytes, DecodeOptions::default())
}

/// Read a file from disk and decode it.
pub fn decode_file(path: &Path) -> Result<Song, MidiError> {
    let bytes = std::fs::read(path)?;
    decode(&bytes)
}

pub fn decode_with(bytes: &[u8], options: DecodeOptions) -> Result<Song, MidiError> {
    if bytes.len() < HEADER_MAGIC.len() || &bytes[..4] != HEADER_MAGIC {
        return Err(MidiError::Format("missing MThd header".into()));
    }

    let mut reader = ByteReader::new(bytes);
    reader.pos = 8;
    let _format = reader.u16();
    let ntrks = reader.u16() as usize;
    // SMPTE divisions (high bit set) are read as plain PPQ
    let division = reader.u16();
    reader.pos = HEADER_LEN;

    let mut tempo_us = DEFAULT_TEMPO_US;
    let mut edges: Vec<NoteEdge> = Vec::new();
    let mut track_count = 0;

    for track in 0..ntrks {
        if !reader.has(4) || reader.peek_slice(4) != TRACK_MAGIC {
            debug!("midi: track {} has no MTrk chunk, stopping", track);
            break;
        }
        reader.pos += 4;
        let len = reader.u32() as usize;
        let end = reader.pos.saturating_add(len).min(bytes.len());
        track_count += 1;

        read_track(&mut reader, end, track, &mut tempo_us, &mut edges);
        reader.pos = end;
    }

    let seconds_per_tick = (tempo_us as f64 / 1_000_000.0) / division.max(1) as f64;
    let mut notes = pair_edges(&edges, options.open_notes, seconds_per_tick);
    notes.sort_by(|a, b| a.time.total_cmp(&b.time).then(a.midi.cmp(&b.midi)));

    let total_duration = notes.iter().map(NoteEvent::end).fold(0.0, f64::max);

    debug!(
        "midi: {} track(s), division {}, tempo {}µs → {} notes, {:.2}s",
        track_count,
        division,
        tempo_us,
        notes.len(),
        total_duration
    );

    Ok(Song {
        notes,
        total_duration,
        track_count,
        division,
        tempo_us,
    })
}

/// Parse one track's `(delta, event)` stream up to `end`.
fn read_track(
    reader: &mut ByteReader<'_>,
    end: usize,
    track: usize,
    tempo_us: &mut u32,
    edges: &mut Vec<NoteEdge>,
) {
    let mut tick: u64 = 0;
    let mut running_status: u8 = 0;

    while reader.pos < end {
        tick += reader.var_len() as u64;

        let mut status = reader.peek();
        if status < 0x80 {
            status = running_status;
        } else {
            reader.pos += 1;
            running_status = status;
        }

        match status {
            META => {
                let kind = reader.byte();
                let len = reader.var_len() as usize;
                if kind == META_SET_TEMPO && reader.has(3) {
                    let t = reader.peek_slice(3);
                    *tempo_us = (t[0] as u32) << 16 | (t[1] as u32) << 8 | t[2] as u32;
                    trace!("midi: track {} tick {} tempo → {}µs", track, tick, tempo_us);
                }
                reader.pos = reader.pos.saturating_add(len);
            }
            SYSEX | SYSEX_ESCAPE => {
                let len = reader.var_len() as usize;
                reader.pos = reader.pos.saturating_add(len);
            }
            s if s & 0xF0 == NOTE_ON => {
                let midi = reader.byte();
                let velocity = reader.byte();
                edges.push(NoteEdge { track, tick, midi, velocity });
            }
            s if s & 0xF0 == NOTE_OFF => {
                let midi = reader.byte();
                reader.pos += 1;
                edges.push(NoteEdge { track, tick, midi, velocity: 0 });
            }
            _ => {
                // Controllers, program changes, pitch bend, ...
                reader.pos += 2;
            }
        }

        if reader.pos >= reader.len() {
            break;
        }
    }
}

/// Match each note-off with the open note-on for its pitch.
fn pair_edges(edges: &[NoteEdge], scope: OpenNoteScope, seconds_per_tick: f64) -> Vec<NoteEvent> {
    let mut open: HashMap<(usize, u8), (u64, u8)> = HashMap::new();
    let mut notes = Vec::new();

    for edge in edges {
        let key = match scope {
            OpenNoteScope::Shared => (0, edge.midi),
            OpenNoteScope::PerTrack => (edge.track, edge.midi),
        };
        if edge.velocity > 0 {
            open.insert(key, (edge.tick, edge.velocity));
        } else if let Some((start, velocity)) = open.remove(&key) {
            // Zero-length pairs make no sound
            if edge.tick <= start {
                continue;
            }
            notes.push(NoteEvent {
                time: start as f64 * seconds_per_tick,
                duration: (edge.tick - start) as f64 * seconds_per_tick,
                midi: edge.midi,
                velocity: velocity as f32 / 127.0,
            });
        }
    }

    notes
}

/// Cursor over the raw file. Reads past the end yield zero so a truncated
/// file ends its track instead of panicking.
struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn len(&self) -> usize {
        self.buf.len()
    }

    fn has(&self, n: usize) -> bool {
        self.pos.saturating_add(n) <= self.buf.len()
    }

    fn peek(&self) -> u8 {
        self.buf.get(self.pos).copied().unwrap_or(0)
    }

    fn peek_slice(&self, n: usize) -> &'a [u8] {
        &self.buf[self.pos..self.pos + n]
    }

    fn byte(&mut self) -> u8 {
        let b = self.peek();
        self.pos += 1;
        b
    }

    fn u16(&mut self) -> u16 {
        let v = if self.has(2) {
            BigEndian::read_u16(self.peek_slice(2))
        } else {
            0
        };
        self.pos += 2;
        v
    }

    fn u32(&mut self) -> u32 {
        let v = if self.has(4) {
            BigEndian::read_u32(self.peek_slice(4))
        } else {
            0
        };
        self.pos += 4;
        v
    }

    /// Variable-length quantity: 7 bits per byte, high bit = more follows.
    fn var_len(&mut self) -> u32 {
        let mut value: u32 = 0;
        // SMF caps quantities at 4 bytes; the bound also stops runaway reads
        for _ in 0..4 {
            if self.pos >= self.buf.len() {
                self.pos += 1;
                break;
            }
            let b = self.byte();
            value = (value << 7) | (b & 0x7F) as u32;
            if b & 0x80 == 0 {
                break;
            }
        }
        value
    }
}
