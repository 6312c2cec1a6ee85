//! Local MIDI library: a content-addressed store on disk.
//!
//! Each file is keyed by the SHA-1 of its bytes, so adding the same song
//! twice replaces the first entry instead of duplicating it.
//!
//! Layout:
//! ```text
//! <dir>/index.json       [LibraryEntry, ...]
//! <dir>/<sha1>.mid       raw file bytes
//! ```

use log::{info, warn};
use serde::{Deserialize, Serialize};
use sha1_smol::Sha1;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryEntry {
    /// Lowercase hex SHA-1 of the file bytes
    pub id: String,
    pub name: String,
    pub size: u64,
    /// Milliseconds since the Unix epoch
    pub added_at: u64,
}

pub struct Library {
    dir: PathBuf,
    entries: Vec<LibraryEntry>,
}

/// Content id for a byte buffer.
pub fn content_id(bytes: &[u8]) -> String {
    Sha1::from(bytes).digest().to_string()
}

/// True for `.mid` / `.midi` file names, any case.
pub fn is_midi_file_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".mid") || lower.ends_with(".midi")
}

impl Library {
    /// Open (or create) a library directory. A corrupt index is logged and
    /// treated as empty.
    pub fn open(dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let index_path = dir.join(INDEX_FILE);
        let entries = match fs::read_to_string(&index_path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_else(|e| {
                warn!("Library index {:?} unreadable ({}), starting empty", index_path, e);
                Vec::new()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e),
        };
        Ok(Self {
            dir: dir.to_path_buf(),
            entries,
        })
    }

    fn blob_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.mid", id))
    }

    fn write_index(&self) -> io::Result<()> {
        let json = serde_json::to_string_pretty(&self.entries).map_err(io::Error::other)?;
        fs::write(self.dir.join(INDEX_FILE), json)
    }

    /// Store `bytes` under its content id. Returns the id.
    pub fn add(&mut self, name: &str, bytes: &[u8]) -> io::Result<String> {
        let id = content_id(bytes);
        fs::write(self.blob_path(&id), bytes)?;

        let added_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.entries.retain(|e| e.id != id);
        self.entries.push(LibraryEntry {
            id: id.clone(),
            name: name.to_string(),
            size: bytes.len() as u64,
            added_at,
        });
        self.write_index()?;

        info!("Library: saved {:?} as {}", name, id);
        Ok(id)
    }

    /// Add a file from disk. Files without a `.mid`/`.midi` extension are
    /// skipped and yield `Ok(None)`.
    pub fn add_file(&mut self, path: &Path) -> io::Result<Option<String>> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !is_midi_file_name(&name) {
            warn!("Library: skipping {:?} (not a .mid/.midi file)", path);
            return Ok(None);
        }
        let bytes = fs::read(path)?;
        self.add(&name, &bytes).map(Some)
    }

    /// All entries, newest first.
    pub fn list(&self) -> Vec<LibraryEntry> {
        let mut items = self.entries.clone();
        items.sort_by(|a, b| b.added_at.cmp(&a.added_at));
        items
    }

    /// Entries whose name contains `query`, case-insensitive. An empty query
    /// matches everything.
    pub fn search(&self, query: &str) -> Vec<LibraryEntry> {
        let q = query.trim().to_lowercase();
        self.list()
            .into_iter()
            .filter(|e| q.is_empty() || e.name.to_lowercase().contains(&q))
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&LibraryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn load(&self, id: &str) -> io::Result<Vec<u8>> {
        if self.get(id).is_none() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no library entry {}", id),
            ));
        }
        fs::read(self.blob_path(id))
    }

    /// Remove one entry. Returns false if the id was unknown.
    pub fn delete(&mut self, id: &str) -> io::Result<bool> {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        if self.entries.len() == before {
            return Ok(false);
        }
        match fs::remove_file(self.blob_path(id)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        self.write_index()?;
        info!("Library: deleted {}", id);
        Ok(true)
    }

    pub fn clear(&mut self) -> io::Result<()> {
        let ids: Vec<String> = self.entries.iter().map(|e| e.id.clone()).collect();
        for id in ids {
            let _ = fs::remove_file(self.blob_path(&id));
        }
        self.entries.clear();
        self.write_index()?;
        info!("Library: cleared");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
