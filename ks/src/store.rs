//! Core KeySet implementation

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from key set operations
#[derive(Debug, Error)]
pub enum KeySetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode entry: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Key must not be blank")]
    BlankKey,
}

/// A single persisted line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEntry {
    /// The stored key
    pub key: String,
    /// When the key was first appended (unix ms)
    pub added_at: i64,
}

/// Append-only key set stored as JSONL
#[derive(Debug, Clone)]
pub struct KeySet {
    path: PathBuf,
}

impl KeySet {
    /// Open or create a key set file at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KeySetError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&path)?;
        debug!(?path, "Opened key set");
        Ok(Self { path })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every entry in append order
    ///
    /// Lines that fail to parse (e.g. a write torn by a crash) are skipped.
    pub fn entries(&self) -> Result<Vec<KeyEntry>, KeySetError> {
        let file = File::open(&self.path)?;
        FileExt::lock_shared(&file)?;
        let entries = read_entries(&file, &self.path);
        FileExt::unlock(&file)?;
        entries
    }

    /// Load the distinct set of keys
    pub fn load(&self) -> Result<BTreeSet<String>, KeySetError> {
        let keys: BTreeSet<String> = self.entries()?.into_iter().map(|e| e.key).collect();
        debug!(count = keys.len(), path = ?self.path, "load: loaded keys");
        Ok(keys)
    }

    /// Check whether a key has been stored
    pub fn contains(&self, key: &str) -> Result<bool, KeySetError> {
        Ok(self.entries()?.iter().any(|e| e.key == key))
    }

    /// Number of distinct keys
    pub fn len(&self) -> Result<usize, KeySetError> {
        Ok(self.load()?.len())
    }

    /// True when no key has been stored
    pub fn is_empty(&self) -> Result<bool, KeySetError> {
        Ok(self.len()? == 0)
    }

    /// Append a single key; returns false if it was already present
    pub fn append(&self, key: &str) -> Result<bool, KeySetError> {
        Ok(self.append_batch([key])? == 1)
    }

    /// Append several keys under one lock; returns how many were new
    pub fn append_batch<I, S>(&self, keys: I) -> Result<usize, KeySetError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys: Vec<String> = keys.into_iter().map(|k| k.as_ref().trim().to_string()).collect();
        if keys.iter().any(|k| k.is_empty()) {
            return Err(KeySetError::BlankKey);
        }

        let mut file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        FileExt::lock_exclusive(&file)?;
        let result = append_locked(&mut file, &self.path, keys);
        FileExt::unlock(&file)?;

        let written = result?;
        if written > 0 {
            info!(written, path = ?self.path, "Appended keys");
        }
        Ok(written)
    }

    /// Drop every key
    pub fn clear(&self) -> Result<(), KeySetError> {
        let file = OpenOptions::new().write(true).open(&self.path)?;
        FileExt::lock_exclusive(&file)?;
        let result = file.set_len(0).and_then(|_| file.sync_all());
        FileExt::unlock(&file)?;
        result?;
        info!(path = ?self.path, "Cleared key set");
        Ok(())
    }
}

fn read_entries(file: &File, path: &Path) -> Result<Vec<KeyEntry>, KeySetError> {
    let reader = BufReader::new(file);
    let mut entries = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<KeyEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(line = idx + 1, ?path, error = %e, "Skipping unreadable key set line"),
        }
    }
    Ok(entries)
}

fn append_locked(file: &mut File, path: &Path, keys: Vec<String>) -> Result<usize, KeySetError> {
    file.seek(SeekFrom::Start(0))?;
    let mut existing: BTreeSet<String> = read_entries(file, path)?.into_iter().map(|e| e.key).collect();

    let now = chrono::Utc::now().timestamp_millis();
    let mut buf = String::new();
    if ends_mid_line(file)? {
        buf.push('\n');
    }
    let mut written = 0;
    for key in keys {
        if !existing.insert(key.clone()) {
            continue;
        }
        let line = serde_json::to_string(&KeyEntry { key, added_at: now })?;
        buf.push_str(&line);
        buf.push('\n');
        written += 1;
    }

    if written > 0 {
        file.seek(SeekFrom::End(0))?;
        file.write_all(buf.as_bytes())?;
        file.sync_data()?;
    }
    Ok(written)
}

// A crash mid-append leaves a line without its newline
fn ends_mid_line(file: &mut File) -> Result<bool, KeySetError> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}
