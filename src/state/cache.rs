// Interim note event cache
// Pitch model output stored as JSON, keyed by the SHA-256 of the audio it was extracted from

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::events::{parse_voices_json, voices_to_json, NoteEventSource, SourceError, Voice};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to get cache directory")]
    NoCacheDir,

    #[error("Cached entry is unreadable: {0}")]
    Source(#[from] SourceError),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Calculate SHA256 hash of data as lowercase hex
pub fn calculate_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Directory of `<sha256>.json` note event files
#[derive(Debug, Clone)]
pub struct NoteEventCache {
    dir: PathBuf,
}

impl NoteEventCache {
    /// Cache rooted at an explicit directory (created on demand)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        NoteEventCache { dir: dir.into() }
    }

    /// Cache under the user's cache directory
    pub fn default_location() -> CacheResult<Self> {
        let cache_dir = dirs::cache_dir().ok_or(CacheError::NoCacheDir)?;
        Ok(NoteEventCache::new(cache_dir.join("vocalscore")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entry_path(key).is_file()
    }

    /// Look up voices stored under a key
    pub fn get(&self, key: &str) -> CacheResult<Option<Vec<Voice>>> {
        let path = self.entry_path(key);
        if !path.is_file() {
            return Ok(None);
        }

        let bytes = fs::read(&path)?;
        let voices = parse_voices_json(&bytes)?;
        log::debug!("Cache hit for {} ({} voices)", key, voices.len());
        Ok(Some(voices))
    }

    /// Store voices under a key, returning the entry path
    pub fn put(&self, key: &str, voices: &[Voice]) -> CacheResult<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.entry_path(key);
        fs::write(&path, voices_to_json(voices)?)?;
        log::debug!("Cached {} voices at {}", voices.len(), path.display());
        Ok(path)
    }

    /// Remove an entry; returns whether it existed
    pub fn remove(&self, key: &str) -> CacheResult<bool> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path)?;
        Ok(true)
    }
}

/// Note source that consults the cache before asking the wrapped source
///
/// Meant to sit in front of an expensive source such as the external separation and
/// pitch model, keyed by the audio bytes that source would process. Re-running a
/// transcription with new settings then skips extraction entirely.
pub struct CachedSource<S> {
    inner: S,
    cache: NoteEventCache,
    key: String,
}

impl<S: NoteEventSource> CachedSource<S> {
    /// `input` is the audio the inner source derives its events from
    pub fn new(inner: S, cache: NoteEventCache, input: &[u8]) -> Self {
        CachedSource {
            inner,
            cache,
            key: calculate_sha256(input),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl<S: NoteEventSource> NoteEventSource for CachedSource<S> {
    fn load_voices(&self) -> Result<Vec<Voice>, SourceError> {
        match self.cache.get(&self.key) {
            Ok(Some(voices)) => return Ok(voices),
            Ok(None) => {}
            Err(e) => log::warn!("Ignoring unreadable cache entry {}: {}", self.key, e),
        }

        let voices = self.inner.load_voices()?;
        if let Err(e) = self.cache.put(&self.key, &voices) {
            log::warn!("Failed to cache note events: {}", e);
        }
        Ok(voices)
    }
}
