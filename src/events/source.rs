// Note event sources
// Boundary with the external pitch/onset model: anything that can hand over voices

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::types::{Voice, VoiceRole};

/// Errors raised while obtaining raw note events
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse note events JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse MIDI: {0}")]
    Midi(String),

    #[error("Source produced no voices")]
    NoVoices,
}

/// Anything that produces one time-ordered note list per detected voice
pub trait NoteEventSource {
    /// Load all voices, lead first
    fn load_voices(&self) -> Result<Vec<Voice>, SourceError>;
}

/// Source backed by voices already held in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    voices: Vec<Voice>,
}

impl MemorySource {
    pub fn new(voices: Vec<Voice>) -> Self {
        MemorySource { voices }
    }
}

impl NoteEventSource for MemorySource {
    fn load_voices(&self) -> Result<Vec<Voice>, SourceError> {
        if self.voices.is_empty() {
            return Err(SourceError::NoVoices);
        }
        Ok(self.voices.clone())
    }
}

/// JSON list of voices, e.g. `[{"role": "lead", "events": [{"pitch": 60, ...}]}]`
#[derive(Debug, Clone)]
pub struct JsonSource {
    path: PathBuf,
}

impl JsonSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonSource { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NoteEventSource for JsonSource {
    fn load_voices(&self) -> Result<Vec<Voice>, SourceError> {
        let bytes = std::fs::read(&self.path)?;
        parse_voices_json(&bytes)
    }
}

/// Parse voices from JSON bytes, ordering the lead voice first
pub fn parse_voices_json(bytes: &[u8]) -> Result<Vec<Voice>, SourceError> {
    let mut voices: Vec<Voice> = serde_json::from_slice(bytes)?;
    if voices.is_empty() {
        return Err(SourceError::NoVoices);
    }

    // Stable sort keeps the model's instrument order within each role
    voices.sort_by_key(|v| match v.role {
        VoiceRole::Lead => 0,
        VoiceRole::Harmony => 1,
    });

    log::debug!("Parsed {} voices from JSON", voices.len());
    Ok(voices)
}

/// Serialize voices to pretty JSON bytes
pub fn voices_to_json(voices: &[Voice]) -> Result<Vec<u8>, SourceError> {
    Ok(serde_json::to_vec_pretty(voices)?)
}
