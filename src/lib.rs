// Vocalscore - Sung Vocals to Sheet Music
// Module declarations and the public transcription API

pub mod audio;
pub mod cleanup;
pub mod events;
pub mod groove;
pub mod pipeline;
pub mod score;
pub mod state;
pub mod tonal;

pub use events::{NoteEvent, NoteEventSource, Voice, VoiceRole};
pub use pipeline::{Transcriber, Transcription, TranscriptionConfig, TranscriptionError};
pub use score::{export_score_midi, Element, Measure, MidiExportOptions, Part, Score, Tie};
pub use tonal::{estimate_key, KeyEstimate, Mode};

/// Transcribe voices with the default configuration
pub fn transcribe(title: &str, voices: Vec<Voice>) -> Result<Transcription, TranscriptionError> {
    Transcriber::new(TranscriptionConfig::default()).transcribe_voices(title, voices, None)
}
