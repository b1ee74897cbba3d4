// Audio processing module
// WAV ingestion, onset detection, and rhythm analysis for the beat-adaptive path

pub mod features;
pub mod ingest;
pub mod rhythm;

pub use features::{detect_onsets, Onset, OnsetConfig};
pub use ingest::{ingest_wav, read_wav, AudioBuffer, AudioError};
pub use rhythm::{analyze_rhythm, RhythmAnalysis};
