// Pipeline module
// Configuration, orchestration, and progress tracing for a transcription run

pub mod config;
pub mod trace;
pub mod transcribe;

pub use config::{ConfigError, QuantizationStrategy, TranscriptionConfig};
pub use trace::{read_trace_file, Stage, TraceBuilder, TraceEntry, TraceError, TraceWriter};
pub use transcribe::{Transcriber, Transcription, TranscriptionError, VoiceSummary};
