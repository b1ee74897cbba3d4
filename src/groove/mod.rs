// Groove Engine - Tempo, Grids, and Duration Quantization
// Fixed-threshold and beat-adaptive paths share the QuantizedNote output

pub mod adaptive;
pub mod grid;
pub mod quantize;
pub mod tempo;

pub use adaptive::{kmeans_1d, quantize_adaptive, AdaptiveConfig};
pub use grid::{BeatTrack, GridError, QuantizationGrid, TimeSignature};
pub use quantize::{
    beats_to_seconds, quantize_fixed, seconds_to_beats, DurationPolicy, DurationQuantizer,
    DurationTable, QuantizedNote,
};
pub use tempo::{
    estimate_tempo, estimate_tempo_from_notes, estimate_tempo_with_config, TempoConfig,
    TempoEstimate, DEFAULT_BPM,
};
