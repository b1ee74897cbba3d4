// Score - notation model, part assembly, and MIDI rendering
// Turns quantized voices into measure-partitioned parts

pub mod assemble;
pub mod midi;
pub mod types;

pub use assemble::{assemble_part, assemble_score, build_elements, partition_measures, PartOptions};
pub use midi::{export_score_midi, MidiExportOptions};
pub use types::{Element, Measure, Part, Score, ScoreError, Tie};
