// Note event module
// Raw note events from the pitch/onset model and the sources that provide them

pub mod midi;
pub mod source;
pub mod types;

pub use midi::{parse_midi_voices, MidiSource};
pub use source::{parse_voices_json, voices_to_json, JsonSource, MemorySource, NoteEventSource, SourceError};
pub use types::{EventError, NoteEvent, Voice, VoiceRole};
