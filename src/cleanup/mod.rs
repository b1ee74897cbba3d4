// Note cleanup module
// Turns over-segmented pitch-tracker output into clean, non-overlapping notes

pub mod key_filter;
pub mod merge;

pub use key_filter::filter_out_of_key;
pub use merge::{clean_notes, merge_notes, MergeConfig, LONG_NOTE_EXEMPTION_SECS};
