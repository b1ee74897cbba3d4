// Key filtering
// Removes short out-of-key notes, keeping long ones as intentional chromatic notes

use crate::events::NoteEvent;
use crate::tonal::KeyEstimate;

/// Keep notes that are in the key's scale or last longer than `exemption` seconds
pub fn filter_out_of_key(notes: &[NoteEvent], key: &KeyEstimate, exemption: f64) -> Vec<NoteEvent> {
    let kept: Vec<NoteEvent> = notes
        .iter()
        .filter(|n| key.contains_pitch(n.pitch) || n.duration() > exemption)
        .copied()
        .collect();

    if kept.len() < notes.len() {
        log::debug!(
            "Removed {} out-of-key notes for {}",
            notes.len() - kept.len(),
            key.name()
        );
    }

    kept
}
