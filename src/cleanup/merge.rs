// Note merging
// Collapses fragmented pitch-tracker output into single notes with one running accumulator

use serde::{Deserialize, Serialize};

use super::key_filter::filter_out_of_key;
use crate::events::NoteEvent;
use crate::tonal::KeyEstimate;

/// Out-of-key notes longer than this (seconds) are treated as intentional
pub const LONG_NOTE_EXEMPTION_SECS: f64 = 0.5;

/// Settings for merging and filtering a voice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Largest silence (seconds) bridged when joining two fragments
    pub max_gap: f64,

    /// Notes shorter than this (seconds) are discarded
    pub min_duration: f64,

    /// Largest pitch difference (semitones) still considered the same note
    pub pitch_tolerance: u8,

    /// Out-of-key notes longer than this (seconds) survive key filtering
    pub long_note_exemption: f64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        MergeConfig {
            max_gap: 0.15,
            min_duration: 0.075,
            pitch_tolerance: 1,
            long_note_exemption: LONG_NOTE_EXEMPTION_SECS,
        }
    }
}

/// Whether a note is a held out-of-key note rather than tracking noise
fn is_intentional(note: &NoteEvent, key: Option<&KeyEstimate>, config: &MergeConfig) -> bool {
    match key {
        Some(key) => !key.contains_pitch(note.pitch) && note.duration() > config.long_note_exemption,
        None => false,
    }
}

fn can_merge(
    current: &NoteEvent,
    event: &NoteEvent,
    key: Option<&KeyEstimate>,
    config: &MergeConfig,
) -> bool {
    let pitch_delta = (i16::from(current.pitch) - i16::from(event.pitch)).unsigned_abs();
    if pitch_delta > u16::from(config.pitch_tolerance) {
        return false;
    }
    if event.start - current.end > config.max_gap {
        return false;
    }

    // A held out-of-key note is never absorbed by a neighbour of another pitch
    if current.pitch != event.pitch
        && (is_intentional(current, key, config) || is_intentional(event, key, config))
    {
        return false;
    }

    true
}

/// Append a finished note, keeping the output free of overlaps
fn flush(output: &mut Vec<NoteEvent>, mut note: NoteEvent, config: &MergeConfig) {
    if let Some(last) = output.last() {
        if note.start < last.end {
            note.start = last.end;
        }
    }

    if note.duration() > 0.0 && note.duration() >= config.min_duration {
        output.push(note);
    }
}

/// One left-to-right scan with a single accumulator
fn merge_scan(
    events: &[NoteEvent],
    key: Option<&KeyEstimate>,
    config: &MergeConfig,
) -> Vec<NoteEvent> {
    let mut output = Vec::with_capacity(events.len());
    let mut current: Option<NoteEvent> = None;

    for event in events {
        current = match current {
            Some(mut acc) if can_merge(&acc, event, key, config) => {
                acc.end = acc.end.max(event.end);
                acc.velocity = acc.velocity.max(event.velocity);

                // Prefer the in-key pitch when fragments disagree
                if let Some(key) = key {
                    if key.contains_pitch(event.pitch) && !key.contains_pitch(acc.pitch) {
                        acc.pitch = event.pitch;
                    }
                }
                Some(acc)
            }
            Some(acc) => {
                flush(&mut output, acc, config);
                Some(*event)
            }
            None => Some(*event),
        };
    }

    if let Some(acc) = current {
        flush(&mut output, acc, config);
    }

    output
}

/// Drop malformed events and order the rest by onset
fn prepare(events: &[NoteEvent]) -> Vec<NoteEvent> {
    let mut valid: Vec<NoteEvent> = events.iter().filter(|e| e.is_valid()).copied().collect();

    let skipped = events.len() - valid.len();
    if skipped > 0 {
        log::warn!("Skipping {} malformed note events", skipped);
    }

    valid.sort_by(|a, b| a.start.total_cmp(&b.start));
    valid
}

/// Merge fragmented note events into musically whole notes
///
/// Neighbouring events within `pitch_tolerance` semitones and `max_gap` seconds are
/// joined (end and velocity take the maximum, the in-key pitch wins), and notes shorter
/// than `min_duration` are discarded. Scanning repeats until nothing changes, so the
/// result is stable under a second pass. Output is time-ordered and never overlaps.
pub fn merge_notes(
    events: &[NoteEvent],
    key: Option<&KeyEstimate>,
    config: &MergeConfig,
) -> Vec<NoteEvent> {
    let mut notes = merge_scan(&prepare(events), key, config);

    loop {
        let next = merge_scan(&notes, key, config);
        if next.len() == notes.len() {
            break;
        }
        notes = next;
    }

    log::debug!("Merged {} events into {} notes", events.len(), notes.len());
    notes
}

/// Merge, then drop short out-of-key notes, until the voice is stable
pub fn clean_notes(
    events: &[NoteEvent],
    key: Option<&KeyEstimate>,
    config: &MergeConfig,
) -> Vec<NoteEvent> {
    let mut notes = merge_notes(events, key, config);

    if let Some(key) = key {
        loop {
            let filtered = filter_out_of_key(&notes, key, config.long_note_exemption);
            if filtered.len() == notes.len() {
                break;
            }
            // Removing a note can expose two neighbours that now merge
            notes = merge_notes(&filtered, Some(key), config);
        }
    }

    log::info!(
        "Cleaned voice: {} raw events -> {} notes",
        events.len(),
        notes.len()
    );

    notes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tonal::Mode;

    fn note(pitch: u8, start: f64, end: f64) -> NoteEvent {
        NoteEvent::new(pitch, start, end, 100)
    }

    /// Deterministic pseudo-random voice for property checks
    fn noisy_voice(seed: u64, count: usize) -> Vec<NoteEvent> {
        let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state % 10_000) as f64 / 10_000.0
        };

        let mut events = Vec::with_capacity(count);
        let mut t = 0.0;
        for _ in 0..count {
            let start = t + next() * 0.2 - 0.05;
            let start = if start < 0.0 { 0.0 } else { start };
            let duration = 0.01 + next() * 0.6;
            let pitch = 55 + (next() * 14.0) as u8;
            let velocity = 40 + (next() * 80.0) as u8;
            events.push(NoteEvent::new(pitch, start, start + duration, velocity));
            t = start + duration;
        }
        events
    }

    #[test]
    fn test_merges_small_gap_same_pitch() {
        let config = MergeConfig {
            max_gap: 0.15,
            pitch_tolerance: 1,
            min_duration: 0.2,
            ..MergeConfig::default()
        };
        let events = vec![note(60, 0.0, 0.4), note(60, 0.42, 0.9), note(64, 0.95, 1.5)];

        let merged = merge_notes(&events, None, &config);

        assert_eq!(merged, vec![note(60, 0.0, 0.9), note(64, 0.95, 1.5)]);
    }

    #[test]
    fn test_velocity_takes_maximum() {
        let events = vec![
            NoteEvent::new(60, 0.0, 0.3, 70),
            NoteEvent::new(61, 0.35, 0.6, 110),
        ];
        let merged = merge_notes(&events, None, &MergeConfig::default());
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].velocity, 110);
        assert!((merged[0].end - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_drops_short_notes() {
        let config = MergeConfig::default();
        let events = vec![note(60, 0.0, 0.05), note(67, 1.0, 1.5)];
        assert_eq!(merge_notes(&events, None, &config), vec![note(67, 1.0, 1.5)]);
    }

    #[test]
    fn test_empty_input_is_empty_output() {
        let key = KeyEstimate::default();
        assert!(merge_notes(&[], None, &MergeConfig::default()).is_empty());
        assert!(clean_notes(&[], Some(&key), &MergeConfig::default()).is_empty());
    }

    #[test]
    fn test_malformed_events_are_skipped() {
        let events = vec![note(60, 0.0, 0.5), note(62, 0.7, 0.7), note(64, 1.0, 1.4)];
        let merged = merge_notes(&events, None, &MergeConfig::default());
        assert_eq!(merged, vec![note(60, 0.0, 0.5), note(64, 1.0, 1.4)]);
    }

    #[test]
    fn test_in_key_pitch_preferred_on_merge() {
        let c_major = KeyEstimate::new(0, Mode::Major);
        let events = vec![note(61, 0.0, 0.3), note(62, 0.32, 0.5)];

        let merged = merge_notes(&events, Some(&c_major), &MergeConfig::default());

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].pitch, 62);
        assert!((merged[0].start - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_long_out_of_key_note_not_merged_away() {
        let c_major = KeyEstimate::new(0, Mode::Major);
        // C# held for 0.88s right after a C
        let events = vec![note(60, 0.0, 0.3), note(61, 0.32, 1.2)];

        let merged = merge_notes(&events, Some(&c_major), &MergeConfig::default());
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].pitch, 61);

        let cleaned = clean_notes(&events, Some(&c_major), &MergeConfig::default());
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[1].pitch, 61);
    }

    #[test]
    fn test_without_key_tolerance_merges_neighbours() {
        let events = vec![note(60, 0.0, 0.3), note(61, 0.32, 1.2)];
        let merged = merge_notes(&events, None, &MergeConfig::default());
        assert_eq!(merged, vec![note(60, 0.0, 1.2)]);
    }

    #[test]
    fn test_short_out_of_key_note_removed() {
        let c_major = KeyEstimate::new(0, Mode::Major);
        let events = vec![note(60, 0.0, 0.5), note(66, 1.0, 1.3), note(67, 2.0, 2.5)];

        let cleaned = clean_notes(&events, Some(&c_major), &MergeConfig::default());

        assert_eq!(cleaned, vec![note(60, 0.0, 0.5), note(67, 2.0, 2.5)]);
    }

    #[test]
    fn test_overlapping_output_is_clipped() {
        let events = vec![note(60, 0.0, 1.0), note(67, 0.5, 1.5)];
        let merged = merge_notes(&events, None, &MergeConfig::default());

        assert_eq!(merged.len(), 2);
        assert!((merged[1].start - 1.0).abs() < 1e-12);
        assert!(merged[1].start >= merged[0].end);
    }

    #[test]
    fn test_dropped_fragment_does_not_break_idempotence() {
        // The short F between two Cs is dropped, leaving the Cs mergeable
        let events = vec![note(60, 0.0, 1.0), note(65, 1.0, 1.05), note(60, 1.06, 2.0)];
        let config = MergeConfig::default();

        let once = merge_notes(&events, None, &config);
        let twice = merge_notes(&once, None, &config);

        assert_eq!(once, twice);
        assert_eq!(once, vec![note(60, 0.0, 2.0)]);
    }

    #[test]
    fn test_output_never_overlaps_and_respects_min_duration() {
        let config = MergeConfig::default();
        let key = KeyEstimate::new(7, Mode::Major);

        for seed in 1..40 {
            let events = noisy_voice(seed, 60);
            for result in [
                merge_notes(&events, None, &config),
                clean_notes(&events, Some(&key), &config),
            ] {
                for note in &result {
                    assert!(note.duration() >= config.min_duration);
                }
                for pair in result.windows(2) {
                    assert!(pair[1].start >= pair[0].end, "overlap for seed {}", seed);
                }
            }
        }
    }

    #[test]
    fn test_merge_is_idempotent() {
        let config = MergeConfig::default();
        let key = KeyEstimate::new(9, Mode::Minor);

        for seed in 1..40 {
            let events = noisy_voice(seed, 60);

            let once = merge_notes(&events, None, &config);
            assert_eq!(merge_notes(&once, None, &config), once);

            let cleaned = clean_notes(&events, Some(&key), &config);
            assert_eq!(clean_notes(&cleaned, Some(&key), &config), cleaned);
        }
    }
}
