// Part and Score Assembly
// Walks quantized notes into notes and rests, then fills measures barline by barline

use serde::{Deserialize, Serialize};

use super::types::{Element, Measure, Part, Score, ScoreError, Tie};
use crate::events::VoiceRole;
use crate::groove::{seconds_to_beats, DurationQuantizer, QuantizedNote, TimeSignature};
use crate::tonal::KeyEstimate;

/// Tolerance for floating point measure arithmetic (quarter notes)
const FILL_EPSILON: f64 = 1e-9;

/// How a single voice is turned into a part
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartOptions {
    pub name: String,
    pub role: VoiceRole,
    pub key: KeyEstimate,
    pub time_signature: TimeSignature,

    /// Materialize silence as rests
    pub include_rests: bool,

    /// Length of the voice in seconds; a trailing rest fills up to it
    pub total_duration: Option<f64>,

    /// Tempo used to express gaps in quarter notes
    pub tempo_bpm: f64,
}

impl PartOptions {
    /// Lead defaults: continuous melodic line, no rests
    pub fn lead(key: KeyEstimate, tempo_bpm: f64) -> Self {
        PartOptions {
            name: VoiceRole::Lead.display_name().to_string(),
            role: VoiceRole::Lead,
            key,
            time_signature: TimeSignature::common(),
            include_rests: false,
            total_duration: None,
            tempo_bpm,
        }
    }

    /// Harmony defaults: rests included
    pub fn harmony(key: KeyEstimate, tempo_bpm: f64) -> Self {
        PartOptions {
            name: VoiceRole::Harmony.display_name().to_string(),
            role: VoiceRole::Harmony,
            include_rests: true,
            ..PartOptions::lead(key, tempo_bpm)
        }
    }
}

/// Flat note/rest sequence for a voice
///
/// Gaps between the previous note's end and the next start become rests (when enabled)
/// and a trailing rest runs to `total_duration`. Rests that quantize to zero are dropped.
pub fn build_elements(
    notes: &[QuantizedNote],
    quantizer: &DurationQuantizer,
    options: &PartOptions,
) -> Vec<Element> {
    let mut elements = Vec::with_capacity(notes.len() * 2);
    let mut previous_end = 0.0f64;

    let rest_for = |gap_seconds: f64| -> Option<Element> {
        let beats = seconds_to_beats(gap_seconds, options.tempo_bpm);
        let duration = quantizer.quantize_rest(beats);
        (duration > 0.0).then(|| Element::rest(duration))
    };

    for note in notes {
        if options.include_rests {
            let gap = note.start - previous_end;
            if gap > 0.0 {
                elements.extend(rest_for(gap));
            }
        }

        elements.push(Element::note(note.pitch, note.velocity, note.duration));
        previous_end = previous_end.max(note.end);
    }

    if options.include_rests {
        if let Some(total) = options.total_duration {
            if total > previous_end {
                elements.extend(rest_for(total - previous_end));
            }
        }
    }

    elements
}

/// Split a flat element sequence into measures
///
/// Elements overflowing a barline are split there and carried into the next measure;
/// split notes are tied. Total duration is preserved and the last measure may be
/// partially filled.
pub fn partition_measures(elements: &[Element], time_signature: &TimeSignature) -> Vec<Measure> {
    let capacity = time_signature.quarter_length();
    if !(capacity > FILL_EPSILON) {
        log::warn!(
            "Cannot partition into measures of {}; time signature has no length",
            time_signature.label()
        );
        return Vec::new();
    }

    let mut measures = Vec::new();
    let mut current = Measure::new(1);
    let mut fill = 0.0f64;

    for element in elements {
        let mut remaining = element.duration();
        let mut piece = 0usize;

        while remaining > FILL_EPSILON {
            let room = capacity - fill;
            let take = if remaining <= room + FILL_EPSILON {
                remaining
            } else {
                room
            };
            let last_piece = remaining - take <= FILL_EPSILON;

            let tie = match (piece == 0, last_piece) {
                (true, true) => None,
                (true, false) => Some(Tie::Start),
                (false, true) => Some(Tie::Stop),
                (false, false) => Some(Tie::Continue),
            };

            current.elements.push(element.with_duration(take, tie));
            fill += take;
            remaining -= take;
            piece += 1;

            if fill >= capacity - FILL_EPSILON {
                let number = current.number + 1;
                measures.push(std::mem::replace(&mut current, Measure::new(number)));
                fill = 0.0;
            }
        }
    }

    if !current.is_empty() {
        measures.push(current);
    }

    measures
}

/// Assemble one voice into a measure-partitioned part
pub fn assemble_part(
    notes: &[QuantizedNote],
    quantizer: &DurationQuantizer,
    options: &PartOptions,
) -> Part {
    let elements = build_elements(notes, quantizer, options);
    let measures = partition_measures(&elements, &options.time_signature);

    log::debug!(
        "Assembled part '{}': {} elements in {} measures",
        options.name,
        elements.len(),
        measures.len()
    );

    Part {
        name: options.name.clone(),
        role: options.role,
        key: options.key,
        time_signature: options.time_signature,
        measures,
    }
}

/// Combine lead and optional harmony into a score
///
/// A harmony part shorter than the lead is padded with empty measures; the measure
/// invariant is then checked.
pub fn assemble_score(
    title: &str,
    tempo_bpm: f64,
    lead: Part,
    harmony: Option<Part>,
) -> Result<Score, ScoreError> {
    let lead_measures = lead.measure_count();
    let mut parts = vec![lead];

    if let Some(mut harmony) = harmony {
        if harmony.measure_count() < lead_measures {
            log::debug!(
                "Padding harmony from {} to {} measures",
                harmony.measure_count(),
                lead_measures
            );
            harmony.pad_to(lead_measures);
        }
        parts.push(harmony);
    }

    let score = Score {
        title: title.to_string(),
        tempo_bpm,
        parts,
    };
    score.validate()?;

    log::info!(
        "Assembled score '{}' with {} parts, {} measures",
        score.title,
        score.parts.len(),
        lead_measures
    );

    Ok(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groove::{DurationTable, QuantizationGrid};

    fn qnote(pitch: u8, start: f64, end: f64, duration: f64) -> QuantizedNote {
        QuantizedNote {
            pitch,
            velocity: 100,
            start,
            end,
            duration,
        }
    }

    fn quantizer() -> DurationQuantizer {
        DurationQuantizer::threshold(DurationTable::Eighth)
    }

    fn total(elements: &[Element]) -> f64 {
        elements.iter().map(Element::duration).sum()
    }

    #[test]
    fn test_empty_voice_gives_single_trailing_rest() {
        let mut options = PartOptions::harmony(KeyEstimate::default(), 120.0);
        options.total_duration = Some(2.0);

        let elements = build_elements(&[], &quantizer(), &options);
        assert_eq!(elements, vec![Element::rest(4.0)]);
    }

    #[test]
    fn test_long_silence_on_grid_policy_spans_full_duration() {
        let grid = DurationQuantizer::nearest_grid(QuantizationGrid::expressible());
        let mut options = PartOptions::harmony(KeyEstimate::default(), 120.0);
        options.total_duration = Some(30.0);

        let part = assemble_part(&[], &grid, &options);
        assert_eq!(part.total_duration(), 60.0);
        assert_eq!(part.measure_count(), 15);
        assert!(part.elements().all(Element::is_rest));
    }

    #[test]
    fn test_long_gap_keeps_following_note_in_place() {
        let grid = DurationQuantizer::nearest_grid(QuantizationGrid::expressible());
        let notes = vec![qnote(55, 0.0, 0.5, 1.0), qnote(57, 20.0, 20.5, 1.0)];
        let options = PartOptions::harmony(KeyEstimate::default(), 120.0);

        let elements = build_elements(&notes, &grid, &options);
        assert_eq!(
            elements,
            vec![
                Element::note(55, 100, 1.0),
                Element::rest(39.0),
                Element::note(57, 100, 1.0),
            ]
        );
    }

    #[test]
    fn test_zero_length_meter_yields_no_measures() {
        let meter = TimeSignature {
            numerator: 0,
            denominator: 4,
        };
        let elements = vec![Element::note(60, 100, 1.0), Element::rest(2.0)];
        assert!(partition_measures(&elements, &meter).is_empty());
    }

    #[test]
    fn test_empty_voice_with_zero_duration_has_no_elements() {
        let mut options = PartOptions::harmony(KeyEstimate::default(), 120.0);
        options.total_duration = Some(0.0);
        assert!(build_elements(&[], &quantizer(), &options).is_empty());

        let part = assemble_part(&[], &quantizer(), &options);
        assert_eq!(part.measure_count(), 0);
    }

    #[test]
    fn test_rests_fill_gaps_when_enabled() {
        let notes = vec![qnote(60, 0.0, 0.5, 1.0), qnote(62, 1.0, 1.5, 1.0)];
        let options = PartOptions::harmony(KeyEstimate::default(), 120.0);

        let elements = build_elements(&notes, &quantizer(), &options);
        assert_eq!(
            elements,
            vec![
                Element::note(60, 100, 1.0),
                Element::rest(1.0),
                Element::note(62, 100, 1.0),
            ]
        );
    }

    #[test]
    fn test_lead_omits_rests() {
        let notes = vec![qnote(60, 0.5, 1.0, 1.0), qnote(62, 2.0, 2.5, 1.0)];
        let mut options = PartOptions::lead(KeyEstimate::default(), 120.0);
        options.total_duration = Some(10.0);

        let elements = build_elements(&notes, &quantizer(), &options);
        assert_eq!(elements.len(), 2);
        assert!(elements.iter().all(|e| !e.is_rest()));
    }

    #[test]
    fn test_tiny_gaps_produce_no_rest() {
        // 0.05s at 120 BPM = 0.1 beats, under half an eighth
        let notes = vec![qnote(60, 0.0, 0.5, 1.0), qnote(62, 0.55, 1.0, 1.0)];
        let options = PartOptions::harmony(KeyEstimate::default(), 120.0);
        assert_eq!(build_elements(&notes, &quantizer(), &options).len(), 2);
    }

    #[test]
    fn test_leading_silence_becomes_rest() {
        let notes = vec![qnote(67, 1.0, 1.5, 1.0)];
        let options = PartOptions::harmony(KeyEstimate::default(), 120.0);
        let elements = build_elements(&notes, &quantizer(), &options);
        assert_eq!(elements[0], Element::rest(2.0));
    }

    #[test]
    fn test_partition_splits_and_ties() {
        let elements = vec![Element::note(60, 100, 3.0), Element::note(62, 90, 2.0)];
        let measures = partition_measures(&elements, &TimeSignature::common());

        assert_eq!(measures.len(), 2);
        assert_eq!(measures[0].number, 1);
        assert_eq!(measures[1].number, 2);
        assert_eq!(
            measures[0].elements[1],
            Element::Note {
                pitch: 62,
                velocity: 90,
                duration: 1.0,
                tie: Some(Tie::Start)
            }
        );
        assert_eq!(
            measures[1].elements[0],
            Element::Note {
                pitch: 62,
                velocity: 90,
                duration: 1.0,
                tie: Some(Tie::Stop)
            }
        );
    }

    #[test]
    fn test_long_note_spans_several_measures() {
        let elements = vec![Element::note(60, 100, 1.0), Element::note(64, 100, 10.0)];
        let measures = partition_measures(&elements, &TimeSignature::common());

        assert_eq!(measures.len(), 3);
        let ties: Vec<Option<Tie>> = measures
            .iter()
            .flat_map(|m| m.elements.iter())
            .filter_map(|e| match e {
                Element::Note { pitch: 64, tie, .. } => Some(*tie),
                _ => None,
            })
            .collect();
        assert_eq!(ties, vec![Some(Tie::Start), Some(Tie::Continue), Some(Tie::Stop)]);
        assert!((measures[2].duration() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_rests_split_without_ties() {
        let elements = vec![Element::note(60, 100, 3.0), Element::rest(2.0)];
        let measures = partition_measures(&elements, &TimeSignature::common());
        assert_eq!(measures[0].elements[1], Element::rest(1.0));
        assert_eq!(measures[1].elements[0], Element::rest(1.0));
    }

    #[test]
    fn test_partition_preserves_total_duration() {
        let elements: Vec<Element> = (0..37)
            .map(|i| {
                let duration = [0.25, 0.5, 1.0, 1.5, 2.0, 3.0, 4.0, 5.0][i % 8];
                if i % 3 == 0 {
                    Element::rest(duration)
                } else {
                    Element::note(60 + (i % 12) as u8, 100, duration)
                }
            })
            .collect();

        for ts in [TimeSignature::common(), TimeSignature::new(3, 4).unwrap()] {
            let measures = partition_measures(&elements, &ts);
            let partitioned: f64 = measures.iter().map(Measure::duration).sum();
            assert!((partitioned - total(&elements)).abs() < 1e-9);

            // Every measure but the last is exactly full
            for measure in &measures[..measures.len() - 1] {
                assert!((measure.duration() - ts.quarter_length()).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_assemble_score_pads_harmony() {
        let lead_notes: Vec<QuantizedNote> = (0..12)
            .map(|i| qnote(60, i as f64 * 0.5, i as f64 * 0.5 + 0.5, 1.0))
            .collect();
        let harmony_notes = vec![qnote(55, 0.0, 1.0, 2.0)];

        let lead = assemble_part(
            &lead_notes,
            &quantizer(),
            &PartOptions::lead(KeyEstimate::default(), 120.0),
        );
        let harmony = assemble_part(
            &harmony_notes,
            &quantizer(),
            &PartOptions::harmony(KeyEstimate::default(), 120.0),
        );
        assert_eq!(lead.measure_count(), 3);
        assert_eq!(harmony.measure_count(), 1);

        let score = assemble_score("Test", 120.0, lead, Some(harmony)).unwrap();
        assert_eq!(score.parts.len(), 2);
        assert_eq!(score.parts[0].role, VoiceRole::Lead);
        assert_eq!(score.parts[1].measure_count(), 3);
        assert!(score.parts[1].measures[2].is_empty());
        assert!(score.validate().is_ok());
    }

    #[test]
    fn test_assemble_score_lead_only() {
        let lead = assemble_part(
            &[qnote(60, 0.0, 0.5, 1.0)],
            &quantizer(),
            &PartOptions::lead(KeyEstimate::default(), 120.0),
        );
        let score = assemble_score("Solo", 96.0, lead, None).unwrap();
        assert_eq!(score.parts.len(), 1);
        assert!(score.harmony().is_none());
        assert_eq!(score.tempo_bpm, 96.0);
    }
}
