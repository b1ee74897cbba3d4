// End-to-end transcription tests
// Exercise the public API from note events to score, MIDI, and trace output

use tempfile::TempDir;

use vocalscore_lib::cleanup::{merge_notes, MergeConfig};
use vocalscore_lib::events::{parse_midi_voices, JsonSource, MemorySource, NoteEvent, Voice, VoiceRole};
use vocalscore_lib::groove::{DurationQuantizer, DurationTable};
use vocalscore_lib::pipeline::{read_trace_file, Transcriber, TranscriptionConfig, TraceWriter};
use vocalscore_lib::score::{build_elements, export_score_midi, Element, MidiExportOptions, PartOptions};
use vocalscore_lib::state::{CachedSource, NoteEventCache};
use vocalscore_lib::tonal::{rank_keys, KeyEstimate, Mode, PitchClassHistogram};

fn note(pitch: u8, start: f64, end: f64) -> NoteEvent {
    NoteEvent::new(pitch, start, end, 100)
}

/// Eight detached notes, one per beat at 120 BPM
fn melody() -> Vec<NoteEvent> {
    [60, 62, 64, 65, 67, 69, 71, 72]
        .iter()
        .enumerate()
        .map(|(i, &p)| note(p, i as f64 * 0.5, i as f64 * 0.5 + 0.3))
        .collect()
}

#[test]
fn test_fragmented_note_merges_across_small_gap() {
    let events = vec![note(60, 0.0, 0.4), note(60, 0.42, 0.9), note(64, 0.95, 1.5)];
    let config = MergeConfig {
        max_gap: 0.15,
        pitch_tolerance: 1,
        min_duration: 0.2,
        ..MergeConfig::default()
    };

    let merged = merge_notes(&events, None, &config);
    assert_eq!(merged, vec![note(60, 0.0, 0.9), note(64, 0.95, 1.5)]);
}

#[test]
fn test_triad_histogram_picks_c_major() {
    let mut weights = [0.0; 12];
    weights[0] = 1.0;
    weights[4] = 1.0;
    weights[7] = 1.0;

    let ranked = rank_keys(&PitchClassHistogram::from_weights(weights));
    assert_eq!(ranked[0].key, KeyEstimate::new(0, Mode::Major));
}

#[test]
fn test_eighth_table_boundaries() {
    let table = DurationTable::Eighth;
    assert_eq!(table.quantize(0.6), 1.0);
    assert_eq!(table.quantize(0.5), 1.0);
    assert_eq!(table.quantize(1.5), 2.0);
}

#[test]
fn test_empty_voice_with_rests_is_one_trailing_rest() {
    let quantizer = DurationQuantizer::threshold(DurationTable::Eighth);
    let mut options = PartOptions::harmony(KeyEstimate::default(), 120.0);

    options.total_duration = Some(2.0);
    assert_eq!(build_elements(&[], &quantizer, &options), vec![Element::rest(4.0)]);

    options.total_duration = Some(0.0);
    assert!(build_elements(&[], &quantizer, &options).is_empty());
}

#[test]
fn test_silent_harmony_is_padded_to_lead() {
    let voices = vec![Voice::lead(melody()), Voice::harmony(vec![])];
    let result = Transcriber::new(TranscriptionConfig::default())
        .transcribe_voices("Duet", voices, None)
        .unwrap();

    let lead = result.score.lead().unwrap();
    let harmony = result.score.harmony().unwrap();
    assert_eq!(lead.measure_count(), 2);
    assert!(harmony.measure_count() >= lead.measure_count());
    assert_eq!(harmony.note_count(), 0);
}

#[test]
fn test_json_file_to_midi_round_trip() {
    let dir = TempDir::new().unwrap();
    let json_path = dir.path().join("take.json");
    let voices = vec![
        Voice::harmony(vec![note(55, 0.0, 1.8)]),
        Voice::lead(melody()),
    ];
    std::fs::write(&json_path, serde_json::to_vec(&voices).unwrap()).unwrap();

    let transcription = Transcriber::new(TranscriptionConfig::default())
        .transcribe_source("Take", &JsonSource::new(&json_path), None)
        .unwrap();
    assert_eq!(transcription.score.parts[0].role, VoiceRole::Lead);

    let midi = export_score_midi(&transcription.score, &MidiExportOptions::default()).unwrap();
    let parsed = parse_midi_voices(&midi).unwrap();

    assert_eq!(parsed[0].role, VoiceRole::Lead);
    let pitches: Vec<u8> = parsed[0].events.iter().map(|e| e.pitch).collect();
    assert_eq!(pitches, vec![60, 62, 64, 65, 67, 69, 71, 72]);
}

#[test]
fn test_cached_source_and_trace_together() {
    let dir = TempDir::new().unwrap();
    let trace_path = dir.path().join("trace.jsonl");
    let source = CachedSource::new(
        MemorySource::new(vec![Voice::lead(melody())]),
        NoteEventCache::new(dir.path().join("cache")),
        b"recording",
    );

    let transcriber =
        Transcriber::new(TranscriptionConfig::default()).with_trace(TraceWriter::new(&trace_path));
    let first = transcriber.transcribe_source("One", &source, None).unwrap();
    let second = transcriber.transcribe_source("Two", &source, None).unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(first.score.parts, second.score.parts);

    let entries = read_trace_file(&trace_path).unwrap();
    assert_eq!(entries.len(), 24);
}

#[test]
fn test_top_level_transcribe_helper() {
    let result = vocalscore_lib::transcribe("Helper", vec![Voice::lead(melody())]).unwrap();
    assert_eq!(result.score.title, "Helper");
    assert_eq!(result.score.lead().unwrap().note_count(), 8);
}
