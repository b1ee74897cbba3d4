// Transcription pipeline
// Voices -> key -> cleanup -> rhythm -> quantization -> score, one stage at a time

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::config::{ConfigError, QuantizationStrategy, TranscriptionConfig};
use super::trace::{Stage, TraceBuilder, TraceEntry, TraceError, TraceWriter};
use crate::audio::{analyze_rhythm, AudioBuffer, AudioError};
use crate::cleanup::{clean_notes, merge_notes};
use crate::events::{EventError, NoteEvent, NoteEventSource, SourceError, Voice, VoiceRole};
use crate::groove::{
    estimate_tempo_from_notes, quantize_adaptive, quantize_fixed, BeatTrack, DurationQuantizer,
    QuantizationGrid, QuantizedNote, TempoEstimate,
};
use crate::score::{assemble_part, assemble_score, Part, PartOptions, Score, ScoreError};
use crate::tonal::{try_estimate_key, KeyEstimate};

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("Failed to load note events: {0}")]
    Source(#[from] SourceError),

    #[error("No lead voice in the input")]
    MissingLead,

    #[error("Lead voice event {index} is invalid: {source}")]
    InvalidLead { index: usize, source: EventError },

    #[error("Audio analysis failed: {0}")]
    Audio(#[from] AudioError),

    #[error("Score assembly failed: {0}")]
    Score(#[from] ScoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Trace error: {0}")]
    Trace(#[from] TraceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// What happened to one voice on its way into the score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSummary {
    pub role: VoiceRole,
    pub name: String,
    pub key: KeyEstimate,

    /// False when the key fell back to the default
    pub key_estimated: bool,
    pub raw_events: usize,
    pub cleaned_notes: usize,
}

/// Result of one transcription request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcription {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub tempo: TempoEstimate,
    pub voices: Vec<VoiceSummary>,
    pub score: Score,
}

/// A voice after key estimation and cleanup
struct PreparedVoice {
    voice: Voice,
    key: KeyEstimate,
    key_estimated: bool,
    notes: Vec<NoteEvent>,
}

/// Runs the pipeline with one configuration; holds no per-request state
pub struct Transcriber {
    config: TranscriptionConfig,
    trace: Option<TraceWriter>,
}

impl Transcriber {
    pub fn new(config: TranscriptionConfig) -> Self {
        Transcriber {
            config,
            trace: None,
        }
    }

    /// Record stage progress to a JSONL trace
    pub fn with_trace(mut self, writer: TraceWriter) -> Self {
        self.trace = Some(writer);
        self
    }

    pub fn config(&self) -> &TranscriptionConfig {
        &self.config
    }

    fn record(&self, entry: TraceEntry) -> Result<(), TranscriptionError> {
        if let Some(writer) = &self.trace {
            writer.write(&entry)?;
        }
        Ok(())
    }

    /// Load voices from a source and transcribe them
    pub fn transcribe_source(
        &self,
        title: &str,
        source: &dyn NoteEventSource,
        audio: Option<&AudioBuffer>,
    ) -> Result<Transcription, TranscriptionError> {
        let voices = source.load_voices()?;
        self.transcribe_voices(title, voices, audio)
    }

    /// Transcribe already-loaded voices
    ///
    /// The first lead voice is required and must be well-formed. The first harmony voice
    /// is optional; a malformed one is dropped with a warning.
    pub fn transcribe_voices(
        &self,
        title: &str,
        voices: Vec<Voice>,
        audio: Option<&AudioBuffer>,
    ) -> Result<Transcription, TranscriptionError> {
        self.config.validate()?;
        let id = Uuid::new_v4();

        let load = TraceBuilder::new(id, Stage::Load);
        self.record(load.start(format!("Selecting voices for '{}'", title)))?;
        let (lead, harmony) = select_voices(voices)?;
        self.record(load.complete("Voices selected").with_data(serde_json::json!({
            "lead_events": lead.events.len(),
            "harmony_events": harmony.as_ref().map(|h| h.events.len()),
        })))?;

        // Silence after the last note still belongs to the recording
        let total_duration = audio
            .map(|a| a.duration_secs())
            .unwrap_or(0.0)
            .max(lead.end_time())
            .max(harmony.as_ref().map(Voice::end_time).unwrap_or(0.0));

        let keys = TraceBuilder::new(id, Stage::KeyEstimation);
        self.record(keys.start("Estimating keys"))?;
        let lead = self.estimate_voice_key(lead);
        let harmony = harmony.map(|h| self.estimate_voice_key(h));
        self.record(keys.complete(format!("Lead key {}", lead.key.name())))?;

        let cleanup = TraceBuilder::new(id, Stage::Cleanup);
        self.record(cleanup.start("Merging and filtering notes"))?;
        let lead = self.clean_voice(lead);
        let harmony = harmony.map(|h| self.clean_voice(h));
        self.record(cleanup.complete("Notes cleaned").with_data(serde_json::json!({
            "lead_notes": lead.notes.len(),
            "harmony_notes": harmony.as_ref().map(|h| h.notes.len()),
        })))?;

        let rhythm = TraceBuilder::new(id, Stage::Rhythm);
        self.record(rhythm.start("Estimating tempo"))?;
        let tempo = self.estimate_tempo(&lead.notes, audio)?;
        let bpm = tempo.bpm;
        self.record(rhythm.complete(format!("{:.1} BPM", bpm)))?;

        let quantization = TraceBuilder::new(id, Stage::Quantization);
        self.record(quantization.start(format!(
            "Quantizing with {} strategy",
            self.config.quantization.to_string()
        )))?;
        let rest_quantizer = self.rest_quantizer();
        let lead_quantized = self.quantize_voice(&lead, &tempo.beats, bpm);
        let harmony_quantized = harmony
            .as_ref()
            .map(|h| self.quantize_voice(h, &tempo.beats, bpm));
        self.record(quantization.complete("Durations quantized"))?;

        let assembly = TraceBuilder::new(id, Stage::Assembly);
        self.record(assembly.start("Assembling score"))?;
        let lead_part = self.assemble_voice(
            &lead,
            &lead_quantized,
            &rest_quantizer,
            bpm,
            total_duration,
        );
        let harmony_part = match (&harmony, &harmony_quantized) {
            (Some(h), Some(q)) => {
                Some(self.assemble_voice(h, q, &rest_quantizer, bpm, total_duration))
            }
            _ => None,
        };
        let score = assemble_score(title, bpm, lead_part, harmony_part)?;
        self.record(assembly.complete("Score assembled").with_data(serde_json::json!({
            "parts": score.parts.len(),
            "measures": score.lead().map(Part::measure_count),
        })))?;

        let voices = std::iter::once(&lead)
            .chain(harmony.as_ref())
            .map(|p| VoiceSummary {
                role: p.voice.role,
                name: p.voice.part_name(),
                key: p.key,
                key_estimated: p.key_estimated,
                raw_events: p.voice.events.len(),
                cleaned_notes: p.notes.len(),
            })
            .collect();

        log::info!(
            "Transcription {} complete: {} parts at {:.1} BPM",
            id,
            score.parts.len(),
            bpm
        );

        Ok(Transcription {
            id,
            created_at: Utc::now(),
            tempo,
            voices,
            score,
        })
    }

    fn estimate_voice_key(&self, voice: Voice) -> PreparedVoice {
        let (key, key_estimated) = match try_estimate_key(&voice.events) {
            Ok(key) => (key, true),
            Err(e) => {
                log::warn!(
                    "Key estimation failed for {}: {}; using {}",
                    voice.part_name(),
                    e,
                    KeyEstimate::default().name()
                );
                (KeyEstimate::default(), false)
            }
        };

        PreparedVoice {
            voice,
            key,
            key_estimated,
            notes: Vec::new(),
        }
    }

    /// Merge, and key-filter when the key is trustworthy
    fn clean_voice(&self, mut prepared: PreparedVoice) -> PreparedVoice {
        let key = prepared.key_estimated.then_some(&prepared.key);
        let events = &prepared.voice.events;

        prepared.notes = if self.config.key_filtering {
            clean_notes(events, key, &self.config.merge)
        } else {
            merge_notes(events, key, &self.config.merge)
        };
        prepared
    }

    /// Tempo from audio or note onsets; any fallback resolves to the configured default
    fn estimate_tempo(
        &self,
        lead_notes: &[NoteEvent],
        audio: Option<&AudioBuffer>,
    ) -> Result<TempoEstimate, TranscriptionError> {
        let estimate = if let Some(audio) = audio {
            analyze_rhythm(audio, &self.config.onsets, &self.config.tempo)?.tempo
        } else if self.config.estimate_tempo_from_notes {
            estimate_tempo_from_notes(lead_notes, &self.config.tempo)
        } else {
            TempoEstimate::fallback(self.config.default_bpm)
        };

        if estimate.is_fallback() {
            log::debug!("No tempo estimate; using {:.1} BPM", self.config.default_bpm);
            return Ok(TempoEstimate::fallback(self.config.default_bpm));
        }
        Ok(estimate)
    }

    fn quantize_voice(&self, prepared: &PreparedVoice, beats: &BeatTrack, bpm: f64) -> Vec<QuantizedNote> {
        match &self.config.quantization {
            QuantizationStrategy::Fixed { table } => {
                quantize_fixed(&prepared.notes, &DurationQuantizer::threshold(*table), bpm)
            }
            QuantizationStrategy::BeatAdaptive(adaptive) => {
                let key = prepared.key_estimated.then_some(&prepared.key);
                quantize_adaptive(&prepared.notes, beats, bpm, key, adaptive)
            }
        }
    }

    /// Quantizer used for rests, matching the note vocabulary of the strategy
    fn rest_quantizer(&self) -> DurationQuantizer {
        match &self.config.quantization {
            QuantizationStrategy::Fixed { table } => DurationQuantizer::threshold(*table),
            QuantizationStrategy::BeatAdaptive(_) => {
                DurationQuantizer::nearest_grid(QuantizationGrid::expressible())
            }
        }
    }

    fn assemble_voice(
        &self,
        prepared: &PreparedVoice,
        notes: &[QuantizedNote],
        rest_quantizer: &DurationQuantizer,
        bpm: f64,
        total_duration: f64,
    ) -> Part {
        let include_rests = match prepared.voice.role {
            VoiceRole::Lead => self.config.lead_rests,
            VoiceRole::Harmony => self.config.harmony_rests,
        };

        let options = PartOptions {
            name: prepared.voice.part_name(),
            role: prepared.voice.role,
            key: prepared.key,
            time_signature: self.config.time_signature,
            include_rests,
            total_duration: Some(total_duration),
            tempo_bpm: bpm,
        };

        assemble_part(notes, rest_quantizer, &options)
    }
}

/// Pick the lead and an optional harmony voice
fn select_voices(voices: Vec<Voice>) -> Result<(Voice, Option<Voice>), TranscriptionError> {
    let mut lead = None;
    let mut harmony = None;
    let mut ignored = 0usize;

    for voice in voices {
        match voice.role {
            VoiceRole::Lead if lead.is_none() => lead = Some(voice),
            VoiceRole::Harmony if harmony.is_none() => harmony = Some(voice),
            _ => ignored += 1,
        }
    }

    if ignored > 0 {
        log::debug!("Ignoring {} additional voices", ignored);
    }

    let lead = lead.ok_or(TranscriptionError::MissingLead)?;
    lead.validate()
        .map_err(|(index, source)| TranscriptionError::InvalidLead { index, source })?;

    let harmony = harmony.and_then(|h| match h.validate() {
        Ok(()) => Some(h),
        Err((index, e)) => {
            log::warn!(
                "Dropping harmony voice: event {} is invalid ({}); producing lead-only score",
                index,
                e
            );
            None
        }
    });

    Ok((lead, harmony))
}
