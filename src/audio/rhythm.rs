// Rhythm analysis
// Onsets from the recording feed tempo estimation and the beat track

use serde::{Deserialize, Serialize};

use super::features::{detect_onsets, OnsetConfig};
use super::ingest::{AudioBuffer, AudioError};
use crate::groove::{estimate_tempo_with_config, BeatTrack, TempoConfig, TempoEstimate};

/// Tempo and beat positions derived from audio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RhythmAnalysis {
    pub tempo: TempoEstimate,
    pub beats: BeatTrack,
    pub onset_count: usize,
}

/// Detect onsets and estimate tempo and beats for a recording
pub fn analyze_rhythm(
    audio: &AudioBuffer,
    onsets: &OnsetConfig,
    tempo: &TempoConfig,
) -> Result<RhythmAnalysis, AudioError> {
    let detected = detect_onsets(audio, onsets)?;
    let times: Vec<f64> = detected.iter().map(|o| o.time).collect();
    let estimate = estimate_tempo_with_config(&times, tempo);

    log::info!(
        "Rhythm analysis: {} onsets, {:.1} BPM (confidence {:.2}), {} beats",
        detected.len(),
        estimate.bpm,
        estimate.confidence,
        estimate.beats.len()
    );

    Ok(RhythmAnalysis {
        beats: estimate.beats.clone(),
        tempo: estimate,
        onset_count: detected.len(),
    })
}
