// Transcription configuration
// Every knob of the pipeline in one serde struct; missing JSON fields take defaults

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::OnsetConfig;
use crate::cleanup::MergeConfig;
use crate::groove::{AdaptiveConfig, DurationTable, TempoConfig, TimeSignature, DEFAULT_BPM};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Which quantization path to run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum QuantizationStrategy {
    /// Threshold table at a fixed tempo, starts untouched
    Fixed { table: DurationTable },

    /// Beat-snapped starts and performance-derived durations
    BeatAdaptive(AdaptiveConfig),
}

impl Default for QuantizationStrategy {
    fn default() -> Self {
        QuantizationStrategy::Fixed {
            table: DurationTable::default(),
        }
    }
}

impl QuantizationStrategy {
    pub fn to_string(&self) -> &'static str {
        match self {
            QuantizationStrategy::Fixed { .. } => "fixed",
            QuantizationStrategy::BeatAdaptive(_) => "beat_adaptive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub merge: MergeConfig,
    pub quantization: QuantizationStrategy,

    /// Drop short out-of-key notes after merging
    pub key_filtering: bool,

    /// Materialize rests in the lead part
    pub lead_rests: bool,

    /// Materialize rests in the harmony part
    pub harmony_rests: bool,

    /// Tempo used when no tempo can be estimated
    pub default_bpm: f64,

    /// Estimate tempo from note onsets when no audio is supplied
    pub estimate_tempo_from_notes: bool,

    pub time_signature: TimeSignature,
    pub tempo: TempoConfig,
    pub onsets: OnsetConfig,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        TranscriptionConfig {
            merge: MergeConfig::default(),
            quantization: QuantizationStrategy::default(),
            key_filtering: true,
            lead_rests: false,
            harmony_rests: true,
            default_bpm: DEFAULT_BPM,
            estimate_tempo_from_notes: false,
            time_signature: TimeSignature::common(),
            tempo: TempoConfig::default(),
            onsets: OnsetConfig::default(),
        }
    }
}

impl TranscriptionConfig {
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: TranscriptionConfig = serde_json::from_slice(bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path)?;
        let config = Self::from_json_bytes(&bytes)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.default_bpm > 0.0) || !self.default_bpm.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "default_bpm must be positive, got {}",
                self.default_bpm
            )));
        }
        if !(self.merge.max_gap >= 0.0) || !(self.merge.min_duration >= 0.0) {
            return Err(ConfigError::Invalid(
                "merge gap and minimum duration must be non-negative".to_string(),
            ));
        }
        if TimeSignature::new(self.time_signature.numerator, self.time_signature.denominator)
            .is_err()
        {
            return Err(ConfigError::Invalid(format!(
                "unsupported time signature {}",
                self.time_signature.label()
            )));
        }
        if let QuantizationStrategy::BeatAdaptive(adaptive) = &self.quantization {
            if adaptive.n_duration_clusters == 0 {
                return Err(ConfigError::Invalid(
                    "n_duration_clusters must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }
}
