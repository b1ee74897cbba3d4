// Key estimation
// Duration-weighted pitch-class histogram correlated against the 24 major/minor profiles

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::profiles::{
    MAJOR_FIFTHS, MAJOR_PROFILE, MAJOR_SCALE, MINOR_PROFILE, MINOR_SCALE, PITCH_CLASS_NAMES,
};
use crate::events::NoteEvent;

/// Why a key could not be inferred from a voice
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KeyError {
    #[error("No pitched material to estimate a key from")]
    EmptyHistogram,

    #[error("Histogram contains non-finite weights")]
    NonFinite,
}

/// Major or (natural) minor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Major,
    Minor,
}

impl Mode {
    pub fn profile(&self) -> &'static [f64; 12] {
        match self {
            Mode::Major => &MAJOR_PROFILE,
            Mode::Minor => &MINOR_PROFILE,
        }
    }

    pub fn scale(&self) -> &'static [u8; 7] {
        match self {
            Mode::Major => &MAJOR_SCALE,
            Mode::Minor => &MINOR_SCALE,
        }
    }

    pub fn to_string(&self) -> &'static str {
        match self {
            Mode::Major => "major",
            Mode::Minor => "minor",
        }
    }
}

/// Tonic pitch class plus mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyEstimate {
    /// Pitch class of the tonic (0 = C ... 11 = B)
    pub tonic: u8,
    pub mode: Mode,
}

impl Default for KeyEstimate {
    fn default() -> Self {
        KeyEstimate {
            tonic: 0,
            mode: Mode::Major,
        }
    }
}

impl KeyEstimate {
    pub fn new(tonic: u8, mode: Mode) -> Self {
        KeyEstimate {
            tonic: tonic % 12,
            mode,
        }
    }

    /// Human-readable name, e.g. "F# minor"
    pub fn name(&self) -> String {
        format!(
            "{} {}",
            PITCH_CLASS_NAMES[self.tonic as usize % 12],
            self.mode.to_string()
        )
    }

    /// Key signature as a count of sharps (positive) or flats (negative)
    pub fn fifths(&self) -> i8 {
        let major_tonic = match self.mode {
            Mode::Major => self.tonic,
            Mode::Minor => (self.tonic % 12 + 3) % 12,
        };
        MAJOR_FIFTHS[major_tonic as usize % 12]
    }

    /// Whether a pitch class belongs to this key's scale
    pub fn contains(&self, pitch_class: u8) -> bool {
        let step = (pitch_class % 12 + 12 - self.tonic % 12) % 12;
        self.mode.scale().contains(&step)
    }

    /// Whether a note's pitch class belongs to this key's scale
    pub fn contains_pitch(&self, pitch: u8) -> bool {
        self.contains(pitch % 12)
    }

    /// Move a pitch to the nearest in-scale pitch within the same octave
    ///
    /// Ties go to the lower pitch. In-scale pitches are returned unchanged.
    pub fn snap_pitch(&self, pitch: u8) -> u8 {
        if self.contains_pitch(pitch) {
            return pitch;
        }

        let octave_base = i32::from(pitch / 12) * 12;
        let target = i32::from(pitch);

        let mut best: Option<(i32, i32)> = None;
        for pc in 0..12u8 {
            if !self.contains(pc) {
                continue;
            }
            let candidate = octave_base + i32::from(pc);
            if candidate > 127 {
                continue;
            }
            let distance = (candidate - target).abs();
            let better = match best {
                None => true,
                Some((best_distance, best_pitch)) => {
                    distance < best_distance || (distance == best_distance && candidate < best_pitch)
                }
            };
            if better {
                best = Some((distance, candidate));
            }
        }

        best.map(|(_, p)| p as u8).unwrap_or(pitch)
    }
}

/// Duration-weighted distribution over the 12 pitch classes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchClassHistogram {
    /// Normalized weights (sum to 1, or all zero)
    pub weights: [f64; 12],
}

impl PitchClassHistogram {
    /// Build from note events, weighting each pitch class by summed duration
    pub fn from_events(events: &[NoteEvent]) -> Self {
        let mut weights = [0.0f64; 12];
        for event in events {
            let duration = event.duration();
            // Non-finite spans are kept so the estimator can report them
            if duration > 0.0 || !duration.is_finite() {
                weights[event.pitch_class() as usize] += duration;
            }
        }
        Self::from_weights(weights)
    }

    /// Normalize raw weights; negative entries count as zero
    pub fn from_weights(raw: [f64; 12]) -> Self {
        let mut weights = raw;
        for w in weights.iter_mut() {
            if *w < 0.0 {
                *w = 0.0;
            }
        }

        let total: f64 = weights.iter().sum();
        if total > 0.0 && total.is_finite() {
            for w in weights.iter_mut() {
                *w /= total;
            }
        }

        PitchClassHistogram { weights }
    }

    pub fn is_empty(&self) -> bool {
        self.weights.iter().all(|&w| w == 0.0)
    }

    pub fn is_finite(&self) -> bool {
        self.weights.iter().all(|w| w.is_finite())
    }

    /// Dot product of the histogram, rotated so `tonic` sits at index 0, with a profile
    pub fn correlate(&self, tonic: u8, profile: &[f64; 12]) -> f64 {
        (0..12)
            .map(|step| self.weights[(step + tonic as usize) % 12] * profile[step])
            .sum()
    }
}

/// One scored tonic/mode combination
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyCandidate {
    pub key: KeyEstimate,
    pub score: f64,
}

/// Score all 24 keys, best first
///
/// Enumeration order is tonic 0..11 with major before minor; the stable sort keeps that
/// order among equal scores, so the earliest candidate wins ties.
pub fn rank_keys(histogram: &PitchClassHistogram) -> Vec<KeyCandidate> {
    let mut candidates = Vec::with_capacity(24);
    for tonic in 0..12u8 {
        for mode in [Mode::Major, Mode::Minor] {
            candidates.push(KeyCandidate {
                key: KeyEstimate::new(tonic, mode),
                score: histogram.correlate(tonic, mode.profile()),
            });
        }
    }

    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates
}

/// Relative margin between the best and runner-up candidate [0.0, 1.0]
pub fn key_confidence(ranked: &[KeyCandidate]) -> f64 {
    match ranked {
        [best, second, ..] if best.score > 0.0 => {
            ((best.score - second.score) / best.score).clamp(0.0, 1.0)
        }
        _ => 0.0,
    }
}

/// Estimate the key of a voice, reporting degenerate input
pub fn try_estimate_key(events: &[NoteEvent]) -> Result<KeyEstimate, KeyError> {
    let histogram = PitchClassHistogram::from_events(events);

    if !histogram.is_finite() {
        return Err(KeyError::NonFinite);
    }
    if histogram.is_empty() {
        return Err(KeyError::EmptyHistogram);
    }

    let ranked = rank_keys(&histogram);
    let best = ranked[0];

    log::debug!(
        "Key estimate {} (score {:.3}, confidence {:.2}, runner-up {})",
        best.key.name(),
        best.score,
        key_confidence(&ranked),
        ranked[1].key.name()
    );

    Ok(best.key)
}

/// Estimate the key of a voice, defaulting to C major for degenerate input
pub fn estimate_key(events: &[NoteEvent]) -> KeyEstimate {
    try_estimate_key(events).unwrap_or_default()
}
