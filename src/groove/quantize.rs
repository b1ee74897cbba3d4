// Duration Quantization - maps performed lengths onto notatable note values
// Threshold tables, nearest-grid snapping, and the fixed-grid note path

use serde::{Deserialize, Serialize};

use super::adaptive::kmeans_1d;
use super::grid::{GridError, QuantizationGrid};
use crate::events::NoteEvent;

/// Convert seconds to quarter-note beats at a tempo
pub fn seconds_to_beats(seconds: f64, bpm: f64) -> f64 {
    seconds * bpm / 60.0
}

/// Convert quarter-note beats to seconds at a tempo
pub fn beats_to_seconds(beats: f64, bpm: f64) -> f64 {
    if bpm > 0.0 {
        beats * 60.0 / bpm
    } else {
        0.0
    }
}

/// Threshold table resolution
///
/// Each table is a strictly increasing list of `(upper_bound, value)` pairs in
/// quarter-note units, compared with `<`. Durations past the last bound round to the
/// nearest whole quarter note, never below the last value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationTable {
    Sixteenth,
    #[default]
    Eighth,
    Quarter,
    /// Adds dotted values (dotted quarter, dotted half)
    Extended,
}

const SIXTEENTH_TABLE: &[(f64, f64)] = &[(0.5, 0.25), (1.0, 0.5), (2.0, 1.0), (3.0, 2.0)];
const EIGHTH_TABLE: &[(f64, f64)] = &[(0.5, 0.5), (1.5, 1.0), (2.5, 2.0), (3.5, 3.0)];
const QUARTER_TABLE: &[(f64, f64)] = &[(1.5, 1.0), (2.5, 2.0), (3.5, 3.0)];
const EXTENDED_TABLE: &[(f64, f64)] = &[
    (0.375, 0.25),
    (0.75, 0.5),
    (1.25, 1.0),
    (1.75, 1.5),
    (2.5, 2.0),
    (3.5, 3.0),
];

/// Step used to round durations past the last threshold
const OVERFLOW_STEP: f64 = 1.0;

impl DurationTable {
    pub fn thresholds(&self) -> &'static [(f64, f64)] {
        match self {
            DurationTable::Sixteenth => SIXTEENTH_TABLE,
            DurationTable::Eighth => EIGHTH_TABLE,
            DurationTable::Quarter => QUARTER_TABLE,
            DurationTable::Extended => EXTENDED_TABLE,
        }
    }

    /// Smallest value the table can produce
    pub fn smallest(&self) -> f64 {
        self.thresholds()[0].1
    }

    /// Bucket a duration in quarter notes
    pub fn quantize(&self, beats: f64) -> f64 {
        let table = self.thresholds();
        let beats = sanitize(beats);

        for &(bound, value) in table {
            if beats < bound {
                return value;
            }
        }

        let last = table[table.len() - 1].1;
        ((beats / OVERFLOW_STEP).round() * OVERFLOW_STEP).max(last)
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "sixteenth" | "16th" => Some(DurationTable::Sixteenth),
            "eighth" | "8th" => Some(DurationTable::Eighth),
            "quarter" => Some(DurationTable::Quarter),
            "extended" => Some(DurationTable::Extended),
            _ => None,
        }
    }

    pub fn to_string(&self) -> &'static str {
        match self {
            DurationTable::Sixteenth => "sixteenth",
            DurationTable::Eighth => "eighth",
            DurationTable::Quarter => "quarter",
            DurationTable::Extended => "extended",
        }
    }
}

/// Negative, NaN and infinite inputs are treated as zero length
fn sanitize(beats: f64) -> f64 {
    if beats.is_finite() && beats > 0.0 {
        beats
    } else {
        0.0
    }
}

/// How a duration is mapped onto a note value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", content = "values", rename_all = "snake_case")]
pub enum DurationPolicy {
    /// Ordered threshold comparisons
    Threshold(DurationTable),

    /// Closest value of an explicit grid
    NearestGrid(QuantizationGrid),
}

impl Default for DurationPolicy {
    fn default() -> Self {
        DurationPolicy::Threshold(DurationTable::default())
    }
}

/// Pure duration quantizer parameterized by a policy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DurationQuantizer {
    pub policy: DurationPolicy,
}

impl DurationQuantizer {
    pub fn new(policy: DurationPolicy) -> Self {
        DurationQuantizer { policy }
    }

    pub fn threshold(table: DurationTable) -> Self {
        DurationQuantizer::new(DurationPolicy::Threshold(table))
    }

    pub fn nearest_grid(grid: QuantizationGrid) -> Self {
        DurationQuantizer::new(DurationPolicy::NearestGrid(grid))
    }

    /// Nearest-grid quantizer whose grid is the k-means centroids of the given
    /// durations (quarter notes)
    pub fn population_adaptive(durations: &[f64], n_clusters: usize) -> Result<Self, GridError> {
        let positive: Vec<f64> = durations
            .iter()
            .copied()
            .filter(|d| d.is_finite() && *d > 0.0)
            .collect();

        let centroids = kmeans_1d(&positive, n_clusters, 100);
        let grid = QuantizationGrid::new(centroids)?;
        log::debug!("Population-adaptive grid: {:?}", grid.values());

        Ok(DurationQuantizer::nearest_grid(grid))
    }

    /// Smallest value this quantizer can produce
    pub fn smallest(&self) -> f64 {
        match &self.policy {
            DurationPolicy::Threshold(table) => table.smallest(),
            DurationPolicy::NearestGrid(grid) => grid.smallest(),
        }
    }

    /// Quantize a note duration in quarter notes; the result is always positive
    pub fn quantize_note(&self, beats: f64) -> f64 {
        match &self.policy {
            DurationPolicy::Threshold(table) => table.quantize(beats),
            DurationPolicy::NearestGrid(grid) => grid.nearest(sanitize(beats)),
        }
    }

    /// Quantize a rest duration; gaps under half the smallest value vanish (0.0)
    ///
    /// Rests are never capped by the grid: past its largest value they round to whole
    /// beats and the assembler splits them at barlines.
    pub fn quantize_rest(&self, beats: f64) -> f64 {
        let beats = sanitize(beats);
        if beats < self.smallest() / 2.0 {
            return 0.0;
        }

        match &self.policy {
            DurationPolicy::NearestGrid(grid) if beats > grid.largest() => {
                ((beats / OVERFLOW_STEP).round() * OVERFLOW_STEP).max(grid.largest())
            }
            _ => self.quantize_note(beats),
        }
    }
}

/// A note with its notated duration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantizedNote {
    pub pitch: u8,
    pub velocity: u8,

    /// Start time in seconds (beat-snapped on the adaptive path)
    pub start: f64,

    /// End time in seconds
    pub end: f64,

    /// Notated duration in quarter notes, always positive
    pub duration: f64,
}

/// Fixed-grid path: keep timing, quantize each duration at the given tempo
pub fn quantize_fixed(
    notes: &[NoteEvent],
    quantizer: &DurationQuantizer,
    bpm: f64,
) -> Vec<QuantizedNote> {
    let quantized: Vec<QuantizedNote> = notes
        .iter()
        .map(|note| QuantizedNote {
            pitch: note.pitch,
            velocity: note.velocity,
            start: note.start,
            end: note.end,
            duration: quantizer.quantize_note(seconds_to_beats(note.duration(), bpm)),
        })
        .collect();

    log::debug!("Quantized {} notes at {:.1} BPM", quantized.len(), bpm);
    quantized
}
