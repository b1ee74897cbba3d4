// Musical grids - time signature, duration grids, and beat tracks
// Provides the structure that quantization snaps onto

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when constructing a grid
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridError {
    #[error("Quantization grid needs at least one value")]
    Empty,

    #[error("Grid value {0} must be finite and positive")]
    InvalidValue(f64),

    #[error("Invalid time signature {0}/{1}")]
    InvalidTimeSignature(u8, u8),
}

/// Musical time signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    /// Beats per bar
    pub numerator: u8,

    /// Note value that gets one beat (4 = quarter note)
    pub denominator: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        TimeSignature::common()
    }
}

impl TimeSignature {
    /// 4/4, the only meter the transcriber targets
    pub fn common() -> Self {
        TimeSignature {
            numerator: 4,
            denominator: 4,
        }
    }

    pub fn new(numerator: u8, denominator: u8) -> Result<Self, GridError> {
        let power_of_two = denominator != 0 && denominator & (denominator - 1) == 0;
        if numerator == 0 || !power_of_two {
            return Err(GridError::InvalidTimeSignature(numerator, denominator));
        }
        Ok(TimeSignature {
            numerator,
            denominator,
        })
    }

    /// Get number of beats per bar
    pub fn beats_per_bar(&self) -> u32 {
        u32::from(self.numerator)
    }

    /// Length of one measure in quarter notes
    pub fn quarter_length(&self) -> f64 {
        f64::from(self.numerator) * 4.0 / f64::from(self.denominator.max(1))
    }

    pub fn label(&self) -> String {
        format!("{}/{}", self.numerator, self.denominator)
    }
}

/// Ordered set of allowed durations in quarter-note units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct QuantizationGrid {
    values: Vec<f64>,
}

impl QuantizationGrid {
    /// Build a grid; values are sorted ascending and de-duplicated
    pub fn new(values: impl IntoIterator<Item = f64>) -> Result<Self, GridError> {
        let mut values: Vec<f64> = values.into_iter().collect();
        if values.is_empty() {
            return Err(GridError::Empty);
        }
        if let Some(&bad) = values.iter().find(|v| !v.is_finite() || **v <= 0.0) {
            return Err(GridError::InvalidValue(bad));
        }

        values.sort_by(f64::total_cmp);
        values.dedup();
        Ok(QuantizationGrid { values })
    }

    /// Durations representable in plain notation: 16th through double whole
    pub fn expressible() -> Self {
        QuantizationGrid {
            values: vec![0.25, 0.5, 1.0, 2.0, 4.0, 8.0],
        }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn smallest(&self) -> f64 {
        self.values[0]
    }

    pub fn largest(&self) -> f64 {
        self.values[self.values.len() - 1]
    }

    /// Closest grid value by absolute difference; ties go to the lower value
    pub fn nearest(&self, duration: f64) -> f64 {
        let duration = if duration.is_nan() { 0.0 } else { duration };

        let mut best = self.values[0];
        let mut best_distance = (best - duration).abs();
        for &value in &self.values[1..] {
            let distance = (value - duration).abs();
            if distance < best_distance {
                best = value;
                best_distance = distance;
            }
        }
        best
    }
}

impl TryFrom<Vec<f64>> for QuantizationGrid {
    type Error = GridError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        QuantizationGrid::new(values)
    }
}

impl From<QuantizationGrid> for Vec<f64> {
    fn from(grid: QuantizationGrid) -> Self {
        grid.values
    }
}

/// Strictly increasing beat timestamps in seconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BeatTrack {
    beats: Vec<f64>,
}

impl BeatTrack {
    /// Build from arbitrary timestamps; non-finite and negative values are dropped,
    /// the rest sorted and de-duplicated
    pub fn new(timestamps: impl IntoIterator<Item = f64>) -> Self {
        let mut beats: Vec<f64> = timestamps
            .into_iter()
            .filter(|t| t.is_finite() && *t >= 0.0)
            .collect();
        beats.sort_by(f64::total_cmp);
        beats.dedup();
        BeatTrack { beats }
    }

    pub fn empty() -> Self {
        BeatTrack::default()
    }

    /// Evenly spaced beats at `bpm` from `offset` seconds up to and including `until`
    pub fn regular(bpm: f64, offset: f64, until: f64) -> Self {
        if !(bpm > 0.0) || !bpm.is_finite() || !until.is_finite() {
            return BeatTrack::empty();
        }

        let interval = 60.0 / bpm;
        let offset = offset.max(0.0);
        let mut beats = Vec::new();
        let mut i = 0u32;
        loop {
            let t = offset + f64::from(i) * interval;
            if t > until + 1e-9 {
                break;
            }
            beats.push(t);
            i += 1;
        }

        BeatTrack { beats }
    }

    pub fn beats(&self) -> &[f64] {
        &self.beats
    }

    pub fn len(&self) -> usize {
        self.beats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beats.is_empty()
    }

    /// Find the nearest beat to a timestamp
    /// Returns (beat time, beat index), earliest beat on ties, None when empty
    pub fn nearest(&self, timestamp: f64) -> Option<(f64, usize)> {
        let mut nearest: Option<(f64, usize)> = None;
        let mut nearest_distance = f64::MAX;

        for (i, &beat) in self.beats.iter().enumerate() {
            let distance = (beat - timestamp).abs();
            if distance < nearest_distance {
                nearest_distance = distance;
                nearest = Some((beat, i));
            }
        }

        nearest
    }

    /// Median inter-beat interval converted to BPM
    pub fn implied_bpm(&self) -> Option<f64> {
        if self.beats.len() < 2 {
            return None;
        }
        let mut intervals: Vec<f64> = self.beats.windows(2).map(|w| w[1] - w[0]).collect();
        intervals.sort_by(f64::total_cmp);
        let median = intervals[intervals.len() / 2];
        if median > 0.0 {
            Some(60.0 / median)
        } else {
            None
        }
    }
}
