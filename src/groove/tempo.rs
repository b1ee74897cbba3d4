// Tempo Estimation - BPM and beat track from onset times
// Uses an inter-onset interval histogram, then phase-aligns a beat grid to the onsets

use serde::{Deserialize, Serialize};

use super::grid::BeatTrack;
use crate::events::NoteEvent;

/// Tempo assumed when nothing better is known
pub const DEFAULT_BPM: f64 = 120.0;

/// Tempo estimation result with BPM and beat positions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempoEstimate {
    /// Estimated beats per minute
    pub bpm: f64,

    /// Confidence in the estimate [0.0, 1.0]
    /// Zero means the estimate is a fallback
    pub confidence: f32,

    /// Predicted beat locations in seconds
    pub beats: BeatTrack,
}

impl TempoEstimate {
    /// Fallback estimate: given tempo, no beats, no confidence
    pub fn fallback(bpm: f64) -> Self {
        TempoEstimate {
            bpm,
            confidence: 0.0,
            beats: BeatTrack::empty(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.confidence == 0.0 && self.beats.is_empty()
    }
}

/// Configuration for tempo estimation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    /// Minimum BPM to consider
    pub min_bpm: f64,

    /// Maximum BPM to consider
    pub max_bpm: f64,

    /// Number of bins for IOI histogram
    pub histogram_bins: usize,

    /// Minimum number of onsets required for estimation
    pub min_onsets: usize,
}

impl Default for TempoConfig {
    fn default() -> Self {
        TempoConfig {
            min_bpm: 60.0,
            max_bpm: 180.0,
            histogram_bins: 300,
            min_onsets: 8,
        }
    }
}

impl TempoConfig {
    /// Beat interval range in seconds (shortest, longest)
    fn interval_range(&self) -> Option<(f64, f64)> {
        if !(self.min_bpm > 0.0) || !(self.max_bpm > self.min_bpm) || self.histogram_bins == 0 {
            return None;
        }
        Some((60.0 / self.max_bpm, 60.0 / self.min_bpm))
    }
}

/// Estimate tempo from onset times (seconds) with the default configuration
pub fn estimate_tempo(onsets: &[f64]) -> TempoEstimate {
    estimate_tempo_with_config(onsets, &TempoConfig::default())
}

/// Estimate tempo from the start times of a voice's notes
pub fn estimate_tempo_from_notes(notes: &[NoteEvent], config: &TempoConfig) -> TempoEstimate {
    let onsets: Vec<f64> = notes.iter().map(|n| n.start).collect();
    estimate_tempo_with_config(&onsets, config)
}

/// Estimate tempo with custom configuration
///
/// Algorithm:
/// 1. Compute inter-onset intervals (IOIs)
/// 2. Build IOI histogram, crediting half and double intervals
/// 3. Pick the strongest histogram peak in the BPM range
/// 4. Refine the interval from the raw IOIs near the peak
/// 5. Phase-align a beat grid to the onsets
pub fn estimate_tempo_with_config(onsets: &[f64], config: &TempoConfig) -> TempoEstimate {
    let mut onsets: Vec<f64> = onsets.iter().copied().filter(|t| t.is_finite()).collect();
    onsets.sort_by(f64::total_cmp);

    if onsets.len() < config.min_onsets {
        log::debug!(
            "Tempo estimation skipped: {} onsets (need {})",
            onsets.len(),
            config.min_onsets
        );
        return TempoEstimate::fallback(DEFAULT_BPM);
    }

    let Some((min_interval, max_interval)) = config.interval_range() else {
        log::warn!("Invalid tempo range {}-{} BPM", config.min_bpm, config.max_bpm);
        return TempoEstimate::fallback(DEFAULT_BPM);
    };

    let iois = compute_iois(&onsets);
    if iois.is_empty() {
        return TempoEstimate::fallback(DEFAULT_BPM);
    }

    let histogram = build_ioi_histogram(&iois, min_interval, max_interval, config.histogram_bins);
    let Some((peak_bin, peak_strength)) = strongest_peak(&histogram) else {
        return TempoEstimate::fallback(DEFAULT_BPM);
    };

    let bin_width = (max_interval - min_interval) / config.histogram_bins as f64;
    let peak_interval = min_interval + (peak_bin as f64 + 0.5) * bin_width;
    let interval = refine_interval(&iois, peak_interval);

    let bpm = (60.0 / interval).clamp(config.min_bpm, config.max_bpm);
    let interval = 60.0 / bpm;
    let confidence = peak_confidence(&histogram, peak_strength);
    let beats = generate_beat_grid(&onsets, interval);

    log::debug!(
        "Tempo estimate {:.1} BPM (confidence {:.2}, {} beats)",
        bpm,
        confidence,
        beats.len()
    );

    TempoEstimate {
        bpm,
        confidence,
        beats,
    }
}

/// Compute inter-onset intervals (time between consecutive onsets)
fn compute_iois(onsets: &[f64]) -> Vec<f64> {
    onsets
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|&interval| interval > 0.0)
        .collect()
}

/// Build a smoothed histogram of inter-onset intervals over the beat interval range
fn build_ioi_histogram(iois: &[f64], min_interval: f64, max_interval: f64, bins: usize) -> Vec<f32> {
    let bin_width = (max_interval - min_interval) / bins as f64;
    let mut histogram = vec![0.0f32; bins];

    let mut add = |interval: f64, weight: f32| {
        if interval >= min_interval && interval <= max_interval {
            let bin = (((interval - min_interval) / bin_width) as usize).min(bins - 1);
            histogram[bin] += weight;
        }
    };

    for &ioi in iois {
        add(ioi, 1.0);
        // 2:1 and 1:2 relationships get a lower weight
        add(ioi / 2.0, 0.5);
        add(ioi * 2.0, 0.5);
    }

    smooth_histogram(&histogram, 3)
}

/// Smooth histogram using moving average filter
fn smooth_histogram(histogram: &[f32], window_size: usize) -> Vec<f32> {
    let half_window = window_size / 2;

    (0..histogram.len())
        .map(|i| {
            let start = i.saturating_sub(half_window);
            let end = (i + half_window + 1).min(histogram.len());
            histogram[start..end].iter().sum::<f32>() / (end - start) as f32
        })
        .collect()
}

/// Strongest local maximum; plateaus resolve to their last bin
fn strongest_peak(histogram: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;

    for (i, &value) in histogram.iter().enumerate() {
        let left = if i > 0 { histogram[i - 1] } else { 0.0 };
        let right = histogram.get(i + 1).copied().unwrap_or(0.0);
        if value > 0.0 && value >= left && value > right {
            match best {
                Some((_, strength)) if strength >= value => {}
                _ => best = Some((i, value)),
            }
        }
    }

    best
}

/// Average of the raw IOIs within 10% of the peak interval
fn refine_interval(iois: &[f64], peak_interval: f64) -> f64 {
    let tolerance = peak_interval * 0.1;
    let near: Vec<f64> = iois
        .iter()
        .copied()
        .filter(|ioi| (ioi - peak_interval).abs() <= tolerance)
        .collect();

    if near.is_empty() {
        peak_interval
    } else {
        near.iter().sum::<f64>() / near.len() as f64
    }
}

/// Peak strength relative to the histogram mean
fn peak_confidence(histogram: &[f32], peak_strength: f32) -> f32 {
    let mean = histogram.iter().sum::<f32>() / histogram.len().max(1) as f32;
    if mean > 0.0 && peak_strength.is_finite() {
        let raw = peak_strength / (mean * 3.0);
        if raw.is_finite() {
            raw.min(1.0)
        } else {
            0.0
        }
    } else {
        0.0
    }
}

/// Generate a beat grid with the phase that best matches the onsets
fn generate_beat_grid(onsets: &[f64], interval: f64) -> BeatTrack {
    let (Some(&first), Some(&last)) = (onsets.first(), onsets.last()) else {
        return BeatTrack::empty();
    };
    if last <= first || interval <= 0.0 {
        return BeatTrack::empty();
    }

    // Test phase offsets across one beat interval
    let num_phase_tests = 8;
    let phase_step = interval / num_phase_tests as f64;

    let mut best_phase = first;
    let mut best_score = 0.0;
    for i in 0..num_phase_tests {
        let phase = first + i as f64 * phase_step;
        let score = score_beat_alignment(onsets, phase, interval, last);
        if score > best_score {
            best_score = score;
            best_phase = phase;
        }
    }

    // Extend backwards so notes before the phase still have beats to snap to
    let mut start = best_phase;
    while start - interval >= 0.0 {
        start -= interval;
    }

    let mut beats = Vec::new();
    let mut beat_time = start;
    while beat_time <= last + interval {
        beats.push(beat_time);
        beat_time += interval;
    }

    BeatTrack::new(beats)
}

/// Score how well a beat grid aligns with the onsets
fn score_beat_alignment(onsets: &[f64], phase: f64, interval: f64, end_time: f64) -> f64 {
    // 15% tolerance window
    let tolerance = interval * 0.15;
    let mut score = 0.0;

    let mut beat_time = phase;
    while beat_time <= end_time {
        let closest = onsets
            .iter()
            .map(|onset| (onset - beat_time).abs())
            .fold(f64::MAX, f64::min);

        if closest < tolerance {
            score += (tolerance - closest) / tolerance;
        }
        beat_time += interval;
    }

    score
}
