// Beat-Adaptive Quantization
// Derives the duration vocabulary from the performance itself and snaps starts to beats

use serde::{Deserialize, Serialize};

use super::grid::{BeatTrack, QuantizationGrid};
use super::quantize::{seconds_to_beats, QuantizedNote};
use crate::events::NoteEvent;
use crate::tonal::KeyEstimate;

pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Settings for the beat-adaptive path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    /// Number of duration clusters to look for
    pub n_duration_clusters: usize,

    /// k-means iteration cap
    pub max_iterations: usize,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        AdaptiveConfig {
            n_duration_clusters: 5,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// One-dimensional k-means
///
/// Centroids start at evenly spaced quantiles of the distinct values, so results are
/// deterministic. `k` is capped by the number of distinct values. Returns centroids in
/// ascending order; empty input gives no centroids.
pub fn kmeans_1d(values: &[f64], k: usize, max_iterations: usize) -> Vec<f64> {
    let mut distinct: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    distinct.sort_by(f64::total_cmp);
    distinct.dedup();

    let k = k.min(distinct.len());
    if k == 0 {
        return Vec::new();
    }

    let mut centroids: Vec<f64> = (0..k)
        .map(|j| {
            let idx = ((j as f64 + 0.5) / k as f64 * distinct.len() as f64) as usize;
            distinct[idx.min(distinct.len() - 1)]
        })
        .collect();

    for iteration in 0..max_iterations {
        let mut sums = vec![0.0f64; k];
        let mut counts = vec![0usize; k];

        for &value in values.iter().filter(|v| v.is_finite()) {
            let cluster = nearest_index(&centroids, value);
            sums[cluster] += value;
            counts[cluster] += 1;
        }

        let mut moved = false;
        for j in 0..k {
            // Empty clusters keep their centroid
            if counts[j] > 0 {
                let mean = sums[j] / counts[j] as f64;
                if (mean - centroids[j]).abs() > 1e-12 {
                    moved = true;
                }
                centroids[j] = mean;
            }
        }

        if !moved {
            log::debug!("k-means converged after {} iterations", iteration + 1);
            break;
        }
    }

    centroids.sort_by(f64::total_cmp);
    centroids.dedup();
    centroids
}

/// Index of the closest centroid, lowest index on ties
fn nearest_index(centroids: &[f64], value: f64) -> usize {
    let mut best = 0;
    let mut best_distance = f64::MAX;
    for (i, &c) in centroids.iter().enumerate() {
        let distance = (c - value).abs();
        if distance < best_distance {
            best = i;
            best_distance = distance;
        }
    }
    best
}

/// Beat-adaptive quantization of one voice
///
/// Starts snap to the nearest beat (unchanged when the beat track is empty), durations
/// snap to the nearest cluster centroid and then to the nearest expressible value, and
/// pitches are moved into the key's scale when a key is given.
pub fn quantize_adaptive(
    notes: &[NoteEvent],
    beats: &BeatTrack,
    bpm: f64,
    key: Option<&KeyEstimate>,
    config: &AdaptiveConfig,
) -> Vec<QuantizedNote> {
    if notes.is_empty() {
        return Vec::new();
    }

    let durations: Vec<f64> = notes
        .iter()
        .map(|n| seconds_to_beats(n.duration(), bpm))
        .collect();
    let centroids = kmeans_1d(&durations, config.n_duration_clusters, config.max_iterations);
    let cluster_grid = QuantizationGrid::new(centroids).ok();
    let expressible = QuantizationGrid::expressible();

    if beats.is_empty() {
        log::warn!("Empty beat track, keeping original note starts");
    }

    let quantized: Vec<QuantizedNote> = notes
        .iter()
        .zip(&durations)
        .map(|(note, &raw)| {
            let start = beats
                .nearest(note.start)
                .map(|(beat, _)| beat)
                .unwrap_or(note.start);

            let centroid = cluster_grid
                .as_ref()
                .map(|grid| grid.nearest(raw))
                .unwrap_or(raw);

            let pitch = key.map(|k| k.snap_pitch(note.pitch)).unwrap_or(note.pitch);

            QuantizedNote {
                pitch,
                velocity: note.velocity,
                start,
                end: start + note.duration(),
                duration: expressible.nearest(centroid),
            }
        })
        .collect();

    log::debug!(
        "Adaptive quantization: {} notes, {} beats, clusters {:?}",
        quantized.len(),
        beats.len(),
        cluster_grid.as_ref().map(|g| g.values())
    );

    quantized
}
