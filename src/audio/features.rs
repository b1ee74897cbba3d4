// Onset detection
// Spectral flux over Hann-windowed frames with adaptive peak picking

use std::sync::Arc;

use realfft::{RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use super::ingest::{AudioBuffer, AudioError};

/// Onset detection result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Onset {
    /// Seconds from the start of the audio (frame centre)
    pub time: f64,

    /// Normalized onset strength [0.0, 1.0]
    pub strength: f32,
}

/// Configuration for onset detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnsetConfig {
    /// FFT window size in samples
    pub window_size: usize,

    /// Hop size in samples (advance between frames)
    pub hop_size: usize,

    /// Threshold = mean(flux) + threshold_factor * std(flux)
    pub threshold_factor: f32,

    /// Minimum time between onsets in seconds
    pub min_onset_gap: f64,
}

impl Default for OnsetConfig {
    fn default() -> Self {
        OnsetConfig {
            window_size: 2048,
            hop_size: 512,
            threshold_factor: 1.5,
            min_onset_gap: 0.03,
        }
    }
}

/// Apply Hann window function to reduce spectral leakage
fn apply_hann_window(samples: &mut [f32]) {
    let n = samples.len();
    if n == 0 {
        return;
    }

    for (i, sample) in samples.iter_mut().enumerate() {
        let window = 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n as f32).cos());
        *sample *= window;
    }
}

/// Magnitude spectrum of one windowed frame
fn magnitude_spectrum(
    fft: &Arc<dyn RealToComplex<f32>>,
    frame: &[f32],
) -> Result<Vec<f32>, AudioError> {
    let mut input = frame.to_vec();
    apply_hann_window(&mut input);

    let mut spectrum = fft.make_output_vec();
    fft.process(&mut input, &mut spectrum)
        .map_err(|e| AudioError::Fft(e.to_string()))?;

    Ok(spectrum.iter().map(|c| c.norm()).collect())
}

/// Spectral flux per frame: sum of positive magnitude differences to the previous frame
fn compute_spectral_flux(samples: &[f32], config: &OnsetConfig) -> Result<Vec<f32>, AudioError> {
    let window_size = config.window_size;
    let hop_size = config.hop_size;

    if hop_size == 0 || window_size == 0 || samples.len() < window_size {
        return Ok(Vec::new());
    }

    let mut planner = RealFftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(window_size);

    let num_frames = (samples.len() - window_size) / hop_size + 1;
    let mut flux = Vec::with_capacity(num_frames);
    let mut previous: Option<Vec<f32>> = None;

    for frame_idx in 0..num_frames {
        let start = frame_idx * hop_size;
        let spectrum = magnitude_spectrum(&fft, &samples[start..start + window_size])?;

        let frame_flux = match &previous {
            Some(prev) => spectrum
                .iter()
                .zip(prev)
                .map(|(curr, prev)| (curr - prev).max(0.0))
                .sum(),
            None => 0.0,
        };

        flux.push(frame_flux);
        previous = Some(spectrum);
    }

    Ok(flux)
}

/// Pick local flux maxima above an adaptive threshold
fn pick_onset_peaks(flux: &[f32], sample_rate: u32, config: &OnsetConfig) -> Vec<Onset> {
    if flux.len() < 3 || sample_rate == 0 {
        return Vec::new();
    }

    let mean = flux.iter().sum::<f32>() / flux.len() as f32;
    let variance = flux.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / flux.len() as f32;
    let std_dev = variance.sqrt();
    let threshold = mean + config.threshold_factor * std_dev;

    let frame_secs = config.hop_size as f64 / f64::from(sample_rate);
    let centre_secs = config.window_size as f64 / 2.0 / f64::from(sample_rate);

    let mut onsets: Vec<Onset> = Vec::new();
    for i in 1..flux.len() - 1 {
        let is_peak = flux[i] > flux[i - 1] && flux[i] >= flux[i + 1];
        if !is_peak || flux[i] <= threshold {
            continue;
        }

        let time = i as f64 * frame_secs + centre_secs;
        if let Some(last) = onsets.last() {
            if time - last.time < config.min_onset_gap {
                continue;
            }
        }

        // 1e-6 keeps a flat flux from dividing by zero
        let strength = ((flux[i] - threshold) / (std_dev + 1e-6)).clamp(0.0, 1.0);
        onsets.push(Onset { time, strength });
    }

    onsets
}

/// Detect onsets in an audio buffer
pub fn detect_onsets(audio: &AudioBuffer, config: &OnsetConfig) -> Result<Vec<Onset>, AudioError> {
    let mono = audio.to_mono();
    if mono.is_empty() {
        return Ok(Vec::new());
    }

    let flux = compute_spectral_flux(&mono, config)?;
    let onsets = pick_onset_peaks(&flux, audio.sample_rate, config);

    log::debug!(
        "Detected {} onsets over {:.2}s of audio",
        onsets.len(),
        audio.duration_secs()
    );

    Ok(onsets)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const TEST_SAMPLE_RATE: u32 = 16_384;

    /// Short sine bursts every `interval` seconds
    pub(crate) fn burst_train(count: usize, interval: f64) -> AudioBuffer {
        let sr = TEST_SAMPLE_RATE as f64;
        let total = ((count as f64 + 1.0) * interval * sr) as usize;
        let burst_len = (0.06 * sr) as usize;
        let mut samples = vec![0.0f32; total];

        for k in 0..count {
            let start = ((k as f64 + 0.5) * interval * sr) as usize;
            for n in 0..burst_len {
                let t = n as f64 / sr;
                samples[start + n] = (0.8 * (2.0 * std::f64::consts::PI * 880.0 * t).sin()) as f32;
            }
        }

        AudioBuffer::new(samples, TEST_SAMPLE_RATE, 1)
    }

    #[test]
    fn test_hann_window() {
        let mut samples = vec![1.0; 100];
        apply_hann_window(&mut samples);

        assert!(samples[0] < 0.1);
        assert!(samples[99] < 0.1);
        assert!(samples[50] > 0.9);
    }

    #[test]
    fn test_onset_detection_empty() {
        let audio = AudioBuffer::new(vec![], 44_100, 1);
        assert!(detect_onsets(&audio, &OnsetConfig::default()).unwrap().is_empty());

        // Shorter than one window
        let short = AudioBuffer::new(vec![0.1; 100], 44_100, 1);
        assert!(detect_onsets(&short, &OnsetConfig::default()).unwrap().is_empty());
    }

    #[test]
    fn test_silence_has_no_onsets() {
        let audio = AudioBuffer::new(vec![0.0; 32_768], TEST_SAMPLE_RATE, 1);
        assert!(detect_onsets(&audio, &OnsetConfig::default()).unwrap().is_empty());
    }

    #[test]
    fn test_bursts_produce_regular_onsets() {
        let audio = burst_train(12, 0.5);
        let onsets = detect_onsets(&audio, &OnsetConfig::default()).unwrap();

        assert!(onsets.len() >= 10, "found {} onsets", onsets.len());
        for pair in onsets.windows(2) {
            assert!(pair[1].time > pair[0].time);
        }
        for onset in &onsets {
            assert!((0.0..=1.0).contains(&onset.strength));
        }
    }
}
