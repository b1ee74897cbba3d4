// Audio ingestion
// Decodes WAV takes with hound into normalized f32 samples for rhythm analysis

use std::io::Cursor;
use std::path::Path;

use hound::{SampleFormat, WavReader};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Failed to read WAV data: {0}")]
    Wav(#[from] hound::Error),

    #[error("Failed to read audio file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("FFT failed: {0}")]
    Fft(String),
}

/// Decoded audio, interleaved when multi-channel
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Samples normalized to [-1.0, 1.0]
    pub samples: Vec<f32>,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Number of interleaved channels
    pub channels: u16,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        AudioBuffer {
            samples,
            sample_rate,
            channels: channels.max(1),
        }
    }

    /// Number of frames (samples per channel)
    pub fn frame_count(&self) -> usize {
        self.samples.len() / usize::from(self.channels.max(1))
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / f64::from(self.sample_rate)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Downmix to mono by averaging channels
    pub fn to_mono(&self) -> Vec<f32> {
        let channels = usize::from(self.channels.max(1));
        if channels == 1 {
            return self.samples.clone();
        }

        self.samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }
}

/// Read integer PCM samples and scale them into [-1.0, 1.0]
fn read_int<R: std::io::Read>(reader: &mut WavReader<R>, scale: f32) -> Result<Vec<f32>, AudioError> {
    reader
        .samples::<i32>()
        .map(|s| s.map(|v| v as f32 / scale).map_err(AudioError::from))
        .collect()
}

/// Decode a WAV file held in memory
pub fn ingest_wav(data: &[u8]) -> Result<AudioBuffer, AudioError> {
    let mut reader = WavReader::new(Cursor::new(data))?;
    let spec = reader.spec();

    let samples = match (spec.sample_format, spec.bits_per_sample) {
        // hound already re-centres unsigned 8-bit PCM
        (SampleFormat::Int, 8) => read_int(&mut reader, 128.0)?,
        (SampleFormat::Int, 16) => read_int(&mut reader, 32_768.0)?,
        (SampleFormat::Int, 24) => read_int(&mut reader, 8_388_608.0)?,
        (SampleFormat::Int, 32) => read_int(&mut reader, 2_147_483_648.0)?,
        (SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        (format, bits) => {
            return Err(AudioError::UnsupportedFormat(format!(
                "{:?} {}-bit audio",
                format, bits
            )));
        }
    };

    let buffer = AudioBuffer::new(samples, spec.sample_rate, spec.channels);
    log::debug!(
        "Decoded WAV: {} Hz, {} channels, {:.2}s",
        buffer.sample_rate,
        buffer.channels,
        buffer.duration_secs()
    );

    Ok(buffer)
}

/// Read and decode a WAV file from disk
pub fn read_wav(path: &Path) -> Result<AudioBuffer, AudioError> {
    let bytes = std::fs::read(path)?;
    ingest_wav(&bytes)
}
