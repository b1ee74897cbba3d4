// Transcription progress trace
// Append-only JSONL log of stage starts and completions per transcription

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Transcription stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Load,
    KeyEstimation,
    Cleanup,
    Rhythm,
    Quantization,
    Assembly,
}

impl Stage {
    pub fn to_string(&self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::KeyEstimation => "key_estimation",
            Stage::Cleanup => "cleanup",
            Stage::Rhythm => "rhythm",
            Stage::Quantization => "quantization",
            Stage::Assembly => "assembly",
        }
    }

    /// Overall progress once this stage is finished
    pub fn progress(&self) -> f32 {
        match self {
            Stage::Load => 0.1,
            Stage::KeyEstimation => 0.2,
            Stage::Cleanup => 0.4,
            Stage::Rhythm => 0.6,
            Stage::Quantization => 0.8,
            Stage::Assembly => 1.0,
        }
    }
}

/// One line of the trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub timestamp: DateTime<Utc>,
    pub transcription_id: Uuid,
    pub stage: Stage,

    /// Overall progress [0.0, 1.0]
    pub progress: f32,
    pub message: String,

    /// Optional structured detail (counts, tempo, key)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl TraceEntry {
    pub fn new(
        transcription_id: Uuid,
        stage: Stage,
        progress: f32,
        message: impl Into<String>,
    ) -> Self {
        TraceEntry {
            timestamp: Utc::now(),
            transcription_id,
            stage,
            progress: progress.clamp(0.0, 1.0),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Serialize to a JSON line (with newline)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        Ok(format!("{}\n", serde_json::to_string(self)?))
    }
}

/// Shorthand for the start/complete pair of a stage
pub struct TraceBuilder {
    transcription_id: Uuid,
    stage: Stage,
}

impl TraceBuilder {
    pub fn new(transcription_id: Uuid, stage: Stage) -> Self {
        TraceBuilder {
            transcription_id,
            stage,
        }
    }

    /// Entry at the progress reached before this stage
    pub fn start(&self, message: impl Into<String>) -> TraceEntry {
        let before = match self.stage {
            Stage::Load => 0.0,
            Stage::KeyEstimation => Stage::Load.progress(),
            Stage::Cleanup => Stage::KeyEstimation.progress(),
            Stage::Rhythm => Stage::Cleanup.progress(),
            Stage::Quantization => Stage::Rhythm.progress(),
            Stage::Assembly => Stage::Quantization.progress(),
        };
        TraceEntry::new(self.transcription_id, self.stage, before, message)
    }

    pub fn complete(&self, message: impl Into<String>) -> TraceEntry {
        TraceEntry::new(
            self.transcription_id,
            self.stage,
            self.stage.progress(),
            message,
        )
    }
}

/// Appends entries to a JSONL file, creating it on first write
#[derive(Debug, Clone)]
pub struct TraceWriter {
    file_path: PathBuf,
}

impl TraceWriter {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        TraceWriter {
            file_path: file_path.into(),
        }
    }

    pub fn write(&self, entry: &TraceEntry) -> Result<(), TraceError> {
        self.write_batch(std::slice::from_ref(entry))
    }

    pub fn write_batch(&self, entries: &[TraceEntry]) -> Result<(), TraceError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;

        for entry in entries {
            file.write_all(entry.to_json_line()?.as_bytes())?;
        }
        file.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

/// Read trace entries from a JSONL file, skipping blank lines
pub fn read_trace_file(path: &Path) -> Result<Vec<TraceEntry>, TraceError> {
    let contents = std::fs::read_to_string(path)?;
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(TraceError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_progress_clamping() {
        let id = Uuid::new_v4();
        assert_eq!(TraceEntry::new(id, Stage::Load, -0.5, "x").progress, 0.0);
        assert_eq!(TraceEntry::new(id, Stage::Load, 1.5, "x").progress, 1.0);
    }

    #[test]
    fn test_builder_start_and_complete() {
        let builder = TraceBuilder::new(Uuid::new_v4(), Stage::Cleanup);
        let start = builder.start("Merging");
        let complete = builder.complete("Merged");

        assert_eq!(start.stage, Stage::Cleanup);
        assert_eq!(start.progress, Stage::KeyEstimation.progress());
        assert_eq!(complete.progress, Stage::Cleanup.progress());
        assert!(start.progress < complete.progress);
    }

    #[test]
    fn test_stage_progress_increases() {
        let stages = [
            Stage::Load,
            Stage::KeyEstimation,
            Stage::Cleanup,
            Stage::Rhythm,
            Stage::Quantization,
            Stage::Assembly,
        ];
        for pair in stages.windows(2) {
            assert!(pair[0].progress() < pair[1].progress());
        }
        assert_eq!(Stage::Assembly.progress(), 1.0);
    }

    #[test]
    fn test_writer_appends_and_reads_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("trace.jsonl");
        let writer = TraceWriter::new(&path);
        let id = Uuid::new_v4();

        writer
            .write(&TraceEntry::new(id, Stage::Load, 0.0, "Loading"))
            .unwrap();
        writer
            .write_batch(&[
                TraceEntry::new(id, Stage::Load, 0.1, "Loaded")
                    .with_data(serde_json::json!({"voices": 2})),
                TraceEntry::new(id, Stage::KeyEstimation, 0.2, "Key found"),
            ])
            .unwrap();

        let entries = read_trace_file(&path).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].data.as_ref().unwrap()["voices"], 2);
        assert_eq!(entries[2].stage, Stage::KeyEstimation);
        assert!(entries.iter().all(|e| e.transcription_id == id));
    }

    #[test]
    fn test_json_line_format() {
        let entry = TraceEntry::new(Uuid::new_v4(), Stage::Assembly, 1.0, "Done");
        let line = entry.to_json_line().unwrap();
        assert!(line.ends_with('\n'));
        assert!(line.contains("\"stage\":\"assembly\""));
    }

    #[test]
    fn test_malformed_line_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("trace.jsonl");
        std::fs::write(&path, "{\"stage\":\n").unwrap();
        assert!(matches!(read_trace_file(&path), Err(TraceError::Serialization(_))));
    }
}
