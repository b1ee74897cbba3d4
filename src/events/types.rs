// Note event types
// Raw note events as emitted by the pitch/onset model, grouped into voices

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Highest valid MIDI pitch / velocity value
pub const MIDI_MAX: u8 = 127;

/// Reasons a note event violates the input contract
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EventError {
    #[error("Non-finite timing (start {start}, end {end})")]
    NonFiniteTime { start: f64, end: f64 },

    #[error("Negative start time: {0}")]
    NegativeStart(f64),

    #[error("End {end} is not after start {start}")]
    EmptySpan { start: f64, end: f64 },

    #[error("Pitch {0} is outside the MIDI range")]
    PitchOutOfRange(u8),

    #[error("Velocity {0} is outside the MIDI range")]
    VelocityOutOfRange(u8),
}

/// A discrete pitched sound detected in the recording
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// MIDI semitone (0-127, 60 = middle C)
    pub pitch: u8,

    /// Onset in seconds from the start of the recording
    pub start: f64,

    /// Release in seconds from the start of the recording
    pub end: f64,

    /// MIDI velocity (0-127)
    #[serde(default = "default_velocity")]
    pub velocity: u8,
}

fn default_velocity() -> u8 {
    100
}

impl NoteEvent {
    /// Create a new note event
    pub fn new(pitch: u8, start: f64, end: f64, velocity: u8) -> Self {
        NoteEvent {
            pitch,
            start,
            end,
            velocity,
        }
    }

    /// Length of the note in seconds
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Pitch reduced modulo 12 (0 = C ... 11 = B)
    pub fn pitch_class(&self) -> u8 {
        self.pitch % 12
    }

    /// Check the event against the input contract
    pub fn validate(&self) -> Result<(), EventError> {
        if !self.start.is_finite() || !self.end.is_finite() {
            return Err(EventError::NonFiniteTime {
                start: self.start,
                end: self.end,
            });
        }
        if self.start < 0.0 {
            return Err(EventError::NegativeStart(self.start));
        }
        if self.end <= self.start {
            return Err(EventError::EmptySpan {
                start: self.start,
                end: self.end,
            });
        }
        if self.pitch > MIDI_MAX {
            return Err(EventError::PitchOutOfRange(self.pitch));
        }
        if self.velocity > MIDI_MAX {
            return Err(EventError::VelocityOutOfRange(self.velocity));
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Which notational part a voice ends up in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceRole {
    /// Main melodic line, always required
    Lead,

    /// Optional second line, dropped if malformed
    Harmony,
}

impl VoiceRole {
    /// Accepts both PascalCase and snake_case, anything else is treated as harmony
    pub fn from_string(s: &str) -> Self {
        match s {
            "Lead" | "lead" => VoiceRole::Lead,
            _ => VoiceRole::Harmony,
        }
    }

    pub fn to_string(&self) -> &'static str {
        match self {
            VoiceRole::Lead => "lead",
            VoiceRole::Harmony => "harmony",
        }
    }

    /// Part name shown on the score
    pub fn display_name(&self) -> &'static str {
        match self {
            VoiceRole::Lead => "Lead Vocal",
            VoiceRole::Harmony => "Harmony",
        }
    }
}

/// One detected voice and its time-ordered note events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    pub role: VoiceRole,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub events: Vec<NoteEvent>,
}

impl Voice {
    pub fn new(role: VoiceRole, events: Vec<NoteEvent>) -> Self {
        Voice {
            role,
            name: None,
            events,
        }
    }

    pub fn lead(events: Vec<NoteEvent>) -> Self {
        Self::new(VoiceRole::Lead, events)
    }

    pub fn harmony(events: Vec<NoteEvent>) -> Self {
        Self::new(VoiceRole::Harmony, events)
    }

    /// Name for the part, falling back to the role's display name
    pub fn part_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.role.display_name().to_string())
    }

    /// Validate every event, reporting the first offending index
    pub fn validate(&self) -> Result<(), (usize, EventError)> {
        for (i, event) in self.events.iter().enumerate() {
            event.validate().map_err(|e| (i, e))?;
        }
        Ok(())
    }

    /// Latest release time among the events (0.0 for a silent voice)
    pub fn end_time(&self) -> f64 {
        self.events
            .iter()
            .map(|e| e.end)
            .filter(|t| t.is_finite())
            .fold(0.0, f64::max)
    }

    pub fn is_silent(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_and_pitch_class() {
        let event = NoteEvent::new(62, 1.0, 1.5, 90);
        assert!((event.duration() - 0.5).abs() < 1e-12);
        assert_eq!(event.pitch_class(), 2);
    }

    #[test]
    fn test_validate_rejects_empty_span() {
        let event = NoteEvent::new(60, 1.0, 1.0, 90);
        assert!(matches!(event.validate(), Err(EventError::EmptySpan { .. })));

        let event = NoteEvent::new(60, 2.0, 1.0, 90);
        assert!(!event.is_valid());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert_eq!(
            NoteEvent::new(128, 0.0, 1.0, 90).validate(),
            Err(EventError::PitchOutOfRange(128))
        );
        assert_eq!(
            NoteEvent::new(60, 0.0, 1.0, 200).validate(),
            Err(EventError::VelocityOutOfRange(200))
        );
        assert!(NoteEvent::new(60, f64::NAN, 1.0, 90).validate().is_err());
        assert!(NoteEvent::new(60, -0.5, 1.0, 90).validate().is_err());
    }

    #[test]
    fn test_voice_validate_reports_index() {
        let voice = Voice::lead(vec![
            NoteEvent::new(60, 0.0, 0.5, 90),
            NoteEvent::new(62, 0.6, 0.6, 90),
        ]);
        let (index, _) = voice.validate().unwrap_err();
        assert_eq!(index, 1);
    }

    #[test]
    fn test_voice_end_time() {
        let voice = Voice::harmony(vec![
            NoteEvent::new(60, 0.0, 2.5, 90),
            NoteEvent::new(62, 1.0, 1.5, 90),
        ]);
        assert!((voice.end_time() - 2.5).abs() < 1e-12);
        assert_eq!(Voice::lead(vec![]).end_time(), 0.0);
    }

    #[test]
    fn test_role_round_trip() {
        let role = VoiceRole::Harmony;
        assert_eq!(VoiceRole::from_string(role.to_string()), role);
        assert_eq!(VoiceRole::from_string("Lead"), VoiceRole::Lead);
    }

    #[test]
    fn test_velocity_defaults_when_missing() {
        let event: NoteEvent =
            serde_json::from_str(r#"{"pitch": 64, "start": 0.0, "end": 0.25}"#).unwrap();
        assert_eq!(event.velocity, 100);
    }
}
