// Score types
// Notation model handed to renderers: parts of measures of notes and rests

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::VoiceRole;
use crate::groove::TimeSignature;
use crate::tonal::KeyEstimate;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoreError {
    #[error("Harmony part has {harmony} measures but the lead has {lead}")]
    MeasureMismatch { lead: usize, harmony: usize },

    #[error("Score has no parts")]
    NoParts,

    #[error("MIDI export failed: {0}")]
    Midi(String),
}

/// Tie marking for a note split across a barline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tie {
    Start,
    Continue,
    Stop,
}

/// A single notation element; durations are in quarter notes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Element {
    Note {
        pitch: u8,
        velocity: u8,
        duration: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tie: Option<Tie>,
    },
    Rest {
        duration: f64,
    },
}

impl Element {
    pub fn note(pitch: u8, velocity: u8, duration: f64) -> Self {
        Element::Note {
            pitch,
            velocity,
            duration,
            tie: None,
        }
    }

    pub fn rest(duration: f64) -> Self {
        Element::Rest { duration }
    }

    pub fn duration(&self) -> f64 {
        match self {
            Element::Note { duration, .. } | Element::Rest { duration } => *duration,
        }
    }

    pub fn is_rest(&self) -> bool {
        matches!(self, Element::Rest { .. })
    }

    /// Copy of this element with a new duration; the tie only applies to notes
    pub fn with_duration(&self, duration: f64, tie: Option<Tie>) -> Self {
        match self {
            Element::Note {
                pitch, velocity, ..
            } => Element::Note {
                pitch: *pitch,
                velocity: *velocity,
                duration,
                tie,
            },
            Element::Rest { .. } => Element::Rest { duration },
        }
    }
}

/// One bar of a part
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    /// 1-based bar number
    pub number: u32,
    pub elements: Vec<Element>,
}

impl Measure {
    pub fn new(number: u32) -> Self {
        Measure {
            number,
            elements: Vec::new(),
        }
    }

    pub fn duration(&self) -> f64 {
        self.elements.iter().map(Element::duration).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Notation for one voice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub name: String,
    pub role: VoiceRole,
    pub key: KeyEstimate,
    pub time_signature: TimeSignature,
    pub measures: Vec<Measure>,
}

impl Part {
    pub fn measure_count(&self) -> usize {
        self.measures.len()
    }

    /// Sum of all element durations in quarter notes
    pub fn total_duration(&self) -> f64 {
        self.measures.iter().map(Measure::duration).sum()
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.measures.iter().flat_map(|m| m.elements.iter())
    }

    /// Number of sounding notes, counting tied continuations once
    pub fn note_count(&self) -> usize {
        self.elements()
            .filter(|e| {
                matches!(
                    e,
                    Element::Note {
                        tie: None | Some(Tie::Start),
                        ..
                    }
                )
            })
            .count()
    }

    /// Append empty measures until the part has `count` of them
    pub fn pad_to(&mut self, count: usize) {
        while self.measures.len() < count {
            let number = self.measures.len() as u32 + 1;
            self.measures.push(Measure::new(number));
        }
    }
}

/// A complete multi-voice transcription, lead part first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub title: String,
    pub tempo_bpm: f64,
    pub parts: Vec<Part>,
}

impl Score {
    pub fn lead(&self) -> Option<&Part> {
        self.parts.iter().find(|p| p.role == VoiceRole::Lead)
    }

    pub fn harmony(&self) -> Option<&Part> {
        self.parts.iter().find(|p| p.role == VoiceRole::Harmony)
    }

    /// Check that no harmony part is shorter than the lead
    pub fn validate(&self) -> Result<(), ScoreError> {
        let lead = self.lead().ok_or(ScoreError::NoParts)?;

        for part in self.parts.iter().filter(|p| p.role == VoiceRole::Harmony) {
            if part.measure_count() < lead.measure_count() {
                return Err(ScoreError::MeasureMismatch {
                    lead: lead.measure_count(),
                    harmony: part.measure_count(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(role: VoiceRole, measures: usize) -> Part {
        Part {
            name: role.display_name().to_string(),
            role,
            key: KeyEstimate::default(),
            time_signature: TimeSignature::common(),
            measures: (1..=measures as u32).map(Measure::new).collect(),
        }
    }

    #[test]
    fn test_element_helpers() {
        let note = Element::note(60, 100, 1.5);
        assert_eq!(note.duration(), 1.5);
        assert!(!note.is_rest());

        let tied = note.with_duration(0.5, Some(Tie::Start));
        assert_eq!(
            tied,
            Element::Note {
                pitch: 60,
                velocity: 100,
                duration: 0.5,
                tie: Some(Tie::Start)
            }
        );
        assert_eq!(Element::rest(2.0).with_duration(1.0, Some(Tie::Stop)), Element::rest(1.0));
    }

    #[test]
    fn test_element_serialization() {
        let json = serde_json::to_string(&Element::rest(1.0)).unwrap();
        assert_eq!(json, r#"{"type":"rest","duration":1.0}"#);

        let note: Element =
            serde_json::from_str(r#"{"type":"note","pitch":62,"velocity":80,"duration":2.0}"#)
                .unwrap();
        assert_eq!(note, Element::note(62, 80, 2.0));
    }

    #[test]
    fn test_pad_to() {
        let mut harmony = part(VoiceRole::Harmony, 1);
        harmony.pad_to(3);
        assert_eq!(harmony.measure_count(), 3);
        assert_eq!(harmony.measures[2].number, 3);
        assert!(harmony.measures[2].is_empty());
    }

    #[test]
    fn test_validate_measure_counts() {
        let score = Score {
            title: "t".to_string(),
            tempo_bpm: 120.0,
            parts: vec![part(VoiceRole::Lead, 4), part(VoiceRole::Harmony, 2)],
        };
        assert_eq!(
            score.validate(),
            Err(ScoreError::MeasureMismatch { lead: 4, harmony: 2 })
        );

        let lead_only = Score {
            parts: vec![part(VoiceRole::Lead, 4)],
            ..score
        };
        assert!(lead_only.validate().is_ok());

        let empty = Score {
            title: "t".to_string(),
            tempo_bpm: 120.0,
            parts: vec![],
        };
        assert_eq!(empty.validate(), Err(ScoreError::NoParts));
    }

    #[test]
    fn test_note_count_ignores_tied_continuations() {
        let mut lead = part(VoiceRole::Lead, 2);
        lead.measures[0].elements = vec![
            Element::note(60, 100, 2.0),
            Element::note(62, 100, 2.0).with_duration(2.0, Some(Tie::Start)),
        ];
        lead.measures[1].elements = vec![
            Element::note(62, 100, 1.0).with_duration(1.0, Some(Tie::Stop)),
            Element::rest(3.0),
        ];
        assert_eq!(lead.note_count(), 2);
        assert_eq!(lead.total_duration(), 8.0);
    }
}
