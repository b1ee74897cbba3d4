// MIDI Export - renders a Score to a Standard MIDI File using midly
// Notated durations become ticks, so the file reflects the quantized notation

use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind};
use serde::{Deserialize, Serialize};

use super::types::{Element, Part, Score, ScoreError, Tie};
use crate::groove::TimeSignature;
use crate::tonal::Mode;

/// MIDI export options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiExportOptions {
    /// Pulses per quarter note (PPQ) - typically 480 or 960
    pub ppq: u16,

    /// Include tempo metadata
    pub include_tempo: bool,

    /// Include time and key signature metadata
    pub include_signatures: bool,

    /// Include track names
    pub track_names: bool,
}

impl Default for MidiExportOptions {
    fn default() -> Self {
        MidiExportOptions {
            ppq: 480,
            include_tempo: true,
            include_signatures: true,
            track_names: true,
        }
    }
}

/// Export a score to MIDI file bytes, one track per part after a meta track
pub fn export_score_midi(score: &Score, options: &MidiExportOptions) -> Result<Vec<u8>, ScoreError> {
    if !(score.tempo_bpm > 0.0) {
        return Err(ScoreError::Midi(format!("invalid tempo {}", score.tempo_bpm)));
    }

    let header = Header {
        format: Format::Parallel,
        timing: Timing::Metrical(options.ppq.into()),
    };

    let mut tracks = Vec::with_capacity(score.parts.len() + 1);

    // Track 0: tempo and signatures
    let mut meta_track = Track::new();
    if options.track_names {
        add_track_name(&mut meta_track, score.title.as_bytes());
    }
    if options.include_tempo {
        add_tempo(&mut meta_track, score.tempo_bpm);
    }
    if options.include_signatures {
        if let Some(lead) = score.lead() {
            add_time_signature(&mut meta_track, &lead.time_signature);
            meta_track.push(TrackEvent {
                delta: 0.into(),
                kind: TrackEventKind::Meta(MetaMessage::KeySignature(
                    lead.key.fifths(),
                    lead.key.mode == Mode::Minor,
                )),
            });
        }
    }
    add_end_of_track(&mut meta_track, 0);
    tracks.push(meta_track);

    for (index, part) in score.parts.iter().enumerate() {
        let channel = (index % 16) as u8;
        tracks.push(create_part_track(part, channel, options));
    }

    let smf = Smf { header, tracks };
    let mut bytes = Vec::new();
    smf.write(&mut bytes)
        .map_err(|e| ScoreError::Midi(e.to_string()))?;

    log::info!(
        "Exported '{}' to MIDI ({} tracks, {} bytes)",
        score.title,
        score.parts.len() + 1,
        bytes.len()
    );

    Ok(bytes)
}

/// Create a MIDI track for one part; tied notes sound as a single note
fn create_part_track<'a>(part: &'a Part, channel: u8, options: &MidiExportOptions) -> Track<'a> {
    let ticks_per_quarter = f64::from(options.ppq);
    let mut track = Track::new();
    if options.track_names {
        add_track_name(&mut track, part.name.as_bytes());
    }

    let mut position = 0.0f64;
    let mut last_tick = 0u32;

    let mut push = |track: &mut Track<'a>, at: f64, message: MidiMessage| {
        let tick = (at * ticks_per_quarter).round() as u32;
        track.push(TrackEvent {
            delta: tick.saturating_sub(last_tick).into(),
            kind: TrackEventKind::Midi {
                channel: channel.into(),
                message,
            },
        });
        last_tick = last_tick.max(tick);
    };

    for element in part.elements() {
        if let Element::Note {
            pitch,
            velocity,
            duration,
            tie,
        } = element
        {
            let key = (*pitch).min(127).into();
            if matches!(tie, None | Some(Tie::Start)) {
                push(
                    &mut track,
                    position,
                    MidiMessage::NoteOn {
                        key,
                        vel: (*velocity).clamp(1, 127).into(),
                    },
                );
            }
            if matches!(tie, None | Some(Tie::Stop)) {
                push(
                    &mut track,
                    position + duration,
                    MidiMessage::NoteOff {
                        key,
                        vel: 0.into(),
                    },
                );
            }
        }
        position += element.duration();
    }

    let end_tick = (position * ticks_per_quarter).round() as u32;
    add_end_of_track(&mut track, end_tick.saturating_sub(last_tick));
    track
}

fn add_track_name<'a>(track: &mut Track<'a>, name: &'a [u8]) {
    track.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::TrackName(name)),
    });
}

/// Add tempo meta message (microseconds per quarter note)
fn add_tempo(track: &mut Track, bpm: f64) {
    let us_per_quarter = ((60_000_000.0 / bpm) as u32).min(0x00FF_FFFF);
    track.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(us_per_quarter.into())),
    });
}

fn add_time_signature(track: &mut Track, time_signature: &TimeSignature) {
    // Denominator is stored as a power of two
    let denominator = time_signature.denominator.max(1).trailing_zeros() as u8;

    track.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::TimeSignature(
            time_signature.numerator,
            denominator,
            24,
            8,
        )),
    });
}

fn add_end_of_track(track: &mut Track, delta: u32) {
    track.push(TrackEvent {
        delta: delta.into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
}
