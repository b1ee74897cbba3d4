// MIDI note source
// Reads the pitch model's MIDI output back into per-track note events using midly

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};

use super::source::{NoteEventSource, SourceError};
use super::types::{NoteEvent, Voice, VoiceRole};

/// Default tempo when a file carries no tempo meta event (120 BPM)
const DEFAULT_MICROS_PER_QUARTER: u32 = 500_000;

/// Note source reading a Standard MIDI File from disk
#[derive(Debug, Clone)]
pub struct MidiSource {
    path: PathBuf,
}

impl MidiSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        MidiSource { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NoteEventSource for MidiSource {
    fn load_voices(&self) -> Result<Vec<Voice>, SourceError> {
        let bytes = std::fs::read(&self.path)?;
        parse_midi_voices(&bytes)
    }
}

/// Tick to seconds conversion honouring tempo changes
struct TempoMap {
    /// (tick, seconds at tick, seconds per tick from here on)
    segments: Vec<(u64, f64, f64)>,
}

impl TempoMap {
    fn metrical(ppq: u16, mut changes: Vec<(u64, u32)>) -> Self {
        let ppq = f64::from(ppq.max(1));
        changes.sort_by_key(|&(tick, _)| tick);

        let mut segments = vec![(0u64, 0.0f64, DEFAULT_MICROS_PER_QUARTER as f64 / 1e6 / ppq)];
        for (tick, micros) in changes {
            let (last_tick, last_secs, last_rate) = segments[segments.len() - 1];
            let secs = last_secs + (tick - last_tick) as f64 * last_rate;
            let rate = micros as f64 / 1e6 / ppq;
            if tick == last_tick {
                // A later change at the same tick wins
                let idx = segments.len() - 1;
                segments[idx] = (tick, last_secs, rate);
            } else {
                segments.push((tick, secs, rate));
            }
        }

        TempoMap { segments }
    }

    fn fixed(seconds_per_tick: f64) -> Self {
        TempoMap {
            segments: vec![(0, 0.0, seconds_per_tick)],
        }
    }

    fn seconds(&self, tick: u64) -> f64 {
        let segment = self
            .segments
            .iter()
            .rev()
            .find(|(start, _, _)| *start <= tick)
            .unwrap_or(&self.segments[0]);
        let (start, secs, rate) = *segment;
        secs + (tick - start) as f64 * rate
    }
}

/// Parse MIDI bytes into voices, one per track that contains notes
///
/// The first note-bearing track becomes the lead voice, later ones harmony.
pub fn parse_midi_voices(bytes: &[u8]) -> Result<Vec<Voice>, SourceError> {
    let smf = Smf::parse(bytes).map_err(|e| SourceError::Midi(e.to_string()))?;

    // Tempo events apply to every track in a parallel file
    let mut tempo_changes = Vec::new();
    for track in &smf.tracks {
        let mut tick = 0u64;
        for event in track {
            tick += u64::from(event.delta.as_int());
            if let TrackEventKind::Meta(MetaMessage::Tempo(micros)) = event.kind {
                tempo_changes.push((tick, micros.as_int()));
            }
        }
    }

    let tempo_map = match smf.header.timing {
        Timing::Metrical(ppq) => TempoMap::metrical(ppq.as_int(), tempo_changes),
        Timing::Timecode(fps, subframes) => {
            let ticks_per_second = fps.as_f32() as f64 * f64::from(subframes.max(1));
            TempoMap::fixed(1.0 / ticks_per_second)
        }
    };

    let mut voices = Vec::new();

    for track in &smf.tracks {
        let mut tick = 0u64;
        let mut name: Option<String> = None;
        // (channel, key) -> open notes as (start tick, velocity), oldest first
        let mut open: HashMap<(u8, u8), Vec<(u64, u8)>> = HashMap::new();
        let mut notes: Vec<(u64, u64, u8, u8)> = Vec::new();

        for event in track {
            tick += u64::from(event.delta.as_int());
            match event.kind {
                TrackEventKind::Meta(MetaMessage::TrackName(raw)) => {
                    name = Some(String::from_utf8_lossy(raw).trim().to_string());
                }
                TrackEventKind::Midi { channel, message } => {
                    let channel = channel.as_int();
                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            open.entry((channel, key.as_int()))
                                .or_default()
                                .push((tick, vel.as_int()));
                        }
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            let key = key.as_int();
                            if let Some(stack) = open.get_mut(&(channel, key)) {
                                if !stack.is_empty() {
                                    let (start, vel) = stack.remove(0);
                                    notes.push((start, tick, key, vel));
                                }
                            }
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        // Hanging notes are closed at the end of the track
        for ((_, key), stack) in open {
            for (start, vel) in stack {
                notes.push((start, tick, key, vel));
            }
        }

        let mut events: Vec<NoteEvent> = notes
            .into_iter()
            .filter(|&(start, end, _, _)| end > start)
            .map(|(start, end, key, vel)| {
                NoteEvent::new(key, tempo_map.seconds(start), tempo_map.seconds(end), vel)
            })
            .collect();

        if events.is_empty() {
            continue;
        }

        events.sort_by(|a, b| a.start.total_cmp(&b.start).then(a.pitch.cmp(&b.pitch)));

        let role = if voices.is_empty() {
            VoiceRole::Lead
        } else {
            VoiceRole::Harmony
        };
        let mut voice = Voice::new(role, events);
        voice.name = name.filter(|n| !n.is_empty());
        voices.push(voice);
    }

    if voices.is_empty() {
        return Err(SourceError::NoVoices);
    }

    log::info!(
        "Loaded {} voices from MIDI ({} lead notes)",
        voices.len(),
        voices[0].events.len()
    );

    Ok(voices)
}
