// Transcribe CLI
// Note events (JSON or MIDI) in, score JSON and optional MIDI out

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;

use vocalscore_lib::audio::read_wav;
use vocalscore_lib::events::{JsonSource, MidiSource, NoteEventSource};
use vocalscore_lib::pipeline::{Transcriber, TranscriptionConfig, TranscriptionError, TraceWriter};
use vocalscore_lib::score::{export_score_midi, MidiExportOptions};

#[derive(Parser, Debug)]
#[command(author, version, about = "Turn sung note events into a quantized score")]
struct Args {
    /// Note events: `.json` voices or a `.mid` file (track 1 lead, track 2 harmony)
    input: PathBuf,

    /// WAV recording used for tempo and beat tracking
    #[arg(short, long)]
    audio: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Score JSON output (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also write the score as a MIDI file
    #[arg(short, long)]
    midi: Option<PathBuf>,

    /// Append stage progress to this JSONL file
    #[arg(long)]
    trace: Option<PathBuf>,

    /// Score title (defaults to the input file stem)
    #[arg(short, long)]
    title: Option<String>,
}

fn open_source(path: &Path) -> Box<dyn NoteEventSource> {
    let is_midi = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("mid") || e.eq_ignore_ascii_case("midi"))
        .unwrap_or(false);

    if is_midi {
        Box::new(MidiSource::new(path))
    } else {
        Box::new(JsonSource::new(path))
    }
}

fn run(args: Args) -> Result<(), TranscriptionError> {
    let config = match &args.config {
        Some(path) => TranscriptionConfig::load(path)?,
        None => TranscriptionConfig::default(),
    };

    let mut transcriber = Transcriber::new(config);
    if let Some(path) = &args.trace {
        transcriber = transcriber.with_trace(TraceWriter::new(path));
    }

    let audio = match &args.audio {
        Some(path) => Some(read_wav(path)?),
        None => None,
    };

    let title = args.title.clone().unwrap_or_else(|| {
        args.input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Untitled")
            .to_string()
    });

    let source = open_source(&args.input);
    let transcription = transcriber.transcribe_source(&title, source.as_ref(), audio.as_ref())?;

    let json = serde_json::to_string_pretty(&transcription)?;
    match &args.output {
        Some(path) => fs::write(path, json)?,
        None => println!("{}", json),
    }

    if let Some(path) = &args.midi {
        let bytes = export_score_midi(&transcription.score, &MidiExportOptions::default())?;
        fs::write(path, bytes)?;
    }

    let score = &transcription.score;
    eprintln!("Transcription {}:", transcription.id);
    eprintln!("  Title: {}", score.title);
    eprintln!("  Tempo: {:.1} BPM", score.tempo_bpm);
    for summary in &transcription.voices {
        eprintln!(
            "  {}: {} ({} raw events -> {} notes)",
            summary.name,
            summary.key.name(),
            summary.raw_events,
            summary.cleaned_notes
        );
    }
    for part in &score.parts {
        eprintln!("  {}: {} measures", part.name, part.measure_count());
    }

    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
