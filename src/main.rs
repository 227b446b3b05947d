//! songsketch - drive the audio core from the terminal
//!
//! Set `RUST_LOG=debug` for stream and scheduling detail.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use songsketch_audio::metronome::Beat;
use songsketch_audio::{
    fmt_ms, AudioBackend, AudioBlob, AudioRecorder, AudioSettings, Clip, CpalBackend, Metronome,
    PitchDetector, PitchReading, Result,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Metronome, tuner and recorder for songwriting",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a click track.
    Metronome {
        /// Tempo, clamped to 40-200.
        #[arg(short, long)]
        bpm: Option<u32>,
        /// How long to play for.
        #[arg(short, long, default_value_t = 10)]
        seconds: u64,
    },
    /// Show the note sung or played into the microphone.
    Tune {
        #[arg(short, long, default_value_t = 10)]
        seconds: u64,
    },
    /// Record the microphone to a WAV file.
    Record {
        /// Output path; defaults to `recording-<timestamp>.wav`.
        #[arg(short, long)]
        out: Option<PathBuf>,
        #[arg(short, long, default_value_t = 5)]
        seconds: u64,
    },
    /// Print the duration of an audio file.
    Duration {
        file: PathBuf,
    },
    /// List input devices.
    Devices,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let settings = AudioSettings::load();

    match cli.command {
        Commands::Metronome { bpm, seconds } => run_metronome(&settings, bpm, seconds),
        Commands::Tune { seconds } => run_tuner(&settings, seconds),
        Commands::Record { out, seconds } => {
            let out = out.unwrap_or_else(|| PathBuf::from(Clip::default_filename()));
            run_recorder(&settings, &out, seconds)
        }
        Commands::Duration { file } => print_duration(&file),
        Commands::Devices => {
            for name in CpalBackend::input_device_names() {
                println!("{}", name);
            }
            Ok(())
        }
    }
}

fn backend(settings: &AudioSettings) -> Arc<dyn AudioBackend> {
    match &settings.input_device {
        Some(name) => Arc::new(CpalBackend::with_input_device(name.clone())),
        None => Arc::new(CpalBackend::new()),
    }
}

fn run_metronome(settings: &AudioSettings, bpm: Option<u32>, seconds: u64) -> Result<()> {
    let mut metronome = Metronome::new(
        backend(settings),
        &settings.metronome,
        Some(Box::new(|beat: Beat| {
            let mark = if beat.accented { "TICK" } else { "tick" };
            println!("{:>4}  {}", beat.index + 1, mark);
        })),
    );
    if let Some(bpm) = bpm {
        metronome.set_bpm(bpm);
    }

    metronome.start()?;
    println!("{} BPM for {}s", metronome.bpm(), seconds);
    thread::sleep(Duration::from_secs(seconds));
    metronome.stop();
    Ok(())
}

fn run_tuner(settings: &AudioSettings, seconds: u64) -> Result<()> {
    let mut last = None;
    let mut detector = PitchDetector::new(
        backend(settings),
        &settings.pitch,
        Box::new(move |reading: PitchReading| {
            let shown = (reading.note, reading.cents);
            if last == Some(shown) {
                return;
            }
            last = Some(shown);
            println!(
                "{:<2} {:+4} cents  {:7.1} Hz  {}",
                reading.note.name(),
                reading.cents,
                reading.frequency_hz,
                reading.status().label()
            );
        }),
    );

    detector.start()?;
    thread::sleep(Duration::from_secs(seconds));
    detector.stop();
    Ok(())
}

fn run_recorder(settings: &AudioSettings, out: &Path, seconds: u64) -> Result<()> {
    let mut recorder = AudioRecorder::new(
        backend(settings),
        &settings.recorder,
        Some(Box::new(|chunk: &[u8]| {
            log::debug!("Chunk of {} bytes", chunk.len());
        })),
        None,
    );

    recorder.start()?;
    println!("Recording for {}s", seconds);
    thread::sleep(Duration::from_secs(seconds));
    let Some(blob) = recorder.stop() else {
        return Ok(());
    };

    std::fs::write(out, blob.to_wav()?)?;
    let filename = out
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("recording.wav")
        .to_string();
    let clip = Clip::from_blob(filename, out.display().to_string(), &blob);
    println!("Saved {} ({})", out.display(), fmt_ms(clip.duration_ms));
    match serde_json::to_string_pretty(&clip) {
        Ok(json) => println!("{}", json),
        Err(e) => log::warn!("Failed to serialize clip: {}", e),
    }
    Ok(())
}

fn print_duration(path: &Path) -> Result<()> {
    let bytes = std::fs::read(path)?;
    let blob = AudioBlob::new(mime_for(path), bytes);
    let ms = songsketch_audio::duration_ms(&blob)?;
    println!("{} ms ({})", ms, fmt_ms(ms));
    Ok(())
}

/// MIME type from the file extension, for the decoder's format hint
fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "wav" | "wave" => "audio/wav",
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "ogg" | "oga" => "audio/ogg",
        "webm" => "audio/webm",
        "m4a" | "mp4" | "aac" => "audio/mp4",
        _ => "application/octet-stream",
    }
}
