use std::{
    fs,
    io::{self, IsTerminal, Read},
    path::PathBuf,
    sync::mpsc::Receiver,
    thread,
    time::Duration,
};

use anyhow::{anyhow, bail, ensure, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use audiobook::{
    chunk::chunk_text,
    config::{load_config_from_path, print_config, AppConfig, ChunkMode},
    create_engine, EngineKind, ExportFormat, JobHandle, JobOutcome, OutputMode, Session,
    SessionEvent, VoiceEffect, VoiceSettings,
};

#[derive(Debug, Parser)]
#[command(name = "audiobook", version)]
#[command(about = "Read text aloud or turn it into an audiobook file")]
struct Cli {
    /// Configuration file (replaces audiobook.toml / audiobook.local.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Speech engine: espeak or silent
    #[arg(long, global = true)]
    engine: Option<EngineKind>,
    /// More log output (-v info, -vv debug, -vvv trace); RUST_LOG wins
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List the engine's voices
    Voices {
        #[arg(long)]
        json: bool,
    },
    /// Speak the sample sentence of a voice effect
    Preview(PreviewArgs),
    /// Read text aloud
    Play(PlayArgs),
    /// Speak and/or save text as an audio file
    Convert(ConvertArgs),
    /// Print the chunks the text would be read in
    Split(SplitArgs),
}

#[derive(Debug, Args)]
struct PreviewArgs {
    #[command(flatten)]
    voice: VoiceArgs,
}

#[derive(Debug, Args)]
struct PlayArgs {
    #[command(flatten)]
    text: TextInput,
    #[command(flatten)]
    voice: VoiceArgs,
    #[command(flatten)]
    chunking: ChunkArgs,
}

#[derive(Debug, Args)]
struct ConvertArgs {
    #[command(flatten)]
    text: TextInput,
    #[command(flatten)]
    voice: VoiceArgs,
    #[command(flatten)]
    chunking: ChunkArgs,
    /// Silence between chunks, in seconds (0.1-5.0)
    #[arg(long)]
    pause: Option<f32>,
    /// Reading speed used for the time estimate (80-300)
    #[arg(long)]
    wpm: Option<u32>,
    /// Output directory
    #[arg(long)]
    dir: Option<PathBuf>,
    /// Output file name without extension
    #[arg(long)]
    filename: Option<String>,
    /// play, save or both
    #[arg(long)]
    mode: Option<OutputMode>,
    /// mp3 or wav (default mp3 when built with the mp3 feature, else wav)
    #[arg(long)]
    format: Option<ExportFormat>,
    /// MP3 bitrate in kbps
    #[arg(long)]
    bitrate: Option<u32>,
}

#[derive(Debug, Args)]
struct SplitArgs {
    #[command(flatten)]
    text: TextInput,
    #[command(flatten)]
    chunking: ChunkArgs,
}

#[derive(Debug, Args)]
struct VoiceArgs {
    /// Engine voice id (see `audiobook voices`)
    #[arg(long)]
    voice: Option<String>,
    /// Speaking rate in words per minute (50-300)
    #[arg(long)]
    rate: Option<u32>,
    /// Volume in percent (0-100)
    #[arg(long, value_name = "PCT")]
    volume: Option<u32>,
    /// Pitch in percent of normal (50-150)
    #[arg(long, value_name = "PCT")]
    pitch: Option<u32>,
    /// none, echo, whisper, robot or slow-motion
    #[arg(long)]
    effect: Option<VoiceEffect>,
}

impl VoiceArgs {
    fn apply(&self, base: &VoiceSettings) -> VoiceSettings {
        let mut voice = base.clone();
        if let Some(id) = &self.voice {
            voice.voice = Some(id.clone());
        }
        if let Some(rate) = self.rate {
            voice.rate = rate;
        }
        if let Some(percent) = self.volume {
            voice = voice.with_volume_percent(percent);
        }
        if let Some(pitch) = self.pitch {
            voice.pitch = pitch;
        }
        if let Some(effect) = self.effect {
            voice.effect = effect;
        }
        voice.clamped()
    }
}

#[derive(Debug, Args)]
struct TextInput {
    /// Text to read
    #[arg(long, conflicts_with = "file")]
    text: Option<String>,
    /// File to read the text from
    #[arg(long, conflicts_with = "text")]
    file: Option<PathBuf>,
}

impl TextInput {
    /// The text, and whether it was taken from stdin.
    fn read(&self) -> Result<(String, bool)> {
        if let Some(text) = &self.text {
            return Ok((text.clone(), false));
        }
        if let Some(path) = &self.file {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Cannot read {}", path.display()))?;
            return Ok((text, false));
        }
        let stdin = io::stdin();
        if stdin.is_terminal() {
            bail!("No text given: use --text, --file, or pipe text on stdin");
        }
        let mut text = String::new();
        stdin.lock().read_to_string(&mut text).context("Cannot read stdin")?;
        Ok((text, true))
    }
}

#[derive(Debug, Args)]
struct ChunkArgs {
    /// packed or paragraph
    #[arg(long)]
    strategy: Option<ChunkMode>,
    /// Longest packed chunk, in characters
    #[arg(long)]
    max_chars: Option<usize>,
}

impl ChunkArgs {
    fn apply(&self, config: &mut AppConfig) -> Result<()> {
        if let Some(mode) = self.strategy {
            config.chunking.strategy = mode;
        }
        if let Some(max_chars) = self.max_chars {
            ensure!(max_chars > 0, "--max-chars must be at least 1");
            config.chunking.max_chars = max_chars;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry point
// ─────────────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config_from_path(cli.config.as_deref())
        .map_err(|e| anyhow!("Failed to load config: {e}"))?;
    init_logging(cli.verbose, &config.log.level);

    if let Some(kind) = cli.engine {
        config.engine.kind = kind;
    }
    print_config(&config);

    let kind = config.engine.kind;
    let program = config.engine.program.clone();
    let open_session = move || -> Result<(Session, Receiver<SessionEvent>)> {
        Ok(Session::new(create_engine(kind, program.as_deref())?))
    };

    match cli.command {
        Commands::Split(args) => split(&mut config, &args),
        Commands::Voices { json } => {
            let (session, _) = open_session()?;
            list_voices(&session, json)
        }
        Commands::Preview(args) => {
            let (session, _) = open_session()?;
            let voice = args.voice.apply(&config.voice);
            eprintln!("Previewing the {} effect...", voice.effect);
            session.preview(&voice)?;
            Ok(())
        }
        Commands::Play(args) => {
            let (session, events) = open_session()?;
            play(&session, events, &mut config, &args)
        }
        Commands::Convert(args) => {
            let (session, events) = open_session()?;
            convert(&session, events, &mut config, &args)
        }
    }
}

fn init_logging(verbose: u8, config_level: &str) {
    let fallback = match verbose {
        0 => config_level,
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

fn list_voices(session: &Session, json: bool) -> Result<()> {
    let voices = session.voices()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&voices)?);
        return Ok(());
    }
    if voices.is_empty() {
        println!("No voices available.");
    }
    for voice in &voices {
        println!("{:<16} {}", voice.id, voice);
    }
    Ok(())
}

fn split(config: &mut AppConfig, args: &SplitArgs) -> Result<()> {
    args.chunking.apply(config)?;
    let (text, _) = args.text.read()?;
    let chunks = chunk_text(&text, config.chunking.strategy());
    let total = chunks.len();
    for (i, chunk) in chunks.iter().enumerate() {
        println!("--- chunk {}/{} ({} chars) ---", i + 1, total, chunk.chars().count());
        println!("{chunk}");
    }
    let estimated = config.pacing.estimated_duration(&chunks);
    eprintln!("{total} chunks, about {} of audio", format_duration(estimated));
    Ok(())
}

fn play(
    session: &Session,
    events: Receiver<SessionEvent>,
    config: &mut AppConfig,
    args: &PlayArgs,
) -> Result<()> {
    args.chunking.apply(config)?;
    let (text, from_stdin) = args.text.read()?;
    let voice = args.voice.apply(&config.voice);
    let job = session.play(&text, &voice, config.chunking.strategy())?;
    follow(session, events, job, !from_stdin)
}

fn convert(
    session: &Session,
    events: Receiver<SessionEvent>,
    config: &mut AppConfig,
    args: &ConvertArgs,
) -> Result<()> {
    args.chunking.apply(config)?;
    let (text, from_stdin) = args.text.read()?;

    let mut request = config.conversion_request();
    request.voice = args.voice.apply(&config.voice);
    if let Some(pause) = args.pause {
        request.pacing.pause_secs = pause;
    }
    if let Some(wpm) = args.wpm {
        request.pacing.words_per_minute = wpm;
    }
    if let Some(dir) = &args.dir {
        request.output.dir = dir.clone();
    }
    if let Some(filename) = &args.filename {
        request.output.filename = filename.clone();
    }
    if let Some(mode) = args.mode {
        request.output.mode = mode;
    }
    if let Some(format) = args.format {
        request.output.format = format;
    }
    if let Some(bitrate) = args.bitrate {
        ensure!(bitrate > 0, "--bitrate must be positive");
        request.output.bitrate_kbps = bitrate;
    }

    let job = session.convert(&text, request)?;
    follow(session, events, job, !from_stdin)
}

/// Render a job's events until it finishes. With `interactive`, Enter stops it.
fn follow(
    session: &Session,
    events: Receiver<SessionEvent>,
    job: JobHandle,
    interactive: bool,
) -> Result<()> {
    if interactive && io::stdin().is_terminal() {
        eprintln!("Press Enter to stop.");
        let session = session.clone();
        // Left blocked on stdin once the job is over; the process exits anyway.
        thread::spawn(move || {
            let mut line = String::new();
            if io::stdin().read_line(&mut line).is_ok() {
                session.stop();
            }
        });
    }

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {msg}")?
            .progress_chars("█▉▊▋▌▍▎▏  "),
    );
    bar.enable_steady_tick(Duration::from_millis(120));

    for event in events.iter() {
        match event {
            SessionEvent::Started { chunks, estimated, .. } => {
                bar.set_length(chunks as u64);
                bar.set_message(format!("about {}", format_duration(estimated)));
            }
            SessionEvent::Progress { index, message, .. } => {
                bar.set_position(index as u64);
                bar.set_message(message);
            }
            SessionEvent::Status(message) => bar.println(message),
            SessionEvent::Saved(path) => tracing::info!(path = %path.display(), "audio file written"),
            SessionEvent::Finished { outcome, .. } => {
                match &outcome {
                    JobOutcome::Completed => bar.finish_with_message("done"),
                    JobOutcome::Stopped => bar.abandon_with_message("stopped"),
                    JobOutcome::Failed(_) => bar.abandon_with_message("failed"),
                }
                break;
            }
        }
    }

    match job.join() {
        JobOutcome::Failed(message) => Err(anyhow!(message)),
        JobOutcome::Completed | JobOutcome::Stopped => Ok(()),
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    match secs {
        s if s >= 3600 => format!("{}h {:02}m", s / 3600, (s % 3600) / 60),
        s if s >= 60 => format!("{}m {:02}s", s / 60, s % 60),
        s => format!("{s}s"),
    }
}
