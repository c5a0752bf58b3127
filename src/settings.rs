//! Voice, pacing and output settings.
//!
//! Every numeric field has a legal range taken from the controls of the
//! desktop front-end; constructors and [`clamped`](VoiceSettings::clamped)
//! pull values back into that range rather than failing.

use std::{ops::RangeInclusive, path::PathBuf, time::Duration};

use serde::Deserialize;

use crate::{
    audio::{ExportFormat, DEFAULT_MP3_BITRATE_KBPS},
    chunk::word_count,
    effect::VoiceEffect,
};

pub const RATE_RANGE: RangeInclusive<u32> = 50..=300;
pub const PITCH_RANGE: RangeInclusive<u32> = 50..=150;
pub const VOLUME_PERCENT_RANGE: RangeInclusive<u32> = 0..=100;
pub const PAUSE_SECS_RANGE: RangeInclusive<f32> = 0.1..=5.0;
pub const WPM_RANGE: RangeInclusive<u32> = 80..=300;

pub const DEFAULT_FILENAME: &str = "audiobook";

fn clamp_to<T: PartialOrd + Copy>(v: T, range: &RangeInclusive<T>) -> T {
    if v < *range.start() {
        *range.start()
    } else if v > *range.end() {
        *range.end()
    } else {
        v
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Voice
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the engine needs to know about how to speak.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    /// Engine-specific voice id; `None` keeps the engine default.
    pub voice: Option<String>,
    /// Words per minute.
    pub rate: u32,
    /// Fraction of full volume, `0.0..=1.0`.
    pub volume: f32,
    /// Percent of the engine's normal pitch.
    pub pitch: u32,
    pub effect: VoiceEffect,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self { voice: None, rate: 150, volume: 0.9, pitch: 100, effect: VoiceEffect::None }
    }
}

impl VoiceSettings {
    /// Copy with every field pulled into its legal range.
    pub fn clamped(&self) -> Self {
        let volume = if self.volume.is_nan() { 0.0 } else { self.volume.clamp(0.0, 1.0) };
        Self {
            voice: self.voice.clone().filter(|v| !v.trim().is_empty()),
            rate: clamp_to(self.rate, &RATE_RANGE),
            volume,
            pitch: clamp_to(self.pitch, &PITCH_RANGE),
            effect: self.effect,
        }
    }

    pub fn with_volume_percent(mut self, percent: u32) -> Self {
        self.volume = clamp_to(percent, &VOLUME_PERCENT_RANGE) as f32 / 100.0;
        self
    }

    pub fn volume_percent(&self) -> u32 {
        (self.volume.clamp(0.0, 1.0) * 100.0).round() as u32
    }

    pub fn pitch_label(&self) -> &'static str {
        match self.pitch {
            p if p < 90 => "Low",
            p if p > 110 => "High",
            _ => "Normal",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pacing
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PacingSettings {
    /// Silence between chunks, in seconds.
    pub pause_secs: f32,
    /// Reading speed assumed for time estimates.
    pub words_per_minute: u32,
}

impl Default for PacingSettings {
    fn default() -> Self {
        Self { pause_secs: 0.5, words_per_minute: 180 }
    }
}

impl PacingSettings {
    pub fn clamped(&self) -> Self {
        let pause_secs = if self.pause_secs.is_nan() {
            *PAUSE_SECS_RANGE.start()
        } else {
            clamp_to(self.pause_secs, &PAUSE_SECS_RANGE)
        };
        Self { pause_secs, words_per_minute: clamp_to(self.words_per_minute, &WPM_RANGE) }
    }

    pub fn pause(&self) -> Duration {
        Duration::from_secs_f32(self.clamped().pause_secs)
    }

    /// Listening time for `chunks`: speech at `words_per_minute` plus one
    /// pause between each pair of consecutive chunks.
    pub fn estimated_duration<S: AsRef<str>>(&self, chunks: &[S]) -> Duration {
        let wpm = self.clamped().words_per_minute;
        let words: usize = chunks.iter().map(|c| word_count(c.as_ref())).sum();
        let speech = Duration::from_secs_f64(words as f64 * 60.0 / f64::from(wpm));
        let gaps = chunks.len().saturating_sub(1) as u32;
        speech + self.pause() * gaps
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

/// What a conversion does with each chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    /// Speak only, write nothing.
    PlayOnly,
    /// Write the audio file without speaking.
    #[default]
    SaveOnly,
    /// Speak and write.
    Both,
}

impl OutputMode {
    pub fn plays(self) -> bool {
        matches!(self, OutputMode::PlayOnly | OutputMode::Both)
    }

    pub fn saves(self) -> bool {
        matches!(self, OutputMode::SaveOnly | OutputMode::Both)
    }
}

impl std::str::FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "play" | "play-only" => Ok(OutputMode::PlayOnly),
            "save" | "save-only" => Ok(OutputMode::SaveOnly),
            "both" => Ok(OutputMode::Both),
            other => Err(format!("unknown output mode {other:?} (expected play, save or both)")),
        }
    }
}

/// Where and how a conversion writes its audio file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub dir: PathBuf,
    /// File stem; the extension comes from `format`.
    pub filename: String,
    pub mode: OutputMode,
    pub format: ExportFormat,
    pub bitrate_kbps: u32,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            filename: DEFAULT_FILENAME.to_string(),
            mode: OutputMode::default(),
            format: ExportFormat::default(),
            bitrate_kbps: DEFAULT_MP3_BITRATE_KBPS,
        }
    }
}

impl OutputSettings {
    /// `dir/<filename>.<ext>`, falling back to `audiobook` for a blank name.
    pub fn output_path(&self) -> PathBuf {
        let stem = self.filename.trim();
        let stem = if stem.is_empty() { DEFAULT_FILENAME } else { stem };
        self.dir.join(format!("{}.{}", stem, self.format.extension()))
    }
}

/// `~/Audiobooks`, or `./Audiobooks` when no home directory is known.
pub fn default_output_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join("Audiobooks"))
        .unwrap_or_else(|| PathBuf::from("Audiobooks"))
}
