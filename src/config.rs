//! Layered configuration.
//!
//! Priority, highest first:
//! 1. command-line flags (applied by the binary on top of the result)
//! 2. environment variables, prefix `AUDIOBOOK_`, nesting separator `__`
//! 3. `audiobook.toml` / `audiobook.local.toml` in the working directory,
//!    or the single file passed with `--config`
//! 4. built-in defaults
//!
//! ```text
//! AUDIOBOOK_VOICE__RATE=180
//! AUDIOBOOK_PACING__PAUSE_SECS=1.5
//! AUDIOBOOK_OUTPUT__FORMAT=wav
//! AUDIOBOOK_ENGINE__KIND=silent
//! ```

use std::path::Path;

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::{
    chunk::{ChunkStrategy, DEFAULT_MAX_CHARS},
    engine::EngineKind,
    session::ConversionRequest,
    settings::{
        default_output_dir, OutputSettings, PacingSettings, VoiceSettings, PAUSE_SECS_RANGE,
        PITCH_RANGE, RATE_RANGE, WPM_RANGE,
    },
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::Load(err.to_string())
    }
}

const CONFIG_FILE_NAMES: &[&str] = &["audiobook", "audiobook.local"];

const ENV_PREFIX: &str = "AUDIOBOOK";

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub voice: VoiceSettings,
    pub pacing: PacingSettings,
    pub output: OutputSettings,
    pub chunking: ChunkingConfig,
    pub engine: EngineConfig,
    pub log: LogConfig,
}

impl AppConfig {
    /// A conversion of everything the configuration describes.
    pub fn conversion_request(&self) -> ConversionRequest {
        ConversionRequest {
            voice: self.voice.clone(),
            pacing: self.pacing.clone(),
            output: self.output.clone(),
            strategy: self.chunking.strategy(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkMode {
    #[default]
    Packed,
    Paragraph,
}

impl std::str::FromStr for ChunkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "packed" => Ok(ChunkMode::Packed),
            "paragraph" => Ok(ChunkMode::Paragraph),
            other => Err(format!("unknown chunk strategy {other:?} (expected packed or paragraph)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub strategy: ChunkMode,
    /// Budget for packed chunks; ignored by `paragraph`.
    pub max_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { strategy: ChunkMode::Packed, max_chars: DEFAULT_MAX_CHARS }
    }
}

impl ChunkingConfig {
    pub fn strategy(&self) -> ChunkStrategy {
        match self.strategy {
            ChunkMode::Packed => ChunkStrategy::Packed { max_chars: self.max_chars },
            ChunkMode::Paragraph => ChunkStrategy::Paragraph,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub kind: EngineKind,
    /// Explicit espeak executable; looked up on `PATH` when unset.
    pub program: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "warn".to_string() }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Loading
// ─────────────────────────────────────────────────────────────────────────────

pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// Load configuration, reading only `config_path` (which must exist) when given.
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let voice = VoiceSettings::default();
    let pacing = PacingSettings::default();
    let output = OutputSettings::default();

    let mut builder = Config::builder()
        .set_default("voice.rate", i64::from(voice.rate))?
        .set_default("voice.volume", f64::from(voice.volume))?
        .set_default("voice.pitch", i64::from(voice.pitch))?
        .set_default("voice.effect", "none")?
        .set_default("pacing.pause_secs", f64::from(pacing.pause_secs))?
        .set_default("pacing.words_per_minute", i64::from(pacing.words_per_minute))?
        .set_default("output.dir", default_output_dir().to_string_lossy().into_owned())?
        .set_default("output.filename", output.filename)?
        .set_default("output.mode", "save-only")?
        .set_default("output.format", output.format.extension())?
        .set_default("output.bitrate_kbps", i64::from(output.bitrate_kbps))?
        .set_default("chunking.strategy", "packed")?
        .set_default("chunking.max_chars", DEFAULT_MAX_CHARS as i64)?
        .set_default("engine.kind", "espeak")?
        .set_default("log.level", LogConfig::default().level)?;

    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::Parse(format!("Failed to deserialize config: {e}")))?;

    validate_config(&app_config)?;
    Ok(app_config)
}

/// Values from files and the environment must already be in range; only
/// interactive input is clamped.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    fn out_of_range<T: std::fmt::Display>(key: &str, value: T, lo: T, hi: T) -> ConfigError {
        ConfigError::Validation(format!("{key} = {value} is outside {lo}..={hi}"))
    }

    let voice = &config.voice;
    if !RATE_RANGE.contains(&voice.rate) {
        return Err(out_of_range("voice.rate", voice.rate, *RATE_RANGE.start(), *RATE_RANGE.end()));
    }
    if !(0.0..=1.0).contains(&voice.volume) {
        return Err(out_of_range("voice.volume", voice.volume, 0.0, 1.0));
    }
    if !PITCH_RANGE.contains(&voice.pitch) {
        return Err(out_of_range("voice.pitch", voice.pitch, *PITCH_RANGE.start(), *PITCH_RANGE.end()));
    }

    let pacing = &config.pacing;
    if !PAUSE_SECS_RANGE.contains(&pacing.pause_secs) {
        return Err(out_of_range(
            "pacing.pause_secs",
            pacing.pause_secs,
            *PAUSE_SECS_RANGE.start(),
            *PAUSE_SECS_RANGE.end(),
        ));
    }
    if !WPM_RANGE.contains(&pacing.words_per_minute) {
        return Err(out_of_range(
            "pacing.words_per_minute",
            pacing.words_per_minute,
            *WPM_RANGE.start(),
            *WPM_RANGE.end(),
        ));
    }

    if config.output.filename.trim().is_empty() {
        return Err(ConfigError::Validation("output.filename cannot be empty".to_string()));
    }
    if config.output.bitrate_kbps == 0 {
        return Err(ConfigError::Validation("output.bitrate_kbps cannot be 0".to_string()));
    }
    if config.chunking.strategy == ChunkMode::Packed && config.chunking.max_chars == 0 {
        return Err(ConfigError::Validation("chunking.max_chars cannot be 0".to_string()));
    }
    if config.log.level.trim().is_empty() {
        return Err(ConfigError::Validation("log.level cannot be empty".to_string()));
    }

    Ok(())
}

pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Audiobook Configuration ===");
    tracing::info!(
        "Voice: {} rate={} volume={}% pitch={}% effect={}",
        config.voice.voice.as_deref().unwrap_or("(default)"),
        config.voice.rate,
        config.voice.volume_percent(),
        config.voice.pitch,
        config.voice.effect,
    );
    tracing::info!(
        "Pacing: pause={}s wpm={}",
        config.pacing.pause_secs,
        config.pacing.words_per_minute
    );
    tracing::info!("Output: {} ({:?})", config.output.output_path().display(), config.output.mode);
    tracing::info!("Chunking: {}", config.chunking.strategy());
    tracing::info!(
        "Engine: {:?}{}",
        config.engine.kind,
        config.engine.program.as_deref().map(|p| format!(" ({p})")).unwrap_or_default()
    );
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("===============================");
}
