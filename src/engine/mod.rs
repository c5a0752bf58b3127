//! Speech engine abstraction.
//!
//! The session never talks to a concrete synthesiser; it drives a
//! [`SpeechEngine`], which is handed complete settings on every call so
//! that no engine state has to be saved and restored around a preview.

use std::{fmt, path::Path, str::FromStr, sync::Arc};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::settings::VoiceSettings;

pub mod espeak;
pub mod silent;

pub use espeak::EspeakEngine;
pub use silent::SilentEngine;

/// One voice offered by an engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceInfo {
    /// Identifier passed back to the engine in [`VoiceSettings::voice`].
    pub id: String,
    pub name: String,
    pub language: String,
    pub gender: Option<String>,
}

impl fmt::Display for VoiceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.gender {
            Some(g) => write!(f, "{} ({})", self.name, g),
            None => f.write_str(&self.name),
        }
    }
}

/// A text-to-speech backend.
///
/// `speak` and `synthesize_to_file` block until the utterance is done or
/// [`stop`](SpeechEngine::stop) interrupts it. `stop` is called from a
/// different thread than the one blocked in `speak`.
pub trait SpeechEngine: Send + Sync {
    fn name(&self) -> &str;

    fn voices(&self) -> Result<Vec<VoiceInfo>>;

    /// Speak `text` through the default audio output.
    fn speak(&self, text: &str, voice: &VoiceSettings) -> Result<()>;

    /// Render `text` into a WAV file at `path`.
    fn synthesize_to_file(&self, text: &str, voice: &VoiceSettings, path: &Path) -> Result<()>;

    /// Interrupt the utterance in progress, if any.
    fn stop(&self);
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine selection
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// `espeak-ng` / `espeak` subprocess.
    #[default]
    Espeak,
    /// No audio device; silence sized to the speaking rate.
    Silent,
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "espeak" | "espeak-ng" => Ok(EngineKind::Espeak),
            "silent" => Ok(EngineKind::Silent),
            other => Err(format!("unknown engine {other:?} (expected espeak or silent)")),
        }
    }
}

/// Build the engine described by `kind`.
///
/// `program` overrides the espeak executable; otherwise `espeak-ng` and
/// then `espeak` are looked up on `PATH`.
pub fn create_engine(kind: EngineKind, program: Option<&str>) -> Result<Arc<dyn SpeechEngine>> {
    let engine: Arc<dyn SpeechEngine> = match kind {
        EngineKind::Espeak => match program {
            Some(p) => Arc::new(EspeakEngine::new(p)),
            None => Arc::new(EspeakEngine::detect()?),
        },
        EngineKind::Silent => Arc::new(SilentEngine::new()),
    };
    tracing::debug!(engine = engine.name(), "speech engine ready");
    Ok(engine)
}
