//! Engine that produces silence instead of speech.
//!
//! Useful for dry runs on machines without a synthesiser or sound card:
//! the rest of the pipeline (chunking, pacing, export) runs unchanged and
//! the exported file has the length real speech at the chosen rate would.

use std::{
    path::Path,
    sync::{Condvar, Mutex},
    time::Duration,
};

use anyhow::Result;

use super::{SpeechEngine, VoiceInfo};
use crate::{audio::AudioSegment, chunk::word_count, settings::VoiceSettings};

/// Sample rate of generated files (espeak's native rate).
pub const SILENT_SAMPLE_RATE: u32 = 22_050;

#[derive(Default)]
pub struct SilentEngine {
    /// Block in `speak` for as long as the speech would take.
    realtime: bool,
    stop_signal: (Mutex<bool>, Condvar),
}

impl SilentEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// `speak` blocks for the utterance's estimated length.
    pub fn realtime() -> Self {
        Self { realtime: true, ..Self::default() }
    }

    /// How long `text` takes at `voice.rate` words per minute.
    pub fn utterance_length(text: &str, voice: &VoiceSettings) -> Duration {
        let rate = voice.clamped().rate;
        Duration::from_secs_f64(word_count(text) as f64 * 60.0 / f64::from(rate))
    }
}

impl SpeechEngine for SilentEngine {
    fn name(&self) -> &str {
        "silent"
    }

    fn voices(&self) -> Result<Vec<VoiceInfo>> {
        Ok(vec![VoiceInfo {
            id: "silent".to_string(),
            name: "Silence".to_string(),
            language: "none".to_string(),
            gender: None,
        }])
    }

    fn speak(&self, text: &str, voice: &VoiceSettings) -> Result<()> {
        if !self.realtime {
            return Ok(());
        }
        let (lock, cvar) = &self.stop_signal;
        let stopped = lock.lock().unwrap_or_else(|p| p.into_inner());
        let (mut stopped, _timeout) = cvar
            .wait_timeout_while(stopped, Self::utterance_length(text, voice), |stopped| !*stopped)
            .unwrap_or_else(|p| p.into_inner());
        // A stop with no utterance in progress ends the next one.
        *stopped = false;
        Ok(())
    }

    fn synthesize_to_file(&self, text: &str, voice: &VoiceSettings, path: &Path) -> Result<()> {
        AudioSegment::silent(Self::utterance_length(text, voice), SILENT_SAMPLE_RATE).write_wav(path)
    }

    fn stop(&self) {
        let (lock, cvar) = &self.stop_signal;
        *lock.lock().unwrap_or_else(|p| p.into_inner()) = true;
        cvar.notify_all();
    }
}
