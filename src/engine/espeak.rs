//! Speech through the `espeak-ng` (or legacy `espeak`) executable.
//!
//! Every utterance is one child process. Text goes in on stdin so that
//! arbitrary input cannot be mistaken for command-line options.
//!
//! | Setting          | espeak flag | Mapping                              |
//! |------------------|-------------|--------------------------------------|
//! | rate (wpm)       | `-s`        | passed through                       |
//! | volume `0..=1`   | `-a`        | `volume × 200` (100 = espeak default) |
//! | pitch `50..=150` | `-p`        | linear onto `0..=99` (100 % → 50)     |
//! | voice id         | `-v`        | passed through                       |
//!
//! The child currently speaking is kept so that [`SpeechEngine::stop`] can
//! kill it from another thread; an utterance is therefore interrupted
//! mid-sentence rather than at the next chunk boundary.

use std::{
    io::{Read, Write},
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
    thread,
    time::Duration,
};

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;

use super::{SpeechEngine, VoiceInfo};
use crate::settings::VoiceSettings;

/// Executables tried by [`EspeakEngine::detect`], in order.
pub const CANDIDATE_PROGRAMS: &[&str] = &["espeak-ng", "espeak"];

/// How often a blocked `speak` checks whether its child has exited.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// One row of `espeak-ng --voices`:
/// ` 5  en-us           --/M      English_(America)  gmw/en-US  (en 8)`
/// Legacy espeak prints the gender without the age prefix (` M `).
static RE_VOICE_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\d+\s+(\S+)\s+(?:\S*/)?([MF-])\s+(\S+)\s+(\S+)").unwrap()
});

pub struct EspeakEngine {
    program: String,
    current: Mutex<Option<Child>>,
    interrupted: AtomicBool,
}

impl EspeakEngine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            current: Mutex::new(None),
            interrupted: AtomicBool::new(false),
        }
    }

    /// Use the first of [`CANDIDATE_PROGRAMS`] found on `PATH`.
    pub fn detect() -> Result<Self> {
        for program in CANDIDATE_PROGRAMS {
            if let Some(path) = find_on_path(program) {
                tracing::debug!(path = %path.display(), "found espeak executable");
                return Ok(Self::new(*program));
            }
        }
        bail!(
            "Could not initialize TTS engine: no espeak executable on PATH (tried: {})",
            CANDIDATE_PROGRAMS.join(", ")
        )
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Spawn one utterance and block until it exits or is killed.
    fn run(&self, text: &str, args: Vec<String>) -> Result<()> {
        self.interrupted.store(false, Ordering::SeqCst);

        let mut child = Command::new(&self.program)
            .args(&args)
            .arg("--stdin")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to launch '{}': ensure it is installed", self.program))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A broken pipe here means espeak already died; its exit status
            // below carries the real error.
            let _ = stdin.write_all(text.as_bytes());
        }

        let mut stderr = child.stderr.take();
        {
            let mut slot = self.current.lock().unwrap_or_else(|p| p.into_inner());
            *slot = Some(child);
        }

        let status = loop {
            {
                let mut slot = self.current.lock().unwrap_or_else(|p| p.into_inner());
                let Some(child) = slot.as_mut() else {
                    bail!("'{}' process handle lost", self.program);
                };
                if let Some(status) = child.try_wait().context("Failed to wait for espeak")? {
                    slot.take();
                    break status;
                }
            }
            thread::sleep(POLL_INTERVAL);
        };

        if self.interrupted.load(Ordering::SeqCst) {
            tracing::debug!(program = %self.program, "utterance interrupted");
            return Ok(());
        }
        if !status.success() {
            let mut message = String::new();
            if let Some(err) = stderr.as_mut() {
                let _ = err.read_to_string(&mut message);
            }
            bail!("'{}' failed ({}): {}", self.program, status, message.trim());
        }
        Ok(())
    }
}

impl SpeechEngine for EspeakEngine {
    fn name(&self) -> &str {
        &self.program
    }

    fn voices(&self) -> Result<Vec<VoiceInfo>> {
        let output = Command::new(&self.program)
            .arg("--voices")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("Failed to launch '{}': ensure it is installed", self.program))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("'{} --voices' failed: {}", self.program, stderr.trim());
        }
        Ok(parse_voice_list(&String::from_utf8_lossy(&output.stdout)))
    }

    fn speak(&self, text: &str, voice: &VoiceSettings) -> Result<()> {
        self.run(text, voice_args(voice))
    }

    fn synthesize_to_file(&self, text: &str, voice: &VoiceSettings, path: &Path) -> Result<()> {
        let mut args = voice_args(voice);
        args.push("-w".to_string());
        args.push(path.to_string_lossy().into_owned());
        self.run(text, args)
            .with_context(|| format!("Synthesis to {} failed", path.display()))
    }

    fn stop(&self) {
        let mut slot = self.current.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(child) = slot.as_mut() {
            self.interrupted.store(true, Ordering::SeqCst);
            if let Err(e) = child.kill() {
                tracing::warn!(error = %e, "failed to kill espeak process");
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// espeak flags for `voice` (clamped first).
pub fn voice_args(voice: &VoiceSettings) -> Vec<String> {
    let v = voice.clamped();
    let mut args = vec![
        "-s".to_string(),
        v.rate.to_string(),
        "-a".to_string(),
        amplitude(v.volume).to_string(),
        "-p".to_string(),
        pitch(v.pitch).to_string(),
    ];
    if let Some(id) = v.voice {
        args.push("-v".to_string());
        args.push(id);
    }
    args
}

fn amplitude(volume: f32) -> u32 {
    (volume * 100.0).round() as u32
}

fn pitch(percent: u32) -> u32 {
    (percent.saturating_sub(50) * 99 + 50) / 100
}

/// Parse the table printed by `espeak-ng --voices`.
pub fn parse_voice_list(listing: &str) -> Vec<VoiceInfo> {
    listing
        .lines()
        .filter_map(|line| RE_VOICE_ROW.captures(line))
        .map(|caps| {
            let language = caps[1].to_string();
            let gender = match &caps[2] {
                "M" => Some("Male".to_string()),
                "F" => Some("Female".to_string()),
                _ => None,
            };
            VoiceInfo {
                id: language.clone(),
                name: caps[3].replace('_', " "),
                language,
                gender,
            }
        })
        .collect()
}

fn find_on_path(program: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .flat_map(|dir| {
            let plain = dir.join(program);
            let exe = dir.join(format!("{program}.exe"));
            [plain, exe]
        })
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::VoiceEffect;

    #[test]
    fn test_default_voice_args() {
        let args = voice_args(&VoiceSettings::default());
        assert_eq!(args, vec!["-s", "150", "-a", "90", "-p", "50"]);

        let loud = VoiceSettings { volume: 1.0, ..Default::default() };
        assert_eq!(voice_args(&loud)[3], "100");
    }

    #[test]
    fn test_voice_args_clamp_and_voice() {
        let v = VoiceSettings {
            voice: Some("en-gb".into()),
            rate: 999,
            volume: 0.0,
            pitch: 150,
            effect: VoiceEffect::None,
        };
        assert_eq!(voice_args(&v), vec!["-s", "300", "-a", "0", "-p", "99", "-v", "en-gb"]);
    }

    #[test]
    fn test_pitch_mapping_bounds() {
        assert_eq!(pitch(50), 0);
        assert_eq!(pitch(100), 50);
        assert_eq!(pitch(150), 99);
    }

    #[test]
    fn test_parse_espeak_ng_voices() {
        let listing = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  af              --/M      Afrikaans          gmw/af
 5  en-us           --/M      English_(America)  gmw/en-US            (en 8)
 5  fr-fr           --/F      French_(France)    roa/fr
 5  mb-x            --/-      mbrola_voice       mb/mb-x
";
        let voices = parse_voice_list(listing);
        assert_eq!(voices.len(), 4);
        assert_eq!(voices[1].id, "en-us");
        assert_eq!(voices[1].name, "English (America)");
        assert_eq!(voices[1].gender.as_deref(), Some("Male"));
        assert_eq!(voices[2].gender.as_deref(), Some("Female"));
        assert_eq!(voices[3].gender, None);
    }

    #[test]
    fn test_parse_legacy_espeak_voices() {
        let listing = "\
Pty Language Age/Gender VoiceName       File        Other Languages
 5  af             M  afrikaans            other/af
 5  en             M  default              default
";
        let voices = parse_voice_list(listing);
        assert_eq!(voices.len(), 2);
        assert_eq!(voices[1].id, "en");
        assert_eq!(voices[1].name, "default");
    }

    #[test]
    fn test_missing_program_reports_error() {
        let engine = EspeakEngine::new("definitely-not-an-espeak-binary");
        let err = engine.speak("hello", &VoiceSettings::default()).unwrap_err();
        assert!(format!("{err:#}").contains("definitely-not-an-espeak-binary"));
        assert!(engine.voices().is_err());
    }

    #[test]
    fn test_stop_when_idle_is_noop() {
        EspeakEngine::new("espeak-ng").stop();
    }
}
