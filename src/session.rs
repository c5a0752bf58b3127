//! Session: runs play / convert jobs on a background thread.
//!
//! A front-end owns one [`Session`] and the [`Receiver`] of its events.
//! Each action spawns a single worker thread; the worker reports progress
//! and status through [`SessionEvent`]s so the front-end never blocks on
//! the speech engine.
//!
//! ## Cancellation
//! Cooperative. [`Session::stop`] raises the running job's stop flag and
//! asks the engine to interrupt its current utterance. The worker checks
//! the flag before every chunk and while pausing between chunks; a stopped
//! conversion never writes its output file.
//!
//! ## Exclusivity
//! At most one job runs at a time. The slot is released by the worker on
//! exit (including on panic) *before* its `Finished` event is sent, so a
//! front-end may start the next job as soon as it sees `Finished`.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, Sender},
        Arc, Mutex, MutexGuard,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::{Context, Result};

use crate::{
    audio::AudioSegment,
    chunk::{chunk_text, ChunkStrategy},
    engine::{SpeechEngine, VoiceInfo},
    error::SessionError,
    settings::{OutputSettings, PacingSettings, VoiceSettings},
};

/// Gap between chunks during plain playback.
pub const PLAYBACK_GAP: Duration = Duration::from_millis(200);

/// Granularity of stop checks while pausing.
const STOP_POLL: Duration = Duration::from_millis(25);

// ─────────────────────────────────────────────────────────────────────────────
// Jobs and events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Play,
    Convert,
    Preview,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobKind::Play => "play",
            JobKind::Convert => "convert",
            JobKind::Preview => "preview",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Stopped,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Started {
        kind: JobKind,
        chunks: usize,
        /// Rough listening time of the whole job.
        estimated: Duration,
    },
    Progress {
        kind: JobKind,
        /// Zero-based chunk index.
        index: usize,
        total: usize,
        percent: u8,
        message: String,
    },
    Status(String),
    Saved(PathBuf),
    Finished {
        kind: JobKind,
        outcome: JobOutcome,
    },
}

/// Everything a conversion needs, captured when it starts.
#[derive(Debug, Clone, Default)]
pub struct ConversionRequest {
    pub voice: VoiceSettings,
    pub pacing: PacingSettings,
    pub output: OutputSettings,
    pub strategy: ChunkStrategy,
}

/// Handle to a running job.
#[derive(Debug)]
pub struct JobHandle {
    kind: JobKind,
    handle: JoinHandle<JobOutcome>,
}

impl JobHandle {
    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the worker exits.
    pub fn join(self) -> JobOutcome {
        self.handle
            .join()
            .unwrap_or_else(|_| JobOutcome::Failed("worker thread panicked".to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

struct ActiveJob {
    kind: JobKind,
    stop: Arc<AtomicBool>,
}

/// Clears the active-job slot when the worker exits, however it exits.
struct ActiveGuard(Arc<Mutex<Option<ActiveJob>>>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        lock(&self.0).take();
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

/// Front-end-facing controller. Cheap to clone; clones share the same job
/// slot, engine and event channel.
#[derive(Clone)]
pub struct Session {
    engine: Arc<dyn SpeechEngine>,
    events: Sender<SessionEvent>,
    active: Arc<Mutex<Option<ActiveJob>>>,
}

impl Session {
    pub fn new(engine: Arc<dyn SpeechEngine>) -> (Self, Receiver<SessionEvent>) {
        let (events, rx) = mpsc::channel();
        let session = Self { engine, events, active: Arc::new(Mutex::new(None)) };
        (session, rx)
    }

    pub fn engine(&self) -> &Arc<dyn SpeechEngine> {
        &self.engine
    }

    pub fn voices(&self) -> Result<Vec<VoiceInfo>, SessionError> {
        Ok(self.engine.voices()?)
    }

    pub fn current_job(&self) -> Option<JobKind> {
        lock(&self.active).as_ref().map(|job| job.kind)
    }

    pub fn is_busy(&self) -> bool {
        self.current_job().is_some()
    }

    /// Speak the preview sentence of `voice.effect` with `voice`, blocking.
    ///
    /// Holds the job slot while speaking, so `stop` interrupts it and no
    /// other job can start meanwhile.
    pub fn preview(&self, voice: &VoiceSettings) -> Result<(), SessionError> {
        let (_stop, _slot) = self.claim(JobKind::Preview)?;
        let voice = voice.clamped();
        tracing::debug!(effect = %voice.effect, rate = voice.rate, "voice preview");
        self.engine.speak(voice.effect.preview_text(), &voice)?;
        Ok(())
    }

    /// Speak `text` chunk by chunk in the background.
    pub fn play(
        &self,
        text: &str,
        voice: &VoiceSettings,
        strategy: ChunkStrategy,
    ) -> Result<JobHandle, SessionError> {
        if let Some(kind) = self.current_job() {
            return Err(SessionError::Busy(kind));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyText(JobKind::Play));
        }

        let voice = voice.clamped();
        let chunks = chunk_text(text, strategy);
        let estimated = PacingSettings {
            pause_secs: PLAYBACK_GAP.as_secs_f32(),
            words_per_minute: voice.rate,
        }
        .estimated_duration(&chunks);

        self.start(JobKind::Play, chunks.len(), estimated, move |ctx| {
            play_job(ctx, &chunks, &voice)
        })
    }

    /// Speak and/or save `text` according to `request` in the background.
    pub fn convert(&self, text: &str, request: ConversionRequest) -> Result<JobHandle, SessionError> {
        if let Some(kind) = self.current_job() {
            return Err(SessionError::Busy(kind));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyText(JobKind::Convert));
        }

        let request = ConversionRequest {
            voice: request.voice.clamped(),
            pacing: request.pacing.clamped(),
            ..request
        };
        if request.output.mode.saves() {
            let format = request.output.format;
            if !format.is_available() {
                return Err(SessionError::FormatUnavailable(format));
            }
            ensure_dir(&request.output.dir)?;
        }

        let chunks = chunk_text(text, request.strategy);
        let estimated = request.pacing.estimated_duration(&chunks);
        tracing::info!(
            chunks = chunks.len(),
            mode = ?request.output.mode,
            estimated_secs = estimated.as_secs(),
            "conversion requested"
        );

        self.start(JobKind::Convert, chunks.len(), estimated, move |ctx| {
            convert_job(ctx, &chunks, &request)
        })
    }

    /// Stop the running job. Returns `false` when nothing was running.
    pub fn stop(&self) -> bool {
        {
            // Sent under the lock so it always precedes the job's `Finished`.
            let active = lock(&self.active);
            let Some(job) = active.as_ref() else {
                return false;
            };
            job.stop.store(true, Ordering::SeqCst);
            tracing::info!(job = %job.kind, "stop requested");
            let message = match job.kind {
                JobKind::Play => "Playback stopped",
                JobKind::Convert => "Conversion stopped",
                JobKind::Preview => "Preview stopped",
            };
            let _ = self.events.send(SessionEvent::Status(message.to_string()));
        }
        self.engine.stop();
        true
    }

    /// Take the job slot for `kind`. The slot is freed when the guard drops.
    fn claim(&self, kind: JobKind) -> Result<(Arc<AtomicBool>, ActiveGuard), SessionError> {
        let stop = Arc::new(AtomicBool::new(false));
        let mut active = lock(&self.active);
        if let Some(running) = active.as_ref() {
            return Err(SessionError::Busy(running.kind));
        }
        *active = Some(ActiveJob { kind, stop: Arc::clone(&stop) });
        Ok((stop, ActiveGuard(Arc::clone(&self.active))))
    }

    fn start<F>(
        &self,
        kind: JobKind,
        chunks: usize,
        estimated: Duration,
        job: F,
    ) -> Result<JobHandle, SessionError>
    where
        F: FnOnce(&JobContext) -> Result<JobOutcome> + Send + 'static,
    {
        let (stop, guard) = self.claim(kind)?;
        let ctx = JobContext {
            kind,
            engine: Arc::clone(&self.engine),
            events: self.events.clone(),
            stop,
        };

        let handle = thread::Builder::new()
            .name(format!("audiobook-{kind}"))
            .spawn(move || {
                ctx.emit(SessionEvent::Started { kind, chunks, estimated });
                tracing::info!(job = %kind, chunks, "job started");

                let outcome = match job(&ctx) {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::error!(job = %kind, error = %format!("{e:#}"), "job failed");
                        ctx.status(format!("Error: {e:#}"));
                        JobOutcome::Failed(format!("{e:#}"))
                    }
                };

                drop(guard);
                tracing::info!(job = %kind, ?outcome, "job finished");
                ctx.emit(SessionEvent::Finished { kind, outcome: outcome.clone() });
                outcome
            })
            // On spawn failure the closure, and with it the guard, is dropped.
            .map_err(SessionError::Spawn)?;

        Ok(JobHandle { kind, handle })
    }
}

fn ensure_dir(dir: &Path) -> Result<(), SessionError> {
    if dir.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(dir).map_err(|source| SessionError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;
    tracing::info!(dir = %dir.display(), "created output directory");
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Worker side
// ─────────────────────────────────────────────────────────────────────────────

struct JobContext {
    kind: JobKind,
    engine: Arc<dyn SpeechEngine>,
    events: Sender<SessionEvent>,
    stop: Arc<AtomicBool>,
}

impl JobContext {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn emit(&self, event: SessionEvent) {
        // The front-end may have dropped its receiver; the job still runs.
        let _ = self.events.send(event);
    }

    fn status(&self, message: impl Into<String>) {
        self.emit(SessionEvent::Status(message.into()));
    }

    fn progress(&self, index: usize, total: usize, verb: &str) {
        let percent = ((index + 1) * 100 / total.max(1)).min(100) as u8;
        tracing::debug!(job = %self.kind, chunk = index + 1, total, "chunk started");
        self.emit(SessionEvent::Progress {
            kind: self.kind,
            index,
            total,
            percent,
            message: format!("{verb} chunk {}/{}", index + 1, total),
        });
    }

    /// Sleep for `duration` unless stopped first. Returns `true` if stopped.
    fn pause(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.stopped() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(STOP_POLL.min(deadline - now));
        }
    }
}

fn play_job(ctx: &JobContext, chunks: &[String], voice: &VoiceSettings) -> Result<JobOutcome> {
    let total = chunks.len();
    for (i, chunk) in chunks.iter().enumerate() {
        if ctx.stopped() {
            return Ok(JobOutcome::Stopped);
        }
        ctx.progress(i, total, "Playing");
        ctx.engine
            .speak(&voice.effect.apply(chunk), voice)
            .with_context(|| format!("Speaking chunk {} failed", i + 1))?;

        if i + 1 < total && ctx.pause(PLAYBACK_GAP) {
            return Ok(JobOutcome::Stopped);
        }
    }

    if ctx.stopped() {
        return Ok(JobOutcome::Stopped);
    }
    ctx.status("Playback complete");
    Ok(JobOutcome::Completed)
}

fn convert_job(ctx: &JobContext, chunks: &[String], request: &ConversionRequest) -> Result<JobOutcome> {
    let ConversionRequest { voice, pacing, output, .. } = request;
    let pause = pacing.pause();
    let total = chunks.len();

    // Per-chunk WAV files live next to the output, like the final file.
    let scratch = if output.mode.saves() {
        Some(
            tempfile::Builder::new()
                .prefix(".audiobook-chunks-")
                .tempdir_in(&output.dir)
                .with_context(|| format!("Cannot create scratch directory in {}", output.dir.display()))?,
        )
    } else {
        None
    };

    let mut combined = AudioSegment::empty();
    for (i, chunk) in chunks.iter().enumerate() {
        if ctx.stopped() {
            return Ok(JobOutcome::Stopped);
        }
        ctx.progress(i, total, "Processing");

        let text = voice.effect.apply(chunk);
        let last = i + 1 == total;

        if output.mode.plays() {
            ctx.engine
                .speak(&text, voice)
                .with_context(|| format!("Speaking chunk {} failed", i + 1))?;
            if ctx.stopped() {
                return Ok(JobOutcome::Stopped);
            }
            if !last && ctx.pause(pause) {
                return Ok(JobOutcome::Stopped);
            }
        }

        if let Some(dir) = &scratch {
            let wav = dir.path().join(format!("chunk_{i}.wav"));
            ctx.engine.synthesize_to_file(&text, voice, &wav)?;
            // An interrupted synthesis leaves a truncated file behind.
            if ctx.stopped() {
                return Ok(JobOutcome::Stopped);
            }
            let segment = AudioSegment::from_wav_file(&wav)?;
            combined
                .append(&segment)
                .with_context(|| format!("Cannot join chunk {}", i + 1))?;
            if !last {
                combined.append_silence(pause);
            }
            if let Err(e) = std::fs::remove_file(&wav) {
                tracing::debug!(path = %wav.display(), error = %e, "could not remove chunk file");
            }
        }
    }

    if ctx.stopped() {
        return Ok(JobOutcome::Stopped);
    }

    if let Some(dir) = scratch {
        if combined.is_empty() {
            tracing::warn!("engine produced no audio; nothing exported");
        } else {
            let path = output.output_path();
            combined.export(&path, output.format, output.bitrate_kbps)?;
            ctx.emit(SessionEvent::Saved(path.clone()));
            ctx.status(format!("Successfully saved to {}", path.display()));
        }
        if let Err(e) = dir.close() {
            tracing::warn!(error = %e, "could not remove scratch directory");
        }
    }

    ctx.status("Conversion complete!");
    Ok(JobOutcome::Completed)
}
