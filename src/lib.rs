//! # audiobook
//!
//! Turn plain text into speech and audiobook files through a pluggable
//! speech engine.
//!
//! ## Quick start
//!
//! ```no_run
//! use audiobook::{create_engine, ConversionRequest, EngineKind, Session, SessionEvent};
//!
//! let engine = create_engine(EngineKind::Espeak, None).unwrap();
//! let (session, events) = Session::new(engine);
//!
//! let job = session
//!     .convert("Chapter one.\n\nIt was a dark night.", ConversionRequest::default())
//!     .unwrap();
//! for event in events.iter() {
//!     if let SessionEvent::Progress { message, .. } = &event {
//!         println!("{message}");
//!     }
//!     if matches!(event, SessionEvent::Finished { .. }) {
//!         break;
//!     }
//! }
//! job.join();
//! ```
//!
//! ## Pipeline
//! 1. **Chunking**: the text is split on blank lines; long paragraphs are
//!    re-packed by sentence into ≤ 500-char chunks ([`chunk`]).
//! 2. **Effect**: an optional textual voice effect is applied per chunk ([`effect`]).
//! 3. **Speech**: each chunk is spoken and/or rendered to WAV by a
//!    [`SpeechEngine`] (`espeak-ng` subprocess, or silence for dry runs).
//! 4. **Assembly**: rendered chunks are concatenated with a configurable
//!    pause between them and exported as WAV or MP3 ([`audio`]).
//!
//! Steps 2 to 4 run on a background worker owned by a [`Session`], which
//! reports progress over a channel and can be stopped at any time.
//!
//! ## Build requirements
//! | Feature   | Requirement                                                |
//! |-----------|------------------------------------------------------------|
//! | (default) | `espeak-ng` or `espeak` on `PATH` at runtime               |
//! | `mp3`     | a C compiler for the bundled LAME sources                  |

pub mod audio;
pub mod chunk;
pub mod config;
pub mod effect;
pub mod engine;
pub mod error;
pub mod session;
pub mod settings;

// ─── Re-exports for convenience ─────────────────────────────────────────────

pub use audio::{AudioSegment, ExportFormat};
pub use chunk::{chunk_text, ChunkStrategy};
pub use config::{AppConfig, ConfigError};
pub use effect::VoiceEffect;
pub use engine::{create_engine, EngineKind, SpeechEngine, VoiceInfo};
pub use error::SessionError;
pub use session::{ConversionRequest, JobHandle, JobKind, JobOutcome, Session, SessionEvent};
pub use settings::{OutputMode, OutputSettings, PacingSettings, VoiceSettings};
