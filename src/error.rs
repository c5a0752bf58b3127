use std::{io, path::PathBuf};

use thiserror::Error;

use crate::{audio::ExportFormat, session::JobKind};

/// Reasons a [`Session`](crate::Session) action is refused before any work starts.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Please enter some text to {0}.")]
    EmptyText(JobKind),

    #[error("Cannot start: a {0} job is already running")]
    Busy(JobKind),

    #[error("Cannot create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0} export is not available in this build")]
    FormatUnavailable(ExportFormat),

    #[error("Engine error: {0:#}")]
    Engine(#[from] anyhow::Error),

    #[error("Failed to start worker thread: {0}")]
    Spawn(#[source] io::Error),
}
