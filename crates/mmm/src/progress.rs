//! Newline-delimited JSON progress stream.

use std::io::Write;

use mmm_schemas::{ProgressEvent, Stage};
use tracing::{info, warn};

/// Writes one [`ProgressEvent`] per line, flushing after each.
///
/// Reported percentages never decrease. A failed write is logged and
/// otherwise ignored; losing the progress stream must not fail a run.
pub(crate) struct ProgressReporter<W> {
    out: W,
    last: u8,
}

impl<W: Write> ProgressReporter<W> {
    pub(crate) fn new(out: W) -> Self {
        Self { out, last: 0 }
    }

    /// Announces that `stage` has been reached.
    pub(crate) fn stage(&mut self, stage: Stage) {
        self.emit(stage, None);
    }

    /// Announces `stage` with a short human-readable note.
    pub(crate) fn stage_with(&mut self, stage: Stage, message: impl Into<String>) {
        self.emit(stage, Some(message.into()));
    }

    /// Emits the terminal error event at the last reported percentage.
    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.emit(Stage::Error, Some(message.into()));
    }

    fn emit(&mut self, status: Stage, message: Option<String>) {
        let progress = status.progress().unwrap_or(self.last).max(self.last);
        self.last = progress;
        info!(stage = ?status, progress, "progress");

        let event = ProgressEvent {
            status,
            progress,
            message,
        };
        let written = serde_json::to_writer(&mut self.out, &event)
            .map_err(std::io::Error::from)
            .and_then(|()| writeln!(self.out))
            .and_then(|()| self.out.flush());
        if let Err(err) = written {
            warn!(error = %err, "progress.write_failed");
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}
