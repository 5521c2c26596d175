//! Append-only request log sink.
//!
//! Records one line per request in the fixed format
//! `{timestamp} - User: {username} - Path: {path}`, attributing anonymous
//! requests to `anonymous`. The sink is strictly best-effort: a file that
//! cannot be opened or a write that fails is reported through `tracing`
//! and otherwise ignored, because a logging fault must never fail a
//! request.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use crate::gate::RequestContext;

/// A process-wide append-only log of handled requests.
#[derive(Debug)]
pub struct RequestLog {
    sink: Option<Mutex<File>>,
}

impl RequestLog {
    /// Opens (creating if needed) the log file in append mode.
    ///
    /// On failure the log degrades to a no-op sink; the gateway keeps
    /// serving without it.
    pub fn open(path: &Path) -> Self {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Self {
                sink: Some(Mutex::new(file)),
            },
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to open request log, continuing without it"
                );
                Self { sink: None }
            }
        }
    }

    /// A sink that records nothing. Used by tests and by pipelines that
    /// do not want file logging.
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    /// Appends one line for the given request. Never fails.
    pub fn record(&self, ctx: &RequestContext) {
        let Some(sink) = &self.sink else {
            return;
        };

        let line = format!(
            "{} - User: {} - Path: {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.6f"),
            ctx.display_user(),
            ctx.path,
        );

        // A poisoned lock is recovered rather than propagated: the file
        // handle stays usable and a logging fault must never fail a request.
        let mut file = sink
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Err(e) = file.write_all(line.as_bytes()) {
            tracing::warn!(error = %e, "failed to append request log entry");
        }
    }
}
