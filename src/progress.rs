//! Ingestion progress reporting.
//!
//! Progress is emitted on **stderr** so stdout stays parseable for scripts.
//! The default mode is human-readable lines when stderr is a TTY, silent
//! otherwise; `--progress json` emits one JSON object per event.

use std::io::Write;

/// A single progress event during an ingestion run.
#[derive(Clone, Debug)]
pub enum IngestEvent {
    /// The repository snapshot is being cloned or pulled.
    Syncing { repo: String },
    /// A file has been chunked; running totals so far.
    FileChunked { files: u64, chunks: u64 },
    /// A batch has been submitted to the vector index.
    BatchSubmitted { batches: u64, chunks: u64 },
}

/// Reports ingestion progress. Implementations write to stderr.
pub trait ProgressReporter {
    fn report(&self, event: IngestEvent);
}

/// Human-friendly lines: `index  12 files / 340 chunks`.
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: IngestEvent) {
        let line = match &event {
            IngestEvent::Syncing { repo } => format!("index {repo}  syncing...\n"),
            IngestEvent::FileChunked { files, chunks } => {
                format!("index  {files} files / {chunks} chunks\n")
            }
            IngestEvent::BatchSubmitted { batches, chunks } => {
                format!("index  batch {batches} submitted ({chunks} chunks total)\n")
            }
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: IngestEvent) {
        let object = match &event {
            IngestEvent::Syncing { repo } => serde_json::json!({
                "event": "progress",
                "phase": "syncing",
                "repo": repo,
            }),
            IngestEvent::FileChunked { files, chunks } => serde_json::json!({
                "event": "progress",
                "phase": "chunking",
                "files": files,
                "chunks": chunks,
            }),
            IngestEvent::BatchSubmitted { batches, chunks } => serde_json::json!({
                "event": "progress",
                "phase": "submitting",
                "batches": batches,
                "chunks": chunks,
            }),
        };
        if let Ok(line) = serde_json::to_string(&object) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{line}");
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: IngestEvent) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
