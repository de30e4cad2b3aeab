// src/logging.rs
//
// Per-second session telemetry.
// - EventSink: trait fed by greedy playback and the fixed-action simulator
// - NoopSink:  discards all records
// - VecSink:   keeps records in memory (tests, summaries)
// - FileSink:  writes one JSON object per line (JSONL)

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PacerError, Result};
use crate::rl::observation::EpisodeState;
use crate::types::Action;

/// One simulated second as seen by a session consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub second: u64,
    pub action: Action,
    pub reward: f64,
    pub fatigue_score: f64,
    /// State after the action was applied.
    pub state: EpisodeState,
}

/// Abstract sink for per-second session records.
pub trait EventSink {
    fn log_step(&mut self, record: &SessionRecord);

    /// Called once after the last record of a session.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Sink that discards all records.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn log_step(&mut self, _record: &SessionRecord) {}
}

#[derive(Debug, Default, Clone)]
pub struct VecSink {
    pub records: Vec<SessionRecord>,
}

impl EventSink for VecSink {
    fn log_step(&mut self, record: &SessionRecord) {
        self.records.push(record.clone());
    }
}

/// JSONL file sink.
pub struct FileSink {
    path: String,
    writer: BufWriter<File>,
    failed: bool,
}

impl FileSink {
    /// Create a new sink writing to `path` (truncating).
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| PacerError::io(path, e))?;
        Ok(Self {
            path: path.display().to_string(),
            writer: BufWriter::new(file),
            failed: false,
        })
    }
}

impl EventSink for FileSink {
    fn log_step(&mut self, record: &SessionRecord) {
        if self.failed {
            return;
        }
        // A failing log write must not abort the session; report once and stop writing.
        let written = serde_json::to_writer(&mut self.writer, record)
            .map_err(std::io::Error::from)
            .and_then(|_| self.writer.write_all(b"\n"));
        if let Err(e) = written {
            tracing::warn!(path = %self.path, error = %e, "session log write failed; further records dropped");
            self.failed = true;
        }
    }

    fn finish(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| PacerError::io(self.path.clone(), e))
    }
}
