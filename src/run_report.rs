//! Run Report - what one batch run processed and what it skipped

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name of the run report inside the output directory
pub const RUN_REPORT_FILE_NAME: &str = "run_report.json";

/// Status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Images are still being processed.
    Running,
    /// Every image was measured.
    Success,
    /// Some images failed, at least one succeeded.
    PartialFailure,
    /// No image could be measured.
    Failed,
}

/// An image that made it into the corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedImage {
    /// Image file name
    pub image: String,
    /// 1-based position in the configured image list
    pub sample_index: u32,
    /// Particles measured
    pub particles: usize,
}

/// An image that was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedImage {
    /// Image file name
    pub image: String,
    /// 1-based position in the configured image list
    pub sample_index: u32,
    /// Error message
    pub cause: String,
}

/// Outcome of one batch run, serialized as `run_report.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunReport {
    run_id: String,
    status: RunStatus,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    processed: Vec<ProcessedImage>,
    failed: Vec<FailedImage>,
}

impl RunReport {
    /// Start a run now, in Running status.
    ///
    /// The run id is derived from the start time.
    #[must_use]
    pub fn start() -> Self {
        let started_at = Utc::now();
        Self {
            run_id: format!("run-{}", started_at.format("%Y%m%dT%H%M%S%.3fZ")),
            status: RunStatus::Running,
            started_at,
            ended_at: None,
            processed: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the current run status.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    /// Get the start timestamp.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Get the end timestamp, if the run has finished.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Images merged into the corpus.
    #[must_use]
    pub fn processed(&self) -> &[ProcessedImage] {
        &self.processed
    }

    /// Images that were skipped.
    #[must_use]
    pub fn failed(&self) -> &[FailedImage] {
        &self.failed
    }

    /// Record a successfully measured image.
    pub fn record_processed(&mut self, image: impl Into<String>, sample_index: u32, particles: usize) {
        self.processed.push(ProcessedImage {
            image: image.into(),
            sample_index,
            particles,
        });
    }

    /// Record a skipped image and its cause.
    pub fn record_failure(&mut self, image: impl Into<String>, sample_index: u32, cause: &Error) {
        self.failed.push(FailedImage {
            image: image.into(),
            sample_index,
            cause: cause.to_string(),
        });
    }

    /// Finish the run, deriving the final status from what was recorded.
    ///
    /// Sets the `ended_at` timestamp to now.
    pub fn finish(&mut self) {
        self.status = match (self.processed.is_empty(), self.failed.is_empty()) {
            (false, true) => RunStatus::Success,
            (false, false) => RunStatus::PartialFailure,
            (true, _) => RunStatus::Failed,
        };
        self.ended_at = Some(Utc::now());
    }

    /// Write the report as pretty-printed JSON, replacing any existing file.
    ///
    /// # Errors
    /// Returns `Error::Io` if the file cannot be written
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Other(format!("Failed to serialize run report: {e}")))?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Read a report written by [`write_json`](Self::write_json).
    ///
    /// # Errors
    /// Returns `Error::Io` if the file cannot be read or `Error::InvalidInput` if it does not parse
    pub fn read_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&text)
            .map_err(|e| Error::InvalidInput(format!("Malformed run report: {e}")))
    }
}
