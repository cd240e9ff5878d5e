//! Batch accumulation: keep going after an item fails
//!
//! A multi-item operation records each produced path and each failure line.
//! A single failing item never aborts the batch; the batch succeeds only when
//! no failure line was recorded.
//!
//! # Example
//!
//! ```
//! use gridlink_core_resilience::batch::{BatchReport, BatchStatus};
//!
//! let mut report = BatchReport::new();
//! report.record_success("/dest/a.txt");
//! report.record_failure("file /missing.txt does not exist.");
//! report.record_success("/dest/b.txt");
//!
//! assert_eq!(report.outputs(), ["/dest/a.txt", "/dest/b.txt"]);
//! assert_eq!(report.exit_message(), "file /missing.txt does not exist.\n");
//! assert!(matches!(report.status(), BatchStatus::PartialFailure(_)));
//! ```

use std::fmt;

/// Overall status of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStatus {
    /// No item failed
    Success,
    /// At least one item failed; carries the accumulated message
    PartialFailure(String),
}

/// Ordered outputs plus accumulated failure text for one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    outputs: Vec<String>,
    message: String,
    failures: usize,
}

impl BatchReport {
    /// Create an empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a path produced by a successful item
    pub fn record_success(&mut self, output: impl Into<String>) {
        self.outputs.push(output.into());
    }

    /// Record one failure line. A trailing newline is added if missing.
    pub fn record_failure(&mut self, line: impl AsRef<str>) {
        let line = line.as_ref();
        self.message.push_str(line);
        if !line.ends_with('\n') {
            self.message.push('\n');
        }
        self.failures += 1;
    }

    /// Fold another report into this one, keeping order
    pub fn merge(&mut self, other: BatchReport) {
        self.outputs.extend(other.outputs);
        self.message.push_str(&other.message);
        self.failures += other.failures;
    }

    /// Paths produced so far, in input order
    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Accumulated failure text; empty on success
    pub fn exit_message(&self) -> &str {
        &self.message
    }

    /// Number of failure lines recorded
    pub fn failure_count(&self) -> usize {
        self.failures
    }

    /// True if nothing failed
    pub fn is_success(&self) -> bool {
        self.message.is_empty()
    }

    /// Batch status derived from the accumulated message
    pub fn status(&self) -> BatchStatus {
        if self.is_success() {
            BatchStatus::Success
        } else {
            BatchStatus::PartialFailure(self.message.clone())
        }
    }

    /// Split into outputs and message
    pub fn into_parts(self) -> (Vec<String>, String) {
        (self.outputs, self.message)
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for output in &self.outputs {
            writeln!(f, "{}", output)?;
        }
        write!(f, "{}", self.message)
    }
}
