use std::time::Duration;

use serde::Serialize;

use crate::entry::EntryRecord;
use crate::format::ArchiveFormat;

/// How a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    #[default]
    Completed,
    Cancelled,
    TimedOut,
    /// Stopped by a fatal error other than cancellation or timeout.
    Aborted,
}

/// A non-fatal problem recorded against the run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExtractionWarning {
    pub entry: Option<String>,
    pub message: String,
}

impl ExtractionWarning {
    pub fn for_entry(entry: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            entry: Some(entry.into()),
            message: message.into(),
        }
    }
}

/// Outcome of one extraction run, complete or partial.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ExtractionResult {
    pub status: ExtractionStatus,
    pub format: Option<ArchiveFormat>,
    pub extracted_count: usize,
    pub skipped_count: usize,
    pub total_bytes_written: u64,
    pub entries: Vec<EntryRecord>,
    pub warnings: Vec<ExtractionWarning>,
    pub elapsed: Duration,
    /// Highest accounted memory use seen during the run, in bytes.
    pub peak_memory: u64,
    pub pause_count: u64,
    pub total_pause: Duration,
}

impl ExtractionResult {
    pub fn is_complete(&self) -> bool {
        self.status == ExtractionStatus::Completed
    }

    /// Entries skipped because something went wrong rather than by policy.
    pub fn skipped_due_to_error(&self) -> usize {
        self.entries.iter().filter(|e| e.is_error()).count()
    }

    pub fn extracted(&self) -> impl Iterator<Item = &EntryRecord> {
        self.entries.iter().filter(|e| e.is_extracted())
    }

    pub fn entry(&self, name: &str) -> Option<&EntryRecord> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub(crate) fn push(&mut self, record: EntryRecord) {
        if record.is_extracted() {
            self.extracted_count += 1;
            self.total_bytes_written += record.bytes_written;
        } else {
            self.skipped_count += 1;
        }
        self.entries.push(record);
    }

    pub(crate) fn warn(&mut self, warning: ExtractionWarning) {
        self.warnings.push(warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{EntryHeader, EntryOutcome};
    use crate::filter::RejectReason;

    #[test]
    fn counters_follow_records() {
        let mut result = ExtractionResult::default();
        let mut ok = EntryRecord::new(&EntryHeader::file("a", 3), EntryOutcome::Extracted);
        ok.bytes_written = 3;
        result.push(ok);
        result.push(EntryRecord::new(
            &EntryHeader::file("b", 3),
            EntryOutcome::Filtered(RejectReason::NotIncluded),
        ));
        result.push(EntryRecord::new(
            &EntryHeader::file("c", 3),
            EntryOutcome::Failed("crc mismatch".into()),
        ));

        assert_eq!(result.extracted_count, 1);
        assert_eq!(result.skipped_count, 2);
        assert_eq!(result.total_bytes_written, 3);
        assert_eq!(result.skipped_due_to_error(), 1);
        assert_eq!(result.extracted().count(), 1);
        assert!(result.entry("c").is_some());
        assert!(result.is_complete());
    }

    #[test]
    fn serializes_to_json() {
        let mut result = ExtractionResult::default();
        result.warn(ExtractionWarning::for_entry("big.bin", "too large"));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["warnings"][0]["entry"], "big.bin");
    }
}
