//! Fire-and-forget notifications for an extraction run.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::time::Duration;

use serde::Serialize;

use crate::format::ArchiveFormat;
use crate::memory::MemoryUsageSnapshot;
use crate::report::ExtractionStatus;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExtractionEvent {
    Started {
        format: Option<ArchiveFormat>,
        total_bytes: Option<u64>,
    },
    EntryStarted {
        name: String,
        size: u64,
    },
    EntryExtracted {
        name: String,
        bytes_written: u64,
    },
    EntrySkipped {
        name: String,
        reason: String,
    },
    Progress {
        bytes_processed: u64,
        percentage: Option<f32>,
    },
    Paused {
        buffered: u64,
        high_water_mark: u64,
        delay: Duration,
    },
    MemoryWarning {
        usage: MemoryUsageSnapshot,
        percentage: f64,
    },
    Finished {
        status: ExtractionStatus,
        extracted: usize,
        skipped: usize,
    },
}

/// Sending half of a bounded event channel.
///
/// Never blocks the extractor: when the listener falls behind or has gone
/// away, events are dropped and counted.
#[derive(Clone, Debug)]
pub struct EventSender {
    tx: SyncSender<ExtractionEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventSender {
    pub fn new(tx: SyncSender<ExtractionEvent>) -> Self {
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A bounded channel holding at most `bound` undelivered events.
    pub fn channel(bound: usize) -> (Self, Receiver<ExtractionEvent>) {
        let (tx, rx) = mpsc::sync_channel(bound);
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: ExtractionEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Events discarded so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
