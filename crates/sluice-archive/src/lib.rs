//! Memory-bounded streaming archive extraction.
//!
//! # Architecture
//!
//! - `format.rs` - Magic-byte format detection and tar decompressors
//! - `extract/` - Entry sources per format and the extraction [`Engine`]
//! - `pool.rs` - Size-classed [`BufferPool`]
//! - `memory.rs` - [`MemoryMonitor`] and the accounting ledger
//! - `backpressure.rs` - Adaptive high-water mark and pause policy
//! - `filter.rs` / `pattern.rs` - Entry selection rules and glob matching
//! - `sanitize.rs` - Path normalization (zip-slip prevention)
//! - `score.rs` - [`VerificationScorer`] for finished runs
//! - `config.rs` - figment-backed [`EngineConfig`]
//! - `workspace.rs` - Staged extraction with atomic commit

pub use backpressure::{BackpressureController, ThroughputWindow};
pub use config::EngineConfig;
pub use digest::HashStrategy;
pub use entry::{ArchiveEntry, EntryHeader, EntryKind, EntryOutcome, EntryRecord};
pub use error::{Aborted, Error, Result};
pub use events::{EventSender, ExtractionEvent};
pub use extract::{Engine, EngineBuilder, EntrySource, extract_from_reader};
pub use filter::{EntryFilter, FilterConfig, RejectReason, Verdict};
pub use format::{ArchiveFormat, TarCompress, detect_format};
pub use memory::{MemoryLedger, MemoryMonitor, MemorySource, MemorySourceKind, MemoryUsageSnapshot};
pub use options::{CancelToken, ExtractOptions, PermissionStrategy, Progress, Strategy};
pub use pool::{BufferClass, BufferHandle, BufferPool, PoolStats};
pub use report::{ExtractionResult, ExtractionStatus, ExtractionWarning};
pub use sanitize::{SanitizedPath, sanitize_entry_path};
pub use score::{ScoreWeights, VerificationReport, VerificationScorer};
pub use workspace::{WorkspaceExtraction, extract_to_workspace};

pub mod backpressure;
pub mod config;
pub mod digest;
pub mod entry;
mod error;
pub mod events;
pub mod extract;
pub mod filter;
pub mod format;
pub mod memory;
pub mod options;
mod pattern;
pub mod pool;
pub mod report;
mod sanitize;
pub mod score;
mod workspace;
