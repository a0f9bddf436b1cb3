//! Destination sinks for streaming extraction.
//!
//! # Architecture
//!
//! - `sink.rs` - The [`Sink`] contract: sequential writes per relative path
//! - `fs_sink.rs` - Buffered filesystem sink rooted at a destination directory
//! - `memory.rs` - In-memory sink, for previews and tests
//! - `workspace.rs` - Staging directory with atomic commit
//! - `replace_dir.rs` - Directory swap primitive used by the workspace

pub use error::{Error, Result};
pub use fs_sink::FsSink;
pub use memory::MemorySink;
pub use replace_dir::{replace_dir, ReplaceDirOptions};
pub use sink::{validate_relative, Sink};
pub use workspace::Workspace;

mod error;
mod fs_sink;
mod memory;
mod replace_dir;
mod sink;
mod workspace;
