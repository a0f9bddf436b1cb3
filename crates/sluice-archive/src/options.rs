use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::digest::HashStrategy;
use crate::entry::{EntryHeader, EntryRecord};
use crate::events::EventSender;
use crate::filter::FilterConfig;

/// Entries (or archives) larger than this stream in chunks under `Auto`.
pub const DEFAULT_STREAMING_THRESHOLD: u64 = 8 * 1024 * 1024;

pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;
pub type EntryCallback = Arc<dyn Fn(&EntryRecord) + Send + Sync>;

/// How entry bytes travel from the archive to the sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Stage each entry whole in memory, then write it once.
    Standard,
    /// Copy in bounded chunks with backpressure.
    Streaming,
    /// Stream when the entry, or the whole archive, passes the threshold.
    #[default]
    Auto,
}

/// Cooperative cancellation flag shared with the caller.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Progress {
    pub bytes_processed: u64,
    pub total_bytes: Option<u64>,
    pub entries_processed: usize,
    pub current_file: Option<PathBuf>,
}

impl Progress {
    pub fn percentage(&self) -> Option<f32> {
        self.total_bytes.map(|total| {
            if total == 0 {
                100.0
            } else {
                ((self.bytes_processed as f64 / total as f64) * 100.0).min(100.0) as f32
            }
        })
    }
}

/// Permission application strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStrategy {
    /// Archive mode with owner read/write guaranteed; 0o644 when absent.
    #[default]
    Standard,
    ReadOnly,
    /// Archive mode as-is; untouched when absent.
    Preserve,
    /// Ignore the archive and use 0o644.
    Owned,
}

impl PermissionStrategy {
    /// The mode to apply to an extracted file, if any.
    pub fn resolve(self, mode: Option<u32>) -> Option<u32> {
        let mode = mode.map(|m| m & 0o7777);
        match self {
            Self::Standard => Some(match mode {
                Some(m) if m & 0o111 != 0 => m | 0o600,
                Some(m) => m | 0o644,
                None => 0o644,
            }),
            Self::ReadOnly => Some(0o444),
            Self::Preserve => mode,
            Self::Owned => Some(0o644),
        }
    }
}

/// Per-run extraction settings.
#[derive(Clone)]
pub struct ExtractOptions {
    pub filter: FilterConfig,
    pub strategy: Strategy,
    pub streaming_threshold: u64,
    pub high_water_mark_override: Option<u64>,
    pub overwrite_existing: bool,
    pub strip_components: usize,
    pub hash_strategy: HashStrategy,
    pub perm_strategy: PermissionStrategy,
    pub expected_total_bytes: Option<u64>,
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelToken>,
    pub events: Option<EventSender>,
    pub on_progress: Option<ProgressCallback>,
    pub on_entry_extracted: Option<EntryCallback>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            filter: FilterConfig::default(),
            strategy: Strategy::Auto,
            streaming_threshold: DEFAULT_STREAMING_THRESHOLD,
            high_water_mark_override: None,
            overwrite_existing: true,
            strip_components: 0,
            hash_strategy: HashStrategy::None,
            perm_strategy: PermissionStrategy::Standard,
            expected_total_bytes: None,
            timeout: None,
            cancel: None,
            events: None,
            on_progress: None,
            on_entry_extracted: None,
        }
    }
}

impl fmt::Debug for ExtractOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractOptions")
            .field("filter", &self.filter)
            .field("strategy", &self.strategy)
            .field("streaming_threshold", &self.streaming_threshold)
            .field("high_water_mark_override", &self.high_water_mark_override)
            .field("overwrite_existing", &self.overwrite_existing)
            .field("strip_components", &self.strip_components)
            .field("hash_strategy", &self.hash_strategy)
            .field("perm_strategy", &self.perm_strategy)
            .field("expected_total_bytes", &self.expected_total_bytes)
            .field("timeout", &self.timeout)
            .field("cancel", &self.cancel)
            .field("events", &self.events.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .field("on_entry_extracted", &self.on_entry_extracted.is_some())
            .finish()
    }
}

impl ExtractOptions {
    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.filter.include_patterns.push(pattern.into());
        self
    }

    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.filter.exclude_patterns.push(pattern.into());
        self
    }

    pub fn min_size(mut self, bytes: u64) -> Self {
        self.filter.min_size = Some(bytes);
        self
    }

    pub fn max_size(mut self, bytes: u64) -> Self {
        self.filter.max_size = Some(bytes);
        self
    }

    pub fn allowed_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter.allowed_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn allowed_content_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter.allowed_content_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn custom_predicate(
        mut self,
        predicate: impl Fn(&EntryHeader) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.filter.custom_predicate = Some(Arc::new(predicate));
        self
    }

    pub fn filter(mut self, filter: FilterConfig) -> Self {
        self.filter = filter;
        self
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// `true` forces chunked streaming, `false` forces whole-entry staging.
    pub fn use_streaming(self, streaming: bool) -> Self {
        self.strategy(if streaming {
            Strategy::Streaming
        } else {
            Strategy::Standard
        })
    }

    pub fn streaming_threshold(mut self, bytes: u64) -> Self {
        self.streaming_threshold = bytes;
        self
    }

    pub fn high_water_mark_override(mut self, bytes: u64) -> Self {
        self.high_water_mark_override = Some(bytes);
        self
    }

    pub fn overwrite_existing(mut self, overwrite: bool) -> Self {
        self.overwrite_existing = overwrite;
        self
    }

    pub fn strip_components(mut self, n: usize) -> Self {
        self.strip_components = n;
        self
    }

    pub fn hash_strategy(mut self, strategy: HashStrategy) -> Self {
        self.hash_strategy = strategy;
        self
    }

    pub fn permission_strategy(mut self, strategy: PermissionStrategy) -> Self {
        self.perm_strategy = strategy;
        self
    }

    pub fn expected_total_bytes(mut self, bytes: u64) -> Self {
        self.expected_total_bytes = Some(bytes);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn events(mut self, sender: EventSender) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn on_progress(mut self, callback: impl Fn(Progress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub fn on_entry_extracted(
        mut self,
        callback: impl Fn(&EntryRecord) + Send + Sync + 'static,
    ) -> Self {
        self.on_entry_extracted = Some(Arc::new(callback));
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}
