use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::entry::{EntryHeader, EntryKind};
use crate::error::Result;
use crate::pattern::GlobSet;
use crate::sanitize::normalize;

pub type EntryPredicate = Arc<dyn Fn(&EntryHeader) -> bool + Send + Sync>;

/// Declarative inclusion policy, as supplied by the caller.
///
/// Compile it into an [`EntryFilter`] with [`EntryFilter::new`]; pattern
/// errors surface there, before any entry is read.
#[derive(Clone, Default)]
pub struct FilterConfig {
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub allowed_content_types: Vec<String>,
    pub allowed_extensions: Vec<String>,
    pub custom_predicate: Option<EntryPredicate>,
}

impl fmt::Debug for FilterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterConfig")
            .field("include_patterns", &self.include_patterns)
            .field("exclude_patterns", &self.exclude_patterns)
            .field("min_size", &self.min_size)
            .field("max_size", &self.max_size)
            .field("allowed_content_types", &self.allowed_content_types)
            .field("allowed_extensions", &self.allowed_extensions)
            .field("custom_predicate", &self.custom_predicate.is_some())
            .finish()
    }
}

/// Which rule turned an entry away.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum RejectReason {
    Unsafe(&'static str),
    Excluded { pattern: String },
    NotIncluded,
    TooSmall { size: u64, min: u64 },
    TooLarge { size: u64, max: u64 },
    Extension,
    ContentType { content_type: &'static str },
    Predicate,
    /// `strip_components` consumed the whole path.
    Stripped,
    /// Links and special files are never materialized.
    UnsupportedKind(EntryKind),
}

impl RejectReason {
    pub fn is_security(&self) -> bool {
        matches!(self, Self::Unsafe(_))
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsafe(reason) => write!(f, "unsafe path: {reason}"),
            Self::Excluded { pattern } => write!(f, "excluded by '{pattern}'"),
            Self::NotIncluded => f.write_str("matched no include pattern"),
            Self::TooSmall { size, min } => write!(f, "{size} bytes is below the minimum of {min}"),
            Self::TooLarge { size, max } => write!(f, "{size} bytes exceeds the maximum of {max}"),
            Self::Extension => f.write_str("extension not allowed"),
            Self::ContentType { content_type } => {
                write!(f, "content type {content_type} not allowed")
            }
            Self::Predicate => f.write_str("rejected by custom predicate"),
            Self::Stripped => f.write_str("no path components left after stripping"),
            Self::UnsupportedKind(kind) => write!(f, "{kind} entries are not extracted"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(RejectReason),
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// A compiled, immutable [`FilterConfig`].
#[derive(Clone)]
pub struct EntryFilter {
    include: GlobSet,
    exclude: GlobSet,
    min_size: u64,
    max_size: u64,
    extensions: Vec<String>,
    content_types: Vec<String>,
    predicate: Option<EntryPredicate>,
}

impl fmt::Debug for EntryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryFilter")
            .field("include", &self.include)
            .field("exclude", &self.exclude)
            .field("min_size", &self.min_size)
            .field("max_size", &self.max_size)
            .field("extensions", &self.extensions)
            .field("content_types", &self.content_types)
            .finish_non_exhaustive()
    }
}

impl Default for EntryFilter {
    fn default() -> Self {
        Self {
            include: GlobSet::default(),
            exclude: GlobSet::default(),
            min_size: 0,
            max_size: u64::MAX,
            extensions: Vec::new(),
            content_types: Vec::new(),
            predicate: None,
        }
    }
}

impl EntryFilter {
    pub fn new(config: &FilterConfig) -> Result<Self> {
        Ok(Self {
            include: GlobSet::new(&config.include_patterns)?,
            exclude: GlobSet::new(&config.exclude_patterns)?,
            min_size: config.min_size.unwrap_or(0),
            max_size: config.max_size.unwrap_or(u64::MAX),
            extensions: config
                .allowed_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            content_types: config
                .allowed_content_types
                .iter()
                .map(|t| t.to_ascii_lowercase())
                .collect(),
            predicate: config.custom_predicate.clone(),
        })
    }

    pub fn max_size(&self) -> Option<u64> {
        (self.max_size != u64::MAX).then_some(self.max_size)
    }

    /// Decide whether `entry` should be extracted.
    ///
    /// Rules run in a fixed order: path safety, exclude, include, size bounds,
    /// extension and content type, custom predicate. Exclusion wins over
    /// inclusion. Size and type rules only apply to regular files.
    pub fn evaluate(&self, entry: &EntryHeader) -> Verdict {
        let segments = match normalize(&entry.name) {
            Ok(segments) => segments,
            Err(reason) => return Verdict::Reject(RejectReason::Unsafe(reason)),
        };
        let path = segments.join("/");

        if let Some(glob) = self.exclude.first_match(&path) {
            return Verdict::Reject(RejectReason::Excluded {
                pattern: glob.as_str().to_string(),
            });
        }
        if !self.include.is_empty() && !self.include.is_match(&path) {
            return Verdict::Reject(RejectReason::NotIncluded);
        }

        if entry.kind == EntryKind::File {
            if entry.size < self.min_size {
                return Verdict::Reject(RejectReason::TooSmall {
                    size: entry.size,
                    min: self.min_size,
                });
            }
            if entry.size > self.max_size {
                return Verdict::Reject(RejectReason::TooLarge {
                    size: entry.size,
                    max: self.max_size,
                });
            }

            let extension = extension_of(&path);
            if !self.extensions.is_empty() {
                let allowed = extension
                    .as_deref()
                    .is_some_and(|ext| self.extensions.iter().any(|e| e == ext));
                if !allowed {
                    return Verdict::Reject(RejectReason::Extension);
                }
            }
            if !self.content_types.is_empty() {
                let content_type = content_type_for(extension.as_deref());
                if !self
                    .content_types
                    .iter()
                    .any(|allowed| content_type_matches(allowed, content_type))
                {
                    return Verdict::Reject(RejectReason::ContentType { content_type });
                }
            }
        }

        if let Some(predicate) = &self.predicate {
            if !predicate(entry) {
                return Verdict::Reject(RejectReason::Predicate);
            }
        }

        Verdict::Accept
    }
}

fn extension_of(path: &str) -> Option<String> {
    let name = path.rsplit('/').next()?;
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn content_type_matches(allowed: &str, actual: &str) -> bool {
    match allowed.strip_suffix("/*") {
        Some(major) => actual.split('/').next() == Some(major),
        None => allowed == actual,
    }
}

/// Content type for a lowercase extension; `application/octet-stream` when
/// unknown.
pub fn content_type_for(extension: Option<&str>) -> &'static str {
    match extension.unwrap_or_default() {
        "txt" | "log" | "text" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "xml" => "application/xml",
        "js" | "mjs" | "cjs" => "text/javascript",
        "ts" | "tsx" => "application/typescript",
        "json" => "application/json",
        "toml" => "application/toml",
        "yaml" | "yml" => "application/yaml",
        "rs" => "text/x-rust",
        "py" => "text/x-python",
        "sh" => "application/x-sh",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "pdf" => "application/pdf",
        "wasm" => "application/wasm",
        "zip" => "application/zip",
        "gz" | "tgz" => "application/gzip",
        "tar" => "application/x-tar",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}
