use std::fmt;
use std::io::Read;
use std::path::PathBuf;

use serde::Serialize;

use crate::filter::RejectReason;

/// What an archive record materializes as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    /// Hard links, devices, FIFOs and anything else without a byte payload.
    Other,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::File => "file",
            Self::Directory => "directory",
            Self::Symlink => "symlink",
            Self::Other => "special file",
        })
    }
}

/// Metadata for one archive record, as declared by the archive.
///
/// `name` is untrusted: it has not been checked against the destination yet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EntryHeader {
    pub name: String,
    pub size: u64,
    pub compressed_size: u64,
    pub kind: EntryKind,
    pub mode: Option<u32>,
}

impl EntryHeader {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            compressed_size: size,
            kind: EntryKind::File,
            mode: None,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self::payloadless(name, EntryKind::Directory)
    }

    /// A link or special record. It carries no bytes worth extracting.
    pub fn payloadless(name: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            size: 0,
            compressed_size: 0,
            kind,
            mode: None,
        }
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// A record pulled from an archive, with its byte stream.
///
/// Consumed exactly once by the extractor.
pub struct ArchiveEntry<'a> {
    pub header: EntryHeader,
    pub reader: Box<dyn Read + 'a>,
}

impl<'a> ArchiveEntry<'a> {
    pub fn new(header: EntryHeader, reader: impl Read + 'a) -> Self {
        Self {
            header,
            reader: Box::new(reader),
        }
    }
}

impl fmt::Debug for ArchiveEntry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveEntry")
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

/// What happened to one entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum EntryOutcome {
    Extracted,
    /// Rejected by policy. Not an error.
    Filtered(RejectReason),
    /// The destination already held the path and overwriting was disabled.
    Kept,
    /// Skipped because reading or writing the entry failed.
    Failed(String),
}

#[derive(Clone, Debug, Serialize)]
pub struct EntryRecord {
    pub name: String,
    pub target_path: Option<PathBuf>,
    pub declared_size: u64,
    pub bytes_written: u64,
    pub is_directory: bool,
    pub digest: Option<String>,
    pub outcome: EntryOutcome,
}

impl EntryRecord {
    pub fn new(header: &EntryHeader, outcome: EntryOutcome) -> Self {
        Self {
            name: header.name.clone(),
            target_path: None,
            declared_size: header.size,
            bytes_written: 0,
            is_directory: header.is_directory(),
            digest: None,
            outcome,
        }
    }

    pub fn is_extracted(&self) -> bool {
        matches!(self.outcome, EntryOutcome::Extracted)
    }

    /// Skipped because something went wrong, as opposed to skipped by policy.
    pub fn is_error(&self) -> bool {
        match &self.outcome {
            EntryOutcome::Failed(_) => true,
            EntryOutcome::Filtered(reason) => reason.is_security(),
            _ => false,
        }
    }

    pub fn size_matches(&self) -> bool {
        self.bytes_written == self.declared_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_constructors() {
        let file = EntryHeader::file("bin/tool", 1024).with_mode(0o755);
        assert_eq!(file.size, 1024);
        assert_eq!(file.kind, EntryKind::File);
        assert!(!file.is_directory());

        let dir = EntryHeader::directory("bin/");
        assert!(dir.is_directory());
        assert_eq!(dir.size, 0);

        let link = EntryHeader::payloadless("bin/latest", EntryKind::Symlink);
        assert!(!link.is_directory());
        assert_eq!(link.size, 0);
        assert_eq!(link.kind.to_string(), "symlink");
    }

    #[test]
    fn entry_reader_yields_bytes() {
        let mut entry = ArchiveEntry::new(EntryHeader::file("a", 3), Cursor::new(b"abc".to_vec()));
        let mut out = Vec::new();
        entry.reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abc");
    }

    #[test]
    fn record_error_classification() {
        let header = EntryHeader::file("a", 3);
        assert!(EntryRecord::new(&header, EntryOutcome::Failed("crc".into())).is_error());
        assert!(
            !EntryRecord::new(&header, EntryOutcome::Filtered(RejectReason::NotIncluded))
                .is_error()
        );
        let link = EntryHeader::payloadless("l", EntryKind::Symlink);
        assert!(
            !EntryRecord::new(
                &link,
                EntryOutcome::Filtered(RejectReason::UnsupportedKind(EntryKind::Symlink))
            )
            .is_error()
        );
        assert!(
            EntryRecord::new(
                &header,
                EntryOutcome::Filtered(RejectReason::Unsafe("parent traversal"))
            )
            .is_error()
        );
        assert!(!EntryRecord::new(&header, EntryOutcome::Kept).is_error());
    }
}
