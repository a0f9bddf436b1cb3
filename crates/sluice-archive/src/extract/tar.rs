use std::io::Read;

use tracing::debug;

use crate::entry::{ArchiveEntry, EntryHeader, EntryKind};
use crate::error::Error;
use crate::extract::EntrySource;
use crate::format::{ArchiveFormat, TarCompress};
use crate::Result;

/// Owns the tar stream; [`entries`](TarArchive::entries) borrows it for one pass.
pub struct TarArchive<R: Read> {
    archive: tar::Archive<R>,
    compress: TarCompress,
}

impl<R: Read> TarArchive<R> {
    /// `reader` must already be decompressed; `compress` is only reported.
    pub fn new(reader: R, compress: TarCompress) -> Self {
        Self {
            archive: tar::Archive::new(reader),
            compress,
        }
    }

    pub fn entries(&mut self) -> Result<TarSource<'_, R>> {
        let entries = self.archive.entries().map_err(|e| Error::InvalidArchive {
            reason: e.to_string(),
        })?;
        Ok(TarSource {
            entries,
            compress: self.compress,
        })
    }
}

pub struct TarSource<'a, R: 'a + Read> {
    entries: tar::Entries<'a, R>,
    compress: TarCompress,
}

impl<'a, R: Read + 'a> EntrySource for TarSource<'a, R> {
    fn next_entry(&mut self) -> Option<Result<ArchiveEntry<'_>>> {
        loop {
            let entry = match self.entries.next()? {
                Ok(entry) => entry,
                // A tar stream has no index to resync from.
                Err(e) => {
                    return Some(Err(Error::CorruptedArchive {
                        reason: e.to_string(),
                    }));
                }
            };

            let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
            let tar_header = entry.header();
            let entry_type = tar_header.entry_type();
            let mode = tar_header.mode().ok();

            let header = if entry_type.is_dir() {
                EntryHeader::directory(name)
            } else if entry_type.is_file() || entry_type.is_contiguous() {
                EntryHeader::file(name, entry.size())
            } else if entry_type.is_symlink() {
                EntryHeader::payloadless(name, EntryKind::Symlink)
            } else if entry_type.is_pax_global_extensions() {
                // Archive-wide metadata, not an entry.
                debug!(kind = ?entry_type, "skipping tar metadata record");
                continue;
            } else {
                EntryHeader::payloadless(name, EntryKind::Other)
            };
            let header = match mode {
                Some(mode) => header.with_mode(mode),
                None => header,
            };

            return Some(Ok(ArchiveEntry::new(header, entry)));
        }
    }

    fn format(&self) -> Option<ArchiveFormat> {
        Some(ArchiveFormat::Tar(self.compress))
    }
}
