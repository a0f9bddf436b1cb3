use std::io::{self, Read, Seek};

use crate::entry::{ArchiveEntry, EntryHeader, EntryKind};
use crate::error::Error;
use crate::extract::EntrySource;
use crate::format::ArchiveFormat;
use crate::Result;

/// Entries of a zip archive, in central-directory order.
pub struct ZipSource<R: Read + Seek> {
    archive: zip::ZipArchive<R>,
    headers: Vec<EntryHeader>,
    index: usize,
}

impl<R: Read + Seek> ZipSource<R> {
    /// Open the archive and read its central directory. An unreadable
    /// directory fails here, before any entry is touched.
    pub fn new(reader: R) -> Result<Self> {
        let mut archive = zip::ZipArchive::new(reader).map_err(|e| Error::InvalidArchive {
            reason: e.to_string(),
        })?;

        let headers = (0..archive.len())
            .map(|index| {
                let file = archive
                    .by_index_raw(index)
                    .map_err(|e| Error::CorruptedArchive {
                        reason: format!("entry {index}: {e}"),
                    })?;
                let name = file.name().to_string();
                // A symlink's payload is its target; never write it as file content.
                let header = if file.is_symlink() {
                    EntryHeader::payloadless(name, EntryKind::Symlink)
                } else if file.is_dir() {
                    EntryHeader::directory(name)
                } else {
                    EntryHeader {
                        compressed_size: file.compressed_size(),
                        ..EntryHeader::file(name, file.size())
                    }
                };
                Ok(match file.unix_mode() {
                    Some(mode) => header.with_mode(mode),
                    None => header,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            archive,
            headers,
            index: 0,
        })
    }

    pub fn headers(&self) -> &[EntryHeader] {
        &self.headers
    }
}

impl<R: Read + Seek> EntrySource for ZipSource<R> {
    fn next_entry(&mut self) -> Option<Result<ArchiveEntry<'_>>> {
        let header = self.headers.get(self.index)?.clone();
        let index = self.index;
        self.index += 1;

        match self.archive.by_index(index) {
            Ok(file) => Some(Ok(ArchiveEntry::new(header, file))),
            // Unsupported method, encryption, bad local header: this entry only.
            Err(e) => Some(Err(Error::StreamFailure {
                path: header.name,
                source: io::Error::other(e),
            })),
        }
    }

    fn format(&self) -> Option<ArchiveFormat> {
        Some(ArchiveFormat::Zip)
    }

    fn total_size(&self) -> Option<u64> {
        Some(self.headers.iter().map(|h| h.size).sum())
    }
}
