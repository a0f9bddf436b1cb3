use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::sink::validate_relative;
use crate::{Error, Result, Sink};

/// Keeps extracted entries in memory.
///
/// With [`write_behind`](MemorySink::write_behind) set, writes accumulate in a
/// pending buffer that only lands in the file on [`Sink::drain`] or once it
/// reaches the configured capacity, mimicking a slow store.
#[derive(Debug, Default)]
pub struct MemorySink {
    files: BTreeMap<PathBuf, Vec<u8>>,
    dirs: BTreeSet<PathBuf>,
    modes: BTreeMap<PathBuf, u32>,
    current: Option<(PathBuf, Vec<u8>)>,
    pending: Vec<u8>,
    write_behind: usize,
    drains: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_behind(mut self, capacity: usize) -> Self {
        self.write_behind = capacity;
        self
    }

    pub fn files(&self) -> &BTreeMap<PathBuf, Vec<u8>> {
        &self.files
    }

    pub fn file(&self, path: impl AsRef<Path>) -> Option<&[u8]> {
        self.files.get(path.as_ref()).map(Vec::as_slice)
    }

    pub fn dirs(&self) -> &BTreeSet<PathBuf> {
        &self.dirs
    }

    pub fn mode(&self, path: impl AsRef<Path>) -> Option<u32> {
        self.modes.get(path.as_ref()).copied()
    }

    /// Number of explicit drains that moved pending bytes.
    pub fn drains(&self) -> usize {
        self.drains
    }

    fn flush_pending(&mut self) {
        if let Some((_, data)) = self.current.as_mut() {
            data.append(&mut self.pending);
        }
    }
}

impl Sink for MemorySink {
    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path) || self.dirs.contains(path)
    }

    fn create_dir(&mut self, path: &Path) -> Result<()> {
        validate_relative(path)?;
        self.dirs.insert(path.to_path_buf());
        Ok(())
    }

    fn begin(&mut self, path: &Path, overwrite: bool) -> Result<()> {
        if let Some((open, _)) = &self.current {
            return Err(Error::AlreadyOpen { path: open.clone() });
        }
        validate_relative(path)?;
        if !overwrite && self.files.contains_key(path) {
            return Err(Error::AlreadyExists {
                path: path.to_path_buf(),
            });
        }
        self.current = Some((path.to_path_buf(), Vec::new()));
        Ok(())
    }

    fn write(&mut self, chunk: &[u8]) -> Result<()> {
        let Some((_, data)) = self.current.as_mut() else {
            return Err(Error::NotOpen);
        };
        if self.write_behind == 0 {
            data.extend_from_slice(chunk);
            return Ok(());
        }
        self.pending.extend_from_slice(chunk);
        if self.pending.len() >= self.write_behind {
            self.flush_pending();
        }
        Ok(())
    }

    fn buffered(&self) -> u64 {
        self.pending.len() as u64
    }

    fn drain(&mut self) -> Result<()> {
        if !self.pending.is_empty() {
            self.flush_pending();
            self.drains += 1;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<u64> {
        self.flush_pending();
        let (path, data) = self.current.take().ok_or(Error::NotOpen)?;
        let written = data.len() as u64;
        self.files.insert(path, data);
        Ok(written)
    }

    fn abort(&mut self) {
        self.pending.clear();
        self.current = None;
    }

    fn set_mode(&mut self, path: &Path, mode: u32) -> Result<()> {
        self.modes.insert(path.to_path_buf(), mode);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_finished_files() {
        let mut sink = MemorySink::new();
        sink.begin(Path::new("dir/a.txt"), true).unwrap();
        sink.write(b"abc").unwrap();
        assert_eq!(sink.finish().unwrap(), 3);
        assert_eq!(sink.file("dir/a.txt"), Some(&b"abc"[..]));
        assert!(sink.exists(Path::new("dir/a.txt")));
    }

    #[test]
    fn write_behind_holds_bytes_until_drain() {
        let mut sink = MemorySink::new().write_behind(1024);
        sink.begin(Path::new("f"), true).unwrap();
        sink.write(&[1u8; 100]).unwrap();
        assert_eq!(sink.buffered(), 100);
        sink.drain().unwrap();
        assert_eq!(sink.buffered(), 0);
        assert_eq!(sink.drains(), 1);
        assert_eq!(sink.finish().unwrap(), 100);
    }

    #[test]
    fn write_behind_flushes_at_capacity() {
        let mut sink = MemorySink::new().write_behind(64);
        sink.begin(Path::new("f"), true).unwrap();
        sink.write(&[1u8; 80]).unwrap();
        assert_eq!(sink.buffered(), 0);
        assert_eq!(sink.finish().unwrap(), 80);
    }

    #[test]
    fn abort_leaves_no_file() {
        let mut sink = MemorySink::new();
        sink.begin(Path::new("x"), true).unwrap();
        sink.write(b"partial").unwrap();
        sink.abort();
        assert!(sink.files().is_empty());
        assert!(matches!(sink.write(b"late"), Err(Error::NotOpen)));
    }

    #[test]
    fn overwrite_flag_is_honored() {
        let mut sink = MemorySink::new();
        sink.begin(Path::new("x"), true).unwrap();
        sink.finish().unwrap();
        assert!(matches!(
            sink.begin(Path::new("x"), false),
            Err(Error::AlreadyExists { .. })
        ));
        assert!(sink.begin(Path::new("x"), true).is_ok());
    }
}
