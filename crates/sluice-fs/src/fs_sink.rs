use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::sink::validate_relative;
use crate::{Error, Result, Sink};

/// Default write-behind capacity; matches the largest buffer class the
/// extractor hands out.
pub const DEFAULT_CAPACITY: usize = 1024 * 1024;

struct OpenFile {
    path: PathBuf,
    writer: BufWriter<File>,
    written: u64,
}

/// Writes entries as files beneath a root directory.
///
/// Bytes pass through a `BufWriter`; its fill level is what [`Sink::buffered`]
/// reports, so a producer can pause and [`Sink::drain`] before it grows further.
pub struct FsSink {
    root: PathBuf,
    capacity: usize,
    current: Option<OpenFile>,
}

impl FsSink {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.exists() {
            fs::create_dir_all(&root).map_err(|e| Error::CreateDir {
                path: root.clone(),
                source: e,
            })?;
        }
        Ok(Self {
            root,
            capacity: DEFAULT_CAPACITY,
            current: None,
        })
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn target(&self, path: &Path) -> Result<PathBuf> {
        validate_relative(path)?;
        Ok(self.root.join(path))
    }
}

impl Sink for FsSink {
    fn exists(&self, path: &Path) -> bool {
        self.root.join(path).exists()
    }

    fn create_dir(&mut self, path: &Path) -> Result<()> {
        let target = self.target(path)?;
        fs::create_dir_all(&target).map_err(|e| Error::CreateDir {
            path: target,
            source: e,
        })
    }

    fn begin(&mut self, path: &Path, overwrite: bool) -> Result<()> {
        if let Some(open) = &self.current {
            return Err(Error::AlreadyOpen {
                path: open.path.clone(),
            });
        }
        let target = self.target(path)?;
        if !overwrite && target.exists() {
            return Err(Error::AlreadyExists { path: target });
        }
        if let Some(parent) = target.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| Error::CreateDir {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }
        let file = File::create(&target).map_err(|e| Error::Write {
            path: target.clone(),
            source: e,
        })?;
        self.current = Some(OpenFile {
            path: target,
            writer: BufWriter::with_capacity(self.capacity, file),
            written: 0,
        });
        Ok(())
    }

    fn write(&mut self, chunk: &[u8]) -> Result<()> {
        let open = self.current.as_mut().ok_or(Error::NotOpen)?;
        open.writer.write_all(chunk).map_err(|e| Error::Write {
            path: open.path.clone(),
            source: e,
        })?;
        open.written += chunk.len() as u64;
        Ok(())
    }

    fn buffered(&self) -> u64 {
        self.current
            .as_ref()
            .map_or(0, |open| open.writer.buffer().len() as u64)
    }

    fn drain(&mut self) -> Result<()> {
        match self.current.as_mut() {
            Some(open) => open.writer.flush().map_err(|e| Error::Write {
                path: open.path.clone(),
                source: e,
            }),
            None => Ok(()),
        }
    }

    fn finish(&mut self) -> Result<u64> {
        let OpenFile {
            path,
            writer,
            written,
        } = self.current.take().ok_or(Error::NotOpen)?;
        if let Err(e) = writer.into_inner() {
            let (source, writer) = e.into_parts();
            drop(writer.into_parts());
            let _ = fs::remove_file(&path);
            debug!(
                path = %path.display(),
                error = %source,
                "final flush failed, partial file removed"
            );
            return Err(Error::Write { path, source });
        }
        debug!(path = %path.display(), bytes = written, "file written");
        Ok(written)
    }

    fn abort(&mut self) {
        if let Some(open) = self.current.take() {
            // Discard the write-behind buffer instead of flushing it on drop.
            let (file, _unflushed) = open.writer.into_parts();
            drop(file);
            let _ = fs::remove_file(&open.path);
            debug!(path = %open.path.display(), "partial file removed");
        }
    }

    #[cfg(unix)]
    fn set_mode(&mut self, path: &Path, mode: u32) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let target = self.target(path)?;
        fs::set_permissions(&target, fs::Permissions::from_mode(mode)).map_err(|e| {
            Error::Permissions {
                path: target,
                source: e,
            }
        })
    }
}

impl Drop for FsSink {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_file_under_root() {
        let dir = tempdir().unwrap();
        let mut sink = FsSink::new(dir.path()).unwrap();
        sink.begin(Path::new("a/b.txt"), true).unwrap();
        sink.write(b"hello ").unwrap();
        sink.write(b"world").unwrap();
        assert_eq!(sink.finish().unwrap(), 11);
        assert_eq!(fs::read(dir.path().join("a/b.txt")).unwrap(), b"hello world");
    }

    #[test]
    fn buffered_tracks_write_behind() {
        let dir = tempdir().unwrap();
        let mut sink = FsSink::new(dir.path()).unwrap().capacity(1024);
        sink.begin(Path::new("f"), true).unwrap();
        sink.write(&[0u8; 100]).unwrap();
        assert_eq!(sink.buffered(), 100);
        sink.drain().unwrap();
        assert_eq!(sink.buffered(), 0);
        sink.finish().unwrap();
    }

    #[test]
    fn abort_removes_partial_file() {
        let dir = tempdir().unwrap();
        let mut sink = FsSink::new(dir.path()).unwrap();
        sink.begin(Path::new("partial.bin"), true).unwrap();
        sink.write(b"half").unwrap();
        sink.abort();
        assert!(!dir.path().join("partial.bin").exists());
    }

    #[test]
    fn refuses_overwrite_when_disabled() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("keep.txt"), "original").unwrap();
        let mut sink = FsSink::new(dir.path()).unwrap();
        let result = sink.begin(Path::new("keep.txt"), false);
        assert!(matches!(result, Err(Error::AlreadyExists { .. })));
        assert_eq!(fs::read_to_string(dir.path().join("keep.txt")).unwrap(), "original");
    }

    #[test]
    fn rejects_parent_components() {
        let dir = tempdir().unwrap();
        let mut sink = FsSink::new(dir.path().join("root")).unwrap();
        let result = sink.begin(Path::new("../escape.txt"), true);
        assert!(matches!(result, Err(Error::OutsideRoot { .. })));
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[test]
    fn second_begin_without_finish_fails() {
        let dir = tempdir().unwrap();
        let mut sink = FsSink::new(dir.path()).unwrap();
        sink.begin(Path::new("one"), true).unwrap();
        assert!(matches!(
            sink.begin(Path::new("two"), true),
            Err(Error::AlreadyOpen { .. })
        ));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn failed_final_flush_removes_the_file() {
        if !Path::new("/dev/full").exists() {
            return;
        }
        let dir = tempdir().unwrap();
        // Every write to /dev/full fails with ENOSPC.
        std::os::unix::fs::symlink("/dev/full", dir.path().join("full.bin")).unwrap();
        let mut sink = FsSink::new(dir.path()).unwrap();
        sink.begin(Path::new("full.bin"), true).unwrap();
        sink.write(b"never lands").unwrap();

        assert!(matches!(sink.finish(), Err(Error::Write { .. })));
        assert!(fs::symlink_metadata(dir.path().join("full.bin")).is_err());
        assert!(matches!(sink.finish(), Err(Error::NotOpen)));
    }

    #[cfg(unix)]
    #[test]
    fn set_mode_applies_bits() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let mut sink = FsSink::new(dir.path()).unwrap();
        sink.begin(Path::new("tool"), true).unwrap();
        sink.finish().unwrap();
        sink.set_mode(Path::new("tool"), 0o755).unwrap();
        let mode = fs::metadata(dir.path().join("tool")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
