use std::path::{Component, Path};

use crate::{Error, Result};

/// A destination that accepts one entry at a time as a sequence of writes.
///
/// Paths are relative to the sink's root and already sanitized by the caller;
/// implementations still refuse anything that is not a plain relative path.
///
/// Call order per file: [`begin`](Sink::begin), any number of
/// [`write`](Sink::write), then exactly one of [`finish`](Sink::finish) or
/// [`abort`](Sink::abort).
pub trait Sink {
    /// Whether `path` already holds a file or directory.
    fn exists(&self, path: &Path) -> bool;

    /// Create `path` and any missing parents as directories.
    fn create_dir(&mut self, path: &Path) -> Result<()>;

    /// Open `path` for sequential writes.
    fn begin(&mut self, path: &Path, overwrite: bool) -> Result<()>;

    fn write(&mut self, chunk: &[u8]) -> Result<()>;

    /// Bytes accepted by [`write`](Sink::write) but not yet handed to the
    /// underlying store.
    fn buffered(&self) -> u64 {
        0
    }

    /// Push buffered bytes down to the store. Completion acts as the resume
    /// signal for a paused producer.
    fn drain(&mut self) -> Result<()> {
        Ok(())
    }

    /// Close the open file and return the number of bytes it received.
    fn finish(&mut self) -> Result<u64>;

    /// Discard the open file, removing whatever was written so far.
    fn abort(&mut self);

    /// Apply unix permission bits. Sinks without a notion of modes ignore this.
    fn set_mode(&mut self, _path: &Path, _mode: u32) -> Result<()> {
        Ok(())
    }
}

impl<S: Sink + ?Sized> Sink for &mut S {
    fn exists(&self, path: &Path) -> bool {
        (**self).exists(path)
    }

    fn create_dir(&mut self, path: &Path) -> Result<()> {
        (**self).create_dir(path)
    }

    fn begin(&mut self, path: &Path, overwrite: bool) -> Result<()> {
        (**self).begin(path, overwrite)
    }

    fn write(&mut self, chunk: &[u8]) -> Result<()> {
        (**self).write(chunk)
    }

    fn buffered(&self) -> u64 {
        (**self).buffered()
    }

    fn drain(&mut self) -> Result<()> {
        (**self).drain()
    }

    fn finish(&mut self) -> Result<u64> {
        (**self).finish()
    }

    fn abort(&mut self) {
        (**self).abort()
    }

    fn set_mode(&mut self, path: &Path, mode: u32) -> Result<()> {
        (**self).set_mode(path, mode)
    }
}

/// Reject any path that is empty, absolute, or carries `.`/`..` components.
pub fn validate_relative(path: &Path) -> Result<()> {
    let mut normal = 0usize;
    for component in path.components() {
        match component {
            Component::Normal(_) => normal += 1,
            _ => {
                return Err(Error::OutsideRoot {
                    path: path.to_path_buf(),
                });
            }
        }
    }
    if normal == 0 {
        return Err(Error::OutsideRoot {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}
