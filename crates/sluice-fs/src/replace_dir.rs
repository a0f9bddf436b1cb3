use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::{Error, Result};

#[derive(Clone, Copy, Debug)]
pub struct ReplaceDirOptions {
    pub retry_count: u32,
    pub retry_delay: Duration,
}

impl Default for ReplaceDirOptions {
    fn default() -> Self {
        Self {
            retry_count: 5,
            retry_delay: Duration::from_millis(100),
        }
    }
}

impl ReplaceDirOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retry_count(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

/// Move `src` into place at `dest`, removing whatever `dest` held before.
///
/// Both paths must live on the same filesystem. The old `dest` is renamed
/// aside first and restored if the swap fails, so it is never lost. Transient
/// failures (a virus scanner holding a handle on Windows) are retried with
/// linear backoff.
pub fn replace_dir(
    src: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    options: ReplaceDirOptions,
) -> Result<()> {
    let src = src.as_ref();
    let dest = dest.as_ref();
    let mut attempts = 0;

    loop {
        match swap(src, dest) {
            Ok(()) => return Ok(()),
            Err(e) => {
                attempts += 1;
                if attempts >= options.retry_count.max(1) {
                    return Err(Error::ReplaceDir {
                        path: dest.to_path_buf(),
                        source: e,
                    });
                }
                thread::sleep(options.retry_delay * attempts);
            }
        }
    }
}

fn swap(src: &Path, dest: &Path) -> io::Result<()> {
    if !dest.exists() {
        return fs::rename(src, dest);
    }

    let aside = aside_path(dest)?;
    if aside.exists() {
        fs::remove_dir_all(&aside)?;
    }
    fs::rename(dest, &aside)?;

    if let Err(e) = fs::rename(src, dest) {
        if let Err(restore) = fs::rename(&aside, dest) {
            warn!(
                previous = %aside.display(),
                error = %restore,
                "could not restore the replaced directory"
            );
        }
        return Err(e);
    }
    if let Err(e) = fs::remove_dir_all(&aside) {
        warn!(path = %aside.display(), error = %e, "replaced directory left behind");
    }
    Ok(())
}

/// A hidden sibling of `dest` to park the old tree in.
fn aside_path(dest: &Path) -> io::Result<PathBuf> {
    let name = dest.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "destination has no file name")
    })?;
    let mut aside = OsString::from(".");
    aside.push(name);
    aside.push(format!(".replaced-{}", std::process::id()));
    Ok(dest.with_file_name(aside))
}
