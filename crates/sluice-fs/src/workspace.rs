use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{Error, FsSink, ReplaceDirOptions, Result};

/// A staging directory whose contents replace `destination` on commit.
///
/// Dropping an uncommitted workspace removes the staging directory, so a
/// failed extraction never leaves half a tree at the destination.
pub struct Workspace {
    /// `None` once the tree has moved or been discarded.
    staging: Option<PathBuf>,
    destination: PathBuf,
    replace: ReplaceDirOptions,
}

impl Workspace {
    pub fn new(staging_dir: impl AsRef<Path>, destination: impl AsRef<Path>) -> Result<Self> {
        let staging = staging_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&staging).map_err(|e| Error::CreateDir {
            path: staging.clone(),
            source: e,
        })?;

        Ok(Self {
            staging: Some(staging),
            destination: destination.as_ref().to_path_buf(),
            replace: ReplaceDirOptions::default(),
        })
    }

    pub fn replace_options(mut self, options: ReplaceDirOptions) -> Self {
        self.replace = options;
        self
    }

    pub fn path(&self) -> &Path {
        self.staging.as_deref().unwrap_or(&self.destination)
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// A sink writing into the staging directory.
    pub fn sink(&self) -> Result<FsSink> {
        FsSink::new(self.path())
    }

    /// Swap the staged tree into place, returning where it now lives.
    pub fn commit(mut self) -> Result<PathBuf> {
        if let Some(staging) = self.staging.take() {
            if let Err(e) = crate::replace_dir(&staging, &self.destination, self.replace) {
                self.staging = Some(staging);
                return Err(e);
            }
            debug!(destination = %self.destination.display(), "workspace committed");
        }
        Ok(std::mem::take(&mut self.destination))
    }

    /// Remove the staged tree now rather than on drop.
    pub fn discard(mut self) -> Result<()> {
        match self.staging.take() {
            Some(staging) => std::fs::remove_dir_all(&staging).map_err(|e| Error::Write {
                path: staging,
                source: e,
            }),
            None => Ok(()),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Some(staging) = self.staging.take()
            && let Err(e) = std::fs::remove_dir_all(&staging)
        {
            warn!(path = %staging.display(), error = %e, "failed to clean staging directory");
        }
    }
}
