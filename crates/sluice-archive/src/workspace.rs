//! All-or-nothing extraction into a directory.

use std::io::{Read, Seek};
use std::path::Path;

use sluice_fs::Workspace;
use tempfile::TempDir;
use tracing::info;

use crate::error::{Aborted, Error, Result};
use crate::extract::Engine;
use crate::options::ExtractOptions;
use crate::report::ExtractionResult;

/// A finished extraction sitting in a staging directory next to its
/// destination. Nothing is visible at the destination until
/// [`commit`](Self::commit); dropping it discards the staged tree.
pub struct WorkspaceExtraction {
    workspace: Workspace,
    result: ExtractionResult,
    _scratch: TempDir,
}

impl WorkspaceExtraction {
    pub fn report(&self) -> &ExtractionResult {
        &self.result
    }

    pub fn staging_path(&self) -> &Path {
        self.workspace.path()
    }

    /// Replace the destination with the staged tree.
    pub fn commit(self) -> Result<ExtractionResult> {
        let destination = self.workspace.commit()?;
        info!(destination = %destination.display(), "extraction committed");
        Ok(self.result)
    }

    pub fn abort(self) -> ExtractionResult {
        self.result
    }
}

/// Extract `reader` into a staging directory beside `destination`.
///
/// A run that aborts leaves the destination untouched.
pub fn extract_to_workspace<R: Read + Seek>(
    engine: &mut Engine,
    reader: R,
    destination: impl AsRef<Path>,
    options: &ExtractOptions,
) -> std::result::Result<WorkspaceExtraction, Aborted> {
    let destination = destination.as_ref();
    let (scratch, workspace) =
        prepare(destination).map_err(|e| Aborted::new(e, ExtractionResult::default()))?;
    let mut sink = workspace
        .sink()
        .map_err(|e| Aborted::new(e.into(), ExtractionResult::default()))?;

    let result = engine.extract(reader, &mut sink, options)?;
    drop(sink);

    Ok(WorkspaceExtraction {
        workspace,
        result,
        _scratch: scratch,
    })
}

fn prepare(destination: &Path) -> Result<(TempDir, Workspace)> {
    let parent = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(Error::Io)?;
    let scratch = tempfile::Builder::new()
        .prefix(".sluice-")
        .tempdir_in(parent)?;
    let workspace = Workspace::new(scratch.path().join("tree"), destination)?;
    Ok((scratch, workspace))
}
