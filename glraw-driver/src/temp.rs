//! Request-scoped temporary files.
//!
//! A [`TempTracker`] owns every file a request stages or discovers. Dropping
//! the tracker removes them, so each exit path (success, error, a cancelled
//! future) releases exactly once. Removal failures are logged and swallowed.

use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
};

use tempfile::{NamedTempFile, TempPath};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TempRole {
    /// Staged by this service; created and owned here.
    Input,
    /// Produced by the encoder in the result directory; only the reference
    /// is tracked so it can be removed after delivery.
    Output,
}

enum Handle {
    Staged(NamedTempFile),
    Referenced(PathBuf),
}

pub struct ManagedTempFile {
    handle: Handle,
    role: TempRole,
}

impl ManagedTempFile {
    pub fn path(&self) -> &Path {
        match &self.handle {
            Handle::Staged(file) => file.path(),
            Handle::Referenced(path) => path,
        }
    }

    /// Opens a second handle on a staged file for writing. Referenced
    /// outputs belong to the encoder and cannot be reopened.
    pub fn reopen(&self) -> io::Result<File> {
        match &self.handle {
            Handle::Staged(file) => file.reopen(),
            Handle::Referenced(path) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("{} is not a staged file", path.display()),
            )),
        }
    }

    fn release(self, owner: &str) {
        let path = self.path().to_path_buf();
        let result = match self.handle {
            Handle::Staged(file) => {
                let temp_path: TempPath = file.into_temp_path();
                temp_path.close()
            }
            Handle::Referenced(path) => std::fs::remove_file(path),
        };
        match result {
            Ok(()) => log::debug!("[{}] removed {:?} file {}", owner, self.role, path.display()),
            Err(e) => log::warn!(
                "[{}] failed to remove {:?} file {}: {}",
                owner,
                self.role,
                path.display(),
                e
            ),
        }
    }
}

/// Owns the temporary resources of a single conversion job.
pub struct TempTracker {
    owner: String,
    dir: PathBuf,
    files: Vec<ManagedTempFile>,
}

impl TempTracker {
    /// `owner` is only used to tag log lines, `dir` is where staged files go.
    pub fn new(owner: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            owner: owner.into(),
            dir: dir.into(),
            files: Vec::new(),
        }
    }

    /// Creates an exclusively owned, uniquely named file `glraw-<random><suffix>`
    /// in the staging directory.
    pub fn acquire(&mut self, suffix: &str) -> io::Result<&ManagedTempFile> {
        let file = tempfile::Builder::new()
            .prefix("glraw-")
            .suffix(suffix)
            .rand_bytes(12)
            .tempfile_in(&self.dir)?;
        log::debug!("[{}] staged {}", self.owner, file.path().display());
        Ok(self.push(ManagedTempFile {
            handle: Handle::Staged(file),
            role: TempRole::Input,
        }))
    }

    /// Schedules removal of a file this service did not create.
    pub fn track_output(&mut self, path: impl Into<PathBuf>) -> &ManagedTempFile {
        self.push(ManagedTempFile {
            handle: Handle::Referenced(path.into()),
            role: TempRole::Output,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Removes every tracked file. Calling it again is a no-op.
    pub fn release(&mut self) {
        for file in self.files.drain(..) {
            file.release(&self.owner);
        }
    }

    fn push(&mut self, file: ManagedTempFile) -> &ManagedTempFile {
        self.files.push(file);
        &self.files[self.files.len() - 1]
    }
}

impl Drop for TempTracker {
    fn drop(&mut self) {
        self.release();
    }
}
