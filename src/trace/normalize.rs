// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Home directory path normalization.
//!
//! Traced programs report absolute paths. Only the ones that live inside the
//! home directory can ever be tracked by the store, and the store wants them
//! relative to its work tree alias.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};

/// Home-relative path discovered by a trace.
///
/// Candidate for being added to the configuration store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandidatePath(PathBuf);

impl CandidatePath {
    /// Treat candidate as [`Path`] slice.
    pub fn as_path(&self) -> &Path {
        self.0.as_path()
    }

    /// Take ownership of inner path.
    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }
}

impl Display for CandidatePath {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.0.to_string_lossy().as_ref())
    }
}

/// Make absolute path relative to home directory.
///
/// Prefix matching is done component by component, so `/home/alicex/.vimrc`
/// is not considered to be inside `/home/alice`. The home directory itself is
/// never a candidate.
pub fn normalize(path: impl AsRef<Path>, home_dir: impl AsRef<Path>) -> Option<CandidatePath> {
    let path = path.as_ref();
    if !path.is_absolute() {
        return None;
    }

    let relative = path.strip_prefix(home_dir.as_ref()).ok()?;
    if relative.as_os_str().is_empty() {
        return None;
    }

    Some(CandidatePath(relative.to_path_buf()))
}
