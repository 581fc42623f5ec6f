// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pathname helpers shared by the watcher runtime and the backends.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// Join a directory and a file name. An empty file name yields the
/// directory itself.
pub fn mkfilename(dir: &Path, file: &OsStr) -> PathBuf {
    if file.is_empty() {
        return dir.to_path_buf();
    }
    dir.join(file)
}

/// Split a path into its directory part and final component. A path with
/// no directory part splits into `"."` and the whole path; splitting and
/// re-joining is an involution.
pub fn split_pathname(path: &Path) -> (PathBuf, OsString) {
    match (path.parent(), path.file_name()) {
        (Some(dir), Some(name)) => {
            let dir = if dir.as_os_str().is_empty() {
                PathBuf::from(".")
            } else {
                dir.to_path_buf()
            };
            (dir, name.to_os_string())
        }
        _ => (PathBuf::from("."), path.as_os_str().to_os_string()),
    }
}

#[cfg(test)]
#[path = "pathname_tests.rs"]
mod tests;
