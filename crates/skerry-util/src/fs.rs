//! Filesystem helpers shared by the resolver and source providers.

use std::io;
use std::path::{Component, Path, PathBuf};

/// Read a file to string, replacing invalid UTF-8 sequences with the
/// replacement character.
///
/// Module sources are treated as text; a stray invalid byte should surface
/// as a parse problem downstream, not as an I/O failure here.
///
/// # Errors
/// Returns an error if the file cannot be read.
pub fn read_to_string_lossy(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Normalize a path by dropping `.` components and resolving `..` lexically.
///
/// Purely lexical: does not touch the filesystem and does not resolve
/// symlinks.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                result.pop();
            }
            other => result.push(other),
        }
    }
    result
}
