/// `scripting/source.rs` — reads script files for the engine
///
/// Checks existence and file type, canonicalises the path so that relative
/// and absolute references to one file share an identity, and reads the
/// whole file in a single pass.
use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use super::error::{CallResult, ScriptError};

pub struct SourceFile {
    /// Canonical absolute path.
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

pub fn read_source(path: &Path) -> CallResult<SourceFile> {
    if !path.exists() {
        return Err(ScriptError::NotFound(path.to_path_buf()));
    }
    if !path.is_file() {
        return Err(ScriptError::NotAFile(path.to_path_buf()));
    }

    let path = path.canonicalize().map_err(|e| ScriptError::Open {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut file = File::open(&path).map_err(|e| ScriptError::Open {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    let len = file
        .metadata()
        .map_err(|e| ScriptError::Open { path: path.clone(), reason: e.to_string() })?
        .len();
    let expected = usize::try_from(len).map_err(|_| ScriptError::Read {
        path: path.clone(),
        reason: format!("file of {len} bytes does not fit in memory"),
    })?;

    let mut bytes = Vec::with_capacity(expected);
    let n = file
        .read_to_end(&mut bytes)
        .map_err(|e| ScriptError::Read { path: path.clone(), reason: e.to_string() })?;
    if n != expected {
        return Err(ScriptError::Read {
            path,
            reason: format!("expected {expected} bytes, read {n}"),
        });
    }

    Ok(SourceFile { path, bytes })
}

/// Registry key for a user-supplied path. Falls back to the absolute form
/// when the file no longer exists, so a deleted script can still be found.
pub fn canonical_key(path: &Path) -> PathBuf {
    path.canonicalize()
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
