// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// File helpers shared by the outbox and ticket queues.
//
// Every write goes to a sibling temp file which is synced and then renamed
// over the target, so readers only ever see the old or the new content.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use pagetally_core::error::{PageTallyError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Extension of job description records.
pub const RECORD_EXT: &str = "json";
/// Extension of job documents.
pub const DOCUMENT_EXT: &str = "pdf";

fn queue_err(action: &str, path: &Path, e: std::io::Error) -> PageTallyError {
    PageTallyError::Queue(format!("{action} {}: {e}", path.display()))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replace `path` with `data` without ever leaving a torn file.
pub fn write_bytes_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = temp_path(path);
    let mut file = File::create(&tmp).map_err(|e| queue_err("create", &tmp, e))?;
    file.write_all(data).map_err(|e| queue_err("write", &tmp, e))?;
    file.sync_all().map_err(|e| queue_err("sync", &tmp, e))?;
    drop(file);
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        queue_err("replace", path, e)
    })?;
    debug!(path = %path.display(), bytes = data.len(), "file replaced");
    Ok(())
}

/// Serialise `value` as pretty JSON and replace `path` atomically.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    write_bytes_atomic(path, &json)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read(path).map_err(|e| queue_err("read", path, e))?;
    Ok(serde_json::from_slice(&data)?)
}

/// Remove `path`; `Ok(false)` if it did not exist.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(queue_err("remove", path, e)),
    }
}

/// Sorted stems of the files in `dir` with extension `ext`.
pub fn list_stems(dir: &Path, ext: &str) -> Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(queue_err("list", dir, e)),
    };
    let mut stems = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| queue_err("list", dir, e))?.path();
        if path.extension().and_then(|x| x.to_str()) != Some(ext) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            stems.push(stem.to_string());
        }
    }
    stems.sort();
    Ok(stems)
}

/// Reject names that could escape their queue directory.
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\', '\0'])
        || name.len() > 200;
    if bad {
        return Err(PageTallyError::Validation(format!("invalid {kind} name {name:?}")));
    }
    Ok(())
}

/// A fresh unique job file name.
pub fn new_job_file() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
