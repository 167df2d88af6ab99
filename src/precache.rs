use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::{CacheEntry, ContentCache};
use crate::error::PrecacheError;
use crate::mime::TypeMap;

/// What the eager walk loaded, for the startup log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrecacheStats {
    pub files: usize,
    pub bytes: u64,
    pub elapsed: Duration,
}

/// Walk the served tree once, reading every regular file into the cache and
/// warming the extension map along the way. Runs single-threaded before the
/// listener starts, so nothing races it.
///
/// Strict-load semantics: the first unreadable entry aborts the whole walk
/// and the server does not start.
pub fn load(
    cache: &ContentCache,
    types: &TypeMap,
    root: &Path,
) -> Result<PrecacheStats, PrecacheError> {
    let started = Instant::now();
    let mut files = 0;
    let mut bytes = 0;
    walk(cache, types, root, &mut files, &mut bytes)?;
    Ok(PrecacheStats {
        files,
        bytes,
        elapsed: started.elapsed(),
    })
}

fn walk(
    cache: &ContentCache,
    types: &TypeMap,
    dir: &Path,
    files: &mut usize,
    bytes: &mut u64,
) -> Result<(), PrecacheError> {
    let entries = fs::read_dir(dir).map_err(|source| PrecacheError {
        path: dir.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| PrecacheError {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|source| PrecacheError {
            path: path.clone(),
            source,
        })?;

        if file_type.is_dir() {
            walk(cache, types, &path, files, bytes)?;
        } else {
            let content = fs::read(&path).map_err(|source| PrecacheError {
                path: path.clone(),
                source,
            })?;
            *files += 1;
            *bytes += content.len() as u64;

            let content_type = types.resolve(&path, &content);
            cache.store(
                path,
                Arc::new(CacheEntry {
                    content,
                    content_type,
                }),
            );
        }
    }
    Ok(())
}

/// Decimal-unit byte count for the startup log line.
pub fn fmt_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["kB", "MB", "GB", "TB"];
    if n < 1000 {
        return format!("{n} B");
    }
    let mut value = n as f64 / 1000.0;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}
