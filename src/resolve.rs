use std::path::{Path, PathBuf};

/// Where a request path ended up after mapping onto the served tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Request path as it appeared on the request line, minus query/fragment.
    pub original: String,
    /// Absolute filesystem path to open.
    pub full_path: PathBuf,
}

/// Map a request target onto an absolute path under `root`.
///
/// `/` is substituted with the configured default document. The joined path is
/// normalized lexically, so `..` segments can pop out of the root; anything
/// that lands outside it is discarded in favor of `default_doc_path`. The
/// filesystem is never touched here; open errors are the caller's business.
pub fn resolve(
    root: &Path,
    default_doc: &str,
    default_doc_path: &Path,
    target: &str,
) -> Resolution {
    let path = strip_target(target);
    let lookup = if path == "/" { default_doc } else { path };

    let mut full_path = lexical_join(root, lookup);
    if !full_path.starts_with(root) {
        // Traversal attempt, or normalization escaped the root.
        full_path = default_doc_path.to_path_buf();
    }

    Resolution {
        original: path.to_string(),
        full_path,
    }
}

/// Drop the query string and fragment from a request target.
pub fn strip_target(target: &str) -> &str {
    let target = target.split('?').next().unwrap_or(target);
    target.split('#').next().unwrap_or(target)
}

/// Join `path` onto `root`, resolving `.` and `..` segments without consulting
/// the filesystem. `..` pops past `root` rather than clamping at it; an escape
/// stays representable for the caller's prefix check.
pub fn lexical_join(root: &Path, path: &str) -> PathBuf {
    let mut joined = root.to_path_buf();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                joined.pop();
            }
            part => joined.push(part),
        }
    }
    joined
}

/// Root-relative form of a resolved path, for log lines.
pub fn rel_path(root: &Path, full_path: &Path) -> String {
    match full_path.strip_prefix(root) {
        Ok(rel) => format!("/{}", rel.display()),
        Err(_) => full_path.display().to_string(),
    }
}
