use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Startup configuration failures. All of these abort the process before the
/// listener binds.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot resolve served directory {dir:?}: {source}")]
    Root {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("default document {doc:?} is not inside the served directory")]
    DefaultDocOutsideRoot { doc: String },
}

/// A failed read during the eager cache walk. The server refuses to start
/// with a partially populated cache.
#[derive(Debug, Error)]
#[error("pre-cache failed on {path:?}: {source}")]
pub struct PrecacheError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}
