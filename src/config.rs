use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;

use crate::error::ConfigError;
use crate::resolve;

/// Serve a directory over HTTP, straight from memory when asked.
#[derive(Parser, Debug, Clone)]
#[command(name = "dirserv", version)]
pub struct Args {
    /// Directory to host
    #[arg(value_name = "DIR")]
    pub directory: PathBuf,

    /// On failed lookups, return this document instead
    #[arg(short = 'd', long = "default-doc", value_name = "NAME", default_value = "index.html")]
    pub default_doc: String,

    /// Port to listen on
    #[arg(short = 'p', long = "port", default_value_t = 80)]
    pub port: u16,

    /// Keep served files in memory after the first read
    #[arg(short = 'c', long = "cache")]
    pub cache: bool,

    /// Load all files into the cache before serving (enables the cache)
    #[arg(short = 'l', long = "load")]
    pub load: bool,
}

/// Validated, immutable runtime configuration. Built once at startup and
/// shared by every request task; nothing mutates it afterwards.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Absolute directory boundary outside which no file is ever returned.
    pub root: PathBuf,
    /// Relative name substituted for `/` requests.
    pub default_doc: String,
    /// Precomputed `root`-joined default document, the fallback target.
    pub default_doc_path: PathBuf,
    pub port: u16,
    pub cache_enabled: bool,
    pub precache: bool,
}

impl ServerConfig {
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let root = absolutize(&args.directory)?;

        let default_doc_path = resolve::lexical_join(&root, &args.default_doc);
        if !default_doc_path.starts_with(&root) {
            return Err(ConfigError::DefaultDocOutsideRoot {
                doc: args.default_doc,
            });
        }

        Ok(Self {
            root,
            default_doc: args.default_doc,
            default_doc_path,
            port: args.port,
            // --load implies --cache.
            cache_enabled: args.cache || args.load,
            precache: args.load,
        })
    }
}

// Canonicalization also requires the directory to exist.
fn absolutize(dir: &Path) -> Result<PathBuf, ConfigError> {
    fs::canonicalize(dir).map_err(|source| ConfigError::Root {
        dir: dir.to_path_buf(),
        source,
    })
}
