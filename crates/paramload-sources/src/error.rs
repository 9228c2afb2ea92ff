//! Error types for paramload-sources

use crate::format::Format;
use std::path::PathBuf;

/// Result type for paramload-sources operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while reading a config source
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {format} config at {path}: {message}")]
    Parse {
        path: PathBuf,
        format: Format,
        message: String,
    },

    #[error("unsupported config format: {extension}")]
    UnsupportedFormat { extension: String },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap this error as a failure of the config called `config`
    pub fn into_config(self, config: impl Into<String>) -> paramload_core::Error {
        paramload_core::Error::config(config, self)
    }
}
