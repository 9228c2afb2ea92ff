//! Error types for paramload-core

/// Result type for paramload-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while declaring or loading parameters
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Programmer misuse of the loading API
    #[error("{message}")]
    Usage { message: String },

    /// Two or more parameters depend on each other's values.
    ///
    /// `chain` lists every attribute on the lock stack in activation order,
    /// followed by the attribute that was requested a second time.
    #[error("circular dependency while loading: {}", chain.join(" -> "))]
    CircularDependency { chain: Vec<String> },

    /// The default pick policy found no candidate value
    #[error("no value found for {param}")]
    NoValueFound { param: String },

    /// A candidate value was rejected by a transform or pick policy
    #[error("invalid value for {param}: {message}")]
    InvalidValue { param: String, message: String },

    /// A config failed to load or to look up a value
    #[error("config '{config}' failed: {source}")]
    Config {
        config: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// JSON conversion error
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a usage error with the given message
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    /// Create an invalid-value error.
    ///
    /// Transforms usually don't know which parameter they run for; the
    /// parameter name is filled in by [`Error::for_param`] on the way out.
    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::InvalidValue {
            param: String::new(),
            message: message.into(),
        }
    }

    /// Wrap an arbitrary source error raised by a config
    pub fn config(
        config: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Config {
            config: config.into(),
            source: source.into(),
        }
    }

    /// True for [`Error::Usage`] and [`Error::CircularDependency`]
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage { .. } | Self::CircularDependency { .. })
    }

    /// Attach a parameter label to an invalid-value error that lacks one
    pub(crate) fn for_param(self, label: &str) -> Self {
        match self {
            Self::InvalidValue { param, message } if param.is_empty() => Self::InvalidValue {
                param: label.to_string(),
                message,
            },
            other => other,
        }
    }
}
