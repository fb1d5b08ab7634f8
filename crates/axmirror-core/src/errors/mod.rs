use std::error::Error;

/// Base trait for all mirror errors
pub trait MirrorError: Error + Send + Sync + 'static {
    /// Error code for programmatic handling
    fn error_code(&self) -> &'static str;

    /// Whether this error was caused by the caller rather than the service
    fn is_user_error(&self) -> bool {
        false
    }
}

/// Common result type for the mirror
pub type MirrorResult<T> = Result<T, Box<dyn MirrorError>>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine the home directory")]
    HomeDirNotFound,

    #[error("Failed to parse config file '{path}': {message}")]
    ConfigParseError { path: String, message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("IO error reading config: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },
}

impl MirrorError for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            ConfigError::HomeDirNotFound => "CONFIG_HOME_NOT_FOUND",
            ConfigError::ConfigParseError { .. } => "CONFIG_PARSE_ERROR",
            ConfigError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION",
            ConfigError::IoError { .. } => "CONFIG_IO_ERROR",
        }
    }

    fn is_user_error(&self) -> bool {
        matches!(
            self,
            ConfigError::ConfigParseError { .. } | ConfigError::InvalidConfiguration { .. }
        )
    }
}
