//! Error type system for MediaScout
//!
//! This module provides the crate-wide error type with:
//! - Classification of load-time, fetch-time and bridge errors
//! - Error context and chaining support
//! - Retryability hints for callers

/// Main error type for the MediaScout system
#[derive(Debug, thiserror::Error)]
pub enum ScoutError {
    // System-level errors
    #[error("System initialization failed: {0}")]
    InitializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Plugin-related errors
    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("Plugin load failed: {0}")]
    PluginLoadError(String),

    #[error("Plugin execution error: {0}")]
    PluginExecutionError(String),

    // Bridge errors
    #[error("Another task is running.")]
    TaskInProgress,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Callback error: {0}")]
    CallbackError(String),

    // I/O errors
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Network error: {0}")]
    NetworkError(String),
}

impl ScoutError {
    /// Get the error type name used in logs and script-side messages
    pub fn error_type(&self) -> &'static str {
        match self {
            ScoutError::InitializationError(_) => "InitializationError",
            ScoutError::ConfigError(_) => "ConfigError",
            ScoutError::PluginNotFound(_) => "PluginNotFound",
            ScoutError::PluginLoadError(_) => "LoadError",
            ScoutError::PluginExecutionError(_) => "PluginExecutionError",
            ScoutError::TaskInProgress => "ConcurrentTaskError",
            ScoutError::InvalidArgument(_) => "ArgumentError",
            ScoutError::CallbackError(_) => "CallbackError",
            ScoutError::IoError(_) => "IoError",
            ScoutError::NetworkError(_) => "NetworkError",
        }
    }

    /// Check if this error is retryable
    ///
    /// A busy fetch slot clears once the outstanding request completes, and
    /// network failures are local to one task instance.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScoutError::TaskInProgress | ScoutError::NetworkError(_)
        )
    }

    /// Whether the process must stop when this error reaches the top level
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScoutError::InitializationError(_)
                | ScoutError::ConfigError(_)
                | ScoutError::PluginLoadError(_)
        )
    }
}

impl From<crate::core::config::ConfigError> for ScoutError {
    fn from(err: crate::core::config::ConfigError) -> Self {
        ScoutError::ConfigError(err.to_string())
    }
}

/// Result type alias for operations that can fail with ScoutError
pub type Result<T> = std::result::Result<T, ScoutError>;

/// Context extension trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::fmt::Display,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let context_str = context.into();
            ScoutError::InitializationError(format!("{}: {}", context_str, e))
        })
    }
}
