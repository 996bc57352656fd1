use thiserror::Error;

/// Errors that can occur while reconciling bike data or normalizing requests
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CyclingError {
    /// An argument was negative, missing or not a finite number
    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    /// A numeric operation left its valid domain
    #[error("Numeric domain error in {operation}: {detail}")]
    NumericDomain {
        /// Operation that failed
        operation: &'static str,
        /// Offending values
        detail: String,
    },

    /// Setting key is not declared by the mode
    #[error("Unknown setting: {0}")]
    UnknownSetting(String),

    /// Setting value does not match the declared property
    #[error("Invalid value for setting '{key}': {reason}")]
    InvalidSetting {
        /// Setting key
        key: String,
        /// Why the value was rejected
        reason: String,
    },

    /// The adapter does not support the requested cycling mode
    #[error("Unsupported cycling mode: {0}")]
    UnsupportedMode(String),

    /// Command write timeout
    #[error("Command timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// The command sink rejected a write
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// Device is not ready for commands
    #[error("Device not ready: {reason}")]
    NotReady {
        /// Reason why device is not ready
        reason: String,
    },
}

/// Result type for cycling mode operations
pub type Result<T> = std::result::Result<T, CyclingError>;

impl CyclingError {
    /// Create an [`CyclingError::IllegalArgument`] from anything printable
    pub fn illegal(message: impl Into<String>) -> Self {
        Self::IllegalArgument(message.into())
    }

    /// Check if this error was caused by rejected input values
    #[must_use]
    pub const fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::IllegalArgument(_)
                | Self::NumericDomain { .. }
                | Self::InvalidSetting { .. }
                | Self::UnknownSetting(_)
        )
    }

    /// Check if this error is recoverable by retrying later
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::NotReady { .. } | Self::CommandFailed(_)
        )
    }
}
