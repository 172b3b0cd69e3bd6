//! CLI errors with categories, suggestions and sysexits-style exit codes.

use thiserror::Error;
use viewserver_ipc::ClientError;
use viewserver_ipc::DeviceError;
use viewserver_ipc::ErrorCategory;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("No devices attached")]
    NoDevice,

    #[error("More than one device attached: {}", .0.join(", "))]
    MultipleDevices(Vec<String>),

    #[error("Device {0} is not attached")]
    DeviceNotFound(String),

    #[error("Invalid window '{0}': expected a hex hash code or 'focused'")]
    InvalidWindow(String),

    #[error("Window {0} has no views")]
    EmptyWindow(String),

    #[error("No view with hash code {0} in the window")]
    NodeNotFound(String),

    #[error("adb failed: {0}")]
    Adb(#[from] DeviceError),

    #[error("Failed to install signal handler: {0}")]
    SignalSetup(String),

    #[error("Change stream for {serial} kept ending after {attempts} restarts")]
    StreamLost { serial: String, attempts: u32 },
}

impl CliError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            CliError::NoDevice
            | CliError::DeviceNotFound(_)
            | CliError::EmptyWindow(_)
            | CliError::NodeNotFound(_) => ErrorCategory::NotFound,
            CliError::MultipleDevices(_) | CliError::InvalidWindow(_) => ErrorCategory::Protocol,
            CliError::Adb(DeviceError::Timeout) => ErrorCategory::Timeout,
            CliError::Adb(_) | CliError::StreamLost { .. } => ErrorCategory::External,
            CliError::SignalSetup(_) => ErrorCategory::Internal,
        }
    }

    pub fn suggestion(&self) -> Option<String> {
        match self {
            CliError::NoDevice => {
                Some("Connect a device or start an emulator, then run 'adb devices'.".to_string())
            }
            CliError::MultipleDevices(_) => {
                Some("Pick one with --serial or ANDROID_SERIAL.".to_string())
            }
            CliError::DeviceNotFound(_) => Some("Run 'viewserver devices' to list serials.".to_string()),
            CliError::InvalidWindow(_) => {
                Some("Run 'viewserver windows' to list window hash codes.".to_string())
            }
            CliError::NodeNotFound(_) => {
                Some("Run 'viewserver dump <window>' to list node hash codes.".to_string())
            }
            CliError::Adb(_) => Some("Check that adb is installed or pass --adb <path>.".to_string()),
            CliError::StreamLost { .. } => Some(
                "Check the device connection with 'viewserver server status', then watch again."
                    .to_string(),
            ),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, CliError::Adb(DeviceError::Timeout))
    }
}

/// Converts to a UNIX sysexits.h-compliant exit code.
pub fn exit_code_for_category(category: ErrorCategory) -> i32 {
    match category {
        ErrorCategory::Protocol => 65,    // EX_DATAERR
        ErrorCategory::NotFound => 69,    // EX_UNAVAILABLE
        ErrorCategory::Unsupported => 69, // EX_UNAVAILABLE
        ErrorCategory::Internal => 70,    // EX_SOFTWARE
        ErrorCategory::External => 74,    // EX_IOERR
        ErrorCategory::Timeout => 75,     // EX_TEMPFAIL
    }
}

/// A failed command, flattened for the presenter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub message: String,
    pub category: ErrorCategory,
    pub suggestion: Option<String>,
    pub retryable: bool,
}

impl ErrorReport {
    /// Builds a report from the error types the handlers return.
    ///
    /// Anything else is reported as an internal error.
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        if let Some(client_error) = error.downcast_ref::<ClientError>() {
            Self::from(client_error)
        } else if let Some(cli_error) = error.downcast_ref::<CliError>() {
            Self::from(cli_error)
        } else {
            Self {
                message: error.to_string(),
                category: ErrorCategory::Internal,
                suggestion: None,
                retryable: false,
            }
        }
    }

    pub fn exit_code(&self) -> i32 {
        exit_code_for_category(self.category)
    }
}

impl From<&ClientError> for ErrorReport {
    fn from(error: &ClientError) -> Self {
        Self {
            message: error.to_string(),
            category: error.category(),
            suggestion: error.suggestion(),
            retryable: error.is_retryable(),
        }
    }
}

impl From<&CliError> for ErrorReport {
    fn from(error: &CliError) -> Self {
        Self {
            message: error.to_string(),
            category: error.category(),
            suggestion: error.suggestion(),
            retryable: error.is_retryable(),
        }
    }
}
