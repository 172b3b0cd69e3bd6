use std::fmt;

use thiserror::Error;

/// Error category for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Device, forward or server not found / not set up
    NotFound,
    /// Feature unavailable on the device's protocol version
    Unsupported,
    /// Device or adb failure
    External,
    /// Operation timed out
    Timeout,
    /// Unexpected response shape
    Protocol,
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Unsupported => "unsupported",
            ErrorCategory::External => "external",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Protocol => "protocol",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Failures reported by a [`Device`](crate::Device) implementation.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Device is offline")]
    Offline,
    #[error("Device command timed out")]
    Timeout,
    #[error("Command rejected by device: {0}")]
    Rejected(String),
    #[error("Device I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("'{command}' failed: {message}")]
    Command { command: String, message: String },
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("No port forward set up for device {0}")]
    NotForwarded(String),

    #[error("Failed to connect to view server on local port {port}: {source}")]
    Connect {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out waiting for the view server")]
    Timeout,

    #[error("Connection I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection already closed")]
    Closed,

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("View server is not available on device {0}")]
    ServerUnavailable(String),

    #[error("{feature} requires protocol version {required}, device speaks {protocol_version}")]
    Unsupported {
        feature: &'static str,
        protocol_version: i32,
        required: i32,
    },

    #[error("Unexpected view server response: {0}")]
    Protocol(String),
}

impl ClientError {
    /// Maps socket errors so timeouts get their own kind.
    pub(crate) fn from_io(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => ClientError::Timeout,
            _ => ClientError::Io(err),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ClientError::NotForwarded(_) | ClientError::ServerUnavailable(_) => {
                ErrorCategory::NotFound
            }
            ClientError::Connect { .. } | ClientError::Io(_) | ClientError::Closed => {
                ErrorCategory::External
            }
            ClientError::Device(DeviceError::Timeout) | ClientError::Timeout => {
                ErrorCategory::Timeout
            }
            ClientError::Device(_) => ErrorCategory::External,
            ClientError::Unsupported { .. } => ErrorCategory::Unsupported,
            ClientError::Protocol(_) => ErrorCategory::Protocol,
        }
    }

    /// Returns whether this error is potentially transient and may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Timeout
                | ClientError::Connect { .. }
                | ClientError::Device(DeviceError::Timeout)
        )
    }

    /// Returns a helpful suggestion for resolving the error.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            ClientError::NotForwarded(serial) => Some(format!(
                "Set up the port forward for {} first (run 'viewserver server start').",
                serial
            )),
            ClientError::Connect { port, .. } => Some(format!(
                "Check that the view server is running and 'adb forward --list' shows tcp:{}.",
                port
            )),
            ClientError::Timeout => {
                Some("The device may be busy; retry or raise VIEWSERVER_READ_TIMEOUT.".to_string())
            }
            ClientError::ServerUnavailable(_) => Some(
                "The view server only runs on debuggable builds. Try 'viewserver server start'."
                    .to_string(),
            ),
            ClientError::Device(DeviceError::Offline) => {
                Some("Run 'adb devices' and reconnect the device.".to_string())
            }
            ClientError::Unsupported { .. } => {
                Some("Use 'windows' to poll instead of watching for changes.".to_string())
            }
            _ => None,
        }
    }
}
