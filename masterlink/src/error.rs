//! Error types for masterlink.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type for masterlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for masterlink operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on the underlying byte stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The caller supplied fields that do not fit the command layout.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// The master did not reply before the deadline.
    #[error("Communication with master timed out: {command} (after {timeout:?})")]
    CommunicationTimedOut {
        /// Action of the command that timed out.
        command: &'static str,
        /// Deadline that expired.
        timeout: Duration,
    },

    /// A reply arrived but its checksum did not match its payload.
    #[error("CRC check failed for {command}: expected {expected:#06x}, got {actual:#06x}")]
    CrcCheckFailed {
        /// Action of the command whose reply was corrupted.
        command: &'static str,
        /// Checksum computed over the received payload.
        expected: u16,
        /// Checksum carried by the frame.
        actual: u16,
    },

    /// Normal commands are rejected while the master is in maintenance mode.
    #[error("Master is in maintenance mode")]
    InMaintenanceMode,

    /// A maintenance operation was requested outside maintenance mode.
    #[error("Master is not in maintenance mode")]
    NotInMaintenanceMode,

    /// Normal commands are rejected while the link is reserved for passthrough.
    #[error("Link is in passthrough-only mode")]
    InPassthroughMode,

    /// Passthrough data was requested but passthrough is not enabled.
    #[error("Passthrough is not enabled")]
    PassthroughDisabled,

    /// The communicator has not been started (or was stopped).
    #[error("Communicator is not running")]
    NotRunning,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification of an [`Error`].
///
/// Upstream controllers branch on this instead of matching every variant:
/// timeouts are usually retried, mode rejections surface as "busy", encoding
/// and usage errors are bugs on the caller side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid input fields; never retried.
    Encoding,
    /// No reply within the deadline.
    Timeout,
    /// Reply received but corrupted.
    Checksum,
    /// Rejected because of the current operating mode.
    Mode,
    /// Failure of the underlying byte stream.
    Transport,
    /// API misuse (not running, passthrough disabled, bad configuration).
    Usage,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Transport,
            #[cfg(feature = "native")]
            Self::Serial(_) => ErrorKind::Transport,
            Self::Encoding(_) => ErrorKind::Encoding,
            Self::CommunicationTimedOut { .. } => ErrorKind::Timeout,
            Self::CrcCheckFailed { .. } => ErrorKind::Checksum,
            Self::InMaintenanceMode | Self::NotInMaintenanceMode | Self::InPassthroughMode => {
                ErrorKind::Mode
            },
            Self::PassthroughDisabled | Self::NotRunning | Self::Config(_) => ErrorKind::Usage,
        }
    }

    /// Whether retrying the same command later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Timeout | ErrorKind::Checksum | ErrorKind::Transport
        )
    }
}
