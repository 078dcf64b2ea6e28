//! Error types for the kasa-link CLI.
//!
//! CliError wraps CoreError from the shared library and adds CLI-specific variants.

use kasa_link_core::error::CoreError;
use thiserror::Error;

pub use kasa_link_core::error::{DeviceError, StorageError};

/// Exit codes for the CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const NETWORK_ERROR: i32 = 2;
    pub const DEVICE_ERROR: i32 = 3;
    pub const INVALID_ARGS: i32 = 4;
}

/// Main error type for the CLI
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Core(#[from] CoreError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No devices found")]
    NoDevicesFound,

    #[error("No device matching '{0}' answered discovery")]
    DeviceNotFound(String),
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Core(e) if e.is_transport() => exit_codes::NETWORK_ERROR,
            CliError::Core(e) => match e {
                CoreError::Device(_) | CoreError::Protocol(_) => exit_codes::DEVICE_ERROR,
                CoreError::Storage(_) | CoreError::Io(_) | CoreError::Other(_) => {
                    exit_codes::GENERAL_ERROR
                }
            },
            CliError::InvalidArgument(_) => exit_codes::INVALID_ARGS,
            CliError::NoDevicesFound => exit_codes::GENERAL_ERROR,
            CliError::DeviceNotFound(_) => exit_codes::DEVICE_ERROR,
        }
    }
}

impl From<DeviceError> for CliError {
    fn from(e: DeviceError) -> Self {
        CliError::Core(CoreError::Device(e))
    }
}

impl From<StorageError> for CliError {
    fn from(e: StorageError) -> Self {
        CliError::Core(CoreError::Storage(e))
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let offline: CliError = DeviceError::Offline {
            ip: "10.0.0.4".to_string(),
        }
        .into();
        assert_eq!(offline.exit_code(), exit_codes::NETWORK_ERROR);

        let failed: CliError = DeviceError::CommandFailed {
            ip: "10.0.0.4".to_string(),
            message: "err_code -1".to_string(),
        }
        .into();
        assert_eq!(failed.exit_code(), exit_codes::DEVICE_ERROR);

        assert_eq!(
            CliError::InvalidArgument("x".to_string()).exit_code(),
            exit_codes::INVALID_ARGS
        );
        assert_eq!(
            CliError::Core(CoreError::Other("bad config".to_string())).exit_code(),
            exit_codes::GENERAL_ERROR
        );
    }
}
