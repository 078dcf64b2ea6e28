//! Error types for kasa-link core.

use thiserror::Error;

/// Core error type for shared operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl CoreError {
    /// True when the error came from the network transport rather than the device or payload.
    pub fn is_transport(&self) -> bool {
        matches!(self, CoreError::Io(_))
            || matches!(self, CoreError::Device(DeviceError::Offline { .. }))
    }
}

/// Device command errors
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("Command failed on {ip}: {message}")]
    CommandFailed { ip: String, message: String },

    #[error("Invalid response from {ip}: {message}")]
    InvalidResponse { ip: String, message: String },

    #[error("Device {ip} is offline")]
    Offline { ip: String },

    #[error("Device {id} does not support {operation}")]
    Unsupported { id: String, operation: &'static str },

    #[error("Device {id} has no child outlet {child}")]
    NoSuchChild { id: String, child: String },
}

/// Wire payload errors. Never fatal to the listener.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown device model: {0}")]
    UnknownModel(String),

    #[error("Frame of {0} bytes exceeds limit")]
    FrameTooLarge(usize),
}

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to access storage directory: {0}")]
    DirectoryAccess(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_from_device_error() {
        let err = CoreError::Device(DeviceError::NotFound("8006ABCDEF".to_string()));
        assert!(format!("{}", err).contains("Device not found"));
    }

    #[test]
    fn test_unsupported_display() {
        let err = DeviceError::Unsupported {
            id: "X1".to_string(),
            operation: "set_brightness",
        };
        assert_eq!(err.to_string(), "Device X1 does not support set_brightness");
    }

    #[test]
    fn test_transport_classification() {
        let io = CoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert!(io.is_transport());

        let offline = CoreError::Device(DeviceError::Offline {
            ip: "10.0.0.2".to_string(),
        });
        assert!(offline.is_transport());

        let proto = CoreError::Protocol(ProtocolError::Malformed("x".to_string()));
        assert!(!proto.is_transport());
    }
}
