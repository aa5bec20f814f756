//! Controller and driver error types

use thiserror::Error;

/// Errors surfaced by the radio controller.
///
/// `PermissionDenied` and `DeviceNotFound` both return the controller to
/// the off state; a `Driver` failure ends the current session and a fresh
/// `start` is required.
#[derive(Debug, Clone, Error)]
pub enum RadioError {
    #[error("no permission to access the USB ports")]
    PermissionDenied,

    #[error("USB tuner device not found (an RTL2832U-based DVB-T dongle is required)")]
    DeviceNotFound,

    #[error("tuner driver error: {0}")]
    Driver(#[from] TunerError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Failure reported by the tuner driver for any open/configure/read/close
/// operation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TunerError {
    message: String,
}

impl TunerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
