//! Error types for camera, configuration and process setup.

use std::path::PathBuf;

use thiserror::Error;

use crate::traits::{Control, Format};

/// Error type for camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    /// Device with given index was not found.
    #[error("Device {0} not found")]
    DeviceNotFound(u32),
    /// Failed to open device.
    #[error("Failed to open device: {0}")]
    DeviceOpenFailed(String),
    /// Device lacks the capture or streaming capability.
    #[error("Device cannot {0}")]
    Unsupported(&'static str),
    /// Requested format is not supported.
    #[error("Format not supported: {0:?}")]
    FormatNotSupported(Format),
    /// Error during streaming operation.
    #[error("Stream error: {0}")]
    StreamError(String),
    /// The driver refused a control write.
    #[error("Control {control:?} rejected: {reason}")]
    ControlRejected {
        /// The control that was being applied.
        control: Control,
        /// Driver message.
        reason: String,
    },
    /// The frame could not be turned into an image.
    #[error("Encode failed: {0}")]
    Encode(#[from] image::ImageError),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for camera operations.
pub type Result<T> = std::result::Result<T, CameraError>;

/// Invalid or missing startup configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable holds a value that does not parse.
    #[error("{key}={value:?}: {reason}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
        /// What was expected.
        reason: &'static str,
    },
    /// Two exposure presets are bound to the same pin.
    #[error("Exposure preset pin {0} is bound more than once")]
    DuplicatePresetPin(u8),
    /// A button pin is used for two different roles.
    #[error("Pin {0} is assigned to more than one button")]
    PinConflict(u8),
    /// No capture directory configured and `$HOME` is unset.
    #[error("PICAM_CAPTURE_DIR is unset and HOME is not available")]
    NoCaptureDir,
}

/// Top-level error for setup and the event loop.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Camera initialization failed.
    #[error("Camera: {0}")]
    Camera(#[from] CameraError),
    /// GPIO initialization failed.
    #[error("GPIO: {0}")]
    Gpio(#[from] rppal::gpio::Error),
    /// Capture directory could not be created.
    #[error("Capture directory {path}: {source}")]
    CaptureDir {
        /// Directory that was being created.
        path: PathBuf,
        /// Underlying failure.
        source: std::io::Error,
    },
    /// Interrupt handler could not be installed.
    #[error("Signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}
