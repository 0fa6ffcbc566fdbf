//! picam-shutter: button-driven still capture for a Raspberry Pi camera rig
//!
//! A shutter button captures a frame from a V4L2 camera and saves it as a
//! numbered JPEG; auxiliary buttons select exposure presets. Hardware sits
//! behind the capability traits in [`traits`], so the [`controller`] can be
//! tested with mock devices.

pub mod clock;
pub mod config;
pub mod controller;
pub mod device;
pub mod encode;
pub mod error;
pub mod gpio;
pub mod naming;
pub mod presets;
pub mod runtime;
pub mod traits;

#[cfg(test)]
pub mod mock;

pub use config::Config;
pub use controller::{CaptureController, ShutterOutcome};
pub use device::V4L2Session;
pub use error::{CameraError, ConfigError, Error};
pub use naming::FileNamer;
pub use presets::{ExposurePreset, ExposurePresetTable};
pub use traits::{
    CameraSession, Clock, Control, Format, FourCC, Frame, FrameMetadata, PinId, StillProfile,
    TriggerEvent, TriggerSource,
};
