//! Capability traits and the types that cross them.
//!
//! Everything hardware-facing (camera, buttons, output pins, time) sits behind
//! one of these traits so the capture controller can be driven by mocks.

use std::path::Path;
use std::time::Duration;

use crate::error::Result;

/// BCM GPIO pin number.
pub type PinId = u8;

/// Monotonic time since an arbitrary process-local origin.
pub type Timestamp = Duration;

/// A button activation, stamped when the interrupt fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerEvent {
    /// Pin that went active.
    pub pin: PinId,
    /// When it happened.
    pub at: Timestamp,
}

/// Pixel format representation (e.g., YUYV, MJPG, RGB3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// YUYV pixel format (4:2:2 packed).
    pub const YUYV: Self = Self::new(b"YUYV");
    /// MJPEG pixel format (Motion JPEG).
    pub const MJPG: Self = Self::new(b"MJPG");
    /// RGB3 pixel format (24-bit RGB).
    pub const RGB3: Self = Self::new(b"RGB3");
}

impl From<v4l::FourCC> for FourCC {
    fn from(fourcc: v4l::FourCC) -> Self {
        Self(fourcc.repr)
    }
}

impl From<FourCC> for v4l::FourCC {
    fn from(fourcc: FourCC) -> Self {
        Self::new(&fourcc.0)
    }
}

/// Video format specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format.
    pub fourcc: FourCC,
    /// Bytes per line (stride).
    pub stride: u32,
    /// Total frame size in bytes.
    pub size: u32,
}

impl Format {
    /// Create a new format, deriving stride and size from the pixel format.
    #[must_use]
    pub const fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        let bytes_per_pixel = if fourcc.0[0] == b'R' { 3 } else { 2 };
        let stride = width * bytes_per_pixel;
        let size = stride * height;
        Self {
            width,
            height,
            fourcc,
            stride,
            size,
        }
    }
}

/// How the sensor is set up for still capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StillProfile {
    /// Requested resolution and pixel format.
    pub format: Format,
    /// Number of mmap buffers queued while streaming.
    pub buffer_count: u32,
    /// Frames thrown away before the one that is kept.
    pub warmup_frames: u32,
    /// Sensor frame rate, if the driver lets us pick one.
    pub frame_rate: Option<u32>,
    /// JPEG quality, 1 to 100.
    pub jpeg_quality: u8,
}

/// A single sensor setting pushed to the camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Control {
    /// Exposure time in microseconds.
    ExposureTime(u32),
    /// Analogue gain multiplier.
    AnalogueGain(f32),
    /// Automatic exposure on or off.
    AutoExposure(bool),
    /// Continuous autofocus on or off.
    AutoFocus(bool),
    /// Frames per second.
    FrameRate(u32),
}

/// Metadata for a captured frame.
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    /// Frame sequence number.
    pub sequence: u32,
    /// Capture timestamp.
    pub timestamp: Duration,
    /// Actual bytes used in the frame buffer.
    pub bytes_used: u32,
    /// Layout of `Frame::data`.
    pub format: Format,
    /// Exposure time last pushed to the sensor, in microseconds.
    pub exposure_us: Option<u32>,
}

/// A captured video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw frame data.
    pub data: Vec<u8>,
    /// Frame metadata.
    pub metadata: FrameMetadata,
}

impl Frame {
    /// Get RGB values for a YUYV pixel, or `None` when out of bounds.
    ///
    /// Odd x coordinates use the second luma sample of the pair with the
    /// shared chroma values.
    #[must_use]
    pub fn pixel_at(&self, x: u32, y: u32) -> Option<(u8, u8, u8)> {
        let format = &self.metadata.format;
        if x >= format.width || y >= format.height {
            return None;
        }

        // [Y0 U Y1 V] per pixel pair
        let pair_x = x & !1;
        let offset = (y * format.stride + pair_x * 2) as usize;

        let luma = if x % 2 == 0 {
            *self.data.get(offset)?
        } else {
            *self.data.get(offset + 2)?
        };
        let u = *self.data.get(offset + 1)?;
        let v = *self.data.get(offset + 3)?;

        Some(yuv_to_rgb(luma, u, v))
    }
}

/// Convert YUV values to RGB (ITU-R BT.601).
#[must_use]
#[allow(clippy::many_single_char_names)]
pub(crate) fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let y_f = f32::from(y);
    let u_f = f32::from(u) - 128.0;
    let v_f = f32::from(v) - 128.0;

    let r = 1.402f32.mul_add(v_f, y_f);
    let g = 0.714_14f32.mul_add(-v_f, 0.344_14f32.mul_add(-u_f, y_f));
    let b = 1.772f32.mul_add(u_f, y_f);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let clamp = |val: f32| -> u8 { val.clamp(0.0, 255.0) as u8 };

    (clamp(r), clamp(g), clamp(b))
}

/// Abstraction over the camera the rig captures from.
///
/// Calls arrive from a single thread; implementations need no locking.
pub trait CameraSession {
    /// Apply a still profile. Returns the format the driver settled on.
    fn configure(&mut self, profile: &StillProfile) -> Result<Format>;

    /// Make the session ready for `capture_buffer`.
    fn start(&mut self) -> Result<()>;

    /// Grab one frame with its metadata.
    fn capture_buffer(&mut self) -> Result<Frame>;

    /// Encode `frame` and write it to `path`.
    fn encode_and_save(&self, frame: &Frame, path: &Path) -> Result<()>;

    /// Push a single control to the sensor.
    fn set_control(&mut self, control: Control) -> Result<()>;
}

/// Source of button activations.
pub trait TriggerSource {
    /// Call `callback` every time `pin` activates. Electrical debouncing is
    /// the source's job.
    fn on_activate<F>(&mut self, pin: PinId, callback: F) -> rppal::gpio::Result<()>
    where
        F: FnMut() + Send + 'static;
}

/// The auxiliary output asserted before each accepted capture.
pub trait ShutterSignal {
    /// Drive the shutter-release line.
    fn release(&mut self) -> rppal::gpio::Result<()>;
}

/// A status light used to acknowledge setting changes.
pub trait Indicator {
    /// Flash `times` times. Blocks until done.
    fn blink(&mut self, times: u32);
}

/// Monotonic time source.
pub trait Clock {
    /// Current time.
    fn now(&self) -> Timestamp;
}
