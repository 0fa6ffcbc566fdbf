//! V4L2 camera session using the v4l crate.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::control::{Control as V4lControl, Value};
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream as V4lCaptureStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::Device;

use crate::encode;
use crate::error::{CameraError, Result};
use crate::traits::{CameraSession, Control, Format, FourCC, Frame, FrameMetadata, StillProfile};

// V4L2 control ids (linux/v4l2-controls.h)
const CID_EXPOSURE_AUTO: u32 = 0x009a_0901;
const CID_EXPOSURE_ABSOLUTE: u32 = 0x009a_0902;
const CID_FOCUS_AUTO: u32 = 0x009a_090c;
const CID_GAIN: u32 = 0x0098_0913;
const CID_ANALOGUE_GAIN: u32 = 0x009e_0903;

// V4L2_EXPOSURE_MANUAL / V4L2_EXPOSURE_APERTURE_PRIORITY
const EXPOSURE_MANUAL: i64 = 1;
const EXPOSURE_APERTURE_PRIORITY: i64 = 3;

/// Device capability flags.
#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    /// Driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Whether the device can capture video.
    pub can_capture: bool,
    /// Whether the device supports streaming.
    pub can_stream: bool,
}

/// Still-capture session on a V4L2 device.
///
/// A stream is opened per capture so the session holds no borrowed
/// buffers between presses. Dropping the session closes the device.
pub struct V4L2Session {
    device: Device,
    capabilities: DeviceCapabilities,
    format: Format,
    buffer_count: u32,
    warmup_frames: u32,
    quality: u8,
    exposure_us: Option<u32>,
    started: bool,
}

impl V4L2Session {
    /// Open a V4L2 device by index (e.g., 0 for /dev/video0).
    pub fn open(index: u32) -> Result<Self> {
        if !Path::new(&format!("/dev/video{index}")).exists() {
            return Err(CameraError::DeviceNotFound(index));
        }

        let device = Device::new(index as usize)
            .map_err(|err| CameraError::DeviceOpenFailed(err.to_string()))?;

        let caps = device
            .query_caps()
            .map_err(|err| CameraError::DeviceOpenFailed(err.to_string()))?;

        let capabilities = DeviceCapabilities {
            driver: caps.driver,
            card: caps.card,
            bus_info: caps.bus,
            can_capture: caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE),
            can_stream: caps.capabilities.contains(v4l::capability::Flags::STREAMING),
        };
        info!(
            "Opened {} ({}) on {}",
            capabilities.card, capabilities.driver, capabilities.bus_info
        );

        let format = read_format(&device)?;
        Ok(Self {
            device,
            capabilities,
            format,
            buffer_count: 4,
            warmup_frames: 0,
            quality: 90,
            exposure_us: None,
            started: false,
        })
    }

    /// Capabilities reported by the driver.
    pub const fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    /// Format currently in effect.
    pub const fn format(&self) -> &Format {
        &self.format
    }

    fn write_control(&self, control: Control, id: u32, value: Value) -> Result<()> {
        self.device
            .set_control(V4lControl { id, value })
            .map_err(|err| CameraError::ControlRejected {
                control,
                reason: err.to_string(),
            })
    }

    fn gain_control(&self, control: Control, gain: f32) -> Result<()> {
        let controls = self
            .device
            .query_controls()
            .map_err(|err| CameraError::ControlRejected {
                control,
                reason: err.to_string(),
            })?;
        let description = controls
            .iter()
            .find(|desc| desc.id == CID_ANALOGUE_GAIN)
            .or_else(|| controls.iter().find(|desc| desc.id == CID_GAIN))
            .ok_or_else(|| CameraError::ControlRejected {
                control,
                reason: "driver exposes no gain control".to_owned(),
            })?;

        let value = gain_value(gain, description.minimum, description.maximum).ok_or_else(|| {
            CameraError::ControlRejected {
                control,
                reason: format!(
                    "driver reports an empty gain range {}..={}",
                    description.minimum, description.maximum
                ),
            }
        })?;
        self.write_control(control, description.id, Value::Integer(value))
    }
}

/// Gain in hundredths of the multiplier, clamped to `minimum..=maximum`.
/// `None` when the driver reports an inverted range.
fn gain_value(gain: f32, minimum: i64, maximum: i64) -> Option<i64> {
    if minimum > maximum {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let value = (f64::from(gain) * 100.0).round() as i64;
    Some(value.clamp(minimum, maximum))
}

fn read_format(device: &Device) -> Result<Format> {
    device
        .format()
        .map(|fmt| from_v4l(&fmt))
        .map_err(|err| CameraError::StreamError(err.to_string()))
}

fn from_v4l(fmt: &v4l::Format) -> Format {
    Format {
        width: fmt.width,
        height: fmt.height,
        fourcc: FourCC::from(fmt.fourcc),
        stride: fmt.stride,
        size: fmt.size,
    }
}

impl CameraSession for V4L2Session {
    fn configure(&mut self, profile: &StillProfile) -> Result<Format> {
        let mut fmt = self
            .device
            .format()
            .map_err(|err| CameraError::StreamError(err.to_string()))?;

        fmt.width = profile.format.width;
        fmt.height = profile.format.height;
        fmt.fourcc = profile.format.fourcc.into();

        let fmt = self
            .device
            .set_format(&fmt)
            .map_err(|err| CameraError::StreamError(err.to_string()))?;

        let actual = from_v4l(&fmt);
        if actual.fourcc != profile.format.fourcc {
            return Err(CameraError::FormatNotSupported(profile.format.clone()));
        }
        if actual.width != profile.format.width || actual.height != profile.format.height {
            info!(
                "Driver adjusted resolution to {}x{} (asked {}x{})",
                actual.width, actual.height, profile.format.width, profile.format.height
            );
        }

        if let Some(fps) = profile.frame_rate {
            if let Err(err) = self.set_control(Control::FrameRate(fps)) {
                warn!("Frame rate left at driver default: {err}");
            }
        }

        self.format = actual.clone();
        self.buffer_count = profile.buffer_count;
        self.warmup_frames = profile.warmup_frames;
        self.quality = profile.jpeg_quality;
        Ok(actual)
    }

    fn start(&mut self) -> Result<()> {
        if !self.capabilities.can_capture {
            return Err(CameraError::Unsupported("capture video"));
        }
        if !self.capabilities.can_stream {
            return Err(CameraError::Unsupported("stream"));
        }
        self.started = true;
        info!(
            "Camera ready: {}x{} {:?}",
            self.format.width, self.format.height, self.format.fourcc
        );
        Ok(())
    }

    fn capture_buffer(&mut self) -> Result<Frame> {
        if !self.started {
            return Err(CameraError::StreamError("session not started".to_owned()));
        }

        let mut stream = Stream::with_buffers(&self.device, Type::VideoCapture, self.buffer_count)
            .map_err(|err| CameraError::StreamError(err.to_string()))?;

        // Skip frames exposed before the press so the kept one uses current settings
        for _ in 0..self.warmup_frames {
            stream
                .next()
                .map_err(|err| CameraError::StreamError(err.to_string()))?;
        }

        let (buf, meta) = stream
            .next()
            .map_err(|err| CameraError::StreamError(err.to_string()))?;

        // Safe conversions: V4L2 timestamps are always non-negative in practice
        #[allow(clippy::cast_sign_loss)]
        let secs = meta.timestamp.sec.max(0) as u64;
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let nanos = (meta.timestamp.usec.max(0) as u32).saturating_mul(1000);

        debug!(sequence = meta.sequence, bytes = meta.bytesused, "frame dequeued");

        Ok(Frame {
            data: buf.to_vec(),
            metadata: FrameMetadata {
                sequence: meta.sequence,
                timestamp: Duration::new(secs, nanos),
                bytes_used: meta.bytesused,
                format: self.format.clone(),
                exposure_us: self.exposure_us,
            },
        })
    }

    fn encode_and_save(&self, frame: &Frame, path: &Path) -> Result<()> {
        encode::save_jpeg(frame, self.quality, path)
    }

    fn set_control(&mut self, control: Control) -> Result<()> {
        match control {
            Control::ExposureTime(us) => {
                // V4L2 absolute exposure is in 100 us units
                let value = i64::from((us / 100).max(1));
                self.write_control(control, CID_EXPOSURE_ABSOLUTE, Value::Integer(value))?;
                self.exposure_us = Some(us);
            }
            Control::AnalogueGain(gain) => self.gain_control(control, gain)?,
            Control::AutoExposure(enabled) => {
                let mode = if enabled {
                    EXPOSURE_APERTURE_PRIORITY
                } else {
                    EXPOSURE_MANUAL
                };
                self.write_control(control, CID_EXPOSURE_AUTO, Value::Integer(mode))?;
            }
            Control::AutoFocus(enabled) => {
                self.write_control(control, CID_FOCUS_AUTO, Value::Boolean(enabled))?;
            }
            Control::FrameRate(fps) => {
                self.device
                    .set_params(&Parameters::with_fps(fps))
                    .map_err(|err| CameraError::ControlRejected {
                        control,
                        reason: err.to_string(),
                    })?;
            }
        }
        debug!(?control, "control applied");
        Ok(())
    }
}
