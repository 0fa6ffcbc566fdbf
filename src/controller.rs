//! Maps button events to camera actions.
//!
//! The shutter button is debounced in software on top of the GPIO driver's
//! electrical debounce: a press is accepted only if at least `min_interval`
//! has passed since the last accepted press. Exposure and gain buttons are
//! applied immediately.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, error, info, trace, warn};

use crate::error::Result;
use crate::naming::FileNamer;
use crate::presets::ExposurePresetTable;
use crate::traits::{
    CameraSession, Control, Indicator, PinId, ShutterSignal, Timestamp, TriggerEvent,
};

/// What happened to a shutter press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutterOutcome {
    /// Inside the debounce window, dropped.
    Suppressed,
    /// Accepted and saved to the path.
    Captured(PathBuf),
    /// Accepted, but the capture failed and was logged.
    Failed,
}

/// Which physical button a pin is wired to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    /// Shutter release.
    Shutter,
    /// Gain cycling.
    Gain,
    /// Anything else, looked up in the preset table.
    Exposure(PinId),
}

/// Button pin assignment seen by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonMap {
    /// Shutter release pin.
    pub shutter: PinId,
    /// Gain pin, if fitted.
    pub gain: Option<PinId>,
}

impl ButtonMap {
    /// Classify `pin`.
    pub fn classify(&self, pin: PinId) -> Button {
        if pin == self.shutter {
            Button::Shutter
        } else if self.gain == Some(pin) {
            Button::Gain
        } else {
            Button::Exposure(pin)
        }
    }
}

/// Owns the camera and the debounce state.
pub struct CaptureController<C, S, I> {
    session: C,
    signal: S,
    indicator: I,
    namer: FileNamer,
    capture_dir: PathBuf,
    buttons: ButtonMap,
    presets: ExposurePresetTable,
    min_interval: Duration,
    last_accepted: Option<Timestamp>,
    gain_steps: Vec<f32>,
    gain_index: usize,
}

impl<C, S, I> CaptureController<C, S, I>
where
    C: CameraSession,
    S: ShutterSignal,
    I: Indicator,
{
    /// Create a controller writing into `capture_dir`.
    pub fn new(
        session: C,
        signal: S,
        indicator: I,
        capture_dir: PathBuf,
        buttons: ButtonMap,
        presets: ExposurePresetTable,
        min_interval: Duration,
    ) -> Self {
        Self {
            session,
            signal,
            indicator,
            namer: FileNamer::default(),
            capture_dir,
            buttons,
            presets,
            min_interval,
            last_accepted: None,
            gain_steps: Vec::new(),
            gain_index: 0,
        }
    }

    /// Use `namer` instead of the default `picam_<n>.jpg`.
    #[must_use]
    pub fn with_namer(mut self, namer: FileNamer) -> Self {
        self.namer = namer;
        self
    }

    /// Gain values the gain button cycles through, starting from `current`.
    #[must_use]
    pub fn with_gain_steps(mut self, steps: Vec<f32>, current: f32) -> Self {
        self.gain_index = steps
            .iter()
            .position(|&gain| (gain - current).abs() < f32::EPSILON)
            .unwrap_or(0);
        self.gain_steps = steps;
        self
    }

    /// The camera session.
    pub const fn session(&self) -> &C {
        &self.session
    }

    /// The shutter signal output.
    pub const fn signal(&self) -> &S {
        &self.signal
    }

    /// The indicator.
    pub const fn indicator(&self) -> &I {
        &self.indicator
    }

    /// Directory captures go to.
    pub fn capture_dir(&self) -> &Path {
        &self.capture_dir
    }

    /// When the last shutter press was accepted.
    pub const fn last_accepted(&self) -> Option<Timestamp> {
        self.last_accepted
    }

    /// Give the session back, e.g. to close it.
    pub fn into_session(self) -> C {
        self.session
    }

    /// Route an event to the handler for its pin.
    pub fn dispatch(&mut self, event: TriggerEvent) {
        match self.buttons.classify(event.pin) {
            Button::Shutter => {
                self.on_shutter_trigger(event.at);
            }
            Button::Gain => self.on_gain_trigger(),
            Button::Exposure(pin) => self.on_exposure_trigger(pin),
        }
    }

    /// Handle a shutter press at `now`.
    ///
    /// Errors from the capture are logged here; the controller stays armed.
    pub fn on_shutter_trigger(&mut self, now: Timestamp) -> ShutterOutcome {
        if let Some(last) = self.last_accepted {
            if now.saturating_sub(last) < self.min_interval {
                trace!(?now, ?last, "shutter press inside debounce window");
                return ShutterOutcome::Suppressed;
            }
        }
        self.last_accepted = Some(now);

        if let Err(err) = self.signal.release() {
            warn!("Shutter signal failed: {err}");
        }
        info!("Button pressed, releasing shutter");

        match self.capture_and_save() {
            Ok(path) => ShutterOutcome::Captured(path),
            Err(err) => {
                error!("Capture failed: {err}");
                ShutterOutcome::Failed
            }
        }
    }

    /// Apply the exposure preset bound to `pin`, if there is one.
    pub fn on_exposure_trigger(&mut self, pin: PinId) {
        let Some(preset) = self.presets.get(pin) else {
            warn!(pin, "No exposure preset bound to pin");
            return;
        };
        let (exposure_us, label, blinks) = (preset.exposure_us, preset.label.clone(), preset.blinks);

        match self.session.set_control(Control::ExposureTime(exposure_us)) {
            Ok(()) => {
                self.indicator.blink(blinks);
                info!("Exposure set to {label} sec ({exposure_us} us)");
            }
            Err(err) => error!("Setting exposure {label} failed: {err}"),
        }
    }

    /// Step to the next analogue gain value.
    pub fn on_gain_trigger(&mut self) {
        if self.gain_steps.is_empty() {
            warn!("Gain button pressed but no gain steps are configured");
            return;
        }
        let next = (self.gain_index + 1) % self.gain_steps.len();
        let Some(&gain) = self.gain_steps.get(next) else {
            return;
        };

        match self.session.set_control(Control::AnalogueGain(gain)) {
            Ok(()) => {
                self.gain_index = next;
                self.indicator.blink(u32::try_from(next + 1).unwrap_or(u32::MAX));
                info!("Gain set to {gain}");
            }
            Err(err) => error!("Setting gain {gain} failed: {err}"),
        }
    }

    /// Grab a frame and write it as the next capture file.
    ///
    /// The indicator blinks once after the file is written.
    pub fn capture_and_save(&mut self) -> Result<PathBuf> {
        let frame = self.session.capture_buffer()?;
        let path = self.namer.next_path(&self.capture_dir)?;
        self.session.encode_and_save(&frame, &path)?;
        self.indicator.blink(1);

        let meta = &frame.metadata;
        debug!(
            sequence = meta.sequence,
            width = meta.format.width,
            height = meta.format.height,
            exposure_us = meta.exposure_us,
            "frame saved"
        );
        info!("Captured image: {}", path.display());
        Ok(path)
    }
}
