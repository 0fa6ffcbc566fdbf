//! Mock capabilities for testing without hardware.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::Level;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

use crate::encode;
use crate::error::{CameraError, Result};
use crate::traits::{
    CameraSession, Clock, Control, Format, FourCC, Frame, FrameMetadata, Indicator, PinId,
    ShutterSignal, StillProfile, Timestamp, TriggerSource,
};

/// Test pattern types for mock frame generation.
#[derive(Debug, Clone, Copy)]
pub enum TestPattern {
    /// Eight vertical color bars.
    ColorBars,
    /// Horizontal gradient from dark to light.
    Gradient,
    /// Solid color with specified Y, U, V values.
    Solid(u8, u8, u8),
}

/// Build a YUYV frame filled with `pattern`.
pub fn test_frame(format: Format, pattern: TestPattern, sequence: u32) -> Frame {
    let size = format.size as usize;
    let mut data = vec![0u8; size];

    for (i, quad) in data.chunks_exact_mut(4).enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let x = ((i * 2) % format.width.max(1) as usize) as u32;
        let (y, u, v) = match pattern {
            TestPattern::ColorBars => {
                const BARS: [(u8, u8, u8); 8] = [
                    (235, 128, 128),
                    (210, 16, 146),
                    (170, 166, 16),
                    (145, 54, 34),
                    (106, 202, 222),
                    (81, 90, 240),
                    (41, 240, 110),
                    (16, 128, 128),
                ];
                let bar = (x * 8 / format.width.max(1)).min(7) as usize;
                BARS.get(bar).copied().unwrap_or((16, 128, 128))
            }
            #[allow(clippy::cast_possible_truncation)]
            TestPattern::Gradient => (((x * 255) / format.width.max(1)) as u8, 128, 128),
            TestPattern::Solid(y, u, v) => (y, u, v),
        };
        quad.copy_from_slice(&[y, u, y, v]);
    }

    Frame {
        data,
        metadata: FrameMetadata {
            sequence,
            timestamp: Duration::from_millis(u64::from(sequence) * 33),
            bytes_used: format.size,
            format,
            exposure_us: None,
        },
    }
}

/// Call order shared between mocks. Clones append to the same list.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Rc<RefCell<Vec<&'static str>>>);

impl CallLog {
    /// Append `call`.
    pub fn record(&self, call: &'static str) {
        self.0.borrow_mut().push(call);
    }

    /// Calls so far, oldest first.
    pub fn calls(&self) -> Vec<&'static str> {
        self.0.borrow().clone()
    }
}

struct WarnCounter(Arc<AtomicUsize>);

impl<S: tracing::Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Run `f` and count the WARN events it emits.
pub fn count_warnings<F: FnOnce()>(f: F) -> usize {
    let warnings = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(WarnCounter(Arc::clone(&warnings)));
    tracing::subscriber::with_default(subscriber, f);
    warnings.load(Ordering::SeqCst)
}

/// Camera session that records every call.
pub struct MockSession {
    format: Format,
    quality: u8,
    /// Controls in the order they were set.
    pub controls: Vec<Control>,
    /// Frames handed out so far.
    pub captures: u32,
    /// Number of upcoming `capture_buffer` calls that fail with a busy error.
    pub fail_captures: u32,
    /// Number of upcoming `encode_and_save` calls that fail.
    pub fail_saves: Cell<u32>,
    /// Controls the "driver" refuses.
    pub rejected: Vec<Control>,
    /// Whether `start` was called.
    pub started: bool,
    /// Records `capture` and `save`.
    pub log: CallLog,
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSession {
    /// Small YUYV session so encoding stays fast.
    #[must_use]
    pub fn new() -> Self {
        Self {
            format: Format::new(32, 24, FourCC::YUYV),
            quality: 90,
            controls: Vec::new(),
            captures: 0,
            fail_captures: 0,
            fail_saves: Cell::new(0),
            rejected: Vec::new(),
            started: false,
            log: CallLog::default(),
        }
    }

    /// Exposure controls written so far.
    pub fn exposure_writes(&self) -> Vec<u32> {
        self.controls
            .iter()
            .filter_map(|control| match control {
                Control::ExposureTime(us) => Some(*us),
                _ => None,
            })
            .collect()
    }

    /// Most recent exposure written.
    pub fn exposure(&self) -> Option<u32> {
        self.exposure_writes().last().copied()
    }
}

impl CameraSession for MockSession {
    fn configure(&mut self, profile: &StillProfile) -> Result<Format> {
        self.format = profile.format.clone();
        self.quality = profile.jpeg_quality;
        Ok(self.format.clone())
    }

    fn start(&mut self) -> Result<()> {
        self.started = true;
        Ok(())
    }

    fn capture_buffer(&mut self) -> Result<Frame> {
        if self.fail_captures > 0 {
            self.fail_captures -= 1;
            return Err(CameraError::StreamError("device busy".to_owned()));
        }
        let mut frame = test_frame(self.format.clone(), TestPattern::ColorBars, self.captures);
        frame.metadata.exposure_us = self.exposure();
        self.captures += 1;
        self.log.record("capture");
        Ok(frame)
    }

    fn encode_and_save(&self, frame: &Frame, path: &Path) -> Result<()> {
        if self.fail_saves.get() > 0 {
            self.fail_saves.set(self.fail_saves.get() - 1);
            return Err(CameraError::Io(std::io::Error::other("disk full")));
        }
        encode::save_jpeg(frame, self.quality, path)?;
        self.log.record("save");
        Ok(())
    }

    fn set_control(&mut self, control: Control) -> Result<()> {
        if self.rejected.contains(&control) {
            return Err(CameraError::ControlRejected {
                control,
                reason: "not supported".to_owned(),
            });
        }
        self.controls.push(control);
        Ok(())
    }
}

/// Shutter output that counts releases and can be told to fail.
#[derive(Debug, Default)]
pub struct MockSignal {
    /// Successful releases.
    pub releases: u32,
    /// Fail every release.
    pub broken: bool,
    /// Records `release`.
    pub log: CallLog,
}

impl ShutterSignal for MockSignal {
    fn release(&mut self) -> rppal::gpio::Result<()> {
        if self.broken {
            return Err(rppal::gpio::Error::PinNotAvailable(47));
        }
        self.releases += 1;
        self.log.record("release");
        Ok(())
    }
}

/// Indicator that remembers each blink request.
#[derive(Debug, Default)]
pub struct MockIndicator {
    /// Blink counts in request order.
    pub blinks: Vec<u32>,
    /// Records `blink`.
    pub log: CallLog,
}

impl Indicator for MockIndicator {
    fn blink(&mut self, times: u32) {
        self.blinks.push(times);
        self.log.record("blink");
    }
}

type Callback = Box<dyn FnMut() + Send>;

/// Trigger source whose pins are "pressed" by the test.
#[derive(Default)]
pub struct MockTriggers {
    callbacks: HashMap<PinId, Callback>,
}

impl MockTriggers {
    /// Fire the callback registered for `pin`. Returns false if none is.
    pub fn press(&mut self, pin: PinId) -> bool {
        self.callbacks.get_mut(&pin).is_some_and(|callback| {
            callback();
            true
        })
    }

    /// Pins with a registered callback.
    pub fn pins(&self) -> Vec<PinId> {
        let mut pins: Vec<PinId> = self.callbacks.keys().copied().collect();
        pins.sort_unstable();
        pins
    }
}

impl TriggerSource for MockTriggers {
    fn on_activate<F>(&mut self, pin: PinId, callback: F) -> rppal::gpio::Result<()>
    where
        F: FnMut() + Send + 'static,
    {
        if self.callbacks.contains_key(&pin) {
            return Err(rppal::gpio::Error::PinUsed(pin));
        }
        self.callbacks.insert(pin, Box::new(callback));
        Ok(())
    }
}

/// Clock advanced by hand. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    micros: Arc<AtomicU64>,
}

impl ManualClock {
    /// Jump to an absolute time.
    #[allow(clippy::cast_possible_truncation)]
    pub fn set(&self, at: Timestamp) {
        self.micros.store(at.as_micros() as u64, Ordering::SeqCst);
    }

    /// Move forward.
    pub fn advance(&self, by: Duration) {
        self.set(self.now() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Duration::from_micros(self.micros.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_bars_pattern() {
        let frame = test_frame(Format::new(64, 4, FourCC::YUYV), TestPattern::ColorBars, 0);
        assert_eq!(frame.data.len(), 64 * 4 * 2);
        // white first, black last
        assert_eq!(frame.data.first(), Some(&235));
        assert_eq!(frame.data.get(64 * 2 - 4), Some(&16));
    }

    #[test]
    fn test_mock_session_failures_count_down() {
        let mut session = MockSession::new();
        session.fail_captures = 1;

        assert!(session.capture_buffer().is_err());
        let frame = session.capture_buffer().expect("second capture succeeds");
        assert_eq!(frame.metadata.sequence, 0);
        assert_eq!(session.captures, 1);
    }

    #[test]
    fn test_mock_triggers_reject_duplicate_pin() {
        let mut triggers = MockTriggers::default();
        triggers.on_activate(5, || {}).expect("first registration");
        assert!(triggers.on_activate(5, || {}).is_err());
        assert!(!triggers.press(6));
    }
}
