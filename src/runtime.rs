//! Process lifecycle: hardware setup, the event loop, and teardown.
//!
//! GPIO interrupts arrive on driver threads. Their callbacks only stamp a
//! [`TriggerEvent`] and push it into a channel; the loop here hands events
//! to the controller one at a time, in arrival order.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use rppal::gpio::Gpio;
use tracing::{debug, info, warn};

use crate::clock::MonotonicClock;
use crate::config::Config;
use crate::controller::{ButtonMap, CaptureController};
use crate::device::V4L2Session;
use crate::error::{CameraError, Error};
use crate::gpio::{self, GpioLed, GpioSignal, GpioTriggers};
use crate::traits::{
    CameraSession, Clock, Control, Format, Indicator, PinId, ShutterSignal, TriggerEvent,
    TriggerSource,
};

/// How often the idle loop checks for shutdown.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shared stop flag, set from the signal handler.
#[derive(Debug, Clone, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    /// Flag that trips on SIGINT or SIGTERM.
    pub fn install() -> Result<Self, ctrlc::Error> {
        let shutdown = Self::default();
        let handle = shutdown.clone();
        ctrlc::set_handler(move || {
            info!("Shutting down...");
            handle.request();
        })?;
        Ok(shutdown)
    }

    /// Ask the loop to stop.
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was asked for.
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Create the capture directory if it does not exist.
pub fn prepare_capture_dir(path: &Path) -> Result<(), Error> {
    fs::create_dir_all(path).map_err(|source| Error::CaptureDir {
        path: path.to_path_buf(),
        source,
    })
}

/// Configure and start `session`, then push the initial sensor settings.
///
/// Configuration and start failures are fatal. Individual controls the
/// driver rejects are logged and skipped, since sensor drivers differ in
/// what they expose.
pub fn setup_camera<C: CameraSession>(
    session: &mut C,
    config: &Config,
) -> Result<Format, CameraError> {
    let format = session.configure(&config.profile)?;
    session.start()?;

    let initial = [
        Control::AutoExposure(false),
        Control::AutoFocus(false),
        Control::ExposureTime(config.initial.exposure_us),
        Control::AnalogueGain(config.initial.analogue_gain),
    ];
    for control in initial {
        if let Err(err) = session.set_control(control) {
            warn!("Initial control skipped: {err}");
        }
    }
    Ok(format)
}

/// Forward activations of every pin in `pins` into `events`, stamped by `clock`.
pub fn register_buttons<T, K>(
    triggers: &mut T,
    pins: &[PinId],
    clock: &K,
    events: &Sender<TriggerEvent>,
) -> rppal::gpio::Result<()>
where
    T: TriggerSource,
    K: Clock + Clone + Send + 'static,
{
    for &pin in pins {
        let clock = clock.clone();
        let events = events.clone();
        triggers.on_activate(pin, move || {
            let event = TriggerEvent {
                pin,
                at: clock.now(),
            };
            // Receiver gone means we are shutting down
            let _ = events.send(event);
        })?;
    }
    Ok(())
}

/// Feed events to `controller` until shutdown or until every sender is gone.
///
/// Returns the number of events handled.
pub fn run_loop<C, S, I>(
    controller: &mut CaptureController<C, S, I>,
    events: &Receiver<TriggerEvent>,
    shutdown: &Shutdown,
    poll: Duration,
) -> usize
where
    C: CameraSession,
    S: ShutterSignal,
    I: Indicator,
{
    let mut handled = 0;
    while !shutdown.is_requested() {
        match events.recv_timeout(poll) {
            Ok(event) => {
                debug!(pin = event.pin, at = ?event.at, "trigger");
                controller.dispatch(event);
                handled += 1;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    handled
}

/// Input pins the rig listens on: shutter, gain (if fitted), then presets.
pub fn button_pins(config: &Config) -> Vec<PinId> {
    let mut pins = vec![config.pins.shutter];
    pins.extend(config.pins.gain);
    pins.extend(config.presets.iter().map(|preset| preset.pin));
    pins
}

/// Bring up the rig on real hardware and run until interrupted.
pub fn run(config: &Config) -> Result<(), Error> {
    prepare_capture_dir(&config.capture_dir)?;

    let chip = Gpio::new()?;
    gpio::screen_off(&chip, config.pins.screen)?;

    let mut session = V4L2Session::open(config.device_index)?;
    setup_camera(&mut session, config)?;

    let signal = GpioSignal::new(&chip, config.pins.signal)?;
    let led = GpioLed::new(&chip, config.pins.led)?;
    let buttons = ButtonMap {
        shutter: config.pins.shutter,
        gain: config.pins.gain,
    };
    let mut controller = CaptureController::new(
        session,
        signal,
        led,
        config.capture_dir.clone(),
        buttons,
        config.presets.clone(),
        config.min_interval,
    )
    .with_gain_steps(config.gain_steps.clone(), config.initial.analogue_gain);

    let shutdown = Shutdown::install()?;
    let (tx, rx) = mpsc::channel();
    let mut triggers = GpioTriggers::new(chip, config.gpio_debounce);
    register_buttons(&mut triggers, &button_pins(config), &MonotonicClock::new(), &tx)?;
    drop(tx);

    info!(
        "Camera and buttons initialized on GPIOs {:?}. Waiting for button press...",
        triggers.pins()
    );
    let handled = run_loop(&mut controller, &rx, &shutdown, POLL_INTERVAL);

    drop(triggers);
    drop(controller.into_session());
    info!("Exiting after {handled} button events");
    Ok(())
}
