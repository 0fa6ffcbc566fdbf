//! Raspberry Pi GPIO buttons and outputs using rppal.

use std::thread;
use std::time::Duration;

use rppal::gpio::{Gpio, InputPin, OutputPin, Result, Trigger};
use tracing::{debug, info};

use crate::traits::{Indicator, PinId, ShutterSignal, TriggerSource};

const BLINK_ON: Duration = Duration::from_millis(30);
const BLINK_OFF: Duration = Duration::from_millis(300);

/// Pull-up buttons that fire on the falling edge.
pub struct GpioTriggers {
    gpio: Gpio,
    debounce: Duration,
    // Interrupts stay registered only while the pins are alive
    pins: Vec<InputPin>,
}

impl GpioTriggers {
    /// Buttons on `gpio`, debounced electrically by the driver for `debounce`.
    pub fn new(gpio: Gpio, debounce: Duration) -> Self {
        Self {
            gpio,
            debounce,
            pins: Vec::new(),
        }
    }

    /// Pins that have a callback.
    pub fn pins(&self) -> Vec<PinId> {
        self.pins.iter().map(InputPin::pin).collect()
    }
}

impl TriggerSource for GpioTriggers {
    fn on_activate<F>(&mut self, pin: PinId, mut callback: F) -> Result<()>
    where
        F: FnMut() + Send + 'static,
    {
        let mut input = self.gpio.get(pin)?.into_input_pullup();
        input.set_async_interrupt(Trigger::FallingEdge, Some(self.debounce), move |_| {
            callback();
        })?;
        debug!(pin, "button registered");
        self.pins.push(input);
        Ok(())
    }
}

/// Shutter-release line, driven high on each accepted press.
pub struct GpioSignal {
    pin: OutputPin,
}

impl GpioSignal {
    /// Claim `pin` as an output, starting low.
    pub fn new(gpio: &Gpio, pin: PinId) -> Result<Self> {
        Ok(Self {
            pin: gpio.get(pin)?.into_output_low(),
        })
    }
}

impl ShutterSignal for GpioSignal {
    fn release(&mut self) -> Result<()> {
        self.pin.set_high();
        Ok(())
    }
}

/// Indicator LED.
pub struct GpioLed {
    pin: OutputPin,
}

impl GpioLed {
    /// Claim `pin` as an output, starting dark.
    pub fn new(gpio: &Gpio, pin: PinId) -> Result<Self> {
        Ok(Self {
            pin: gpio.get(pin)?.into_output_low(),
        })
    }
}

impl Indicator for GpioLed {
    fn blink(&mut self, times: u32) {
        for _ in 0..times {
            self.pin.set_high();
            thread::sleep(BLINK_ON);
            self.pin.set_low();
            thread::sleep(BLINK_OFF);
        }
    }
}

/// Cut display power by driving `pin` low. The pin keeps its level after exit.
pub fn screen_off(gpio: &Gpio, pin: PinId) -> Result<()> {
    let mut output = gpio.get(pin)?.into_output_low();
    output.set_reset_on_drop(false);
    info!(pin, "Screen off");
    Ok(())
}
