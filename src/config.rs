//! Startup configuration read from `PICAM_*` environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::presets::ExposurePresetTable;
use crate::traits::{Format, FourCC, PinId, StillProfile};

/// GPIO assignment for the rig.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinConfig {
    /// Shutter button.
    pub shutter: PinId,
    /// Output driven high before each capture.
    pub signal: PinId,
    /// Indicator LED.
    pub led: PinId,
    /// Display power, driven low at startup.
    pub screen: PinId,
    /// Button that cycles analogue gain, if fitted.
    pub gain: Option<PinId>,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            shutter: 23,
            signal: 47,
            led: 12,
            screen: 24,
            gain: None,
        }
    }
}

/// Sensor settings applied once the camera is streaming.
#[derive(Debug, Clone, PartialEq)]
pub struct InitialControls {
    /// Exposure time in microseconds.
    pub exposure_us: u32,
    /// Analogue gain.
    pub analogue_gain: f32,
}

impl Default for InitialControls {
    fn default() -> Self {
        Self {
            exposure_us: 1_000_000 / 30,
            analogue_gain: 4.0,
        }
    }
}

/// Everything the rig needs to start.
#[derive(Debug, Clone)]
pub struct Config {
    /// Where captures are written.
    pub capture_dir: PathBuf,
    /// V4L2 device index (`/dev/video<n>`).
    pub device_index: u32,
    /// Still capture profile.
    pub profile: StillProfile,
    /// Settings pushed after start.
    pub initial: InitialControls,
    /// Gain values the gain button steps through.
    pub gain_steps: Vec<f32>,
    /// Button and output pins.
    pub pins: PinConfig,
    /// Exposure buttons.
    pub presets: ExposurePresetTable,
    /// Minimum time between two accepted shutter presses.
    pub min_interval: Duration,
    /// Electrical debounce applied by the GPIO driver.
    pub gpio_debounce: Duration,
}

impl Config {
    /// Defaults rooted at `capture_dir`.
    pub fn with_capture_dir(capture_dir: PathBuf) -> Self {
        Self {
            capture_dir,
            device_index: 0,
            profile: StillProfile {
                format: Format::new(2312, 1736, FourCC::YUYV),
                buffer_count: 4,
                warmup_frames: 2,
                frame_rate: Some(25),
                jpeg_quality: 90,
            },
            initial: InitialControls::default(),
            gain_steps: vec![2.0, 4.0, 8.0],
            pins: PinConfig::default(),
            presets: ExposurePresetTable::default(),
            min_interval: Duration::from_secs(1),
            gpio_debounce: Duration::from_millis(50),
        }
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve variable names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let capture_dir = match lookup("PICAM_CAPTURE_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => lookup("HOME")
                .map(|home| PathBuf::from(home).join("tapes"))
                .ok_or(ConfigError::NoCaptureDir)?,
        };

        let mut config = Self::with_capture_dir(capture_dir);
        let profile = &mut config.profile;

        config.device_index = parse(&lookup, "PICAM_DEVICE", config.device_index)?;
        let width = parse(&lookup, "PICAM_WIDTH", profile.format.width)?;
        let height = parse(&lookup, "PICAM_HEIGHT", profile.format.height)?;
        profile.format = Format::new(width, height, profile.format.fourcc);
        profile.buffer_count = parse(&lookup, "PICAM_BUFFERS", profile.buffer_count)?;
        profile.warmup_frames = parse(&lookup, "PICAM_WARMUP_FRAMES", profile.warmup_frames)?;
        profile.jpeg_quality = parse(&lookup, "PICAM_JPEG_QUALITY", profile.jpeg_quality)?;

        let pins = &mut config.pins;
        pins.shutter = parse(&lookup, "PICAM_SHUTTER_PIN", pins.shutter)?;
        pins.signal = parse(&lookup, "PICAM_SIGNAL_PIN", pins.signal)?;
        pins.led = parse(&lookup, "PICAM_LED_PIN", pins.led)?;
        pins.screen = parse(&lookup, "PICAM_SCREEN_PIN", pins.screen)?;
        if let Some(raw) = lookup("PICAM_GAIN_PIN") {
            pins.gain = Some(parse_value("PICAM_GAIN_PIN", &raw)?);
        }

        let min_interval_ms = parse(&lookup, "PICAM_MIN_INTERVAL_MS", 1000u64)?;
        config.min_interval = Duration::from_millis(min_interval_ms);
        let debounce_ms = parse(&lookup, "PICAM_GPIO_DEBOUNCE_MS", 50u64)?;
        config.gpio_debounce = Duration::from_millis(debounce_ms);

        if let Some(raw) = lookup("PICAM_EXPOSURE_PRESETS") {
            config.presets = ExposurePresetTable::parse(&raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject impossible values and pins used twice.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let quality = self.profile.jpeg_quality;
        if !(1..=100).contains(&quality) {
            return Err(ConfigError::Invalid {
                key: "PICAM_JPEG_QUALITY",
                value: quality.to_string(),
                reason: "must be between 1 and 100",
            });
        }
        if self.profile.buffer_count == 0 {
            return Err(ConfigError::Invalid {
                key: "PICAM_BUFFERS",
                value: "0".to_owned(),
                reason: "at least one buffer is needed",
            });
        }

        let mut used = vec![
            self.pins.shutter,
            self.pins.signal,
            self.pins.led,
            self.pins.screen,
        ];
        used.extend(self.pins.gain);
        used.extend(self.presets.iter().map(|preset| preset.pin));
        for (i, pin) in used.iter().enumerate() {
            if used.iter().skip(i + 1).any(|other| other == pin) {
                return Err(ConfigError::PinConflict(*pin));
            }
        }
        Ok(())
    }
}

fn parse<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key).map_or(Ok(default), |raw| parse_value(key, &raw))
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_owned(),
        reason: "not a valid number",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_from_home() {
        let config = Config::from_lookup(lookup(&[("HOME", "/home/pi")])).expect("config");

        assert_eq!(config.capture_dir, PathBuf::from("/home/pi/tapes"));
        assert_eq!(config.pins.shutter, 23);
        assert_eq!(config.pins.gain, None);
        assert_eq!(config.min_interval, Duration::from_secs(1));
        assert_eq!(config.profile.format.width, 2312);
        assert_eq!(config.profile.buffer_count, 4);
        assert_eq!(config.presets.len(), 4);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("PICAM_CAPTURE_DIR", "/data/shots"),
            ("PICAM_WIDTH", "4624"),
            ("PICAM_HEIGHT", "3472"),
            ("PICAM_GAIN_PIN", "20"),
            ("PICAM_MIN_INTERVAL_MS", "300"),
            ("PICAM_EXPOSURE_PRESETS", "5:250"),
        ]))
        .expect("config");

        assert_eq!(config.capture_dir, PathBuf::from("/data/shots"));
        assert_eq!(config.profile.format.height, 3472);
        assert_eq!(config.profile.format.stride, 4624 * 2);
        assert_eq!(config.pins.gain, Some(20));
        assert_eq!(config.min_interval, Duration::from_millis(300));
        assert_eq!(config.presets.len(), 1);
    }

    #[test]
    fn test_no_home_no_dir() {
        let result = Config::from_lookup(lookup(&[]));
        assert!(matches!(result, Err(ConfigError::NoCaptureDir)));
    }

    #[test]
    fn test_bad_number() {
        let result = Config::from_lookup(lookup(&[("HOME", "/h"), ("PICAM_SHUTTER_PIN", "abc")]));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                key: "PICAM_SHUTTER_PIN",
                ..
            })
        ));
    }

    #[test]
    fn test_pin_conflict() {
        // shutter on an exposure preset pin
        let result = Config::from_lookup(lookup(&[("HOME", "/h"), ("PICAM_SHUTTER_PIN", "19")]));
        assert!(matches!(result, Err(ConfigError::PinConflict(19))));
    }

    #[test]
    fn test_quality_out_of_range() {
        let result = Config::from_lookup(lookup(&[("HOME", "/h"), ("PICAM_JPEG_QUALITY", "0")]));
        assert!(result.is_err());
    }
}
