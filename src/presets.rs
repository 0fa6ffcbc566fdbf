//! Exposure presets bound to buttons.

use crate::error::ConfigError;
use crate::traits::PinId;

/// A fixed shutter duration selected by one button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposurePreset {
    /// Button that selects this preset.
    pub pin: PinId,
    /// Exposure time in microseconds.
    pub exposure_us: u32,
    /// Human readable speed, e.g. `1/250`.
    pub label: String,
    /// Indicator flashes acknowledging the selection. Faster presets blink more.
    pub blinks: u32,
}

/// Ordered pin to exposure mapping, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposurePresetTable {
    presets: Vec<ExposurePreset>,
}

impl Default for ExposurePresetTable {
    fn default() -> Self {
        Self {
            presets: vec![
                preset(19, 1000, 4),
                preset(5, 250, 3),
                preset(6, 60, 2),
                preset(26, 15, 1),
            ],
        }
    }
}

fn preset(pin: PinId, denominator: u32, blinks: u32) -> ExposurePreset {
    ExposurePreset {
        pin,
        exposure_us: 1_000_000 / denominator,
        label: format!("1/{denominator}"),
        blinks,
    }
}

impl ExposurePresetTable {
    /// Build a table from `(pin, 1/denominator seconds)` pairs, in order.
    ///
    /// Blink counts are ranked by speed: the fastest preset blinks once per
    /// preset in the table, the slowest once.
    pub fn from_denominators(entries: &[(PinId, u32)]) -> Result<Self, ConfigError> {
        let mut presets: Vec<ExposurePreset> = Vec::with_capacity(entries.len());
        for &(pin, denominator) in entries {
            if presets.iter().any(|existing| existing.pin == pin) {
                return Err(ConfigError::DuplicatePresetPin(pin));
            }
            if denominator == 0 {
                return Err(ConfigError::Invalid {
                    key: "PICAM_EXPOSURE_PRESETS",
                    value: format!("{pin}:{denominator}"),
                    reason: "denominator must be positive",
                });
            }
            presets.push(preset(pin, denominator, 0));
        }

        let exposures: Vec<u32> = presets.iter().map(|p| p.exposure_us).collect();
        for preset in &mut presets {
            let slower = exposures.iter().filter(|&&us| us > preset.exposure_us).count();
            preset.blinks = u32::try_from(slower + 1).unwrap_or(u32::MAX);
        }

        Ok(Self { presets })
    }

    /// Parse `pin:denominator` pairs separated by commas, e.g. `19:1000,5:250`.
    pub fn parse(list: &str) -> Result<Self, ConfigError> {
        let invalid = |reason| ConfigError::Invalid {
            key: "PICAM_EXPOSURE_PRESETS",
            value: list.to_owned(),
            reason,
        };

        let mut entries = Vec::new();
        for item in list.split(',').map(str::trim).filter(|item| !item.is_empty()) {
            let (pin, denominator) = item
                .split_once(':')
                .ok_or_else(|| invalid("expected pin:denominator"))?;
            let pin = pin.trim().parse().map_err(|_| invalid("pin is not a GPIO number"))?;
            let denominator = denominator
                .trim()
                .parse()
                .map_err(|_| invalid("denominator is not a number"))?;
            entries.push((pin, denominator));
        }
        Self::from_denominators(&entries)
    }

    /// Preset bound to `pin`.
    pub fn get(&self, pin: PinId) -> Option<&ExposurePreset> {
        self.presets.iter().find(|preset| preset.pin == pin)
    }

    /// Presets in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &ExposurePreset> {
        self.presets.iter()
    }

    /// Number of presets.
    pub fn len(&self) -> usize {
        self.presets.len()
    }

    /// True when no button selects an exposure.
    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}
