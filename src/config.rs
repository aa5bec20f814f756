//! Configuration loaded from environment variables

use crate::device::{DeviceId, KNOWN_TUNERS};
use crate::error::RadioError;

/// Radio controller configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Sample rate in Hz. Must be a multiple of `512 * buffers_per_second`
    /// so that read requests stay block-aligned.
    pub sample_rate: u32,

    /// How many sample buffers to read per second of streaming.
    pub buffers_per_second: u32,

    /// Initial center frequency in Hz.
    pub frequency_hz: u32,

    /// PPM frequency correction passed to the tuner at open time.
    pub ppm_correction: i32,

    /// USB devices to search, in order.
    pub devices: Vec<DeviceId>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_rate: 1_024_000,
            buffers_per_second: 100,
            frequency_hz: 82_500_000,
            ppm_correction: 0,
            devices: KNOWN_TUNERS.to_vec(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            sample_rate: std::env::var("RADIO_SAMPLE_RATE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.sample_rate),

            buffers_per_second: std::env::var("RADIO_BUFFERS_PER_SEC")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.buffers_per_second),

            frequency_hz: std::env::var("RADIO_FREQUENCY_HZ")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.frequency_hz),

            ppm_correction: std::env::var("RADIO_PPM_CORRECTION")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.ppm_correction),

            devices: defaults.devices,
        }
    }

    /// Samples requested per read; the pipeline issues fixed-size reads of
    /// this many samples.
    pub fn samples_per_buffer(&self) -> usize {
        (self.sample_rate / self.buffers_per_second) as usize
    }

    /// Check the invariants the streaming pipeline relies on.
    pub fn validate(&self) -> Result<(), RadioError> {
        if self.buffers_per_second == 0 {
            return Err(RadioError::Config(
                "buffers_per_second must be non-zero".into(),
            ));
        }
        if self.sample_rate % (512 * self.buffers_per_second) != 0 {
            return Err(RadioError::Config(format!(
                "sample rate {} is not a multiple of 512 * {} buffers/sec",
                self.sample_rate, self.buffers_per_second
            )));
        }
        if self.devices.is_empty() {
            return Err(RadioError::Config("no tuner devices configured".into()));
        }
        Ok(())
    }
}
