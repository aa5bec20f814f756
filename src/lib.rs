//! RTL-SDR radio controller - device lifecycle, tuning and sample streaming
//!
//! Drives an RTL2832U-based USB dongle through acquisition, tuner setup,
//! continuous overlapped sample reads, live retuning and graceful teardown.
//! The hardware-facing side is abstracted behind [`DeviceTransport`] and
//! [`TunerDriver`], so the controller runs unchanged against a real USB
//! backend or a test double.

pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod tuner;

pub use config::Config;
pub use controller::{RadioController, RadioState, StateSnapshot};
pub use device::{DeviceId, DeviceTransport};
pub use error::{RadioError, TunerError};
pub use tuner::TunerDriver;
