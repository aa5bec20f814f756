//! Tuner driver seam
//!
//! The driver wraps the RF front end of an opened dongle. Every operation
//! is asynchronous and completes exactly once; failures come back as
//! [`TunerError`] and end the current session.

use std::future::Future;

use crate::error::TunerError;

/// Largest manual tuner gain the hardware accepts, in dB. Requested gains
/// are clamped to `[0.0, MAX_GAIN_DB]`.
pub const MAX_GAIN_DB: f32 = 47.4;

/// Operations on an opened tuner.
///
/// Methods take `&self`: the controller keeps two sample reads in flight
/// at once, so the driver must tolerate overlapped calls the way a shared
/// USB device handle does. Reconfiguration (`set_center_frequency`,
/// `reset_buffer`, `close`) is only ever issued once the controller has
/// drained all outstanding reads.
pub trait TunerDriver: Send + Sync + 'static {
    /// Set the sample rate, returning the rate actually configured.
    fn set_sample_rate(&self, hz: u32) -> impl Future<Output = Result<u32, TunerError>> + Send;

    /// Tune to the given center frequency.
    fn set_center_frequency(
        &self,
        hz: u32,
    ) -> impl Future<Output = Result<(), TunerError>> + Send;

    /// Discard whatever the dongle has buffered so the next read starts
    /// on fresh samples.
    fn reset_buffer(&self) -> impl Future<Output = Result<(), TunerError>> + Send;

    /// Read `count` samples, returning the raw I/Q byte buffer.
    fn read_samples(
        &self,
        count: usize,
    ) -> impl Future<Output = Result<Vec<u8>, TunerError>> + Send;

    /// Shut the tuner down. The device handle remains open and is released
    /// separately through the transport.
    fn close(&self) -> impl Future<Output = Result<(), TunerError>> + Send;
}
