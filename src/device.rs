//! USB device identity and the transport seam
//!
//! The transport is the layer that grants USB access, enumerates dongles
//! and hands out opened tuners. The controller never talks to the bus
//! directly; everything goes through [`DeviceTransport`].

use std::future::Future;

use crate::error::TunerError;
use crate::tuner::TunerDriver;

/// USB vendor/product pair identifying a supported tuner dongle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceId {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }
}

/// RTL2832U dongles the controller knows how to drive.
pub const KNOWN_TUNERS: [DeviceId; 2] = [
    DeviceId::new(0x0bda, 0x2832),
    DeviceId::new(0x0bda, 0x2838),
];

/// Device locator and tuner factory.
///
/// All operations are asynchronous and complete exactly once. Methods are
/// declared in desugared form (`-> impl Future + Send`) so the engine task
/// holding the transport stays spawnable onto the runtime.
pub trait DeviceTransport: Send + 'static {
    /// Opaque handle to an acquired USB device. Held by the controller
    /// between acquisition and release.
    type Handle: Send + 'static;

    /// The tuner type produced by [`DeviceTransport::open_tuner`].
    type Tuner: TunerDriver;

    /// Ask the platform for permission to access the listed devices.
    /// Returns `false` when the user or OS refuses.
    fn request_permission(
        &mut self,
        devices: &[DeviceId],
    ) -> impl Future<Output = bool> + Send;

    /// Look for a connected device matching `id`.
    fn find_device(
        &mut self,
        id: DeviceId,
    ) -> impl Future<Output = Option<Self::Handle>> + Send;

    /// Open the tuner on an acquired device with the given ppm frequency
    /// correction and gain (`None` selects automatic gain).
    fn open_tuner(
        &mut self,
        handle: &mut Self::Handle,
        ppm_correction: i32,
        gain_db: Option<f32>,
    ) -> impl Future<Output = Result<Self::Tuner, TunerError>> + Send;

    /// Release an acquired device handle.
    fn close_device(&mut self, handle: Self::Handle) -> impl Future<Output = ()> + Send;
}
