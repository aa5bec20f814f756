//! High-level radio control
//!
//! [`RadioController`] is the cloneable front half: it queues requests to
//! the engine task and reads published state snapshots. The engine
//! (`engine.rs`) owns the device, the tuner and the sample pipeline, and
//! is the single writer of controller state. A requested transition never
//! takes effect synchronously; it is applied on the engine's next
//! dispatch.

mod engine;
mod state;

pub use state::{RadioState, StateSnapshot};

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::config::Config;
use crate::device::DeviceTransport;
use crate::error::RadioError;

use engine::Engine;
use state::Completion;

/// Observer invoked on every committed state transition.
pub(crate) type ObserverFn = Box<dyn Fn(&StateSnapshot) + Send>;

/// Sink receiving every controller and driver error.
pub(crate) type ErrorSinkFn = Box<dyn Fn(&RadioError) + Send>;

/// Requests accepted by the engine task.
pub(crate) enum Command {
    Start(Option<Completion>),
    Stop(Option<Completion>),
    SetFrequency(u32),
    SetAutoGain,
    SetManualGain(f32),
    SetObserver(ObserverFn),
    SetOnError(ErrorSinkFn),
}

/// Handle to a running radio controller.
///
/// Cheap to clone; all clones talk to the same engine. When the last
/// clone is dropped the engine shuts the radio down and exits.
#[derive(Clone)]
pub struct RadioController {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<StateSnapshot>,
}

impl RadioController {
    /// Spawn the controller engine onto the current Tokio runtime.
    ///
    /// The controller starts in the off state; call [`start`] to begin
    /// streaming. Returns an error when the configuration is invalid.
    ///
    /// [`start`]: RadioController::start
    pub fn spawn<T: DeviceTransport>(transport: T, config: Config) -> Result<Self, RadioError> {
        config.validate()?;

        let (commands, cmd_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshots) = watch::channel(StateSnapshot {
            state: RadioState::Off,
            frequency_hz: config.frequency_hz,
            auto_gain: true,
            manual_gain_db: 0.0,
            samples: None,
        });

        tokio::spawn(Engine::new(transport, config, cmd_rx, snapshot_tx).run());

        Ok(Self {
            commands,
            snapshots,
        })
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("radio engine is gone; command dropped");
        }
    }

    /// Start playing the radio.
    pub fn start(&self) {
        self.send(Command::Start(None));
    }

    /// Start playing the radio; `on_ready` fires once streaming begins
    /// (immediately when the radio is already playing).
    pub fn start_with(&self, on_ready: impl FnOnce() + Send + 'static) {
        self.send(Command::Start(Some(Box::new(on_ready))));
    }

    /// Stop playing the radio.
    pub fn stop(&self) {
        self.send(Command::Stop(None));
    }

    /// Stop playing the radio; `on_stopped` fires after teardown
    /// completes (immediately when the radio is already off).
    pub fn stop_with(&self, on_stopped: impl FnOnce() + Send + 'static) {
        self.send(Command::Stop(Some(Box::new(on_stopped))));
    }

    /// Tune to another center frequency. While streaming, the change is
    /// applied once all in-flight sample reads have drained.
    pub fn set_frequency(&self, hz: u32) {
        self.send(Command::SetFrequency(hz));
    }

    /// Currently committed center frequency in Hz.
    pub fn frequency(&self) -> u32 {
        self.snapshots.borrow().frequency_hz
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RadioState {
        self.snapshots.borrow().state
    }

    /// Whether the radio is playing (starting and retuning count).
    pub fn is_playing(&self) -> bool {
        self.state().is_playing()
    }

    /// Whether the radio is currently shutting down.
    pub fn is_stopping(&self) -> bool {
        self.state().is_stopping()
    }

    /// Select automatic tuner gain. Takes effect at the next tuner open.
    pub fn set_auto_gain(&self) {
        self.send(Command::SetAutoGain);
    }

    /// Select a manual tuner gain in dB, clamped to the supported range.
    pub fn set_manual_gain(&self, gain_db: f32) {
        self.send(Command::SetManualGain(gain_db));
    }

    /// Whether automatic gain is selected.
    pub fn is_auto_gain(&self) -> bool {
        self.snapshots.borrow().auto_gain
    }

    /// The configured manual gain in dB.
    pub fn manual_gain(&self) -> f32 {
        self.snapshots.borrow().manual_gain_db
    }

    /// Latest completed sample buffer, if any.
    pub fn samples(&self) -> Option<Arc<Vec<u8>>> {
        self.snapshots.borrow().samples.clone()
    }

    /// Full snapshot of the current controller state.
    pub fn snapshot(&self) -> StateSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Register the observer notified on every committed state
    /// transition. Replaces any previous observer.
    pub fn set_observer(&self, observer: impl Fn(&StateSnapshot) + Send + 'static) {
        self.send(Command::SetObserver(Box::new(observer)));
    }

    /// Register the error sink. Replaces any previous sink.
    ///
    /// Production callers must register a sink before starting: an error
    /// with no sink registered is fatal and aborts the process.
    pub fn set_on_error(&self, sink: impl Fn(&RadioError) + Send + 'static) {
        self.send(Command::SetOnError(Box::new(sink)));
    }
}
