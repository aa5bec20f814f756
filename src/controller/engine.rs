//! Controller engine
//!
//! A single task owns the device handle, the opened tuner and the whole
//! controller state. It drives the state machine forward with sequential
//! asynchronous driver calls, then waits for the next request or sample
//! completion. Queued requests are drained at every dispatch step, which
//! is where start/stop redirects take effect: a redirect never cancels an
//! issued driver call, it only changes which branch the next dispatch
//! takes.

use std::mem;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::device::DeviceTransport;
use crate::error::{RadioError, TunerError};
use crate::tuner::{TunerDriver, MAX_GAIN_DB};

use super::state::{
    apply_start, apply_stop, apply_tune, Completion, Phase, StartStep, StateSnapshot, StopStep,
};
use super::{Command, ErrorSinkFn, ObserverFn};

/// Reads kept in flight while playing: one being serviced by the tuner
/// while the previous result is being consumed.
const PIPELINE_DEPTH: u32 = 2;

type ReadOutcome = Result<Vec<u8>, TunerError>;

/// What the current phase asks of the next dispatch step.
#[derive(Clone, Copy)]
enum Step {
    Idle,
    Start(StartStep),
    Pump,
    Retune(u32),
    Stop(StopStep),
}

pub(crate) struct Engine<T: DeviceTransport> {
    transport: T,
    cfg: Config,

    phase: Phase,
    frequency_hz: u32,
    auto_gain: bool,
    manual_gain_db: f32,
    // DC-offset / ppm calibration accumulators; reset on every (re)tune.
    #[allow(dead_code)]
    offset_sum: f64,
    #[allow(dead_code)]
    offset_count: i32,

    /// Sample reads issued to the tuner but not yet completed. Must drain
    /// to exactly zero before the tuner may be retuned or closed.
    in_flight: u32,
    samples: Option<Arc<Vec<u8>>>,

    handle: Option<T::Handle>,
    tuner: Option<Arc<T::Tuner>>,

    cmd_rx: mpsc::UnboundedReceiver<Command>,
    read_tx: mpsc::UnboundedSender<ReadOutcome>,
    read_rx: mpsc::UnboundedReceiver<ReadOutcome>,
    snapshot_tx: watch::Sender<StateSnapshot>,

    observer: Option<ObserverFn>,
    on_error: Option<ErrorSinkFn>,

    commands_open: bool,
}

impl<T: DeviceTransport> Engine<T> {
    pub(crate) fn new(
        transport: T,
        cfg: Config,
        cmd_rx: mpsc::UnboundedReceiver<Command>,
        snapshot_tx: watch::Sender<StateSnapshot>,
    ) -> Self {
        let (read_tx, read_rx) = mpsc::unbounded_channel();
        let frequency_hz = cfg.frequency_hz;

        Self {
            transport,
            cfg,
            phase: Phase::Off,
            frequency_hz,
            auto_gain: true,
            manual_gain_db: 0.0,
            offset_sum: 0.0,
            offset_count: -1,
            in_flight: 0,
            samples: None,
            handle: None,
            tuner: None,
            cmd_rx,
            read_tx,
            read_rx,
            snapshot_tx,
            observer: None,
            on_error: None,
            commands_open: true,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!("radio engine running");

        loop {
            self.dispatch().await;

            if !self.commands_open && self.in_flight == 0 && matches!(self.phase, Phase::Off) {
                break;
            }

            tokio::select! {
                command = self.cmd_rx.recv(), if self.commands_open => match command {
                    Some(command) => self.handle_command(command),
                    None => self.on_handles_dropped(),
                },
                Some(outcome) = self.read_rx.recv(), if self.in_flight > 0 => {
                    self.on_read_outcome(outcome);
                }
                else => break,
            }
        }

        debug!("radio engine exited");
    }

    /// Drive the state machine until it reaches a stable state or has to
    /// wait for a sample completion or an external request.
    async fn dispatch(&mut self) {
        loop {
            while let Ok(command) = self.cmd_rx.try_recv() {
                self.handle_command(command);
            }

            let step = match &self.phase {
                Phase::Off => Step::Idle,
                Phase::Starting { step, .. } => Step::Start(*step),
                Phase::Playing => Step::Pump,
                Phase::ChangingFrequency { target_hz } => Step::Retune(*target_hz),
                Phase::Stopping { step, .. } => Step::Stop(*step),
            };

            match step {
                Step::Idle => return,

                Step::Start(StartStep::AcquiringDevice) => {
                    info!("requesting USB access");
                    if !self.transport.request_permission(&self.cfg.devices).await {
                        self.fail_session(RadioError::PermissionDenied).await;
                        continue;
                    }
                    self.advance_start(StartStep::ConfiguringTuner);
                    match self.locate_device().await {
                        Some(handle) => self.handle = Some(handle),
                        None => self.fail_session(RadioError::DeviceNotFound).await,
                    }
                }

                Step::Start(StartStep::ConfiguringTuner) => {
                    self.advance_start(StartStep::Activating);
                    if let Err(err) = self.configure_tuner().await {
                        self.fail_session(err).await;
                    }
                }

                Step::Start(StartStep::Activating) => {
                    let on_ready = self.take_on_ready();
                    self.set_phase(Phase::Playing);
                    let Some(tuner) = self.tuner.clone() else {
                        self.fail_session(
                            TunerError::new("tuner missing during activation").into(),
                        )
                        .await;
                        continue;
                    };
                    if let Err(err) = tuner.reset_buffer().await {
                        self.fail_session(err.into()).await;
                        continue;
                    }
                    if let Some(on_ready) = on_ready {
                        on_ready();
                    }
                    info!(frequency_hz = self.frequency_hz, "radio playing");
                    self.notify_observer();
                }

                Step::Pump => {
                    while self.in_flight < PIPELINE_DEPTH && self.tuner.is_some() {
                        self.issue_read();
                    }
                    return;
                }

                Step::Retune(target_hz) => {
                    if self.in_flight > 0 {
                        return;
                    }
                    if let Err(err) = self.retune(target_hz).await {
                        self.fail_session(err).await;
                    }
                }

                Step::Stop(StopStep::Deactivating) => {
                    if self.in_flight > 0 {
                        return;
                    }
                    self.advance_stop(StopStep::ClosingTuner);
                    self.notify_observer();
                    if let Some(tuner) = self.tuner.take() {
                        if let Err(err) = tuner.close().await {
                            self.report_error(&RadioError::Driver(err));
                        }
                    }
                }

                Step::Stop(StopStep::ClosingTuner) => {
                    self.advance_stop(StopStep::ReleasingDevice);
                    if let Some(handle) = self.handle.take() {
                        self.transport.close_device(handle).await;
                    }
                }

                Step::Stop(StopStep::ReleasingDevice) => {
                    let on_stopped = self.take_on_stopped();
                    self.samples = None;
                    self.set_phase(Phase::Off);
                    if let Some(on_stopped) = on_stopped {
                        on_stopped();
                    }
                    info!("radio off");
                    self.notify_observer();
                }
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start(on_ready) => {
                debug!(phase = ?self.phase, "start requested");
                let phase = mem::replace(&mut self.phase, Phase::Off);
                let (phase, ready_now) = apply_start(phase, on_ready);
                self.phase = phase;
                self.publish();
                if let Some(ready_now) = ready_now {
                    ready_now();
                }
            }
            Command::Stop(on_stopped) => {
                debug!(phase = ?self.phase, "stop requested");
                let phase = mem::replace(&mut self.phase, Phase::Off);
                let (phase, stopped_now) = apply_stop(phase, on_stopped);
                self.phase = phase;
                self.publish();
                if let Some(stopped_now) = stopped_now {
                    stopped_now();
                }
            }
            Command::SetFrequency(hz) => {
                let phase = mem::replace(&mut self.phase, Phase::Off);
                let (phase, direct) = apply_tune(phase, hz);
                self.phase = phase;
                if let Some(hz) = direct {
                    self.frequency_hz = hz;
                    self.publish();
                    self.notify_observer();
                } else {
                    self.publish();
                }
            }
            Command::SetAutoGain => {
                self.auto_gain = true;
                self.publish();
            }
            Command::SetManualGain(gain_db) => {
                self.auto_gain = false;
                self.manual_gain_db = gain_db.clamp(0.0, MAX_GAIN_DB);
                self.publish();
            }
            Command::SetObserver(observer) => self.observer = Some(observer),
            Command::SetOnError(sink) => self.on_error = Some(sink),
        }
    }

    fn on_handles_dropped(&mut self) {
        self.commands_open = false;
        if !matches!(self.phase, Phase::Off) {
            debug!("all controller handles dropped; stopping radio");
            let phase = mem::replace(&mut self.phase, Phase::Off);
            let (phase, _) = apply_stop(phase, None);
            self.phase = phase;
            self.publish();
        }
    }

    fn on_read_outcome(&mut self, outcome: ReadOutcome) {
        if self.in_flight == 0 {
            warn!("sample read completed with no reads in flight");
        } else {
            self.in_flight -= 1;
        }

        match outcome {
            Ok(buffer) => {
                // A retune or stop requested while the read was in flight
                // makes the result stale; only the drained counter matters.
                if matches!(self.phase, Phase::Playing) {
                    self.samples = Some(Arc::new(buffer));
                    self.publish();
                }
            }
            Err(err) => {
                self.report_error(&RadioError::Driver(err));
                if matches!(self.phase, Phase::Playing) {
                    let phase = mem::replace(&mut self.phase, Phase::Off);
                    let (phase, _) = apply_stop(phase, None);
                    self.phase = phase;
                    self.publish();
                }
            }
        }
    }

    fn issue_read(&mut self) {
        let Some(tuner) = &self.tuner else { return };
        let tuner = Arc::clone(tuner);
        let completions = self.read_tx.clone();
        let count = self.cfg.samples_per_buffer();

        self.in_flight += 1;
        tokio::spawn(async move {
            let outcome = tuner.read_samples(count).await;
            let _ = completions.send(outcome);
        });
    }

    async fn locate_device(&mut self) -> Option<T::Handle> {
        let devices = self.cfg.devices.clone();
        for id in devices {
            debug!(?id, "searching for tuner device");
            if let Some(handle) = self.transport.find_device(id).await {
                info!(?id, "tuner device acquired");
                return Some(handle);
            }
        }
        None
    }

    async fn configure_tuner(&mut self) -> Result<(), RadioError> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(TunerError::new("device handle missing before tuner open").into());
        };
        let gain_db = if self.auto_gain {
            None
        } else {
            Some(self.manual_gain_db)
        };

        let tuner = self
            .transport
            .open_tuner(handle, self.cfg.ppm_correction, gain_db)
            .await?;
        let tuner = Arc::new(tuner);

        let actual_rate = tuner.set_sample_rate(self.cfg.sample_rate).await?;
        debug!(actual_rate, "tuner sample rate configured");
        self.offset_sum = 0.0;
        self.offset_count = -1;
        tuner.set_center_frequency(self.frequency_hz).await?;

        self.tuner = Some(tuner);
        Ok(())
    }

    async fn retune(&mut self, target_hz: u32) -> Result<(), RadioError> {
        let Some(tuner) = self.tuner.clone() else {
            return Err(TunerError::new("tuner missing during retune").into());
        };

        self.offset_sum = 0.0;
        self.offset_count = -1;
        tuner.set_center_frequency(target_hz).await?;
        tuner.reset_buffer().await?;

        self.frequency_hz = target_hz;
        self.set_phase(Phase::Playing);
        info!(frequency_hz = target_hz, "retuned");
        self.notify_observer();
        Ok(())
    }

    /// Abort the current session: release everything without further
    /// tuner calls, return to off and deliver the error. Queued start or
    /// stop callbacks die with the session.
    async fn fail_session(&mut self, err: RadioError) {
        self.tuner = None;
        if let Some(handle) = self.handle.take() {
            self.transport.close_device(handle).await;
        }
        self.samples = None;
        self.set_phase(Phase::Off);
        self.report_error(&err);
    }

    fn report_error(&self, err: &RadioError) {
        error!(%err, "radio error");
        match &self.on_error {
            Some(sink) => sink(err),
            None => {
                error!("no error handler registered; aborting");
                std::process::abort();
            }
        }
    }

    fn advance_start(&mut self, next: StartStep) {
        if let Phase::Starting { step, .. } = &mut self.phase {
            *step = next;
        }
        self.publish();
    }

    fn advance_stop(&mut self, next: StopStep) {
        if let Phase::Stopping { step, .. } = &mut self.phase {
            *step = next;
        }
        self.publish();
    }

    fn take_on_ready(&mut self) -> Option<Completion> {
        match &mut self.phase {
            Phase::Starting { on_ready, .. } => on_ready.take(),
            _ => None,
        }
    }

    fn take_on_stopped(&mut self) -> Option<Completion> {
        match &mut self.phase {
            Phase::Stopping { on_stopped, .. } => on_stopped.take(),
            _ => None,
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.publish();
    }

    /// Replace the published snapshot. Readers only ever observe whole
    /// records, never a half-applied transition.
    fn publish(&self) {
        self.snapshot_tx.send_replace(StateSnapshot {
            state: self.phase.kind(),
            frequency_hz: self.frequency_hz,
            auto_gain: self.auto_gain,
            manual_gain_db: self.manual_gain_db,
            samples: self.samples.clone(),
        });
    }

    fn notify_observer(&self) {
        if let Some(observer) = &self.observer {
            let snapshot = self.snapshot_tx.borrow().clone();
            observer(&snapshot);
        }
    }
}
