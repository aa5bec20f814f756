//! Controller state model
//!
//! The phase is a nested tagged union: an outer lifecycle phase plus an
//! inner step that only exists while a multi-step start or stop sequence
//! is underway. The transition-scoped payload (a deferred completion
//! callback, or the retune target) lives inside the variant, so replacing
//! the phase replaces the payload with it.
//!
//! Request handling is kept as pure `current phase + request -> new phase`
//! functions so the arbitration table is testable without any I/O.

use std::fmt;
use std::sync::Arc;

/// Completion callback attached to a start or stop request.
pub(crate) type Completion = Box<dyn FnOnce() + Send>;

/// Steps of the starting sequence, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StartStep {
    AcquiringDevice,
    ConfiguringTuner,
    Activating,
}

/// Steps of the stopping sequence, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopStep {
    Deactivating,
    ClosingTuner,
    ReleasingDevice,
}

impl StartStep {
    /// The stopping step that undoes everything brought up so far. Used
    /// when a stop request redirects an in-progress start: the step in
    /// flight still completes, only the direction flips.
    pub(crate) fn teardown(self) -> StopStep {
        match self {
            StartStep::AcquiringDevice => StopStep::ReleasingDevice,
            StartStep::ConfiguringTuner => StopStep::ClosingTuner,
            StartStep::Activating => StopStep::Deactivating,
        }
    }
}

impl StopStep {
    /// The starting step that rebuilds everything torn down so far; the
    /// inverse of [`StartStep::teardown`].
    pub(crate) fn resume(self) -> StartStep {
        match self {
            StopStep::Deactivating => StartStep::Activating,
            StopStep::ClosingTuner => StartStep::ConfiguringTuner,
            StopStep::ReleasingDevice => StartStep::AcquiringDevice,
        }
    }
}

/// Full engine phase, including transition-scoped payloads.
pub(crate) enum Phase {
    Off,
    Starting {
        step: StartStep,
        on_ready: Option<Completion>,
    },
    Playing,
    ChangingFrequency {
        target_hz: u32,
    },
    Stopping {
        step: StopStep,
        on_stopped: Option<Completion>,
    },
}

impl Phase {
    pub(crate) fn kind(&self) -> RadioState {
        match self {
            Phase::Off => RadioState::Off,
            Phase::Starting { .. } => RadioState::Starting,
            Phase::Playing => RadioState::Playing,
            Phase::ChangingFrequency { .. } => RadioState::ChangingFrequency,
            Phase::Stopping { .. } => RadioState::Stopping,
        }
    }
}

impl fmt::Debug for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Off => write!(f, "Off"),
            Phase::Starting { step, .. } => write!(f, "Starting({step:?})"),
            Phase::Playing => write!(f, "Playing"),
            Phase::ChangingFrequency { target_hz } => {
                write!(f, "ChangingFrequency({target_hz})")
            }
            Phase::Stopping { step, .. } => write!(f, "Stopping({step:?})"),
        }
    }
}

/// Externally visible lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioState {
    Off,
    Starting,
    Playing,
    ChangingFrequency,
    Stopping,
}

impl RadioState {
    /// True in every state except `Off` and `Stopping`: a starting or
    /// retuning radio already counts as playing.
    pub fn is_playing(self) -> bool {
        !matches!(self, RadioState::Off | RadioState::Stopping)
    }

    pub fn is_stopping(self) -> bool {
        matches!(self, RadioState::Stopping)
    }
}

/// Snapshot of the controller published on every committed change. The
/// whole record is replaced, never mutated, so readers always observe a
/// consistent state.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub state: RadioState,
    pub frequency_hz: u32,
    pub auto_gain: bool,
    pub manual_gain_db: f32,
    pub samples: Option<Arc<Vec<u8>>>,
}

/// Apply a start request. Returns the new phase plus a callback to invoke
/// right away (the radio is already playing, so "ready" is now).
pub(crate) fn apply_start(
    phase: Phase,
    on_ready: Option<Completion>,
) -> (Phase, Option<Completion>) {
    match phase {
        Phase::Off => (
            Phase::Starting {
                step: StartStep::AcquiringDevice,
                on_ready,
            },
            None,
        ),
        // A repeated start supersedes the previously queued callback.
        Phase::Starting { step, .. } => (Phase::Starting { step, on_ready }, None),
        Phase::Stopping { step, .. } => (
            Phase::Starting {
                step: step.resume(),
                on_ready,
            },
            None,
        ),
        playing @ (Phase::Playing | Phase::ChangingFrequency { .. }) => (playing, on_ready),
    }
}

/// Apply a stop request. Returns the new phase plus a callback to invoke
/// right away (already off: nothing to tear down).
pub(crate) fn apply_stop(
    phase: Phase,
    on_stopped: Option<Completion>,
) -> (Phase, Option<Completion>) {
    match phase {
        Phase::Off => (Phase::Off, on_stopped),
        Phase::Starting { step, .. } => (
            Phase::Stopping {
                step: step.teardown(),
                on_stopped,
            },
            None,
        ),
        // A repeated stop supersedes the previously queued callback.
        Phase::Stopping { step, .. } => (Phase::Stopping { step, on_stopped }, None),
        Phase::Playing | Phase::ChangingFrequency { .. } => (
            Phase::Stopping {
                step: StopStep::Deactivating,
                on_stopped,
            },
            None,
        ),
    }
}

/// Apply a frequency-change request. While streaming this becomes a retune
/// phase; otherwise the frequency is returned for direct storage.
pub(crate) fn apply_tune(phase: Phase, target_hz: u32) -> (Phase, Option<u32>) {
    match phase {
        Phase::Playing | Phase::ChangingFrequency { .. } => {
            (Phase::ChangingFrequency { target_hz }, None)
        }
        other => (other, Some(target_hz)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn flag_callback() -> (Completion, Arc<AtomicBool>) {
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        (Box::new(move || fired2.store(true, Ordering::SeqCst)), fired)
    }

    #[test]
    fn step_pairing_is_involutive() {
        for step in [
            StartStep::AcquiringDevice,
            StartStep::ConfiguringTuner,
            StartStep::Activating,
        ] {
            assert_eq!(step.teardown().resume(), step);
        }
        for step in [
            StopStep::Deactivating,
            StopStep::ClosingTuner,
            StopStep::ReleasingDevice,
        ] {
            assert_eq!(step.resume().teardown(), step);
        }
    }

    #[test]
    fn start_from_off_begins_acquisition() {
        let (phase, now) = apply_start(Phase::Off, None);
        assert!(now.is_none());
        assert!(matches!(
            phase,
            Phase::Starting {
                step: StartStep::AcquiringDevice,
                ..
            }
        ));
    }

    #[test]
    fn start_while_playing_fires_callback_immediately() {
        let (cb, fired) = flag_callback();
        let (phase, now) = apply_start(Phase::Playing, Some(cb));
        assert_eq!(phase.kind(), RadioState::Playing);
        now.expect("callback returned for immediate invocation")();
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn start_redirects_stop_preserving_step_pairing() {
        let (phase, _) = apply_start(
            Phase::Stopping {
                step: StopStep::ClosingTuner,
                on_stopped: None,
            },
            None,
        );
        assert!(matches!(
            phase,
            Phase::Starting {
                step: StartStep::ConfiguringTuner,
                ..
            }
        ));
    }

    #[test]
    fn stop_while_off_fires_callback_immediately() {
        let (cb, fired) = flag_callback();
        let (phase, now) = apply_stop(Phase::Off, Some(cb));
        assert_eq!(phase.kind(), RadioState::Off);
        now.expect("callback returned for immediate invocation")();
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn stop_redirects_start_preserving_step_pairing() {
        let (stop_cb, _) = flag_callback();
        let (start_cb, start_fired) = flag_callback();
        let (phase, now) = apply_stop(
            Phase::Starting {
                step: StartStep::ConfiguringTuner,
                on_ready: Some(start_cb),
            },
            Some(stop_cb),
        );
        assert!(now.is_none());
        assert!(matches!(
            phase,
            Phase::Stopping {
                step: StopStep::ClosingTuner,
                ..
            }
        ));
        // The superseded start callback is dropped, never fired as "ready".
        drop(phase);
        assert!(!start_fired.load(Ordering::SeqCst));
    }

    #[test]
    fn stop_while_playing_begins_deactivation() {
        let (phase, _) = apply_stop(Phase::Playing, None);
        assert!(matches!(
            phase,
            Phase::Stopping {
                step: StopStep::Deactivating,
                ..
            }
        ));
    }

    #[test]
    fn stop_while_retuning_drops_pending_target() {
        let (phase, _) = apply_stop(Phase::ChangingFrequency { target_hz: 99 }, None);
        assert!(matches!(
            phase,
            Phase::Stopping {
                step: StopStep::Deactivating,
                ..
            }
        ));
    }

    #[test]
    fn tune_while_playing_enters_retune_phase() {
        let (phase, direct) = apply_tune(Phase::Playing, 100_300_000);
        assert!(direct.is_none());
        assert!(matches!(
            phase,
            Phase::ChangingFrequency {
                target_hz: 100_300_000
            }
        ));
    }

    #[test]
    fn tune_while_retuning_replaces_target() {
        let (phase, direct) = apply_tune(Phase::ChangingFrequency { target_hz: 1 }, 2);
        assert!(direct.is_none());
        assert!(matches!(phase, Phase::ChangingFrequency { target_hz: 2 }));
    }

    #[test]
    fn tune_while_off_stores_directly() {
        let (phase, direct) = apply_tune(Phase::Off, 88_500_000);
        assert_eq!(phase.kind(), RadioState::Off);
        assert_eq!(direct, Some(88_500_000));
    }

    #[test]
    fn playing_flags_follow_state() {
        assert!(RadioState::Starting.is_playing());
        assert!(RadioState::Playing.is_playing());
        assert!(RadioState::ChangingFrequency.is_playing());
        assert!(!RadioState::Off.is_playing());
        assert!(!RadioState::Stopping.is_playing());
        assert!(RadioState::Stopping.is_stopping());
        assert!(!RadioState::Playing.is_stopping());
    }
}
