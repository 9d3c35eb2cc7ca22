//! One-flight-at-a-time state machine.
//!
//! `Idle` is both the initial and the resting state. The drone counts as busy
//! whenever the phase is anything other than `Idle`.

use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FlightPhase {
    Idle,
    Outbound,
    Returning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightEvent {
    /// A dispatch was accepted.
    Dispatch,
    /// Setup failed before the drone took off.
    Abort,
    ArrivedAtTarget,
    ArrivedAtBase,
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("invalid flight transition: {event:?} while {from:?}")]
pub struct TransitionError {
    pub from: FlightPhase,
    pub event: FlightEvent,
}

impl FlightPhase {
    pub fn next(self, event: FlightEvent) -> Option<FlightPhase> {
        match (self, event) {
            (FlightPhase::Idle, FlightEvent::Dispatch) => Some(FlightPhase::Outbound),
            (FlightPhase::Outbound, FlightEvent::Abort) => Some(FlightPhase::Idle),
            (FlightPhase::Outbound, FlightEvent::ArrivedAtTarget) => Some(FlightPhase::Returning),
            (FlightPhase::Returning, FlightEvent::ArrivedAtBase) => Some(FlightPhase::Idle),
            _ => None,
        }
    }

    pub fn is_busy(self) -> bool {
        self != FlightPhase::Idle
    }
}

/// Holds the current phase. Transitions are applied under the channel's write
/// lock, so checking and setting busy is a single step.
pub struct FlightControl {
    phase: watch::Sender<FlightPhase>,
}

impl Default for FlightControl {
    fn default() -> Self {
        Self::new()
    }
}

impl FlightControl {
    pub fn new() -> Self {
        let (phase, _unused_rx) = watch::channel(FlightPhase::Idle);
        Self { phase }
    }

    pub fn phase(&self) -> FlightPhase {
        *self.phase.borrow()
    }

    pub fn is_busy(&self) -> bool {
        self.phase().is_busy()
    }

    pub fn subscribe(&self) -> watch::Receiver<FlightPhase> {
        self.phase.subscribe()
    }

    pub fn apply(&self, event: FlightEvent) -> Result<FlightPhase, TransitionError> {
        let mut outcome = Err(TransitionError {
            from: FlightPhase::Idle,
            event,
        });

        self.phase.send_if_modified(|phase| match phase.next(event) {
            Some(next) => {
                *phase = next;
                outcome = Ok(next);
                true
            }
            None => {
                outcome = Err(TransitionError {
                    from: *phase,
                    event,
                });
                false
            }
        });

        outcome
    }

    /// Runs `f` only while idle, holding the phase so no dispatch can start
    /// underneath it.
    pub fn while_idle<F: FnOnce()>(&self, f: F) -> bool {
        let phase = self.phase.borrow();
        if *phase != FlightPhase::Idle {
            return false;
        }
        f();
        true
    }
}
