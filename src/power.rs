//! Power phase tracking for the projector.
//!
//! The device only ever reports a raw on/off bit, but physically it moves
//! through timed phases the protocol does not expose: a lamp strike takes
//! about 30 seconds before a picture appears, and after power-off the fans
//! run the lamp down for about 90 seconds, during which the device refuses
//! to restrike. The state machine here reconciles raw readings and operator
//! requests into those phases, with a countdown derived on read.
//!
//! Timed phases carry their start instant inside the variant, so "a
//! transition timestamp exists exactly while a timed phase runs" holds by
//! construction. Both inputs carry the clock as data, keeping the
//! transition table pure and testable without sleeping.
//!
//! Mermaid format:
//!
//! ```text
//! stateDiagram-v2
//! [*] --> Unknown
//! Unknown --> On: Observe(true)
//! Unknown --> Off: Observe(false)
//! Off --> WarmingUp: Request(on)
//! WarmingUp --> WarmingUp: Observe(_) before 30s
//! WarmingUp --> On: Observe(true) at/after 30s
//! WarmingUp --> Off: Observe(false) at/after 30s
//! On --> CoolingDown: Request(off)
//! CoolingDown --> CoolingDown: Observe(_) before 90s
//! CoolingDown --> Off: Observe(false) at/after 90s
//! CoolingDown --> On: Observe(true) at/after 90s
//! ```

use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::{debug, error};
use rust_fsm::*;
use serde::Serialize;
use tokio::sync::watch;

/// Time a lamp strike takes before the picture stabilizes.
pub const WARM_UP: Duration = Duration::from_secs(30);

/// Fan run-on time after power-off before the lamp may be restruck.
pub const COOL_DOWN: Duration = Duration::from_secs(90);

// ------------------------------------------------------------------------------------------------
// States, Inputs

/// Display phase of the projector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerPhase {
    /// No reading has ever been observed.
    Unknown,
    /// Lamp off, ready to be turned on.
    Off,
    /// Lamp striking; the picture arrives when the phase ends.
    WarmingUp { since: Instant },
    /// Lamp on.
    On,
    /// Fans running the lamp down; the device blocks most commands.
    CoolingDown { since: Instant },
}

impl PowerPhase {
    /// The label used on external surfaces.
    pub fn label(&self) -> &'static str {
        match self {
            PowerPhase::Unknown => "UNKNOWN",
            PowerPhase::Off => "OFF",
            PowerPhase::WarmingUp { .. } => "WARMING_UP",
            PowerPhase::On => "ON",
            PowerPhase::CoolingDown { .. } => "COOLING_DOWN",
        }
    }

    /// Whole seconds left in the current timed phase, zero when stable.
    /// Partial seconds round up, so a phase with any time left reads as at
    /// least one second.
    pub fn remaining_seconds(&self, at: Instant) -> u64 {
        let (since, duration) = match self {
            PowerPhase::WarmingUp { since } => (*since, WARM_UP),
            PowerPhase::CoolingDown { since } => (*since, COOL_DOWN),
            _ => return 0,
        };

        let left = duration.saturating_sub(at.duration_since(since));
        left.as_secs_f64().ceil() as u64
    }
}

impl fmt::Display for PowerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One atomic view of the tracked power state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerSnapshot {
    /// Last raw reading observed (or commanded), if any.
    pub power_on: Option<bool>,
    /// Current display phase.
    pub phase: PowerPhase,
}

impl PowerSnapshot {
    /// True only when the device reads on and no timed phase is running.
    pub fn is_settled_on(&self) -> bool {
        self.power_on == Some(true) && self.phase == PowerPhase::On
    }

    /// The snapshot enriched with the phase countdown.
    pub fn info(&self, at: Instant) -> PowerStateInfo {
        PowerStateInfo {
            power_on: self.power_on,
            state: self.phase.label(),
            remaining_seconds: self.phase.remaining_seconds(at),
        }
    }
}

/// External shape of the power state: raw bit, phase label, countdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerStateInfo {
    pub power_on: Option<bool>,
    pub state: &'static str,
    pub remaining_seconds: u64,
}

/// State machine transition inputs.
#[derive(Debug, Clone)]
pub(crate) enum Input {
    /// A raw reading from the device (`None` when it had no answer).
    Observe { reading: Option<bool>, at: Instant },
    /// An operator asked for on or off.
    Request { on: bool, at: Instant },
}

// ================================================================================================
// PowerStateMachine

#[derive(Debug)]
pub(crate) struct PowerStateMachine;

impl StateMachineImpl for PowerStateMachine {
    type Input = Input;
    type State = PowerSnapshot;
    type Output = ();

    const INITIAL_STATE: Self::State = PowerSnapshot {
        power_on: None,
        phase: PowerPhase::Unknown,
    };

    fn transition(state: &Self::State, input: &Self::Input) -> Option<Self::State> {
        match input {
            // No reading is no information.
            Input::Observe { reading: None, .. } => Some(*state),

            Input::Observe {
                reading: Some(on),
                at,
            } => {
                let phase = match state.phase {
                    // A timed phase holds until its duration has fully elapsed.
                    PowerPhase::WarmingUp { since } if at.duration_since(since) < WARM_UP => {
                        PowerPhase::WarmingUp { since }
                    }
                    PowerPhase::CoolingDown { since } if at.duration_since(since) < COOL_DOWN => {
                        PowerPhase::CoolingDown { since }
                    }
                    _ => {
                        if *on {
                            PowerPhase::On
                        } else {
                            PowerPhase::Off
                        }
                    }
                };

                Some(PowerSnapshot {
                    power_on: Some(*on),
                    phase,
                })
            }

            // Requests are honored only from the matching stable state. Every
            // other combination is a no-op, so an in-flight phase timer is
            // never restarted.
            Input::Request { on: true, at } if state.phase == PowerPhase::Off => {
                Some(PowerSnapshot {
                    power_on: Some(true),
                    phase: PowerPhase::WarmingUp { since: *at },
                })
            }
            Input::Request { on: false, at } if state.phase == PowerPhase::On => {
                Some(PowerSnapshot {
                    power_on: Some(false),
                    phase: PowerPhase::CoolingDown { since: *at },
                })
            }
            Input::Request { .. } => Some(*state),
        }
    }

    fn output(_state: &Self::State, _input: &Self::Input) -> Option<()> {
        None
    }
}

// ================================================================================================
// PowerTracker

/// The single mutable holder of the power snapshot.
///
/// Inputs are applied one at a time under a lock, and each resulting
/// snapshot is published on a watch channel before the applying call
/// returns, so readers never observe a half-applied update and
/// subscribers always hold the latest snapshot.
#[derive(Debug)]
pub struct PowerTracker {
    machine: Mutex<StateMachine<PowerStateMachine>>,
    snapshot_tx: watch::Sender<PowerSnapshot>,
}

impl PowerTracker {
    pub fn new() -> PowerTracker {
        PowerTracker {
            machine: Mutex::new(StateMachine::new()),
            snapshot_tx: watch::Sender::new(PowerStateMachine::INITIAL_STATE),
        }
    }

    /// Feeds a raw reading into the machine and returns the resulting
    /// snapshot.
    pub fn observe_reading(&self, reading: Option<bool>) -> PowerSnapshot {
        self.consume(Input::Observe {
            reading,
            at: Instant::now(),
        })
    }

    /// Feeds an operator on/off request into the machine and returns the
    /// resulting snapshot. A no-op unless the matching stable phase is
    /// current.
    pub fn request_transition(&self, on: bool) -> PowerSnapshot {
        self.consume(Input::Request {
            on,
            at: Instant::now(),
        })
    }

    /// The latest snapshot.
    pub fn snapshot(&self) -> PowerSnapshot {
        *self.snapshot_tx.borrow()
    }

    /// The latest snapshot enriched with the countdown, as of now.
    pub fn info(&self) -> PowerStateInfo {
        self.snapshot().info(Instant::now())
    }

    /// A receiver that always holds the latest snapshot.
    pub fn subscribe(&self) -> watch::Receiver<PowerSnapshot> {
        self.snapshot_tx.subscribe()
    }

    fn consume(&self, input: Input) -> PowerSnapshot {
        let mut machine = match self.machine.lock() {
            Ok(machine) => machine,
            Err(poisoned) => poisoned.into_inner(),
        };

        let before = *machine.state();

        if let Err(e) = machine.consume(&input) {
            // Unreachable: the transition table is total.
            error!("Power machine rejected input {:?}: {:?}", input, e);
        }

        let after = *machine.state();

        if before != after {
            debug!("Power phase {} -> {}", before.phase, after.phase);
        }

        // Published while still holding the lock, so the watch value moves
        // through snapshots in mutation order.
        self.snapshot_tx.send_replace(after);

        after
    }
}

impl Default for PowerTracker {
    fn default() -> Self {
        PowerTracker::new()
    }
}

// =================================================================
// Tests
