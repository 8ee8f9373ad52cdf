//! Direction-reversal state machine.
//!
//! [`DirectionController`] exclusively owns the current [`Direction`] and the
//! [`ReversalBudget`]. The supervisor advances it one [`step`] per cycle and
//! feeds it the debounced stall verdict; the controller issues the register
//! writes that belong to each transition.
//!
//! ```text
//! Idle ─► BrakeReleasing ─► DirectionSetting ─► Running ◄─┐
//!                                 ▲               │        │ not stalled
//!                                 │               ├────────┘
//!                                 │               ▼ stalled, budget > 0
//!                            Reversing ◄──── StallDetected
//!                                 │
//!                                 ▼ last unit spent
//!                          BudgetExhausted        (any) ─► Stopped on cancel
//! ```
//!
//! A failed write never advances the state; the same step is retried on the
//! next cycle.
//!
//! [`step`]: DirectionController::step

use core::fmt;
use core::time::Duration;

use crate::cancel::CancelToken;
use crate::config::{ReversalConfig, SupervisorConfig};
use crate::driver::MotorDriver;
use crate::error::TransportError;
use crate::traits::{Direction, RegisterLink};

// ============================================================================
// Control State
// ============================================================================

/// Where the control loop is in its start / run / reverse cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ControlState {
    /// Not started.
    #[default]
    Idle,
    /// Releasing the brake.
    BrakeReleasing,
    /// Writing direction, then enabling the motor.
    DirectionSetting,
    /// Motor enabled, watching for a stall.
    Running,
    /// Stall confirmed, about to reverse.
    StallDetected,
    /// Direction toggled, about to re-enter direction setting.
    Reversing,
    /// Reversal budget spent. Terminal.
    BudgetExhausted,
    /// Cancelled and shut down. Terminal.
    Stopped,
}

impl ControlState {
    const ALL: [ControlState; 8] = [
        ControlState::Idle,
        ControlState::BrakeReleasing,
        ControlState::DirectionSetting,
        ControlState::Running,
        ControlState::StallDetected,
        ControlState::Reversing,
        ControlState::BudgetExhausted,
        ControlState::Stopped,
    ];

    /// No further transitions happen from this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, ControlState::BudgetExhausted | ControlState::Stopped)
    }

    /// Short name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ControlState::Idle => "idle",
            ControlState::BrakeReleasing => "brake_releasing",
            ControlState::DirectionSetting => "direction_setting",
            ControlState::Running => "running",
            ControlState::StallDetected => "stall_detected",
            ControlState::Reversing => "reversing",
            ControlState::BudgetExhausted => "budget_exhausted",
            ControlState::Stopped => "stopped",
        }
    }

    pub(crate) fn code(self) -> u8 {
        Self::ALL.iter().position(|s| *s == self).unwrap_or(0) as u8
    }

    pub(crate) fn from_code(code: u8) -> Self {
        Self::ALL
            .get(usize::from(code))
            .copied()
            .unwrap_or_default()
    }
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Reversal Budget
// ============================================================================

/// Bounded count of direction reversals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReversalBudget {
    max: u32,
    used: u32,
}

impl ReversalBudget {
    /// A fresh budget allowing `max` reversals.
    pub fn new(max: u32) -> Self {
        Self { max, used: 0 }
    }

    /// Configured maximum.
    pub fn max(&self) -> u32 {
        self.max
    }

    /// Reversals performed so far.
    pub fn used(&self) -> u32 {
        self.used
    }

    /// Reversals still allowed.
    pub fn remaining(&self) -> u32 {
        self.max - self.used
    }

    /// Whether no reversal is left.
    pub fn is_exhausted(&self) -> bool {
        self.used >= self.max
    }

    /// Use one reversal. Returns `false` (and changes nothing) when exhausted.
    pub fn spend(&mut self) -> bool {
        if self.is_exhausted() {
            return false;
        }
        self.used += 1;
        true
    }
}

// ============================================================================
// Step Results
// ============================================================================

/// What one [`DirectionController::step`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// Stayed in the same state.
    Held,
    /// Moved to another state.
    Advanced {
        /// State before the step.
        from: ControlState,
        /// State after the step.
        to: ControlState,
    },
    /// Motor disabled and direction toggled.
    Reversed {
        /// The new direction.
        direction: Direction,
        /// Reversals still allowed.
        remaining: u32,
    },
    /// Budget spent; the loop should end.
    Exhausted {
        /// Reversals performed.
        reversals: u32,
    },
}

/// How hard the shutdown sequence tries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShutdownPolicy {
    /// Attempts per write, at least one.
    pub attempts: u8,
    /// Also write speed 0 after disabling and braking.
    pub zero_speed: bool,
}

impl Default for ShutdownPolicy {
    fn default() -> Self {
        Self {
            attempts: 2,
            zero_speed: true,
        }
    }
}

impl From<&SupervisorConfig> for ShutdownPolicy {
    fn from(config: &SupervisorConfig) -> Self {
        Self {
            attempts: config.shutdown_attempts,
            zero_speed: config.zero_speed_on_shutdown,
        }
    }
}

/// Which shutdown writes were acknowledged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// `enable = 0` succeeded.
    pub disabled: bool,
    /// `brake = 1` succeeded.
    pub braked: bool,
    /// `speed = 0` result; `None` if not attempted.
    pub speed_zeroed: Option<bool>,
}

impl ShutdownReport {
    /// Every attempted write succeeded.
    pub fn is_clean(&self) -> bool {
        self.disabled && self.braked && self.speed_zeroed.unwrap_or(true)
    }
}

// ============================================================================
// Controller
// ============================================================================

/// Reversal state machine. Only the supervisor thread touches it.
#[derive(Debug)]
pub struct DirectionController {
    state: ControlState,
    direction: Direction,
    applied: Direction,
    budget: ReversalBudget,
    settle: Duration,
}

impl DirectionController {
    /// A controller in [`ControlState::Idle`].
    pub fn new(initial: Direction, max_reversals: u32, settle: Duration) -> Self {
        Self {
            state: ControlState::Idle,
            direction: initial,
            applied: initial,
            budget: ReversalBudget::new(max_reversals),
            settle,
        }
    }

    /// Controller with the budget and settle delay from `config`, starting clockwise.
    pub fn from_config(config: &ReversalConfig) -> Self {
        Self::new(Direction::default(), config.max_reversals, config.settle())
    }

    /// Current state.
    pub fn state(&self) -> ControlState {
        self.state
    }

    /// Direction the controller is driving toward. Toggled by each reversal,
    /// before it reaches the device.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Last direction the device accepted, or the initial direction before
    /// the first write.
    pub fn applied_direction(&self) -> Direction {
        self.applied
    }

    /// Reversal budget.
    pub fn budget(&self) -> &ReversalBudget {
        &self.budget
    }

    /// Leave `Idle`. Does nothing in any other state.
    pub fn start(&mut self) -> StepOutcome {
        if self.state == ControlState::Idle {
            self.transition(ControlState::BrakeReleasing)
        } else {
            StepOutcome::Held
        }
    }

    /// Advance by one step.
    ///
    /// `stalled` is the detector verdict for this cycle and only matters in
    /// `Running`. `cancel` interrupts the settle delay. On error the state is
    /// unchanged.
    pub fn step<L: RegisterLink>(
        &mut self,
        driver: &MotorDriver<L>,
        stalled: bool,
        cancel: &CancelToken,
    ) -> Result<StepOutcome, TransportError> {
        match self.state {
            ControlState::Idle => Ok(self.start()),
            ControlState::BrakeReleasing => {
                driver.set_brake(false)?;
                Ok(self.transition(ControlState::DirectionSetting))
            }
            ControlState::DirectionSetting => {
                driver.set_direction(self.direction)?;
                self.applied = self.direction;
                driver.set_enable(true)?;
                Ok(self.transition(ControlState::Running))
            }
            ControlState::Running if stalled => {
                if self.budget.is_exhausted() {
                    tracing::info!(
                        reversals = self.budget.used(),
                        "stall confirmed with no reversals left"
                    );
                    self.transition(ControlState::BudgetExhausted);
                    Ok(StepOutcome::Exhausted {
                        reversals: self.budget.used(),
                    })
                } else {
                    tracing::info!(direction = %self.direction, "stall confirmed");
                    Ok(self.transition(ControlState::StallDetected))
                }
            }
            ControlState::Running => Ok(StepOutcome::Held),
            ControlState::StallDetected => self.reverse(driver, cancel),
            ControlState::Reversing => {
                if self.budget.is_exhausted() {
                    tracing::info!(
                        reversals = self.budget.used(),
                        "reversal budget exhausted"
                    );
                    self.transition(ControlState::BudgetExhausted);
                    Ok(StepOutcome::Exhausted {
                        reversals: self.budget.used(),
                    })
                } else {
                    Ok(self.transition(ControlState::DirectionSetting))
                }
            }
            ControlState::BudgetExhausted | ControlState::Stopped => Ok(StepOutcome::Held),
        }
    }

    /// Move to `Stopped` and run the best-effort shutdown writes.
    pub fn stop<L: RegisterLink>(
        &mut self,
        driver: &MotorDriver<L>,
        policy: ShutdownPolicy,
    ) -> ShutdownReport {
        if self.state != ControlState::Stopped {
            self.transition(ControlState::Stopped);
        }
        Self::shutdown(driver, policy)
    }

    /// Disable, engage the brake and optionally zero the speed.
    ///
    /// Each write is tried at most `policy.attempts` times. Failures are
    /// logged and reported, never propagated.
    pub fn shutdown<L: RegisterLink>(
        driver: &MotorDriver<L>,
        policy: ShutdownPolicy,
    ) -> ShutdownReport {
        let attempts = policy.attempts.max(1);
        let disabled = attempt(attempts, "disable", || driver.set_enable(false));
        let braked = attempt(attempts, "brake", || driver.set_brake(true));
        let speed_zeroed = policy
            .zero_speed
            .then(|| attempt(attempts, "zero speed", || driver.set_speed(0)));

        let report = ShutdownReport {
            disabled,
            braked,
            speed_zeroed,
        };
        if report.is_clean() {
            tracing::info!("motor shut down");
        } else {
            tracing::error!(?report, "motor shutdown incomplete");
        }
        report
    }

    fn reverse<L: RegisterLink>(
        &mut self,
        driver: &MotorDriver<L>,
        cancel: &CancelToken,
    ) -> Result<StepOutcome, TransportError> {
        driver.set_enable(false)?;
        if cancel.sleep(self.settle) {
            // Motor is off; the supervisor shuts down on its next check.
            return Ok(StepOutcome::Held);
        }
        if !self.budget.spend() {
            self.transition(ControlState::BudgetExhausted);
            return Ok(StepOutcome::Exhausted {
                reversals: self.budget.used(),
            });
        }
        let from = self.direction;
        self.direction = self.direction.toggled();
        tracing::info!(
            from = %from,
            to = %self.direction,
            reversal = self.budget.used(),
            remaining = self.budget.remaining(),
            "direction reversed"
        );
        self.transition(ControlState::Reversing);
        Ok(StepOutcome::Reversed {
            direction: self.direction,
            remaining: self.budget.remaining(),
        })
    }

    fn transition(&mut self, to: ControlState) -> StepOutcome {
        let from = self.state;
        self.state = to;
        tracing::info!(from = %from, to = %to, "control state changed");
        StepOutcome::Advanced { from, to }
    }
}

fn attempt(
    attempts: u8,
    what: &'static str,
    mut op: impl FnMut() -> Result<(), TransportError>,
) -> bool {
    for n in 1..=attempts {
        match op() {
            Ok(()) => return true,
            Err(err) => tracing::debug!(what, attempt = n, error = %err, "shutdown write failed"),
        }
    }
    tracing::error!(what, attempts, "shutdown write abandoned");
    false
}
