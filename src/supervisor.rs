//! The supervisory control loop.
//!
//! One [`Supervisor::cycle`] does, in order:
//!
//! 1. take at most one operator command and write the pending speed
//! 2. read RPM, publish it, and feed it to the stall detector when the
//!    controller is `Running` and past its spin-up grace
//! 3. read the fault register (optional, `Running` only)
//! 4. advance the [`DirectionController`] by one step
//!
//! [`Supervisor::run`] repeats that with a cancellable sleep between
//! cycles until cancellation or budget exhaustion, then performs the
//! best-effort shutdown writes. No error escapes a cycle: a failed read
//! skips its sample, a failed write is retried next cycle.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use bldc_supervisor::command::command_channel;
//! use bldc_supervisor::config::{Config, ReversalConfig, SupervisorConfig};
//! use bldc_supervisor::hal::{MockLink, MonotonicClock};
//! use bldc_supervisor::supervisor::{Supervisor, SupervisorOutcome};
//! use bldc_supervisor::{CancelToken, MotorDriver, RegisterTransport};
//!
//! let config = Config::default()
//!     .with_reversal(
//!         ReversalConfig::default()
//!             .with_stall_window(2)
//!             .with_settle_ms(0)
//!             .with_spin_up_ms(0)
//!             .with_max_reversals(2),
//!     )
//!     .with_supervisor(SupervisorConfig::default().with_poll_interval_ms(1));
//!
//! // A motor that never turns: every enable ends in a stall.
//! let link = MockLink::new();
//! let transport = Arc::new(RegisterTransport::new(link, 100, Duration::from_millis(50)));
//! let driver = MotorDriver::new(transport, config.registers);
//! let (_tx, rx) = command_channel((&config.speed).into());
//!
//! let mut supervisor =
//!     Supervisor::new(driver, &config, rx, CancelToken::new(), MonotonicClock::new()).unwrap();
//!
//! match supervisor.run() {
//!     SupervisorOutcome::BudgetExhausted { reversals, .. } => assert_eq!(reversals, 2),
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

use core::time::Duration;

use crate::cancel::CancelToken;
use crate::command::CommandReceiver;
use crate::config::Config;
use crate::direction::{
    ControlState, DirectionController, ShutdownPolicy, ShutdownReport, StepOutcome,
};
use crate::driver::MotorDriver;
use crate::error::ValidationError;
use crate::registers::{RegisterValue, FAULT_NONE};
use crate::stall::{RpmSample, StallDetector};
use crate::telemetry::TelemetryHandle;
use crate::traits::{Clock, Direction, RegisterLink};

/// How [`Supervisor::run`] ended. Neither variant is an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorOutcome {
    /// The reversal budget was spent.
    BudgetExhausted {
        /// Reversals performed.
        reversals: u32,
        /// Result of the shutdown writes.
        shutdown: ShutdownReport,
    },
    /// Cancellation was observed.
    Cancelled {
        /// State the loop was in when cancellation was seen.
        from: ControlState,
        /// Result of the shutdown writes.
        shutdown: ShutdownReport,
    },
}

/// What one cycle did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CycleReport {
    /// Controller state after the cycle.
    pub state: ControlState,
    /// Speed value acknowledged by the device this cycle.
    pub speed_written: Option<RegisterValue>,
    /// RPM read this cycle, `None` if the read failed.
    pub rpm: Option<RegisterValue>,
    /// Whether the RPM sample went into the stall detector.
    pub sample_fed: bool,
    /// Stall verdict handed to the controller.
    pub stalled: bool,
    /// Controller step result, `None` if its write failed.
    pub step: Option<StepOutcome>,
}

/// Owns the control loop and everything only it may touch.
pub struct Supervisor<L: RegisterLink, C: Clock> {
    driver: MotorDriver<L>,
    controller: DirectionController,
    detector: StallDetector,
    commands: CommandReceiver,
    cancel: CancelToken,
    clock: C,
    telemetry: TelemetryHandle,
    poll_interval: Duration,
    spin_up_ms: u64,
    monitor_fault: bool,
    shutdown: ShutdownPolicy,
    pending_speed: Option<RegisterValue>,
    running_since_ms: Option<u64>,
    last_fault: Option<RegisterValue>,
}

impl<L: RegisterLink, C: Clock> Supervisor<L, C> {
    /// Build a supervisor from a validated `config`.
    ///
    /// The initial speed from `config.speed` is the first pending speed
    /// write.
    pub fn new(
        driver: MotorDriver<L>,
        config: &Config,
        commands: CommandReceiver,
        cancel: CancelToken,
        clock: C,
    ) -> Result<Self, ValidationError> {
        config.validate()?;
        let reversal = &config.reversal;
        let telemetry = TelemetryHandle::new();
        let controller = DirectionController::from_config(reversal);
        telemetry.publish_direction(controller.applied_direction());

        Ok(Self {
            driver,
            controller,
            detector: StallDetector::new(reversal.stall_window)
                .with_zero_threshold(reversal.stall_rpm_threshold),
            commands,
            cancel,
            clock,
            telemetry,
            poll_interval: config.supervisor.poll_interval(),
            spin_up_ms: reversal.spin_up_ms.into(),
            monitor_fault: config.supervisor.monitor_fault,
            shutdown: ShutdownPolicy::from(&config.supervisor),
            pending_speed: Some(config.speed.initial),
            running_since_ms: None,
            last_fault: None,
        })
    }

    /// Read side for observers. Clone it freely.
    pub fn telemetry(&self) -> TelemetryHandle {
        self.telemetry.clone()
    }

    /// Current controller state.
    pub fn state(&self) -> ControlState {
        self.controller.state()
    }

    /// Direction the controller is driving toward.
    pub fn direction(&self) -> Direction {
        self.controller.direction()
    }

    /// The reversal state machine.
    pub fn controller(&self) -> &DirectionController {
        &self.controller
    }

    /// The stall detector.
    pub fn detector(&self) -> &StallDetector {
        &self.detector
    }

    /// Speed waiting to be written, if any.
    pub fn pending_speed(&self) -> Option<RegisterValue> {
        self.pending_speed
    }

    /// The driver used for every register operation.
    pub fn driver(&self) -> &MotorDriver<L> {
        &self.driver
    }

    /// Run cycles until cancellation or budget exhaustion.
    pub fn run(&mut self) -> SupervisorOutcome {
        tracing::info!(
            direction = %self.controller.direction(),
            max_reversals = self.controller.budget().max(),
            poll_ms = self.poll_interval.as_millis() as u64,
            "supervisor started"
        );

        let outcome = loop {
            if self.cancel.is_cancelled() {
                let from = self.controller.state();
                tracing::info!(state = %from, "stopping on cancellation");
                let shutdown = self.controller.stop(&self.driver, self.shutdown);
                break SupervisorOutcome::Cancelled { from, shutdown };
            }

            self.cycle();

            if self.controller.state() == ControlState::BudgetExhausted {
                let shutdown = DirectionController::shutdown(&self.driver, self.shutdown);
                break SupervisorOutcome::BudgetExhausted {
                    reversals: self.controller.budget().used(),
                    shutdown,
                };
            }

            self.cancel.sleep(self.poll_interval);
        };

        self.commands.close();
        self.telemetry.publish_state(self.controller.state());
        tracing::info!(?outcome, "supervisor finished");
        outcome
    }

    /// Run exactly one control cycle without sleeping.
    pub fn cycle(&mut self) -> CycleReport {
        let state = self.controller.state();
        let now = self.clock.now_ms();

        let speed_written = if state.is_terminal() {
            None
        } else {
            self.apply_speed()
        };

        let mut sample_fed = false;
        let rpm = match self.driver.rpm() {
            Ok(rpm) => {
                self.telemetry.publish_rpm(rpm);
                if state == ControlState::Running && self.spun_up(now) {
                    self.detector.observe(RpmSample::new(rpm, now));
                    sample_fed = true;
                }
                Some(rpm)
            }
            Err(err) => {
                tracing::warn!(error = %err, "rpm read failed, sample skipped");
                None
            }
        };

        if self.monitor_fault && state == ControlState::Running {
            self.check_fault();
        }

        let stalled = state == ControlState::Running && self.detector.is_stalled();
        let step = match self.controller.step(&self.driver, stalled, &self.cancel) {
            Ok(outcome) => {
                self.after_step(state, outcome);
                Some(outcome)
            }
            Err(err) => {
                tracing::warn!(state = %state, error = %err, "step failed, retrying next cycle");
                None
            }
        };

        let state = self.controller.state();
        self.telemetry.publish_state(state);
        self.telemetry.publish_direction(self.controller.applied_direction());
        self.telemetry.finish_cycle();

        tracing::debug!(
            state = %state,
            rpm,
            window = self.detector.len(),
            stalled,
            "cycle complete"
        );

        CycleReport {
            state,
            speed_written,
            rpm,
            sample_fed,
            stalled,
            step,
        }
    }

    fn apply_speed(&mut self) -> Option<RegisterValue> {
        if let Some(cmd) = self.commands.try_pop() {
            if let Some(stale) = self.pending_speed.replace(cmd.value()) {
                tracing::debug!(stale, speed = cmd.value(), "unwritten speed superseded");
            }
        }
        let speed = self.pending_speed?;
        match self.driver.set_speed(speed) {
            Ok(()) => {
                self.pending_speed = None;
                tracing::info!(speed, "speed applied");
                Some(speed)
            }
            Err(_) => None,
        }
    }

    fn spun_up(&self, now: u64) -> bool {
        self.running_since_ms
            .is_some_and(|since| now.saturating_sub(since) >= self.spin_up_ms)
    }

    fn check_fault(&mut self) {
        match self.driver.fault() {
            Ok(code) => {
                self.telemetry.publish_fault(code);
                if self.last_fault != Some(code) {
                    if code == FAULT_NONE {
                        if self.last_fault.is_some() {
                            tracing::info!("driver fault cleared");
                        }
                    } else {
                        tracing::warn!(code, "driver reports fault");
                    }
                    self.last_fault = Some(code);
                }
            }
            Err(err) => tracing::debug!(error = %err, "fault read failed"),
        }
    }

    fn after_step(&mut self, before: ControlState, outcome: StepOutcome) {
        if let StepOutcome::Reversed { .. } = outcome {
            // Deceleration to zero must not count as the next stall.
            self.detector.clear();
            self.telemetry
                .publish_reversals(self.controller.budget().used());
        }

        let after = self.controller.state();
        if after == ControlState::Running && before != ControlState::Running {
            self.detector.clear();
            self.running_since_ms = Some(self.clock.now_ms());
        } else if after != ControlState::Running {
            self.running_since_ms = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{command_channel, CommandSender};
    use crate::config::{ReversalConfig, SpeedConfig, SupervisorConfig};
    use crate::error::TransportError;
    use crate::hal::{MockClock, MockDeviceHandle, MockLink};
    use crate::transport::RegisterTransport;
    use std::sync::Arc;

    const SPEED: u16 = 0x0001;

    struct Harness {
        supervisor: Supervisor<MockLink, Arc<MockClock>>,
        device: MockDeviceHandle,
        tx: CommandSender,
        clock: Arc<MockClock>,
    }

    fn harness(reversal: ReversalConfig, running_rpm: u16) -> Harness {
        let config = Config::default()
            .with_reversal(reversal)
            .with_speed(SpeedConfig::default().with_initial(100))
            .with_supervisor(SupervisorConfig::default().with_poll_interval_ms(1));
        let link = MockLink::new().with_running_rpm(running_rpm);
        let device = link.device();
        let transport = Arc::new(RegisterTransport::new(link, 100, Duration::from_millis(50)));
        let driver = MotorDriver::new(transport, config.registers);
        let (tx, rx) = command_channel((&config.speed).into());
        let clock = Arc::new(MockClock::new());
        let supervisor =
            Supervisor::new(driver, &config, rx, CancelToken::new(), Arc::clone(&clock)).unwrap();
        Harness {
            supervisor,
            device,
            tx,
            clock,
        }
    }

    fn reversal() -> ReversalConfig {
        ReversalConfig::default()
            .with_stall_window(3)
            .with_settle_ms(0)
            .with_spin_up_ms(0)
    }

    fn to_running(h: &mut Harness) {
        for _ in 0..3 {
            h.supervisor.cycle();
        }
        assert_eq!(h.supervisor.state(), ControlState::Running);
    }

    #[test]
    fn rejects_invalid_config() {
        let config = Config::default().with_reversal(ReversalConfig::default().with_stall_window(0));
        let link = MockLink::new();
        let transport = Arc::new(RegisterTransport::new(link, 100, Duration::from_millis(50)));
        let driver = MotorDriver::new(transport, config.registers);
        let (_tx, rx) = command_channel((&config.speed).into());
        assert!(
            Supervisor::new(driver, &config, rx, CancelToken::new(), MockClock::new()).is_err()
        );
    }

    #[test]
    fn initial_speed_written_first_cycle() {
        let mut h = harness(reversal(), 1000);
        let report = h.supervisor.cycle();
        assert_eq!(report.speed_written, Some(100));
        assert_eq!(h.supervisor.pending_speed(), None);
        assert_eq!(h.device.lock().writes_to(SPEED), vec![100]);
    }

    #[test]
    fn failed_speed_write_stays_pending_until_superseded() {
        let mut h = harness(reversal(), 1000);
        h.supervisor.cycle();

        h.device.lock().fail_writes_to(SPEED, TransportError::Timeout);
        h.tx.submit_speed(10).unwrap();
        h.tx.submit_speed(20).unwrap();
        let report = h.supervisor.cycle();
        assert_eq!(report.speed_written, None);
        assert_eq!(h.supervisor.pending_speed(), Some(20));

        h.tx.submit_speed(30).unwrap();
        h.device.lock().heal(SPEED);
        let report = h.supervisor.cycle();
        assert_eq!(report.speed_written, Some(30));
        assert_eq!(h.device.lock().writes_to(SPEED), vec![100, 30]);
    }

    #[test]
    fn samples_only_fed_while_running() {
        let mut h = harness(reversal(), 1000);
        for _ in 0..3 {
            let report = h.supervisor.cycle();
            assert!(!report.sample_fed);
        }
        let report = h.supervisor.cycle();
        assert!(report.sample_fed);
        assert_eq!(report.rpm, Some(1000));
        assert_eq!(h.supervisor.detector().len(), 1);
    }

    #[test]
    fn failed_rpm_read_leaves_window_untouched() {
        let mut h = harness(reversal(), 1000);
        to_running(&mut h);
        h.supervisor.cycle();
        assert_eq!(h.supervisor.detector().len(), 1);

        h.device.lock().fail_next_reads(1, TransportError::Timeout);
        let report = h.supervisor.cycle();
        assert_eq!(report.rpm, None);
        assert!(!report.sample_fed);
        assert_eq!(h.supervisor.detector().len(), 1);
        assert_eq!(h.supervisor.state(), ControlState::Running);
    }

    #[test]
    fn spin_up_grace_delays_detection() {
        let mut h = harness(reversal().with_spin_up_ms(1000), 0);
        to_running(&mut h);

        for _ in 0..5 {
            assert!(!h.supervisor.cycle().sample_fed);
        }
        assert_eq!(h.supervisor.state(), ControlState::Running);

        h.clock.advance(1000);
        assert!(h.supervisor.cycle().sample_fed);
    }

    #[test]
    fn stall_reverses_and_clears_window() {
        let mut h = harness(reversal(), 0);
        to_running(&mut h);

        let mut stalled_at = None;
        for n in 0..3 {
            let report = h.supervisor.cycle();
            if report.stalled {
                stalled_at = Some(n);
            }
        }
        assert_eq!(stalled_at, Some(2));
        assert_eq!(h.supervisor.state(), ControlState::StallDetected);

        let report = h.supervisor.cycle();
        assert!(matches!(report.step, Some(StepOutcome::Reversed { .. })));
        assert!(h.supervisor.detector().is_empty());
        assert_eq!(h.supervisor.direction(), Direction::CounterClockwise);
        assert_eq!(h.supervisor.telemetry().reversals(), 1);
        assert_eq!(h.supervisor.telemetry().current_direction(), Direction::Clockwise);

        h.supervisor.cycle();
        h.supervisor.cycle();
        assert_eq!(h.supervisor.state(), ControlState::Running);
        assert_eq!(
            h.supervisor.telemetry().current_direction(),
            Direction::CounterClockwise
        );
    }

    #[test]
    fn exhausted_telemetry_direction_matches_device() {
        let mut h = harness(reversal().with_max_reversals(1), 0);
        let outcome = h.supervisor.run();
        assert!(matches!(
            outcome,
            SupervisorOutcome::BudgetExhausted { reversals: 1, .. }
        ));

        assert_eq!(h.supervisor.direction(), Direction::CounterClockwise);
        let device = h.device.lock();
        assert_eq!(device.writes_to(0x0002), vec![0]);
        assert_eq!(
            h.supervisor.telemetry().current_direction(),
            Direction::from_register(device.register(0x0002)).unwrap()
        );
    }

    #[test]
    fn fault_code_published() {
        let mut h = harness(reversal(), 1000);
        to_running(&mut h);
        h.device.lock().registers.insert(0x0017, 5);
        h.supervisor.cycle();
        assert_eq!(h.supervisor.telemetry().fault_code(), Some(5));
        assert_eq!(h.supervisor.state(), ControlState::Running);
    }

    #[test]
    fn telemetry_follows_cycles() {
        let mut h = harness(reversal(), 1200);
        let telemetry = h.supervisor.telemetry();
        to_running(&mut h);
        h.supervisor.cycle();

        assert_eq!(telemetry.state(), ControlState::Running);
        assert_eq!(telemetry.current_rpm(), Some(1200));
        assert_eq!(telemetry.current_direction(), Direction::Clockwise);
        assert_eq!(telemetry.cycles(), 4);
    }
}
