//! Telemetry for plotting and observability consumers.
//!
//! Two pieces:
//!
//! - [`TelemetryHandle`]: lock-free snapshot of what the control loop last
//!   saw (RPM, direction, state, fault code, reversal count). The supervisor
//!   publishes into it each cycle; any thread can read it at any time without
//!   touching the bus.
//! - [`TelemetryPoller`]: an independent consumer that polls the device
//!   through the shared [`RegisterTransport`](crate::transport::RegisterTransport)
//!   at its own cadence and hands [`TelemetryFrame`]s to a sink.

use core::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use core::time::Duration;
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::direction::ControlState;
use crate::driver::MotorDriver;
use crate::registers::RegisterValue;
use crate::traits::{Clock, Direction, RegisterLink};

/// Stored in the `u32` cells when no value has been seen.
const UNSET: u32 = u32::MAX;

#[derive(Debug)]
struct Cells {
    rpm: AtomicU32,
    direction: AtomicU8,
    state: AtomicU8,
    fault: AtomicU32,
    reversals: AtomicU32,
    cycles: AtomicU64,
}

impl Default for Cells {
    fn default() -> Self {
        Self {
            rpm: AtomicU32::new(UNSET),
            direction: AtomicU8::new(0),
            state: AtomicU8::new(ControlState::Idle.code()),
            fault: AtomicU32::new(UNSET),
            reversals: AtomicU32::new(0),
            cycles: AtomicU64::new(0),
        }
    }
}

/// Read side of the control loop's published state.
///
/// Cloning is cheap; every clone sees the same values. All reads are single
/// atomic loads and safe to call concurrently with the control cycle.
#[derive(Debug, Clone, Default)]
pub struct TelemetryHandle {
    cells: Arc<Cells>,
}

impl TelemetryHandle {
    /// A handle with nothing published yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last RPM read by the control loop, `None` before the first good read.
    pub fn current_rpm(&self) -> Option<RegisterValue> {
        decode(self.cells.rpm.load(Ordering::Acquire))
    }

    /// Last direction written to the device by the control loop.
    pub fn current_direction(&self) -> Direction {
        Direction::from_register(self.cells.direction.load(Ordering::Acquire).into())
            .unwrap_or_default()
    }

    /// Control state after the last cycle.
    pub fn state(&self) -> ControlState {
        ControlState::from_code(self.cells.state.load(Ordering::Acquire))
    }

    /// Last fault register value, `None` if never read.
    pub fn fault_code(&self) -> Option<RegisterValue> {
        decode(self.cells.fault.load(Ordering::Acquire))
    }

    /// Reversals performed so far.
    pub fn reversals(&self) -> u32 {
        self.cells.reversals.load(Ordering::Acquire)
    }

    /// Control cycles completed.
    pub fn cycles(&self) -> u64 {
        self.cells.cycles.load(Ordering::Acquire)
    }

    pub(crate) fn publish_rpm(&self, rpm: RegisterValue) {
        self.cells.rpm.store(rpm.into(), Ordering::Release);
    }

    pub(crate) fn publish_direction(&self, direction: Direction) {
        // Direction register values are 0 or 1.
        self.cells
            .direction
            .store(direction.register_value() as u8, Ordering::Release);
    }

    pub(crate) fn publish_state(&self, state: ControlState) {
        self.cells.state.store(state.code(), Ordering::Release);
    }

    pub(crate) fn publish_fault(&self, code: RegisterValue) {
        self.cells.fault.store(code.into(), Ordering::Release);
    }

    pub(crate) fn publish_reversals(&self, reversals: u32) {
        self.cells.reversals.store(reversals, Ordering::Release);
    }

    pub(crate) fn finish_cycle(&self) {
        self.cells.cycles.fetch_add(1, Ordering::AcqRel);
    }
}

fn decode(raw: u32) -> Option<RegisterValue> {
    if raw == UNSET {
        None
    } else {
        RegisterValue::try_from(raw).ok()
    }
}

/// One telemetry poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TelemetryFrame {
    /// Clock reading when the poll started.
    pub at_ms: u64,
    /// RPM register, `None` if the read failed.
    pub rpm: Option<RegisterValue>,
    /// Direction read-back, `None` if the read failed or the code was unknown.
    pub direction: Option<Direction>,
}

/// Independent poller for external consumers.
pub struct TelemetryPoller<L: RegisterLink, C: Clock> {
    driver: MotorDriver<L>,
    clock: C,
    interval: Duration,
}

impl<L: RegisterLink, C: Clock> TelemetryPoller<L, C> {
    /// Poll through `driver` every `interval`.
    pub fn new(driver: MotorDriver<L>, clock: C, interval: Duration) -> Self {
        Self {
            driver,
            clock,
            interval,
        }
    }

    /// Read RPM and direction once. Failed reads become `None`.
    pub fn poll_once(&self) -> TelemetryFrame {
        let at_ms = self.clock.now_ms();
        let rpm = self
            .driver
            .rpm()
            .map_err(|err| tracing::debug!(error = %err, "telemetry rpm read failed"))
            .ok();
        let direction = self
            .driver
            .direction_readback()
            .map_err(|err| tracing::debug!(error = %err, "telemetry direction read failed"))
            .ok()
            .flatten();
        TelemetryFrame {
            at_ms,
            rpm,
            direction,
        }
    }

    /// Poll until `cancel` fires, passing each frame to `sink`.
    ///
    /// Returns the number of frames delivered.
    pub fn run(&self, cancel: &CancelToken, mut sink: impl FnMut(TelemetryFrame)) -> u64 {
        let mut frames = 0;
        while !cancel.is_cancelled() {
            sink(self.poll_once());
            frames += 1;
            if cancel.sleep(self.interval) {
                break;
            }
        }
        tracing::debug!(frames, "telemetry poller stopped");
        frames
    }
}
