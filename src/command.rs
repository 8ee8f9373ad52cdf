//! Operator speed commands and the coalescing command channel.
//!
//! Speed changes travel from the operator thread to the control loop through
//! a single-slot channel:
//!
//! - The producer never blocks. A new command overwrites an unconsumed one,
//!   because only the latest operator intent matters.
//! - The consumer never blocks. [`CommandReceiver::try_pop`] returns
//!   immediately with whatever is in the slot.
//! - Range validation happens before anything is queued, in
//!   [`SpeedLimits::validate`].
//!
//! # Example
//!
//! ```rust
//! use bldc_supervisor::command::{command_channel, SpeedLimits};
//!
//! let (tx, rx) = command_channel(SpeedLimits::new(0, 300));
//!
//! tx.submit_speed(10).unwrap();
//! tx.submit_speed(20).unwrap();
//! tx.submit_speed(30).unwrap();
//! assert!(tx.submit_speed(301).is_err()); // rejected, not queued
//!
//! assert_eq!(rx.try_pop().map(|c| c.value()), Some(30));
//! assert_eq!(rx.try_pop(), None);
//! ```

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::ValidationError;
use crate::registers::RegisterValue;

/// Accepted speed register range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpeedLimits {
    min: RegisterValue,
    max: RegisterValue,
}

impl SpeedLimits {
    /// Limits `min..=max`. Swapped bounds are put back in order.
    pub fn new(min: RegisterValue, max: RegisterValue) -> Self {
        Self {
            min: min.min(max),
            max: max.max(min),
        }
    }

    /// Lowest accepted value.
    pub fn min(&self) -> RegisterValue {
        self.min
    }

    /// Highest accepted value.
    pub fn max(&self) -> RegisterValue {
        self.max
    }

    /// Turn raw operator input into a command, or explain why not.
    pub fn validate(&self, value: i64) -> Result<SpeedCommand, ValidationError> {
        ValidationError::check_range("speed", value, self.min.into(), self.max.into())?;
        // In range of two u16 bounds, so the cast is lossless.
        Ok(SpeedCommand(value as RegisterValue))
    }
}

impl From<&crate::config::SpeedConfig> for SpeedLimits {
    fn from(config: &crate::config::SpeedConfig) -> Self {
        Self::new(config.min, config.max)
    }
}

/// A speed value that has passed [`SpeedLimits::validate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpeedCommand(RegisterValue);

impl SpeedCommand {
    /// Register value to write.
    pub fn value(self) -> RegisterValue {
        self.0
    }
}

/// Why a submission was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    /// Value outside the device range.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    /// The consumer is gone or the channel was closed.
    #[error("command channel closed")]
    Closed,
}

#[derive(Debug, Default)]
struct Slot {
    pending: Mutex<Option<SpeedCommand>>,
    closed: AtomicBool,
    pushed: AtomicU64,
    superseded: AtomicU64,
}

impl Slot {
    fn push(&self, cmd: SpeedCommand) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let previous = self.pending.lock().replace(cmd);
        self.pushed.fetch_add(1, Ordering::Relaxed);
        if previous.is_some() {
            self.superseded.fetch_add(1, Ordering::Relaxed);
        }
        true
    }

    fn try_pop(&self) -> Option<SpeedCommand> {
        self.pending.lock().take()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Create a connected sender/receiver pair.
///
/// Neither half is `Clone`: exactly one producer and one consumer.
pub fn command_channel(limits: SpeedLimits) -> (CommandSender, CommandReceiver) {
    let slot = Arc::new(Slot::default());
    (
        CommandSender {
            slot: Arc::clone(&slot),
            limits,
        },
        CommandReceiver { slot },
    )
}

/// Producer half, owned by the operator input thread.
#[derive(Debug)]
pub struct CommandSender {
    slot: Arc<Slot>,
    limits: SpeedLimits,
}

impl CommandSender {
    /// Queue an already-validated command. Returns `false` if the channel
    /// is closed.
    pub fn push(&self, cmd: SpeedCommand) -> bool {
        self.slot.push(cmd)
    }

    /// Validate `value` against the device range and queue it.
    pub fn submit_speed(&self, value: i64) -> Result<SpeedCommand, SubmitError> {
        let cmd = self.limits.validate(value)?;
        if self.push(cmd) {
            Ok(cmd)
        } else {
            Err(SubmitError::Closed)
        }
    }

    /// Range this sender validates against.
    pub fn limits(&self) -> SpeedLimits {
        self.limits
    }

    /// Whether the channel has been closed.
    pub fn is_closed(&self) -> bool {
        self.slot.closed.load(Ordering::Acquire)
    }

    /// Stop accepting commands.
    pub fn close(&self) {
        self.slot.close();
    }
}

impl Drop for CommandSender {
    fn drop(&mut self) {
        self.slot.close();
    }
}

/// Consumer half, owned by the control loop.
#[derive(Debug)]
pub struct CommandReceiver {
    slot: Arc<Slot>,
}

impl CommandReceiver {
    /// Take the latest unconsumed command, if any. Never blocks.
    pub fn try_pop(&self) -> Option<SpeedCommand> {
        self.slot.try_pop()
    }

    /// Stop accepting commands. Already queued commands stay poppable.
    pub fn close(&self) {
        self.slot.close();
    }

    /// Whether the channel has been closed.
    pub fn is_closed(&self) -> bool {
        self.slot.closed.load(Ordering::Acquire)
    }

    /// Commands accepted so far.
    pub fn pushed(&self) -> u64 {
        self.slot.pushed.load(Ordering::Relaxed)
    }

    /// Commands overwritten before they were popped.
    pub fn superseded(&self) -> u64 {
        self.slot.superseded.load(Ordering::Relaxed)
    }
}

impl Drop for CommandReceiver {
    fn drop(&mut self) {
        self.slot.close();
    }
}
