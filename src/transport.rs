//! Serialized register transport.
//!
//! [`RegisterTransport`] owns the only handle to the field-bus link and wraps
//! every transaction in a short critical section, so reads and writes from
//! the supervisor, the telemetry poller and anyone else never interleave
//! their frames on the wire.
//!
//! # Contract
//!
//! - One transaction in flight at a time.
//! - Waiting for the lock is bounded by `lock_timeout`; a caller that cannot
//!   get in reports [`TransportError::Busy`] instead of blocking.
//! - Link faults come back as [`TransportError`]. Nothing is retried here.
//! - A failed write leaves the register in an unknown state.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use bldc_supervisor::transport::RegisterTransport;
//! use bldc_supervisor::hal::MockLink;
//!
//! let transport = RegisterTransport::new(MockLink::new(), 100, Duration::from_millis(50));
//! transport.write(0x0001, 150).unwrap();
//! assert_eq!(transport.read(0x0001, 1).unwrap(), vec![150]);
//!
//! let stats = transport.stats();
//! assert_eq!(stats.calls, 2);
//! assert_eq!(stats.entries, stats.exits);
//! assert_eq!(stats.max_concurrent, 1);
//! ```

use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use core::time::Duration;

use parking_lot::Mutex;

use crate::error::TransportError;
use crate::registers::{RegisterAddress, RegisterValue};
use crate::traits::RegisterLink;

/// Counters describing transport usage.
///
/// `entries` and `exits` count critical-section entry and exit; they are
/// equal whenever no transaction is running. `max_concurrent` is the largest
/// number of callers ever seen inside the section at once and must never
/// exceed 1.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Calls to `read`/`write`, including ones that never got the lock.
    pub calls: u64,
    /// Critical-section entries.
    pub entries: u64,
    /// Critical-section exits.
    pub exits: u64,
    /// Transactions that returned an error.
    pub failures: u64,
    /// Calls that gave up waiting for the lock.
    pub busy: u64,
    /// Peak simultaneous holders of the critical section.
    pub max_concurrent: u64,
}

#[derive(Debug, Default)]
struct Counters {
    calls: AtomicU64,
    entries: AtomicU64,
    exits: AtomicU64,
    failures: AtomicU64,
    busy: AtomicU64,
    in_flight: AtomicUsize,
    max_concurrent: AtomicUsize,
}

/// Thread-safe, one-at-a-time access to a [`RegisterLink`].
///
/// Share it behind an `Arc` between the control loop and any telemetry
/// consumer.
pub struct RegisterTransport<L: RegisterLink> {
    link: Mutex<L>,
    unit: u8,
    lock_timeout: Duration,
    counters: Counters,
}

impl<L: RegisterLink> RegisterTransport<L> {
    /// Wrap `link`, addressing every transaction to `unit`.
    pub fn new(link: L, unit: u8, lock_timeout: Duration) -> Self {
        Self {
            link: Mutex::new(link),
            unit,
            lock_timeout,
            counters: Counters::default(),
        }
    }

    /// Unit (slave) id used for every transaction.
    pub fn unit(&self) -> u8 {
        self.unit
    }

    /// Read `count` holding registers starting at `address`.
    ///
    /// A reply whose length differs from `count` is reported as
    /// [`TransportError::MalformedResponse`].
    pub fn read(
        &self,
        address: RegisterAddress,
        count: u16,
    ) -> Result<Vec<RegisterValue>, TransportError> {
        let values = self.transact(|link, unit| {
            link.read_holding_registers(address, count, unit)
                .map_err(Into::into)
        })?;
        if values.len() != usize::from(count) {
            self.counters.failures.fetch_add(1, Ordering::Relaxed);
            return Err(TransportError::MalformedResponse(format!(
                "asked for {count} registers at {address:#06x}, got {}",
                values.len()
            )));
        }
        Ok(values)
    }

    /// Read a single register.
    pub fn read_one(&self, address: RegisterAddress) -> Result<RegisterValue, TransportError> {
        let values = self.read(address, 1)?;
        values
            .first()
            .copied()
            .ok_or_else(|| TransportError::MalformedResponse("empty reply".into()))
    }

    /// Write a single register.
    pub fn write(&self, address: RegisterAddress, value: RegisterValue) -> Result<(), TransportError> {
        self.transact(|link, unit| link.write_register(address, value, unit).map_err(Into::into))
    }

    /// Snapshot of the usage counters.
    pub fn stats(&self) -> TransportStats {
        let c = &self.counters;
        TransportStats {
            calls: c.calls.load(Ordering::Acquire),
            entries: c.entries.load(Ordering::Acquire),
            exits: c.exits.load(Ordering::Acquire),
            failures: c.failures.load(Ordering::Acquire),
            busy: c.busy.load(Ordering::Acquire),
            max_concurrent: c.max_concurrent.load(Ordering::Acquire) as u64,
        }
    }

    /// Run `f` with exclusive access to the link, outside the statistics.
    ///
    /// Used by test harnesses and diagnostics to inspect the link in place.
    /// The lock wait is bounded like any transaction.
    pub fn with_link<R>(&self, f: impl FnOnce(&mut L) -> R) -> Result<R, TransportError> {
        let mut link = self
            .link
            .try_lock_for(self.lock_timeout)
            .ok_or(TransportError::Busy {
                waited_ms: self.lock_timeout.as_millis() as u64,
            })?;
        Ok(f(&mut link))
    }

    fn transact<T>(
        &self,
        op: impl FnOnce(&mut L, u8) -> Result<T, TransportError>,
    ) -> Result<T, TransportError> {
        let c = &self.counters;
        c.calls.fetch_add(1, Ordering::AcqRel);

        let Some(mut link) = self.link.try_lock_for(self.lock_timeout) else {
            c.busy.fetch_add(1, Ordering::Relaxed);
            c.failures.fetch_add(1, Ordering::Relaxed);
            let waited_ms = self.lock_timeout.as_millis() as u64;
            tracing::warn!(waited_ms, "register transport busy");
            return Err(TransportError::Busy { waited_ms });
        };

        c.entries.fetch_add(1, Ordering::AcqRel);
        let holders = c.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        c.max_concurrent.fetch_max(holders, Ordering::AcqRel);

        let result = op(&mut link, self.unit);

        c.in_flight.fetch_sub(1, Ordering::AcqRel);
        c.exits.fetch_add(1, Ordering::AcqRel);
        drop(link);

        if let Err(err) = &result {
            c.failures.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(error = %err, "register transaction failed");
        }
        result
    }
}
