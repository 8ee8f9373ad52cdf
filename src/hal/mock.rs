//! Mock implementations for testing without hardware.
//!
//! This module provides a simulated motor driver reachable through the
//! [`RegisterLink`] trait, plus a controllable clock, so the whole supervisor
//! can be exercised on a desktop.
//!
//! # Available Mocks
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockLink`] | [`RegisterLink`] | Simulated register file with scripted RPM and fault injection |
//! | [`MockClock`] | [`Clock`] | Controllable time source |
//!
//! # Example
//!
//! ```rust
//! use bldc_supervisor::hal::{MockLink, RpmReading};
//! use bldc_supervisor::traits::RegisterLink;
//!
//! let mut link = MockLink::new();
//! let device = link.device();
//! device.lock().script_rpm([RpmReading::Value(0), RpmReading::Value(40)]);
//!
//! assert_eq!(link.read_holding_registers(0x0015, 1, 100).unwrap(), vec![0]);
//! assert_eq!(link.read_holding_registers(0x0015, 1, 100).unwrap(), vec![40]);
//!
//! link.write_register(0x0003, 1, 100).unwrap();
//! assert_eq!(device.lock().writes_to(0x0003), vec![1]);
//! ```
//!
//! [`RegisterLink`]: crate::traits::RegisterLink
//! [`Clock`]: crate::traits::Clock

use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use core::time::Duration;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::TransportError;
use crate::registers::{RegisterAddress, RegisterMap, RegisterValue, ON};
use crate::traits::{Clock, RegisterLink};

// ============================================================================
// Simulated Device
// ============================================================================

/// One recorded register write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteRecord {
    /// Target register.
    pub address: RegisterAddress,
    /// Written value.
    pub value: RegisterValue,
    /// Unit id the write was addressed to.
    pub unit: u8,
}

/// Next answer of the RPM register.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RpmReading {
    /// Reply with this value.
    Value(RegisterValue),
    /// Fail the read.
    Fail(TransportError),
}

/// Register file of the simulated driver.
///
/// Public fields can be inspected or changed directly from tests.
#[derive(Debug)]
pub struct MockDevice {
    /// Current register contents. Unset registers read as 0.
    pub registers: BTreeMap<RegisterAddress, RegisterValue>,
    /// Every successful write, in order.
    pub writes: Vec<WriteRecord>,
    /// Number of read transactions served (including failed ones).
    pub read_count: usize,
    /// Addresses used to simulate RPM behavior.
    pub map: RegisterMap,
    /// RPM reported while enabled once the script is exhausted.
    pub running_rpm: RegisterValue,
    /// Shorten the next read reply by one register.
    pub truncate_next_read: bool,
    rpm_script: VecDeque<RpmReading>,
    write_failures: VecDeque<TransportError>,
    read_failures: VecDeque<TransportError>,
    failing_addresses: BTreeMap<RegisterAddress, TransportError>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self {
            registers: BTreeMap::new(),
            writes: Vec::new(),
            read_count: 0,
            map: RegisterMap::default(),
            running_rpm: 0,
            truncate_next_read: false,
            rpm_script: VecDeque::new(),
            write_failures: VecDeque::new(),
            read_failures: VecDeque::new(),
            failing_addresses: BTreeMap::new(),
        }
    }
}

impl MockDevice {
    /// Queue RPM answers, consumed one per RPM read.
    pub fn script_rpm(&mut self, readings: impl IntoIterator<Item = RpmReading>) {
        self.rpm_script.extend(readings);
    }

    /// Queue plain RPM values.
    pub fn script_rpm_values(&mut self, values: impl IntoIterator<Item = RegisterValue>) {
        self.rpm_script
            .extend(values.into_iter().map(RpmReading::Value));
    }

    /// RPM answers still queued.
    pub fn scripted_remaining(&self) -> usize {
        self.rpm_script.len()
    }

    /// Fail the next `count` writes (to any register) with `err`.
    pub fn fail_next_writes(&mut self, count: usize, err: TransportError) {
        self.write_failures
            .extend(core::iter::repeat(err).take(count));
    }

    /// Fail the next `count` reads (of any register) with `err`.
    pub fn fail_next_reads(&mut self, count: usize, err: TransportError) {
        self.read_failures
            .extend(core::iter::repeat(err).take(count));
    }

    /// Fail every write to `address` until [`heal`](Self::heal) is called.
    pub fn fail_writes_to(&mut self, address: RegisterAddress, err: TransportError) {
        self.failing_addresses.insert(address, err);
    }

    /// Stop failing writes to `address`.
    pub fn heal(&mut self, address: RegisterAddress) {
        self.failing_addresses.remove(&address);
    }

    /// Current value of a register.
    pub fn register(&self, address: RegisterAddress) -> RegisterValue {
        self.registers.get(&address).copied().unwrap_or(0)
    }

    /// Values written to `address`, oldest first.
    pub fn writes_to(&self, address: RegisterAddress) -> Vec<RegisterValue> {
        self.writes
            .iter()
            .filter(|w| w.address == address)
            .map(|w| w.value)
            .collect()
    }

    /// Whether the enable register is on.
    pub fn is_enabled(&self) -> bool {
        self.register(self.map.enable) == ON
    }

    fn read(&mut self, address: RegisterAddress, count: u16) -> Result<Vec<RegisterValue>, TransportError> {
        self.read_count += 1;
        if let Some(err) = self.read_failures.pop_front() {
            return Err(err);
        }

        let mut values = Vec::with_capacity(usize::from(count));
        for offset in 0..count {
            let reg = address.wrapping_add(offset);
            let value = if reg == self.map.rpm {
                self.next_rpm()?
            } else {
                self.register(reg)
            };
            values.push(value);
        }

        if self.truncate_next_read {
            self.truncate_next_read = false;
            values.pop();
        }
        Ok(values)
    }

    fn next_rpm(&mut self) -> Result<RegisterValue, TransportError> {
        let rpm = match self.rpm_script.pop_front() {
            Some(RpmReading::Value(v)) => v,
            Some(RpmReading::Fail(err)) => return Err(err),
            None if self.is_enabled() => self.running_rpm,
            None => 0,
        };
        self.registers.insert(self.map.rpm, rpm);
        Ok(rpm)
    }

    fn write(&mut self, address: RegisterAddress, value: RegisterValue, unit: u8) -> Result<(), TransportError> {
        if let Some(err) = self.failing_addresses.get(&address) {
            return Err(err.clone());
        }
        if let Some(err) = self.write_failures.pop_front() {
            return Err(err);
        }
        self.registers.insert(address, value);
        if address == self.map.direction {
            self.registers.insert(self.map.direction_readback, value);
        } else if address == self.map.speed {
            self.registers.insert(self.map.speed_readback, value);
        }
        self.writes.push(WriteRecord {
            address,
            value,
            unit,
        });
        Ok(())
    }
}

/// Shared handle to a [`MockDevice`].
pub type MockDeviceHandle = Arc<Mutex<MockDevice>>;

// ============================================================================
// Mock Link
// ============================================================================

/// Simulated field-bus link.
///
/// The device state lives behind a shared handle so tests can inspect it
/// after the link has been moved into a
/// [`RegisterTransport`](crate::transport::RegisterTransport). The link also
/// counts transactions whose execution windows overlapped; with a correct
/// transport that count stays at zero.
#[derive(Debug, Clone)]
pub struct MockLink {
    device: MockDeviceHandle,
    in_flight: Arc<AtomicUsize>,
    overlaps: Arc<AtomicUsize>,
    transaction_delay: Option<Duration>,
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLink {
    /// Creates a link to a fresh device with the default register map.
    pub fn new() -> Self {
        Self {
            device: Arc::new(Mutex::new(MockDevice::default())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            overlaps: Arc::new(AtomicUsize::new(0)),
            transaction_delay: None,
        }
    }

    /// Reports `rpm` whenever the motor is enabled and no script is queued.
    pub fn with_running_rpm(self, rpm: RegisterValue) -> Self {
        self.device.lock().running_rpm = rpm;
        self
    }

    /// Uses `map` to decide which register is the RPM register.
    pub fn with_map(self, map: RegisterMap) -> Self {
        self.device.lock().map = map;
        self
    }

    /// Holds each transaction open for `delay` (simulated wire time).
    pub fn with_transaction_delay(mut self, delay: Duration) -> Self {
        self.transaction_delay = Some(delay);
        self
    }

    /// Shared handle to the simulated device.
    pub fn device(&self) -> MockDeviceHandle {
        Arc::clone(&self.device)
    }

    /// Transactions that started while another was still running.
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::Acquire)
    }

    fn on_wire<T>(&self, op: impl FnOnce(&mut MockDevice) -> T) -> T {
        if self.in_flight.fetch_add(1, Ordering::AcqRel) > 0 {
            self.overlaps.fetch_add(1, Ordering::AcqRel);
        }
        if let Some(delay) = self.transaction_delay {
            std::thread::sleep(delay);
        }
        let result = op(&mut self.device.lock());
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        result
    }
}

impl RegisterLink for MockLink {
    type Error = TransportError;

    fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
        _unit: u8,
    ) -> Result<Vec<u16>, TransportError> {
        self.on_wire(|device| device.read(address, count))
    }

    fn write_register(&mut self, address: u16, value: u16, unit: u8) -> Result<(), TransportError> {
        self.on_wire(|device| device.write(address, value, unit))
    }
}

// ============================================================================
// Mock Clock
// ============================================================================

/// Mock clock for testing.
///
/// Provides a controllable time source for testing time-dependent behavior.
/// Interior mutability lets a test advance time while the supervisor holds
/// a shared reference.
///
/// # Example
///
/// ```rust
/// use bldc_supervisor::hal::MockClock;
/// use bldc_supervisor::traits::Clock;
///
/// let clock = MockClock::new();
/// assert_eq!(clock.now_ms(), 0);
///
/// clock.set(1000);
/// assert_eq!(clock.now_ms(), 1000);
///
/// clock.advance(500);
/// assert_eq!(clock.now_ms(), 1500);
/// ```
#[derive(Debug, Default)]
pub struct MockClock {
    current_ms: AtomicU64,
}

impl MockClock {
    /// Creates a new mock clock starting at 0ms.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the current time in milliseconds.
    pub fn set(&self, ms: u64) {
        self.current_ms.store(ms, Ordering::Release);
    }

    /// Advances time by the specified milliseconds.
    pub fn advance(&self, ms: u64) {
        self.current_ms.fetch_add(ms, Ordering::AcqRel);
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.current_ms.load(Ordering::Acquire)
    }
}

impl Clock for Arc<MockClock> {
    fn now_ms(&self) -> u64 {
        self.as_ref().now_ms()
    }
}
