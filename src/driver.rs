//! Typed register operations for the motor driver.
//!
//! [`MotorDriver`] is a cheap, cloneable view over a shared
//! [`RegisterTransport`] and a [`RegisterMap`]. The control loop and the
//! telemetry poller each hold one; they all funnel through the same
//! transport lock.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use bldc_supervisor::{Direction, MotorDriver, RegisterMap, RegisterTransport};
//! use bldc_supervisor::hal::MockLink;
//!
//! let link = MockLink::new().with_running_rpm(1200);
//! let transport = Arc::new(RegisterTransport::new(link, 100, Duration::from_millis(50)));
//! let driver = MotorDriver::new(transport, RegisterMap::default());
//!
//! driver.set_brake(false).unwrap();
//! driver.set_direction(Direction::CounterClockwise).unwrap();
//! driver.set_enable(true).unwrap();
//! assert_eq!(driver.rpm().unwrap(), 1200);
//! assert_eq!(driver.direction_readback().unwrap(), Some(Direction::CounterClockwise));
//! ```

use std::sync::Arc;

use crate::error::TransportError;
use crate::registers::{RegisterMap, RegisterValue, OFF, ON};
use crate::traits::{Direction, RegisterLink};
use crate::transport::RegisterTransport;

/// Register-level motor operations over a shared transport.
pub struct MotorDriver<L: RegisterLink> {
    transport: Arc<RegisterTransport<L>>,
    map: RegisterMap,
}

impl<L: RegisterLink> Clone for MotorDriver<L> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            map: self.map,
        }
    }
}

impl<L: RegisterLink> MotorDriver<L> {
    /// Create a driver view.
    pub fn new(transport: Arc<RegisterTransport<L>>, map: RegisterMap) -> Self {
        Self { transport, map }
    }

    /// The underlying transport.
    pub fn transport(&self) -> &Arc<RegisterTransport<L>> {
        &self.transport
    }

    /// The register map in use.
    pub fn map(&self) -> &RegisterMap {
        &self.map
    }

    /// Write the speed register. Range checks happen before this point.
    pub fn set_speed(&self, speed: RegisterValue) -> Result<(), TransportError> {
        self.write(self.map.speed, speed)
    }

    /// Write the direction register.
    pub fn set_direction(&self, direction: Direction) -> Result<(), TransportError> {
        self.write(self.map.direction, direction.register_value())
    }

    /// Switch the motor output on or off.
    pub fn set_enable(&self, enable: bool) -> Result<(), TransportError> {
        self.write(self.map.enable, if enable { ON } else { OFF })
    }

    /// Engage (`true`) or release (`false`) the brake.
    pub fn set_brake(&self, engaged: bool) -> Result<(), TransportError> {
        self.write(self.map.brake, if engaged { ON } else { OFF })
    }

    /// Measured RPM.
    pub fn rpm(&self) -> Result<RegisterValue, TransportError> {
        self.transport.read_one(self.map.rpm)
    }

    /// Fault status, `0` meaning normal.
    pub fn fault(&self) -> Result<RegisterValue, TransportError> {
        self.transport.read_one(self.map.fault)
    }

    /// Motor current in driver units.
    pub fn current(&self) -> Result<RegisterValue, TransportError> {
        self.transport.read_one(self.map.current)
    }

    /// Speed the driver reports as commanded.
    pub fn speed_readback(&self) -> Result<RegisterValue, TransportError> {
        self.transport.read_one(self.map.speed_readback)
    }

    /// Direction the driver reports; `None` if the register holds an unknown code.
    pub fn direction_readback(&self) -> Result<Option<Direction>, TransportError> {
        self.transport
            .read_one(self.map.direction_readback)
            .map(Direction::from_register)
    }

    fn write(&self, address: u16, value: RegisterValue) -> Result<(), TransportError> {
        let result = self.transport.write(address, value);
        match &result {
            Ok(()) => tracing::trace!(
                register = self.map.name_of(address),
                value,
                "register written"
            ),
            Err(err) => tracing::warn!(
                register = self.map.name_of(address),
                address = %format_args!("{address:#06x}"),
                value,
                error = %err,
                "register write failed, device state unknown"
            ),
        }
        result
    }
}
