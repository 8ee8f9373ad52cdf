//! Register map of the motor driver.
//!
//! Addresses are the holding-register offsets of the driver's Modbus map.
//! The defaults match the BLDC driver this crate was written against; other
//! drivers with the same semantics can be used by overriding addresses in
//! the `[registers]` config section.
//!
//! | Register | Default | Access | Values |
//! |----------|---------|--------|--------|
//! | speed | `0x0001` | write | `0..=max` (device specific) |
//! | direction | `0x0002` | write | `0 = CW`, `1 = CCW` |
//! | enable | `0x0003` | write | `0 = stop`, `1 = run` |
//! | brake | `0x0004` | write | `0 = released`, `1 = engaged` |
//! | speed read-back | `0x0007` | read | commanded speed |
//! | direction read-back | `0x0008` | read | `0`/`1` |
//! | current | `0x000B` | read | driver units |
//! | RPM | `0x0015` | read | revolutions per minute |
//! | fault | `0x0017` | read | `0 = normal` |

/// Holding-register address.
pub type RegisterAddress = u16;

/// Device-width register value.
pub type RegisterValue = u16;

/// Value written to `enable`/`brake` to switch them on.
pub const ON: RegisterValue = 1;

/// Value written to `enable`/`brake` to switch them off.
pub const OFF: RegisterValue = 0;

/// Fault register value meaning "no fault".
pub const FAULT_NONE: RegisterValue = 0;

/// Addresses of every register the supervisor touches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RegisterMap {
    /// Target speed (write).
    pub speed: RegisterAddress,
    /// Rotation direction (write).
    pub direction: RegisterAddress,
    /// Motor enable (write).
    pub enable: RegisterAddress,
    /// Brake (write).
    pub brake: RegisterAddress,
    /// Commanded speed read-back.
    pub speed_readback: RegisterAddress,
    /// Direction read-back.
    pub direction_readback: RegisterAddress,
    /// Motor current.
    pub current: RegisterAddress,
    /// Measured RPM (read-only).
    pub rpm: RegisterAddress,
    /// Fault status (read-only).
    pub fault: RegisterAddress,
}

impl Default for RegisterMap {
    fn default() -> Self {
        Self {
            speed: 0x0001,
            direction: 0x0002,
            enable: 0x0003,
            brake: 0x0004,
            speed_readback: 0x0007,
            direction_readback: 0x0008,
            current: 0x000B,
            rpm: 0x0015,
            fault: 0x0017,
        }
    }
}

impl RegisterMap {
    /// Human-readable name of an address, for logs.
    pub fn name_of(&self, address: RegisterAddress) -> &'static str {
        match address {
            a if a == self.speed => "speed",
            a if a == self.direction => "direction",
            a if a == self.enable => "enable",
            a if a == self.brake => "brake",
            a if a == self.speed_readback => "speed_readback",
            a if a == self.direction_readback => "direction_readback",
            a if a == self.current => "current",
            a if a == self.rpm => "rpm",
            a if a == self.fault => "fault",
            _ => "unknown",
        }
    }

    /// Set the RPM register address
    pub fn with_rpm(mut self, address: RegisterAddress) -> Self {
        self.rpm = address;
        self
    }

    /// Set the fault register address
    pub fn with_fault(mut self, address: RegisterAddress) -> Self {
        self.fault = address;
        self
    }
}
