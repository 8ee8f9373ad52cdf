//! Hardware abstraction traits for the register link and time source.
//!
//! This module defines the interfaces that let the supervisor run against a
//! real Modbus-RTU serial link or a simulated device with the same code.
//!
//! # Key Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`RegisterLink`] | Holding-register read/write over the field bus |
//! | [`Clock`] | Monotonic millisecond time source |
//!
//! # Implementation
//!
//! For testing and desktop development, use [`crate::hal::MockLink`]. For a
//! real driver, use `hal::ModbusRtuLink` (requires the `modbus` feature).
//!
//! # Example
//!
//! ```rust
//! use bldc_supervisor::traits::RegisterLink;
//! use bldc_supervisor::hal::MockLink;
//!
//! let mut link = MockLink::new();
//! link.write_register(0x0001, 120, 100).unwrap();
//! assert_eq!(link.read_holding_registers(0x0001, 1, 100).unwrap(), vec![120]);
//! ```

use crate::error::TransportError;

/// Rotation direction of the motor.
///
/// Encoded on the direction register as `0 = CW`, `1 = CCW`. The only
/// transition between directions is [`toggled`](Self::toggled).
///
/// # Default
///
/// Defaults to [`Clockwise`](Self::Clockwise), the direction the driver
/// powers up in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Direction {
    /// Clockwise rotation (register value 0).
    #[default]
    Clockwise,
    /// Counter-clockwise rotation (register value 1).
    CounterClockwise,
}

impl Direction {
    /// Returns the opposite direction.
    ///
    /// ```
    /// use bldc_supervisor::Direction;
    ///
    /// assert_eq!(Direction::Clockwise.toggled(), Direction::CounterClockwise);
    /// assert_eq!(Direction::CounterClockwise.toggled(), Direction::Clockwise);
    /// ```
    #[inline]
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Direction::Clockwise => Direction::CounterClockwise,
            Direction::CounterClockwise => Direction::Clockwise,
        }
    }

    /// Value written to the direction register.
    #[inline]
    pub const fn register_value(self) -> u16 {
        match self {
            Direction::Clockwise => 0,
            Direction::CounterClockwise => 1,
        }
    }

    /// Decode a direction register value. Anything other than 0 or 1 is `None`.
    #[inline]
    pub const fn from_register(value: u16) -> Option<Self> {
        match value {
            0 => Some(Direction::Clockwise),
            1 => Some(Direction::CounterClockwise),
            _ => None,
        }
    }

    /// Short label used in log output.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Direction::Clockwise => "cw",
            Direction::CounterClockwise => "ccw",
        }
    }

    /// Parse direction from text input.
    ///
    /// Accepts `cw`/`clockwise`/`0` and `ccw`/`counterclockwise`/
    /// `counter-clockwise`/`1`. Input is trimmed and case-insensitive.
    ///
    /// # Examples
    ///
    /// ```
    /// use bldc_supervisor::Direction;
    ///
    /// assert_eq!(Direction::from_text("cw"), Some(Direction::Clockwise));
    /// assert_eq!(Direction::from_text(" CCW "), Some(Direction::CounterClockwise));
    /// assert_eq!(Direction::from_text("1"), Some(Direction::CounterClockwise));
    /// assert_eq!(Direction::from_text("sideways"), None);
    /// ```
    pub fn from_text(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cw" | "clockwise" | "0" => Some(Direction::Clockwise),
            "ccw" | "counterclockwise" | "counter-clockwise" | "1" => {
                Some(Direction::CounterClockwise)
            }
            _ => None,
        }
    }
}

impl core::fmt::Display for Direction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field-bus link exposing holding-register access.
///
/// This is the only thing the supervisor needs from the wire protocol: a
/// multi-register read and a single-register write addressed to a unit
/// (slave) id. Framing, CRC and serial settings are the implementor's
/// concern.
///
/// # Implementation Notes
///
/// - Every call must finish within the link's own timeout. A timed-out
///   transaction is an error, never a partial success.
/// - A failed write may still have latched on the device. Callers treat it
///   as "unknown state".
/// - Implementations are driven from whichever thread holds the
///   [`RegisterTransport`](crate::transport::RegisterTransport) lock, so
///   they must be `Send`.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use bldc_supervisor::traits::RegisterLink;
/// use bldc_supervisor::TransportError;
///
/// struct LoopbackLink { regs: [u16; 64] }
///
/// impl RegisterLink for LoopbackLink {
///     type Error = TransportError;
///
///     fn read_holding_registers(&mut self, address: u16, count: u16, _unit: u8)
///         -> Result<Vec<u16>, TransportError>
///     {
///         let start = address as usize;
///         Ok(self.regs[start..start + count as usize].to_vec())
///     }
///
///     fn write_register(&mut self, address: u16, value: u16, _unit: u8)
///         -> Result<(), TransportError>
///     {
///         self.regs[address as usize] = value;
///         Ok(())
///     }
/// }
/// ```
pub trait RegisterLink: Send {
    /// Error type for link operations.
    type Error: Into<TransportError>;

    /// Read `count` consecutive holding registers starting at `address`.
    fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
        unit: u8,
    ) -> Result<Vec<u16>, Self::Error>;

    /// Write a single holding register.
    fn write_register(&mut self, address: u16, value: u16, unit: u8) -> Result<(), Self::Error>;
}

/// Time source for sample timestamps and the spin-up grace period.
///
/// # Example
///
/// ```rust
/// use bldc_supervisor::traits::Clock;
/// use bldc_supervisor::hal::MockClock;
///
/// let clock = MockClock::new();
/// assert_eq!(clock.now_ms(), 0);
///
/// clock.advance(100);
/// assert_eq!(clock.now_ms(), 100);
/// ```
pub trait Clock: Send + Sync {
    /// Returns current time in milliseconds since an arbitrary epoch.
    ///
    /// Must be monotonically increasing.
    fn now_ms(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_default_is_clockwise() {
        assert_eq!(Direction::default(), Direction::Clockwise);
    }

    #[test]
    fn direction_toggle_is_involution() {
        for dir in [Direction::Clockwise, Direction::CounterClockwise] {
            assert_ne!(dir.toggled(), dir);
            assert_eq!(dir.toggled().toggled(), dir);
        }
    }

    #[test]
    fn direction_register_encoding() {
        assert_eq!(Direction::Clockwise.register_value(), 0);
        assert_eq!(Direction::CounterClockwise.register_value(), 1);
        assert_eq!(Direction::from_register(0), Some(Direction::Clockwise));
        assert_eq!(Direction::from_register(1), Some(Direction::CounterClockwise));
        assert_eq!(Direction::from_register(2), None);
    }

    #[test]
    fn direction_from_text_variants() {
        assert_eq!(Direction::from_text("clockwise"), Some(Direction::Clockwise));
        assert_eq!(Direction::from_text("0"), Some(Direction::Clockwise));
        assert_eq!(
            Direction::from_text("Counter-Clockwise"),
            Some(Direction::CounterClockwise)
        );
        assert_eq!(Direction::from_text("\tccw\n"), Some(Direction::CounterClockwise));
        assert_eq!(Direction::from_text(""), None);
        assert_eq!(Direction::from_text("2"), None);
    }

    #[test]
    fn direction_display() {
        assert_eq!(Direction::Clockwise.to_string(), "cw");
        assert_eq!(Direction::CounterClockwise.to_string(), "ccw");
    }
}
