//! Trait definitions for hardware abstraction.
//!
//! This module defines the abstractions that allow the supervisor to:
//! - Talk to a real Modbus-RTU driver or a simulated one
//! - Be tested deterministically with a controllable clock
//!
//! The key traits are:
//!
//! - [`RegisterLink`]: Holding-register read/write over the field bus
//! - [`Clock`]: Monotonic time source

pub mod hardware;

pub use hardware::*;
