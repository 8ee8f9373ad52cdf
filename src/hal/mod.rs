//! Hardware Abstraction Layer implementations.
//!
//! This module contains concrete implementations of the traits
//! defined in [`crate::traits`].
//!
//! # Available Implementations
//!
//! - `mock`: Simulated driver and clock for tests and desktop development
//! - `clock`: [`MonotonicClock`] backed by `std::time::Instant`
//! - `modbus`: Modbus-RTU serial link (requires `modbus` feature)

pub mod clock;
pub mod mock;

#[cfg(feature = "modbus")]
pub mod modbus;

pub use clock::*;
pub use mock::*;

#[cfg(feature = "modbus")]
pub use modbus::*;
