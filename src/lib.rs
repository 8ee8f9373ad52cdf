//! # bldc-supervisor
//!
//! Supervisory control loop for a BLDC motor driver reached over
//! Modbus-RTU holding registers.
//!
//! The motor is kept oscillating between two directions: it runs until the
//! RPM stays at zero for a whole debounce window, then it is disabled, given
//! time to settle, reversed and re-enabled. A bounded reversal budget ends
//! the loop deliberately. Operator speed changes arrive asynchronously and
//! never block the loop.
//!
//! ## Features
//!
//! - **Serialized transport**: one bus transaction in flight, bounded lock waits
//! - **Debounced stall detection**: a single zero reading never triggers a reversal
//! - **Reversal state machine**: fixed write order, failed writes retried next cycle
//! - **Coalescing command channel**: the latest operator speed wins
//! - **Cooperative cancellation**: best-effort disable + brake on every exit path
//!
//! ## Architecture
//!
//! The crate is structured to allow testing on desktop without hardware:
//!
//! - `traits` - Register link and clock abstractions
//! - `transport` - Lock-guarded access to the single link
//! - `driver` - Typed register operations
//! - `stall` - Debounce window
//! - `command` - Operator command channel
//! - `direction` - Reversal state machine
//! - `supervisor` - The control cycle that ties everything together
//! - `hal` - Concrete links (mock for testing, Modbus-RTU for hardware)
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use bldc_supervisor::{
//!     command_channel, CancelToken, Config, ControlState, MotorDriver, RegisterTransport,
//!     Supervisor,
//!     hal::{MockLink, MonotonicClock},
//! };
//!
//! let config = Config::default();
//! let link = MockLink::new().with_running_rpm(1500);
//! let transport = Arc::new(RegisterTransport::new(
//!     link,
//!     config.link.unit_id,
//!     config.link.lock_timeout(),
//! ));
//! let driver = MotorDriver::new(transport, config.registers);
//! let (tx, rx) = command_channel((&config.speed).into());
//!
//! let mut supervisor =
//!     Supervisor::new(driver, &config, rx, CancelToken::new(), MonotonicClock::new()).unwrap();
//!
//! tx.submit_speed(150).unwrap();
//! for _ in 0..4 {
//!     supervisor.cycle();
//! }
//! assert_eq!(supervisor.state(), ControlState::Running);
//! assert_eq!(supervisor.telemetry().current_rpm(), Some(1500));
//! ```

#![warn(missing_docs)]

/// Cooperative cancellation shared by all worker threads.
pub mod cancel;
/// Operator speed commands and the coalescing channel.
pub mod command;
/// Configuration tree with defaults, builders and validation.
pub mod config;
/// Direction-reversal state machine and reversal budget.
pub mod direction;
/// Typed motor register operations.
pub mod driver;
/// Error types.
pub mod error;
/// Hardware abstraction layer with mock implementations for testing.
pub mod hal;
/// Line-oriented operator input loop.
pub mod operator;
/// Register map of the motor driver.
pub mod registers;
/// Debounced stall detection.
pub mod stall;
/// The supervisory control loop.
pub mod supervisor;
/// Telemetry snapshot and independent poller.
pub mod telemetry;
/// Core traits for hardware abstraction.
pub mod traits;
/// Serialized register transport.
pub mod transport;

// Re-exports for convenience
pub use cancel::CancelToken;
pub use command::{
    command_channel, CommandReceiver, CommandSender, SpeedCommand, SpeedLimits, SubmitError,
};
pub use direction::{
    ControlState, DirectionController, ReversalBudget, ShutdownPolicy, ShutdownReport,
    StepOutcome,
};
pub use driver::MotorDriver;
pub use error::{ConfigError, TransportError, ValidationError};
pub use operator::{run_operator_input, InputEnd, InputSummary, OperatorLine};
pub use registers::{RegisterAddress, RegisterMap, RegisterValue};
pub use stall::{RpmSample, StallDetector};
pub use supervisor::{CycleReport, Supervisor, SupervisorOutcome};
pub use telemetry::{TelemetryFrame, TelemetryHandle, TelemetryPoller};
pub use traits::{Clock, Direction, RegisterLink};
pub use transport::{RegisterTransport, TransportStats};

// Config re-exports
pub use config::{
    Config, LinkConfig, Parity, ReversalConfig, SpeedConfig, SupervisorConfig, TelemetryConfig,
};
