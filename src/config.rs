//! Supervisor configuration.
//!
//! All thresholds that used to be hard-coded per script (window length,
//! settle delay, reversal limit, poll period, link timeout) live in one
//! [`Config`] tree. Every section has defaults and `with_*` builders; with
//! the `serde` feature the tree can also be loaded from TOML, where missing
//! keys fall back to their defaults.
//!
//! # Example
//!
//! ```rust
//! use bldc_supervisor::config::{Config, LinkConfig, ReversalConfig};
//!
//! // Use defaults
//! let config = Config::default();
//! assert!(config.validate().is_ok());
//!
//! // Or customize
//! let config = Config::default()
//!     .with_link(LinkConfig::default().with_port("/dev/ttyUSB1").with_timeout_ms(50))
//!     .with_reversal(ReversalConfig::default().with_max_reversals(4));
//! assert_eq!(config.reversal.max_reversals, 4);
//! ```

use core::time::Duration;

use crate::error::ValidationError;
use crate::registers::{RegisterMap, RegisterValue};
use crate::stall::MAX_STALL_WINDOW;

// ============================================================================
// Main Config
// ============================================================================

/// Complete application configuration
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// Serial link settings
    pub link: LinkConfig,
    /// Register addresses
    pub registers: RegisterMap,
    /// Accepted speed range
    pub speed: SpeedConfig,
    /// Stall debounce and reversal policy
    pub reversal: ReversalConfig,
    /// Control loop timing and shutdown behavior
    pub supervisor: SupervisorConfig,
    /// Independent telemetry poller
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Set link configuration
    pub fn with_link(mut self, link: LinkConfig) -> Self {
        self.link = link;
        self
    }

    /// Set register map
    pub fn with_registers(mut self, registers: RegisterMap) -> Self {
        self.registers = registers;
        self
    }

    /// Set speed configuration
    pub fn with_speed(mut self, speed: SpeedConfig) -> Self {
        self.speed = speed;
        self
    }

    /// Set reversal configuration
    pub fn with_reversal(mut self, reversal: ReversalConfig) -> Self {
        self.reversal = reversal;
        self
    }

    /// Set supervisor configuration
    pub fn with_supervisor(mut self, supervisor: SupervisorConfig) -> Self {
        self.supervisor = supervisor;
        self
    }

    /// Set telemetry configuration
    pub fn with_telemetry(mut self, telemetry: TelemetryConfig) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Check every section, returning the first violation.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.link.validate()?;
        self.speed.validate()?;
        self.reversal.validate()?;
        self.supervisor.validate()?;
        self.telemetry.validate()
    }

    /// Parse and validate a TOML document.
    ///
    /// ```rust
    /// use bldc_supervisor::config::Config;
    ///
    /// let config = Config::from_toml_str(r#"
    ///     [link]
    ///     port = "/dev/ttyUSB2"
    ///     baud_rate = 9600
    ///
    ///     [reversal]
    ///     stall_window = 8
    /// "#).unwrap();
    ///
    /// assert_eq!(config.link.baud_rate, 9600);
    /// assert_eq!(config.reversal.stall_window, 8);
    /// assert_eq!(config.reversal.max_reversals, 10); // default kept
    /// ```
    #[cfg(feature = "serde")]
    pub fn from_toml_str(s: &str) -> Result<Self, crate::error::ConfigError> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    #[cfg(feature = "serde")]
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, crate::error::ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

// ============================================================================
// Link Config
// ============================================================================

/// Serial parity setting
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Parity {
    /// No parity bit
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Serial link configuration
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LinkConfig {
    /// Serial device path
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits per character (5-8)
    pub data_bits: u8,
    /// Parity
    pub parity: Parity,
    /// Stop bits (1 or 2)
    pub stop_bits: u8,
    /// Per-transaction timeout in milliseconds
    pub timeout_ms: u32,
    /// Modbus unit (slave) id of the driver
    pub unit_id: u8,
    /// Longest wait for the transport lock before reporting busy
    pub lock_timeout_ms: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: String::from("/dev/ttyUSB0"),
            baud_rate: 115_200,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
            timeout_ms: 100,
            unit_id: 100,
            lock_timeout_ms: 1000,
        }
    }
}

impl LinkConfig {
    /// Set the serial device path
    pub fn with_port(mut self, port: &str) -> Self {
        self.port = port.to_string();
        self
    }

    /// Set the baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the parity
    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    /// Set the stop bits
    pub fn with_stop_bits(mut self, stop_bits: u8) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    /// Set the transaction timeout
    pub fn with_timeout_ms(mut self, ms: u32) -> Self {
        self.timeout_ms = ms;
        self
    }

    /// Set the unit id
    pub fn with_unit_id(mut self, unit_id: u8) -> Self {
        self.unit_id = unit_id;
        self
    }

    /// Set the transport lock timeout
    pub fn with_lock_timeout_ms(mut self, ms: u32) -> Self {
        self.lock_timeout_ms = ms;
        self
    }

    /// Transaction timeout as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.timeout_ms))
    }

    /// Lock timeout as a [`Duration`]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.lock_timeout_ms))
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.port.trim().is_empty() {
            return Err(ValidationError::Invalid {
                field: "link.port",
                reason: "must not be empty".into(),
            });
        }
        ValidationError::check_range("link.baud_rate", self.baud_rate.into(), 1, i64::from(u32::MAX))?;
        ValidationError::check_range("link.data_bits", self.data_bits.into(), 5, 8)?;
        ValidationError::check_range("link.stop_bits", self.stop_bits.into(), 1, 2)?;
        ValidationError::check_range("link.timeout_ms", self.timeout_ms.into(), 1, 60_000)?;
        ValidationError::check_range(
            "link.lock_timeout_ms",
            self.lock_timeout_ms.into(),
            1,
            600_000,
        )
    }
}

// ============================================================================
// Speed Config
// ============================================================================

/// Accepted speed register range
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SpeedConfig {
    /// Lowest accepted speed value
    pub min: RegisterValue,
    /// Highest accepted speed value (device specific, e.g. 100 or 300)
    pub max: RegisterValue,
    /// Speed written when the supervisor starts
    pub initial: RegisterValue,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            min: 0,
            max: 300,
            initial: 100,
        }
    }
}

impl SpeedConfig {
    /// Set the accepted range
    pub fn with_range(mut self, min: RegisterValue, max: RegisterValue) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Set the start-up speed
    pub fn with_initial(mut self, initial: RegisterValue) -> Self {
        self.initial = initial;
        self
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.min > self.max {
            return Err(ValidationError::Invalid {
                field: "speed.min",
                reason: format!("min {} exceeds max {}", self.min, self.max),
            });
        }
        ValidationError::check_range(
            "speed.initial",
            self.initial.into(),
            self.min.into(),
            self.max.into(),
        )
    }
}

// ============================================================================
// Reversal Config
// ============================================================================

/// Stall debounce and reversal policy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ReversalConfig {
    /// Consecutive zero samples required to confirm a stall
    pub stall_window: usize,
    /// Samples at or below this RPM count as zero
    pub stall_rpm_threshold: RegisterValue,
    /// Wait between disabling the motor and toggling direction
    pub settle_ms: u32,
    /// Reversals allowed before the loop ends
    pub max_reversals: u32,
    /// Time after the motor is enabled before samples feed the detector
    pub spin_up_ms: u32,
}

impl Default for ReversalConfig {
    fn default() -> Self {
        Self {
            stall_window: 5,
            stall_rpm_threshold: 0,
            settle_ms: 500,
            max_reversals: 10,
            spin_up_ms: 1000,
        }
    }
}

impl ReversalConfig {
    /// Set the debounce window length
    pub fn with_stall_window(mut self, samples: usize) -> Self {
        self.stall_window = samples;
        self
    }

    /// Set the near-zero RPM threshold
    pub fn with_stall_rpm_threshold(mut self, rpm: RegisterValue) -> Self {
        self.stall_rpm_threshold = rpm;
        self
    }

    /// Set the settle delay
    pub fn with_settle_ms(mut self, ms: u32) -> Self {
        self.settle_ms = ms;
        self
    }

    /// Set the reversal limit
    pub fn with_max_reversals(mut self, max: u32) -> Self {
        self.max_reversals = max;
        self
    }

    /// Set the spin-up grace period
    pub fn with_spin_up_ms(mut self, ms: u32) -> Self {
        self.spin_up_ms = ms;
        self
    }

    /// Settle delay as a [`Duration`]
    pub fn settle(&self) -> Duration {
        Duration::from_millis(u64::from(self.settle_ms))
    }

    fn validate(&self) -> Result<(), ValidationError> {
        ValidationError::check_range(
            "reversal.stall_window",
            self.stall_window as i64,
            1,
            MAX_STALL_WINDOW as i64,
        )
    }
}

// ============================================================================
// Supervisor Config
// ============================================================================

/// Control loop configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SupervisorConfig {
    /// Period of one control cycle in milliseconds
    pub poll_interval_ms: u32,
    /// Attempts per shutdown write
    pub shutdown_attempts: u8,
    /// Write speed 0 as the last shutdown step
    pub zero_speed_on_shutdown: bool,
    /// Read the fault register while running
    pub monitor_fault: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            shutdown_attempts: 2,
            zero_speed_on_shutdown: true,
            monitor_fault: true,
        }
    }
}

impl SupervisorConfig {
    /// Set the cycle period
    pub fn with_poll_interval_ms(mut self, ms: u32) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set the attempts per shutdown write
    pub fn with_shutdown_attempts(mut self, attempts: u8) -> Self {
        self.shutdown_attempts = attempts;
        self
    }

    /// Set whether shutdown also zeroes the speed register
    pub fn with_zero_speed_on_shutdown(mut self, zero: bool) -> Self {
        self.zero_speed_on_shutdown = zero;
        self
    }

    /// Set whether the fault register is monitored
    pub fn with_monitor_fault(mut self, monitor: bool) -> Self {
        self.monitor_fault = monitor;
        self
    }

    /// Cycle period as a [`Duration`]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.poll_interval_ms))
    }

    fn validate(&self) -> Result<(), ValidationError> {
        ValidationError::check_range(
            "supervisor.poll_interval_ms",
            self.poll_interval_ms.into(),
            1,
            60_000,
        )?;
        ValidationError::check_range(
            "supervisor.shutdown_attempts",
            self.shutdown_attempts.into(),
            1,
            10,
        )
    }
}

// ============================================================================
// Telemetry Config
// ============================================================================

/// Telemetry poller configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TelemetryConfig {
    /// Whether the poller runs
    pub enabled: bool,
    /// Poll period in milliseconds
    pub poll_interval_ms: u32,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 1000,
        }
    }
}

impl TelemetryConfig {
    /// Enable or disable the poller
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the poll period
    pub fn with_poll_interval_ms(mut self, ms: u32) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Poll period as a [`Duration`]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.poll_interval_ms))
    }

    fn validate(&self) -> Result<(), ValidationError> {
        ValidationError::check_range(
            "telemetry.poll_interval_ms",
            self.poll_interval_ms.into(),
            1,
            600_000,
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.link.baud_rate, 115_200);
        assert_eq!(config.link.unit_id, 100);
        assert_eq!(config.reversal.stall_window, 5);
        assert_eq!(config.reversal.max_reversals, 10);
        assert_eq!(config.speed.max, 300);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::default()
            .with_link(
                LinkConfig::default()
                    .with_port("/dev/ttyUSB2")
                    .with_baud_rate(9600)
                    .with_parity(Parity::Even)
                    .with_stop_bits(2)
                    .with_unit_id(1),
            )
            .with_speed(SpeedConfig::default().with_range(0, 100).with_initial(40))
            .with_supervisor(SupervisorConfig::default().with_poll_interval_ms(30));

        assert_eq!(config.link.port, "/dev/ttyUSB2");
        assert_eq!(config.link.baud_rate, 9600);
        assert_eq!(config.link.parity, Parity::Even);
        assert_eq!(config.link.stop_bits, 2);
        assert_eq!(config.link.unit_id, 1);
        assert_eq!(config.speed.max, 100);
        assert_eq!(config.speed.initial, 40);
        assert_eq!(config.supervisor.poll_interval(), Duration::from_millis(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn stall_window_bounds() {
        let zero = Config::default().with_reversal(ReversalConfig::default().with_stall_window(0));
        assert!(matches!(
            zero.validate(),
            Err(ValidationError::OutOfRange {
                field: "reversal.stall_window",
                ..
            })
        ));

        let too_big = Config::default()
            .with_reversal(ReversalConfig::default().with_stall_window(MAX_STALL_WINDOW + 1));
        assert!(too_big.validate().is_err());

        let max = Config::default()
            .with_reversal(ReversalConfig::default().with_stall_window(MAX_STALL_WINDOW));
        assert!(max.validate().is_ok());
    }

    #[test]
    fn initial_speed_must_be_in_range() {
        let config =
            Config::default().with_speed(SpeedConfig::default().with_range(0, 100).with_initial(150));
        assert!(matches!(
            config.validate(),
            Err(ValidationError::OutOfRange {
                field: "speed.initial",
                value: 150,
                ..
            })
        ));
    }

    #[test]
    fn inverted_speed_range_rejected() {
        let config = Config::default()
            .with_speed(SpeedConfig::default().with_range(200, 100).with_initial(150));
        assert!(matches!(
            config.validate(),
            Err(ValidationError::Invalid {
                field: "speed.min",
                ..
            })
        ));
    }

    #[test]
    fn link_settings_rejected() {
        let bad_stop = Config::default().with_link(LinkConfig::default().with_stop_bits(3));
        assert!(bad_stop.validate().is_err());

        let bad_port = Config::default().with_link(LinkConfig::default().with_port("  "));
        assert!(bad_port.validate().is_err());

        let bad_timeout = Config::default().with_link(LinkConfig::default().with_timeout_ms(0));
        assert!(bad_timeout.validate().is_err());
    }

    #[test]
    fn zero_poll_interval_rejected() {
        let config =
            Config::default().with_supervisor(SupervisorConfig::default().with_poll_interval_ms(0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_shutdown_attempts_rejected() {
        let config =
            Config::default().with_supervisor(SupervisorConfig::default().with_shutdown_attempts(0));
        assert!(config.validate().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn toml_partial_document_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [link]
            parity = "odd"
            timeout_ms = 30

            [registers]
            rpm = 0x30

            [supervisor]
            zero_speed_on_shutdown = false
            "#,
        )
        .unwrap();

        assert_eq!(config.link.parity, Parity::Odd);
        assert_eq!(config.link.timeout_ms, 30);
        assert_eq!(config.link.baud_rate, 115_200);
        assert_eq!(config.registers.rpm, 0x30);
        assert_eq!(config.registers.speed, 0x0001);
        assert!(!config.supervisor.zero_speed_on_shutdown);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn toml_invalid_values_rejected() {
        let err = Config::from_toml_str("[reversal]\nstall_window = 0\n").unwrap_err();
        assert!(matches!(err, crate::error::ConfigError::Invalid(_)));

        let err = Config::from_toml_str("[link\nport = 3").unwrap_err();
        assert!(matches!(err, crate::error::ConfigError::Parse(_)));
    }
}
