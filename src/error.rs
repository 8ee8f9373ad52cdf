//! Error types for the register transport, validation and configuration.
//!
//! Reaching the reversal limit and operator cancellation are not errors;
//! they are reported as [`SupervisorOutcome`](crate::supervisor::SupervisorOutcome)
//! variants.

/// A failed register transaction.
///
/// Every communication-layer fault is translated into one of these before
/// it leaves the [`RegisterTransport`](crate::transport::RegisterTransport).
/// The transport never retries; the caller decides.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The device did not answer within the link timeout.
    #[error("register transaction timed out")]
    Timeout,

    /// The transport lock could not be acquired within its bound.
    #[error("register transport busy for {waited_ms}ms")]
    Busy {
        /// How long the caller waited for the lock.
        waited_ms: u64,
    },

    /// The reply was not what was asked for (wrong length, bad frame, CRC).
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The device rejected the request with a protocol exception (NAK).
    #[error("device exception: {0}")]
    Exception(String),

    /// Serial or OS level failure.
    #[error("link I/O error: {0}")]
    Io(String),

    /// The link is not open.
    #[error("link disconnected")]
    Disconnected,
}

impl TransportError {
    /// True for [`Timeout`](Self::Timeout).
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout)
    }

    /// Whether trying the same transaction on a later cycle can succeed.
    ///
    /// Only [`Disconnected`](Self::Disconnected) is permanent.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Disconnected)
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => TransportError::Timeout,
            std::io::ErrorKind::NotConnected | std::io::ErrorKind::BrokenPipe => {
                TransportError::Disconnected
            }
            std::io::ErrorKind::InvalidData | std::io::ErrorKind::UnexpectedEof => {
                TransportError::MalformedResponse(err.to_string())
            }
            _ => TransportError::Io(err.to_string()),
        }
    }
}

/// An operator command or configuration value outside its accepted range.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Numeric value outside `[min, max]`.
    #[error("{field} = {value} is outside {min}..={max}")]
    OutOfRange {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value.
        value: i64,
        /// Smallest accepted value.
        min: i64,
        /// Largest accepted value.
        max: i64,
    },

    /// Value that fails a non-range rule.
    #[error("{field}: {reason}")]
    Invalid {
        /// Name of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl ValidationError {
    pub(crate) fn out_of_range(field: &'static str, value: i64, min: i64, max: i64) -> Self {
        ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        }
    }

    /// Check `min <= value <= max`.
    pub(crate) fn check_range(
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    ) -> Result<(), Self> {
        if (min..=max).contains(&value) {
            Ok(())
        } else {
            Err(Self::out_of_range(field, value, min, max))
        }
    }
}

/// Failure loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML for [`Config`](crate::config::Config).
    #[cfg(feature = "serde")]
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The file parsed but a value is out of range.
    #[error("invalid config: {0}")]
    Invalid(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_timeout_maps_to_timeout() {
        let err = std::io::Error::new(std::io::ErrorKind::TimedOut, "no reply");
        assert_eq!(TransportError::from(err), TransportError::Timeout);
    }

    #[test]
    fn io_broken_pipe_maps_to_disconnected() {
        let err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged");
        let mapped = TransportError::from(err);
        assert_eq!(mapped, TransportError::Disconnected);
        assert!(!mapped.is_retryable());
    }

    #[test]
    fn io_other_maps_to_io() {
        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "tty");
        assert!(matches!(TransportError::from(err), TransportError::Io(_)));
    }

    #[test]
    fn retryable_classification() {
        assert!(TransportError::Timeout.is_retryable());
        assert!(TransportError::Busy { waited_ms: 5 }.is_retryable());
        assert!(TransportError::Exception("illegal address".into()).is_retryable());
    }

    #[test]
    fn range_check() {
        assert!(ValidationError::check_range("speed", 0, 0, 300).is_ok());
        assert!(ValidationError::check_range("speed", 300, 0, 300).is_ok());
        let err = ValidationError::check_range("speed", 301, 0, 300).unwrap_err();
        assert_eq!(err.to_string(), "speed = 301 is outside 0..=300");
    }
}
