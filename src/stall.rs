//! Debounced stall detection.
//!
//! A single zero RPM reading is not evidence of a stall: the driver's tach
//! input is noisy and a reading can land between pulses. [`StallDetector`]
//! keeps the most recent `N` samples in a fixed-capacity window and only
//! reports a stall when the window is full and every sample in it is zero
//! (or at/below the configured near-zero threshold).
//!
//! # Example
//!
//! ```rust
//! use bldc_supervisor::stall::{RpmSample, StallDetector};
//!
//! let mut detector = StallDetector::new(3);
//! detector.observe(RpmSample::new(0, 0));
//! detector.observe(RpmSample::new(0, 100));
//! assert!(!detector.is_stalled()); // window not full yet
//!
//! detector.observe(RpmSample::new(0, 200));
//! assert!(detector.is_stalled());
//!
//! detector.observe(RpmSample::new(12, 300));
//! assert!(!detector.is_stalled());
//! ```
//!
//! Failed RPM reads must simply not be observed. The window is never padded
//! with a synthetic zero.

use heapless::Deque;

use crate::registers::RegisterValue;

/// Largest supported debounce window.
pub const MAX_STALL_WINDOW: usize = 32;

/// One RPM reading and when it was taken.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RpmSample {
    /// RPM register value.
    pub rpm: RegisterValue,
    /// Timestamp in milliseconds (see [`Clock`](crate::traits::Clock)).
    pub at_ms: u64,
}

impl RpmSample {
    /// Create a sample.
    pub const fn new(rpm: RegisterValue, at_ms: u64) -> Self {
        Self { rpm, at_ms }
    }
}

/// Sliding-window stall detector.
#[derive(Debug)]
pub struct StallDetector {
    window: Deque<RpmSample, MAX_STALL_WINDOW>,
    capacity: usize,
    zero_threshold: RegisterValue,
}

impl StallDetector {
    /// Detector requiring `capacity` consecutive exact-zero samples.
    ///
    /// `capacity` is clamped to `1..=MAX_STALL_WINDOW`; use
    /// [`Config::validate`](crate::config::Config::validate) to reject bad
    /// values before they get here.
    pub fn new(capacity: usize) -> Self {
        Self {
            window: Deque::new(),
            capacity: capacity.clamp(1, MAX_STALL_WINDOW),
            zero_threshold: 0,
        }
    }

    /// Count samples with `rpm <= threshold` as zero.
    pub fn with_zero_threshold(mut self, threshold: RegisterValue) -> Self {
        self.zero_threshold = threshold;
        self
    }

    /// Append a sample, evicting the oldest one when the window is full.
    pub fn observe(&mut self, sample: RpmSample) {
        if self.window.len() >= self.capacity {
            self.window.pop_front();
        }
        // Cannot fail: len < capacity <= MAX_STALL_WINDOW after the eviction.
        let _ = self.window.push_back(sample);
    }

    /// True when the window is full and every sample in it is zero.
    pub fn is_stalled(&self) -> bool {
        self.is_full() && self.window.iter().all(|s| s.rpm <= self.zero_threshold)
    }

    /// Drop every sample.
    ///
    /// Called after a reversal so the motor's own deceleration to zero is not
    /// counted as a second stall.
    pub fn clear(&mut self) {
        self.window.clear();
    }

    /// Number of samples currently held.
    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// True when no samples are held.
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// True when the window holds `capacity` samples.
    pub fn is_full(&self) -> bool {
        self.window.len() >= self.capacity
    }

    /// Configured window length.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recent sample, if any.
    pub fn latest(&self) -> Option<RpmSample> {
        self.window.back().copied()
    }

    /// Samples oldest first.
    pub fn samples(&self) -> impl Iterator<Item = &RpmSample> {
        self.window.iter()
    }
}
