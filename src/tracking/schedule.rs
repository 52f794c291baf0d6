// src/tracking/schedule.rs - Randomized capture intervals
//
// Capture waits are drawn uniformly from [min, max] so the capture times
// cannot be predicted from previous ones.

use std::time::Duration;

use rand::Rng;

use crate::infra::errors::TrackerError;

/// Inclusive range of capture waits. Both bounds are positive and `min <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureWindow {
    min: Duration,
    max: Duration,
}

impl CaptureWindow {
    pub fn new(min: Duration, max: Duration) -> Result<Self, TrackerError> {
        if min.is_zero() || max.is_zero() {
            return Err(TrackerError::ConfigurationInvalid(format!(
                "capture interval bounds must be positive (min {:?}, max {:?})",
                min, max
            )));
        }
        if min > max {
            return Err(TrackerError::ConfigurationInvalid(format!(
                "capture interval min {:?} exceeds max {:?}",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Draw a wait uniformly from `[min, max]`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        rng.gen_range(self.min..=self.max)
    }
}
