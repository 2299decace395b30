//! Bandwidth estimation module
//!
//! Moving averages over received-byte events, used to estimate a peer's
//! packet rate and bit rate.

use crate::time::USECS_PER_SECOND;

/// Number of samples the received-bytes average is smoothed over
pub const BYTES_RECEIVED_SAMPLE_WINDOW: u32 = 100;

/// Smallest event delta used when computing rates (one timestamp tick).
///
/// A zero average delta (a burst of same-timestamp events) is clamped to this,
/// capping packet rates at one million per second.
pub const MIN_EVENT_DELTA_SECS: f64 = 1.0 / USECS_PER_SECOND as f64;

/// Exponentially weighted moving average of sample values and of the time
/// between samples.
#[derive(Debug, Clone, PartialEq)]
pub struct MovingAverage {
    weighting: f64,
    num_samples: u32,
    last_event_usecs: u64,
    average: f64,
    event_delta_average: f64,
}

impl MovingAverage {
    /// Create an average smoothed over `samples_for_smoothing` events
    pub fn new(samples_for_smoothing: u32) -> Self {
        Self {
            weighting: 1.0 / samples_for_smoothing.max(1) as f64,
            num_samples: 0,
            last_event_usecs: 0,
            average: 0.0,
            event_delta_average: 0.0,
        }
    }

    /// Register one sample observed at `now_usecs`, returning the sample count
    pub fn update_average(&mut self, sample: f64, now_usecs: u64) -> u32 {
        if self.num_samples > 0 {
            self.average = self.blend(self.average, sample);

            let event_delta = self.secs_since_last_event(now_usecs);
            if self.num_samples > 1 {
                self.event_delta_average = self.blend(self.event_delta_average, event_delta);
            } else {
                self.event_delta_average = event_delta;
            }
        } else {
            self.average = sample;
            self.event_delta_average = 0.0;
        }

        self.last_event_usecs = now_usecs;
        self.num_samples = self.num_samples.saturating_add(1);
        self.num_samples
    }

    /// Average sample value
    pub fn average(&self) -> f64 {
        self.average
    }

    /// Number of samples registered so far
    pub fn sample_count(&self) -> u32 {
        self.num_samples
    }

    /// Average seconds between events, including the silence since the last one.
    ///
    /// Never below [`MIN_EVENT_DELTA_SECS`].
    pub fn event_delta_average(&self, now_usecs: u64) -> f64 {
        let delta = self.blend(self.event_delta_average, self.secs_since_last_event(now_usecs));
        delta.max(MIN_EVENT_DELTA_SECS)
    }

    /// Events per second inferred from event spacing
    pub fn events_per_second(&self, now_usecs: u64) -> f64 {
        1.0 / self.event_delta_average(now_usecs)
    }

    /// Average sample value normalised to a per-second rate
    pub fn average_sample_value_per_second(&self, now_usecs: u64) -> f64 {
        self.average / self.event_delta_average(now_usecs)
    }

    fn blend(&self, current: f64, sample: f64) -> f64 {
        (1.0 - self.weighting) * current + self.weighting * sample
    }

    fn secs_since_last_event(&self, now_usecs: u64) -> f64 {
        now_usecs.saturating_sub(self.last_event_usecs) as f64 / USECS_PER_SECOND as f64
    }
}

impl Default for MovingAverage {
    fn default() -> Self {
        Self::new(BYTES_RECEIVED_SAMPLE_WINDOW)
    }
}

/// Convert a bytes-per-second rate to kilobits per second
pub fn bytes_to_kilobits_per_second(bytes_per_second: f64) -> f64 {
    bytes_per_second * (8.0 / 1000.0)
}
