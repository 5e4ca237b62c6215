use std::collections::VecDeque;
use std::time::Instant;

/// Sliding window of the most recent seconds-per-percent velocities.
#[derive(Debug, Clone)]
pub struct VelocityWindow {
    capacity: usize,
    samples: VecDeque<f64>,
}

impl VelocityWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    /// Record a velocity. Non-finite and non-positive values are discarded.
    /// Returns whether the value was accepted.
    pub fn push(&mut self, secs_per_percent: f64) -> bool {
        if !secs_per_percent.is_finite() || secs_per_percent <= 0.0 {
            return false;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(secs_per_percent);
        true
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Mean of the stored velocities, `None` until the window is full.
    pub fn average(&self) -> Option<f64> {
        if !self.is_full() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }
}

/// Result of feeding one progress sample to a [`ProgressTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Progress did not move past the previous sample.
    Unchanged,
    /// Progress advanced. `eta_seconds` is `None` until enough velocities exist.
    Advanced {
        percent: u8,
        eta_seconds: Option<u64>,
    },
}

/// Turns a series of percent samples into completion estimates.
///
/// A tracker from [`ProgressTracker::new`] starts at 0 % at the given instant.
/// One from [`ProgressTracker::resuming`] has no baseline yet and takes it
/// from the first sample.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    window: VelocityWindow,
    last_percent: u8,
    last_advance: Instant,
    anchored: bool,
}

impl ProgressTracker {
    pub fn new(window_size: usize, start: Instant) -> Self {
        Self {
            window: VelocityWindow::new(window_size),
            last_percent: 0,
            last_advance: start,
            anchored: true,
        }
    }

    /// Tracker for a transfer that already made progress before sampling began.
    pub fn resuming(window_size: usize) -> Self {
        Self {
            window: VelocityWindow::new(window_size),
            last_percent: 0,
            last_advance: Instant::now(),
            anchored: false,
        }
    }

    /// Last percent that advanced the tracker.
    pub fn percent(&self) -> u8 {
        self.last_percent
    }

    /// Feed the percent observed at `now`.
    pub fn observe(&mut self, percent: u8, now: Instant) -> Observation {
        let percent = percent.min(100);
        if !self.anchored {
            self.anchored = true;
            self.last_percent = percent;
            self.last_advance = now;
            if percent == 0 {
                return Observation::Unchanged;
            }
            return Observation::Advanced {
                percent,
                eta_seconds: None,
            };
        }

        if percent <= self.last_percent {
            return Observation::Unchanged;
        }

        let elapsed = now.saturating_duration_since(self.last_advance).as_secs_f64();
        let delta = f64::from(percent - self.last_percent);
        self.window.push(elapsed / delta);

        self.last_percent = percent;
        self.last_advance = now;

        let eta_seconds = self
            .window
            .average()
            .map(|avg| (f64::from(100 - percent) * avg).round() as u64);

        Observation::Advanced {
            percent,
            eta_seconds,
        }
    }

    /// Move the time baseline to `now` without recording a velocity.
    ///
    /// Called while the transfer is suspended so paused time is not
    /// counted against the next advance.
    pub fn hold(&mut self, now: Instant) {
        self.last_advance = now;
    }
}
