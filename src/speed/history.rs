//! Bounded per-identity position window.

use std::collections::VecDeque;

use nalgebra::{distance, Point2};

/// Metres per second to kilometres per hour.
pub const MPS_TO_KPH: f64 = 3.6;

/// Lifecycle of one identity's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    /// No observation has been recorded.
    Unseen,
    /// One observation; no speed can be computed yet.
    Warming,
    /// At least two observations, window not yet full.
    Estimating,
    /// Window full; every update evicts the oldest sample.
    SteadyState,
}

/// One world-space observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Position on the road plane in metres.
    pub point: Point2<f64>,
    /// Capture time in seconds, when the caller supplied one.
    pub timestamp_s: Option<f64>,
}

/// Time-ordered window of the most recent positions of one tracked object.
///
/// The window never holds more than `capacity` samples; the oldest sample is
/// evicted first.
#[derive(Debug, Clone)]
pub struct TrackHistory {
    window: VecDeque<Sample>,
    capacity: usize,
    /// Update counter value at the last push (least-recently-updated eviction).
    pub(crate) last_update: u64,
}

impl TrackHistory {
    /// Create an empty history holding at most `capacity` samples (at least one).
    ///
    /// `capacity` only bounds the window; storage grows with the samples
    /// actually pushed.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::new(),
            capacity,
            last_update: 0,
        }
    }

    /// Append a sample, evicting the oldest one if the window is full.
    pub fn push(&mut self, point: Point2<f64>, timestamp_s: Option<f64>) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(Sample { point, timestamp_s });
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.window.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.window.len() == self.capacity
    }

    /// Retained positions, oldest first.
    pub fn points(&self) -> impl Iterator<Item = Point2<f64>> + '_ {
        self.window.iter().map(|s| s.point)
    }

    /// Retained samples, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = &Sample> + '_ {
        self.window.iter()
    }

    pub fn oldest(&self) -> Option<&Sample> {
        self.window.front()
    }

    pub fn newest(&self) -> Option<&Sample> {
        self.window.back()
    }

    pub fn state(&self) -> TrackState {
        match self.window.len() {
            0 => TrackState::Unseen,
            1 => TrackState::Warming,
            n if n < self.capacity => TrackState::Estimating,
            _ => TrackState::SteadyState,
        }
    }

    /// Straight-line distance between the oldest and newest retained positions.
    pub fn displacement_m(&self) -> Option<f64> {
        if self.window.len() < 2 {
            return None;
        }
        let oldest = self.window.front()?;
        let newest = self.window.back()?;
        Some(distance(&oldest.point, &newest.point))
    }

    /// Speed in km/h, with elapsed time approximated as `len / sample_rate_hz`.
    ///
    /// Only exact once the window is full; while warming up the sample count
    /// stands in for the real time span.
    pub fn speed_kph(&self, sample_rate_hz: u32) -> Option<f64> {
        let distance_m = self.displacement_m()?;
        let elapsed_s = self.window.len() as f64 / f64::from(sample_rate_hz);
        Some(distance_m / elapsed_s * MPS_TO_KPH)
    }

    /// Speed in km/h using the capture timestamps of the window endpoints.
    ///
    /// Falls back to [`TrackHistory::speed_kph`] when either endpoint lacks a
    /// timestamp. Returns `None` when the timestamps do not increase.
    pub fn timed_speed_kph(&self, sample_rate_hz: u32) -> Option<f64> {
        let distance_m = self.displacement_m()?;
        let oldest = self.window.front()?;
        let newest = self.window.back()?;

        match (oldest.timestamp_s, newest.timestamp_s) {
            (Some(t0), Some(t1)) => {
                let elapsed_s = t1 - t0;
                if elapsed_s > 0.0 && elapsed_s.is_finite() {
                    Some(distance_m / elapsed_s * MPS_TO_KPH)
                } else {
                    None
                }
            }
            _ => self.speed_kph(sample_rate_hz),
        }
    }
}
