//! Sliding-window speed estimator keyed by track identity.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use log::{debug, trace};
use nalgebra::Point2;

use super::history::{TrackHistory, TrackState};
use crate::{Error, Result};

/// Per-identity speed estimator.
///
/// Each identity owns a window of at most `sample_rate_hz` world positions,
/// so a full window spans roughly one second of video. Histories are created
/// on the first observation of an identity and kept until they are
/// [`forget`](SpeedEstimator::forget)-ed or, when a `max_tracks` cap is set,
/// evicted as the least recently updated identity.
#[derive(Debug, Clone)]
pub struct SpeedEstimator<K = i64> {
    sample_rate_hz: u32,
    max_tracks: Option<usize>,
    histories: HashMap<K, TrackHistory>,
    /// Monotonic update counter.
    tick: u64,
}

impl<K> SpeedEstimator<K>
where
    K: Hash + Eq + Clone + Debug,
{
    /// Create an estimator for observations arriving at `sample_rate_hz` per identity.
    ///
    /// The rate doubles as the window capacity. At `sample_rate_hz == 1` the
    /// window holds a single position, so [`update`](SpeedEstimator::update)
    /// never returns a speed.
    ///
    /// # Errors
    /// `Error::InvalidConfig` if `sample_rate_hz` is zero.
    pub fn new(sample_rate_hz: u32) -> Result<Self> {
        if sample_rate_hz == 0 {
            return Err(Error::InvalidConfig(
                "sample rate must be a positive integer".to_string(),
            ));
        }

        Ok(Self {
            sample_rate_hz,
            max_tracks: None,
            histories: HashMap::new(),
            tick: 0,
        })
    }

    /// Cap the number of retained identities.
    ///
    /// When a new identity arrives at the cap, the least recently updated
    /// identity is dropped.
    pub fn with_max_tracks(mut self, max_tracks: usize) -> Result<Self> {
        if max_tracks == 0 {
            return Err(Error::InvalidConfig(
                "max_tracks must be at least 1".to_string(),
            ));
        }
        self.max_tracks = Some(max_tracks);
        Ok(self)
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    /// Window capacity shared by every identity.
    pub fn window_capacity(&self) -> usize {
        self.sample_rate_hz as usize
    }

    pub fn max_tracks(&self) -> Option<usize> {
        self.max_tracks
    }

    /// Record `world_point` for `identity` and return its speed in km/h.
    ///
    /// Returns `None` while the identity has fewer than two retained positions.
    /// Elapsed time is `window length / sample_rate_hz`.
    pub fn update(&mut self, identity: K, world_point: Point2<f64>) -> Option<f64> {
        let sample_rate_hz = self.sample_rate_hz;
        let history = self.record(identity, world_point, None);
        history.speed_kph(sample_rate_hz)
    }

    /// Record a timestamped position and return the speed over the real time span
    /// between the oldest and newest retained samples.
    ///
    /// Returns `None` with fewer than two positions or when time does not advance
    /// across the window.
    pub fn update_at(&mut self, identity: K, world_point: Point2<f64>, timestamp_s: f64) -> Option<f64> {
        let sample_rate_hz = self.sample_rate_hz;
        let history = self.record(identity, world_point, Some(timestamp_s));
        history.timed_speed_kph(sample_rate_hz)
    }

    fn record(&mut self, identity: K, world_point: Point2<f64>, timestamp_s: Option<f64>) -> &TrackHistory {
        self.tick += 1;

        if !self.histories.contains_key(&identity) {
            self.evict_if_full();
            debug!("new track {:?}", identity);
        }

        let capacity = self.window_capacity();
        let history = self
            .histories
            .entry(identity)
            .or_insert_with(|| TrackHistory::new(capacity));
        history.push(world_point, timestamp_s);
        history.last_update = self.tick;

        trace!(
            "track window len {} ({:?}), newest {:?}",
            history.len(),
            history.state(),
            world_point
        );

        history
    }

    fn evict_if_full(&mut self) {
        let Some(max_tracks) = self.max_tracks else {
            return;
        };

        while self.histories.len() >= max_tracks {
            let stale = self
                .histories
                .iter()
                .min_by_key(|(_, h)| h.last_update)
                .map(|(k, _)| k.clone());

            match stale {
                Some(key) => {
                    debug!("evicting least recently updated track {:?}", key);
                    self.histories.remove(&key);
                }
                None => break,
            }
        }
    }

    /// Drop the history of an identity the tracker has lost.
    pub fn forget(&mut self, identity: &K) -> Option<TrackHistory> {
        let removed = self.histories.remove(identity);
        if removed.is_some() {
            debug!("forgot track {:?}", identity);
        }
        removed
    }

    /// Drop every identity for which `keep` returns false.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&K) -> bool,
    {
        self.histories.retain(|k, _| keep(k));
    }

    /// Drop all histories.
    pub fn clear(&mut self) {
        self.histories.clear();
    }

    pub fn history(&self, identity: &K) -> Option<&TrackHistory> {
        self.histories.get(identity)
    }

    /// Retained positions of `identity` in arrival order (empty if unseen).
    pub fn window(&self, identity: &K) -> Vec<Point2<f64>> {
        self.histories
            .get(identity)
            .map(|h| h.points().collect())
            .unwrap_or_default()
    }

    pub fn state(&self, identity: &K) -> TrackState {
        self.histories
            .get(identity)
            .map(TrackHistory::state)
            .unwrap_or(TrackState::Unseen)
    }

    /// Current speed of `identity` without recording a new position.
    pub fn current_speed(&self, identity: &K) -> Option<f64> {
        self.histories.get(identity)?.speed_kph(self.sample_rate_hz)
    }

    pub fn contains(&self, identity: &K) -> bool {
        self.histories.contains_key(identity)
    }

    /// Number of identities with a history.
    pub fn len(&self) -> usize {
        self.histories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }

    pub fn identities(&self) -> impl Iterator<Item = &K> + '_ {
        self.histories.keys()
    }
}
