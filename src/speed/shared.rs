//! Thread-safe speed estimator for pipelines that fan out across workers.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use log::debug;
use nalgebra::Point2;

use super::history::{TrackHistory, TrackState};
use crate::{Error, Result};

/// Shared-reference variant of [`SpeedEstimator`](super::SpeedEstimator).
///
/// The identity map sits behind an `RwLock` and every history behind its own
/// `Mutex`, so updates for different identities run in parallel while updates
/// for one identity are serialised. Retention follows the same rules:
/// unbounded unless a `max_tracks` cap is set, in which case a new identity
/// at the cap evicts the least recently updated one.
#[derive(Debug)]
pub struct SharedSpeedEstimator<K = i64> {
    sample_rate_hz: u32,
    max_tracks: Option<usize>,
    histories: RwLock<HashMap<K, Arc<Mutex<TrackHistory>>>>,
    tick: AtomicU64,
}

fn recover<T>(result: std::result::Result<T, PoisonError<T>>) -> T {
    result.unwrap_or_else(PoisonError::into_inner)
}

impl<K> SharedSpeedEstimator<K>
where
    K: Hash + Eq + Clone + Debug,
{
    pub fn new(sample_rate_hz: u32) -> Result<Self> {
        if sample_rate_hz == 0 {
            return Err(Error::InvalidConfig(
                "sample rate must be a positive integer".to_string(),
            ));
        }

        Ok(Self {
            sample_rate_hz,
            max_tracks: None,
            histories: RwLock::new(HashMap::new()),
            tick: AtomicU64::new(0),
        })
    }

    /// Cap the number of retained identities.
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

    pub fn max_tracks(&self) -> Option<usize> {
        self.max_tracks
    }

    fn history_handle(&self, identity: &K) -> Arc<Mutex<TrackHistory>> {
        if let Some(handle) = recover(self.histories.read()).get(identity) {
            return Arc::clone(handle);
        }

        let mut map = recover(self.histories.write());
        if let Some(handle) = map.get(identity) {
            return Arc::clone(handle);
        }

        if let Some(max_tracks) = self.max_tracks {
            Self::evict_if_full(&mut map, max_tracks);
        }

        debug!("new track {:?}", identity);
        let handle = Arc::new(Mutex::new(TrackHistory::new(self.sample_rate_hz as usize)));
        map.insert(identity.clone(), Arc::clone(&handle));
        handle
    }

    // Lock order is map then history; updaters never take the map while holding a history.
    fn evict_if_full(map: &mut HashMap<K, Arc<Mutex<TrackHistory>>>, max_tracks: usize) {
        while map.len() >= max_tracks {
            let stale = map
                .iter()
                .min_by_key(|(_, h)| Self::lock(h).last_update)
                .map(|(k, _)| k.clone());

            match stale {
                Some(key) => {
                    debug!("evicting least recently updated track {:?}", key);
                    map.remove(&key);
                }
                None => break,
            }
        }
    }

    fn lock(handle: &Mutex<TrackHistory>) -> MutexGuard<'_, TrackHistory> {
        recover(handle.lock())
    }

    fn record<R>(
        &self,
        identity: &K,
        world_point: Point2<f64>,
        timestamp_s: Option<f64>,
        estimate: impl FnOnce(&TrackHistory) -> R,
    ) -> R {
        let handle = self.history_handle(identity);
        let mut history = Self::lock(&handle);
        history.push(world_point, timestamp_s);
        history.last_update = self.tick.fetch_add(1, Ordering::Relaxed) + 1;
        estimate(&history)
    }

    /// Same contract as [`SpeedEstimator::update`](super::SpeedEstimator::update).
    pub fn update(&self, identity: &K, world_point: Point2<f64>) -> Option<f64> {
        let sample_rate_hz = self.sample_rate_hz;
        self.record(identity, world_point, None, |h| h.speed_kph(sample_rate_hz))
    }

    /// Same contract as [`SpeedEstimator::update_at`](super::SpeedEstimator::update_at).
    pub fn update_at(&self, identity: &K, world_point: Point2<f64>, timestamp_s: f64) -> Option<f64> {
        let sample_rate_hz = self.sample_rate_hz;
        self.record(identity, world_point, Some(timestamp_s), |h| {
            h.timed_speed_kph(sample_rate_hz)
        })
    }

    pub fn forget(&self, identity: &K) -> bool {
        let removed = recover(self.histories.write()).remove(identity).is_some();
        if removed {
            debug!("forgot track {:?}", identity);
        }
        removed
    }

    /// Retained positions of `identity` in arrival order (empty if unseen).
    pub fn window(&self, identity: &K) -> Vec<Point2<f64>> {
        let Some(handle) = self.existing(identity) else {
            return Vec::new();
        };
        let history = Self::lock(&handle);
        history.points().collect()
    }

    pub fn state(&self, identity: &K) -> TrackState {
        match self.existing(identity) {
            Some(handle) => Self::lock(&handle).state(),
            None => TrackState::Unseen,
        }
    }

    /// Current speed of `identity` without recording a new position.
    pub fn current_speed(&self, identity: &K) -> Option<f64> {
        let handle = self.existing(identity)?;
        let history = Self::lock(&handle);
        history.speed_kph(self.sample_rate_hz)
    }

    pub fn contains(&self, identity: &K) -> bool {
        recover(self.histories.read()).contains_key(identity)
    }

    fn existing(&self, identity: &K) -> Option<Arc<Mutex<TrackHistory>>> {
        recover(self.histories.read()).get(identity).map(Arc::clone)
    }

    pub fn len(&self) -> usize {
        recover(self.histories.read()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
