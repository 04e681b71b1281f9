//! Per-frame glue between tracker output, calibration and speed estimation.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use log::{debug, trace};
use nalgebra::Point2;

use crate::calibration::RoadCalibration;
use crate::detection::{anchor_points, Anchor, TrackedDetection};
use crate::speed::SpeedEstimator;
use crate::utils::matrix_to_points;
use crate::zone::PolygonZone;
use crate::Result;

/// Speed result for one kept detection.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleSpeed {
    pub track_id: i64,
    pub bbox: [f64; 4],
    /// Anchor point projected onto the road plane (metres).
    pub world_point: Point2<f64>,
    /// `None` until the track has two retained positions.
    pub speed_kph: Option<f64>,
}

impl VehicleSpeed {
    /// Annotation text: `ID 7` or `ID 7 | 52 km/h` (speed truncated toward zero).
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for VehicleSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.speed_kph {
            Some(speed) => write!(f, "ID {} | {} km/h", self.track_id, speed.trunc() as i64),
            None => write!(f, "ID {}", self.track_id),
        }
    }
}

/// Everything produced for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSpeeds {
    /// Zero-based index of the processed frame.
    pub frame_index: u64,
    /// Kept detections in input order.
    pub vehicles: Vec<VehicleSpeed>,
    /// Distinct track identities seen so far (this frame included).
    pub vehicles_counted: usize,
}

impl FrameSpeeds {
    pub fn labels(&self) -> Vec<String> {
        self.vehicles.iter().map(VehicleSpeed::label).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }
}

/// Frame-by-frame speed pipeline.
///
/// Each frame: drop detections of unwanted classes or outside the zone, take
/// their anchor points, project them onto the road plane and feed the
/// estimator. Frames must be processed in order.
#[derive(Debug)]
pub struct SpeedPipeline {
    calibration: Arc<RoadCalibration>,
    estimator: SpeedEstimator<i64>,
    zone: Option<PolygonZone>,
    vehicle_classes: Vec<i32>,
    anchor: Anchor,
    seen: HashSet<i64>,
    frames_processed: u64,
}

impl SpeedPipeline {
    pub fn new(calibration: Arc<RoadCalibration>, estimator: SpeedEstimator<i64>) -> Self {
        Self {
            calibration,
            estimator,
            zone: None,
            vehicle_classes: Vec::new(),
            anchor: Anchor::default(),
            seen: HashSet::new(),
            frames_processed: 0,
        }
    }

    /// Only keep detections whose anchor lies in `zone`.
    pub fn with_zone(mut self, zone: PolygonZone) -> Self {
        self.zone = Some(zone);
        self
    }

    /// Only keep detections with one of these class ids; empty keeps everything.
    ///
    /// Detections without a class id are always kept.
    pub fn with_vehicle_classes(mut self, classes: Vec<i32>) -> Self {
        self.vehicle_classes = classes;
        self
    }

    pub fn with_anchor(mut self, anchor: Anchor) -> Self {
        self.anchor = anchor;
        self
    }

    pub fn calibration(&self) -> &Arc<RoadCalibration> {
        &self.calibration
    }

    pub fn estimator(&self) -> &SpeedEstimator<i64> {
        &self.estimator
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn vehicles_counted(&self) -> usize {
        self.seen.len()
    }

    /// Drop the speed history of a track the tracker reports as lost.
    pub fn forget(&mut self, track_id: i64) {
        self.estimator.forget(&track_id);
    }

    fn keeps(&self, detection: &TrackedDetection) -> bool {
        let class_ok = match detection.class_id {
            Some(class_id) if !self.vehicle_classes.is_empty() => {
                self.vehicle_classes.contains(&class_id)
            }
            _ => true,
        };

        class_ok && self.zone.as_ref().map_or(true, |zone| zone.trigger(detection))
    }

    /// Process one frame of tracked detections.
    pub fn process_frame(&mut self, detections: &[TrackedDetection]) -> Result<FrameSpeeds> {
        let frame_index = self.frames_processed;
        self.frames_processed += 1;

        let kept: Vec<TrackedDetection> = detections
            .iter()
            .filter(|d| self.keeps(d))
            .cloned()
            .collect();

        trace!(
            "frame {}: {} of {} detections kept",
            frame_index,
            kept.len(),
            detections.len()
        );

        let image_points = anchor_points(&kept, self.anchor);
        let world_points = matrix_to_points(&self.calibration.project(&image_points)?)?;

        let mut vehicles = Vec::with_capacity(kept.len());
        for (det, world_point) in kept.iter().zip(world_points) {
            let speed_kph = self.estimator.update(det.track_id, world_point);

            if self.seen.insert(det.track_id) {
                debug!("frame {}: first sighting of track {}", frame_index, det.track_id);
            }

            vehicles.push(VehicleSpeed {
                track_id: det.track_id,
                bbox: det.bbox,
                world_point,
                speed_kph,
            });
        }

        Ok(FrameSpeeds {
            frame_index,
            vehicles,
            vehicles_counted: self.seen.len(),
        })
    }
}
