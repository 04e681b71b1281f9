//! Tracked detections handed over by the external detector + tracker.

use nalgebra::{DMatrix, Point2};
use serde::{Deserialize, Serialize};

use crate::utils::points_to_matrix;
use crate::{Error, Result};

/// Where on a bounding box the representative point is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    Center,
    CenterLeft,
    CenterRight,
    TopLeft,
    TopCenter,
    TopRight,
    BottomLeft,
    /// Where the vehicle touches the road; the usual choice for ground-plane projection.
    #[default]
    BottomCenter,
    BottomRight,
}

/// A detection that already carries a stable tracker identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDetection")]
pub struct TrackedDetection {
    /// Bounding box `[x1, y1, x2, y2]` in image pixels (top-left, bottom-right).
    pub bbox: [f64; 4],

    /// Identity assigned by the tracker, stable across frames for one object.
    pub track_id: i64,

    /// Optional detector class id (COCO ids for the stock vehicle classes).
    #[serde(default)]
    pub class_id: Option<i32>,

    /// Optional detector confidence.
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Unchecked wire form; deserialized detections pass through [`TrackedDetection::new`].
#[derive(Deserialize)]
struct RawDetection {
    bbox: [f64; 4],
    track_id: i64,
    #[serde(default)]
    class_id: Option<i32>,
    #[serde(default)]
    confidence: Option<f64>,
}

impl TryFrom<RawDetection> for TrackedDetection {
    type Error = Error;

    fn try_from(raw: RawDetection) -> Result<Self> {
        let mut detection = Self::new(raw.bbox, raw.track_id)?;
        detection.class_id = raw.class_id;
        detection.confidence = raw.confidence;
        Ok(detection)
    }
}

impl TrackedDetection {
    /// Create a detection from a `[x1, y1, x2, y2]` box and a track identity.
    pub fn new(bbox: [f64; 4], track_id: i64) -> Result<Self> {
        if bbox.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidConfig(format!(
                "bounding box must be finite, got {:?}",
                bbox
            )));
        }
        if bbox[2] < bbox[0] || bbox[3] < bbox[1] {
            return Err(Error::InvalidConfig(format!(
                "bounding box corners out of order: {:?}",
                bbox
            )));
        }

        Ok(Self {
            bbox,
            track_id,
            class_id: None,
            confidence: None,
        })
    }

    pub fn with_class(mut self, class_id: i32) -> Self {
        self.class_id = Some(class_id);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn width(&self) -> f64 {
        self.bbox[2] - self.bbox[0]
    }

    pub fn height(&self) -> f64 {
        self.bbox[3] - self.bbox[1]
    }

    /// The representative image point for `anchor`.
    pub fn anchor_point(&self, anchor: Anchor) -> Point2<f64> {
        let [x1, y1, x2, y2] = self.bbox;
        let cx = (x1 + x2) / 2.0;
        let cy = (y1 + y2) / 2.0;

        match anchor {
            Anchor::Center => Point2::new(cx, cy),
            Anchor::CenterLeft => Point2::new(x1, cy),
            Anchor::CenterRight => Point2::new(x2, cy),
            Anchor::TopLeft => Point2::new(x1, y1),
            Anchor::TopCenter => Point2::new(cx, y1),
            Anchor::TopRight => Point2::new(x2, y1),
            Anchor::BottomLeft => Point2::new(x1, y2),
            Anchor::BottomCenter => Point2::new(cx, y2),
            Anchor::BottomRight => Point2::new(x2, y2),
        }
    }
}

/// Stack the anchor points of `detections` into an `n x 2` matrix (input order).
pub fn anchor_points(detections: &[TrackedDetection], anchor: Anchor) -> DMatrix<f64> {
    let points: Vec<Point2<f64>> = detections.iter().map(|d| d.anchor_point(anchor)).collect();
    points_to_matrix(&points)
}
