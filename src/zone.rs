//! Polygonal region of interest in image space.

use nalgebra::Point2;

use crate::detection::{Anchor, TrackedDetection};
use crate::utils::get_bounding_box;
use crate::{Error, Result};

/// Distance below which a point counts as lying on a polygon edge.
const EDGE_EPSILON: f64 = 1e-9;

/// Closed polygon used to keep only detections on the calibrated road.
///
/// Points on the boundary count as inside.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonZone {
    vertices: Vec<Point2<f64>>,
    bounds: (f64, f64, f64, f64),
    anchor: Anchor,
}

impl PolygonZone {
    /// Create a zone from at least three vertices, testing detections at `anchor`.
    pub fn new(vertices: Vec<Point2<f64>>, anchor: Anchor) -> Result<Self> {
        if vertices.len() < 3 {
            return Err(Error::InvalidConfig(format!(
                "polygon zone needs at least 3 vertices, got {}",
                vertices.len()
            )));
        }
        if vertices.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(Error::InvalidConfig(
                "polygon zone vertices must be finite".to_string(),
            ));
        }

        let bounds = get_bounding_box(&vertices).ok_or_else(|| {
            Error::InvalidConfig("polygon zone has no vertices".to_string())
        })?;

        Ok(Self {
            vertices,
            bounds,
            anchor,
        })
    }

    /// Create a zone from `[x, y]` pairs.
    pub fn from_coords(coords: &[[f64; 2]], anchor: Anchor) -> Result<Self> {
        Self::new(coords.iter().map(|c| Point2::new(c[0], c[1])).collect(), anchor)
    }

    pub fn vertices(&self) -> &[Point2<f64>] {
        &self.vertices
    }

    pub fn anchor(&self) -> Anchor {
        self.anchor
    }

    /// Even-odd point-in-polygon test with inclusive boundary.
    pub fn contains(&self, point: &Point2<f64>) -> bool {
        let (min_x, min_y, max_x, max_y) = self.bounds;
        if point.x < min_x || point.x > max_x || point.y < min_y || point.y > max_y {
            return false;
        }

        let n = self.vertices.len();
        let mut inside = false;
        let mut j = n - 1;

        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[j];

            if on_segment(point, &a, &b) {
                return true;
            }

            if (a.y > point.y) != (b.y > point.y) {
                let x_cross = a.x + (point.y - a.y) * (b.x - a.x) / (b.y - a.y);
                if point.x < x_cross {
                    inside = !inside;
                }
            }

            j = i;
        }

        inside
    }

    /// Whether the detection's anchor point lies in the zone.
    pub fn trigger(&self, detection: &TrackedDetection) -> bool {
        self.contains(&detection.anchor_point(self.anchor))
    }

    /// One flag per detection, in input order.
    pub fn trigger_all(&self, detections: &[TrackedDetection]) -> Vec<bool> {
        detections.iter().map(|d| self.trigger(d)).collect()
    }
}

fn on_segment(p: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>) -> bool {
    let ab = b - a;
    let ap = p - a;
    let len = ab.norm();

    if len == 0.0 {
        return ap.norm() <= EDGE_EPSILON;
    }

    let cross = ab.x * ap.y - ab.y * ap.x;
    if (cross / len).abs() > EDGE_EPSILON {
        return false;
    }

    let dot = ab.dot(&ap);
    dot >= -EDGE_EPSILON && dot <= ab.norm_squared() + EDGE_EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> PolygonZone {
        PolygonZone::from_coords(
            &[[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]],
            Anchor::BottomCenter,
        )
        .unwrap()
    }

    #[test]
    fn test_contains_interior_and_exterior() {
        let zone = square();
        assert!(zone.contains(&Point2::new(5.0, 5.0)));
        assert!(!zone.contains(&Point2::new(15.0, 5.0)));
        assert!(!zone.contains(&Point2::new(-0.1, 5.0)));
    }

    #[test]
    fn test_boundary_is_inside() {
        let zone = square();
        assert!(zone.contains(&Point2::new(0.0, 5.0)));
        assert!(zone.contains(&Point2::new(10.0, 10.0)));
        assert!(zone.contains(&Point2::new(5.0, 0.0)));
    }

    #[test]
    fn test_concave_polygon() {
        // U shape, notch between x = 3 and x = 7 below y = 10
        let zone = PolygonZone::from_coords(
            &[[0.0, 0.0], [3.0, 0.0], [3.0, 10.0], [7.0, 10.0], [7.0, 0.0], [10.0, 0.0], [10.0, 12.0], [0.0, 12.0]],
            Anchor::Center,
        )
        .unwrap();
        assert!(zone.contains(&Point2::new(1.0, 5.0)));
        assert!(!zone.contains(&Point2::new(5.0, 5.0)));
        assert!(zone.contains(&Point2::new(5.0, 11.0)));
    }

    #[test]
    fn test_trigger_uses_anchor() {
        let zone = square();
        // Box top is inside, bottom-center anchor is below the zone
        let det = TrackedDetection::new([4.0, 8.0, 6.0, 14.0], 1).unwrap();
        assert!(!zone.trigger(&det));

        let det = TrackedDetection::new([4.0, 2.0, 6.0, 9.0], 2).unwrap();
        assert!(zone.trigger(&det));
        assert_eq!(zone.trigger_all(&[det]), vec![true]);
    }

    #[test]
    fn test_too_few_vertices() {
        assert!(PolygonZone::from_coords(&[[0.0, 0.0], [1.0, 1.0]], Anchor::Center).is_err());
    }
}
