//! Utility functions for roadspeed.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::OnceLock;

use nalgebra::{DMatrix, Point2};

use crate::{Error, Result};

/// Validate that points have shape (n_points, 2).
///
/// A single row is treated as a single point.
pub fn validate_points(points: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let (rows, cols) = points.shape();

    if cols != 2 {
        return Err(Error::InvalidPointsShape {
            expected: "(n_points, 2)".to_string(),
            got: format!("({}, {})", rows, cols),
        });
    }

    Ok(points.clone())
}

/// Pack points into an `n x 2` matrix, one row per point.
pub fn points_to_matrix(points: &[Point2<f64>]) -> DMatrix<f64> {
    DMatrix::from_fn(points.len(), 2, |i, j| points[i][j])
}

/// Unpack the rows of an `n x 2` matrix into points.
pub fn matrix_to_points(points: &DMatrix<f64>) -> Result<Vec<Point2<f64>>> {
    let points = validate_points(points)?;
    Ok((0..points.nrows())
        .map(|i| Point2::new(points[(i, 0)], points[(i, 1)]))
        .collect())
}

/// Global set of warned messages (for warn_once).
static WARNED_MESSAGES: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();

/// Log a warning message only once.
///
/// Subsequent calls with the same message are ignored.
pub fn warn_once(message: &str) {
    let warned = WARNED_MESSAGES.get_or_init(|| Mutex::new(HashSet::new()));
    // A poisoned set only means another thread panicked mid-insert; keep warning.
    let mut guard = match warned.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if guard.insert(message.to_string()) {
        log::warn!("{}", message);
    }
}

/// Get bounds from points.
///
/// Returns (x1, y1, x2, y2) bounding box of the points.
pub fn get_bounding_box(points: &[Point2<f64>]) -> Option<(f64, f64, f64, f64)> {
    let first = points.first()?;

    let mut min_x = first.x;
    let mut max_x = first.x;
    let mut min_y = first.y;
    let mut max_y = first.y;

    for p in points {
        if p.x < min_x { min_x = p.x; }
        if p.x > max_x { max_x = p.x; }
        if p.y < min_y { min_y = p.y; }
        if p.y > max_y { max_y = p.y; }
    }

    Some((min_x, min_y, max_x, max_y))
}
