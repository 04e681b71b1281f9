//! Four-point homography solver (normalized DLT).

use nalgebra::{Matrix3, Point2, SMatrix};

use crate::{Error, Result};

/// Minimum ratio between the smallest and largest meaningful singular value
/// of the normalized DLT system before it is considered rank deficient.
const CONDITION_THRESHOLD: f64 = 1e-10;

/// Minimum normalized triangle area for three corners to count as non-collinear.
const COLLINEARITY_THRESHOLD: f64 = 1e-9;

/// Reject quadrilaterals where any three corners are (nearly) collinear or coincident.
pub(crate) fn check_non_degenerate(points: &[Point2<f64>; 4], name: &str) -> Result<()> {
    let mut scale: f64 = 0.0;
    for i in 0..4 {
        for j in (i + 1)..4 {
            scale = scale.max((points[j] - points[i]).norm_squared());
        }
    }

    if scale == 0.0 || !scale.is_finite() {
        return Err(Error::DegenerateGeometry(format!(
            "{} points are coincident or non-finite",
            name
        )));
    }

    const TRIPLES: [(usize, usize, usize); 4] = [(0, 1, 2), (0, 1, 3), (0, 2, 3), (1, 2, 3)];
    for &(a, b, c) in &TRIPLES {
        let ab = points[b] - points[a];
        let ac = points[c] - points[a];
        let cross = ab.x * ac.y - ab.y * ac.x;
        if (cross / scale).abs() < COLLINEARITY_THRESHOLD {
            return Err(Error::DegenerateGeometry(format!(
                "{} points {}, {} and {} are collinear",
                name, a, b, c
            )));
        }
    }

    Ok(())
}

/// Similarity transform moving the centroid to the origin with mean distance sqrt(2).
fn normalization_matrix(points: &[Point2<f64>; 4]) -> Matrix3<f64> {
    let cx = points.iter().map(|p| p.x).sum::<f64>() / 4.0;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / 4.0;

    let mean_dist = points
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / 4.0;

    let s = std::f64::consts::SQRT_2 / mean_dist;

    Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

fn apply_affine(t: &Matrix3<f64>, p: &Point2<f64>) -> Point2<f64> {
    Point2::new(
        t[(0, 0)] * p.x + t[(0, 1)] * p.y + t[(0, 2)],
        t[(1, 0)] * p.x + t[(1, 1)] * p.y + t[(1, 2)],
    )
}

/// Compute the homography mapping each `src[i]` onto `dst[i]`.
///
/// Both quadrilaterals must be non-degenerate. The returned matrix is scaled so
/// that its bottom-right element is 1.
///
/// # Errors
/// `Error::DegenerateGeometry` if either point set has three collinear points or
/// the correspondence system is ill-conditioned.
pub fn perspective_transform(src: &[Point2<f64>; 4], dst: &[Point2<f64>; 4]) -> Result<Matrix3<f64>> {
    check_non_degenerate(src, "source")?;
    check_non_degenerate(dst, "target")?;

    let t_src = normalization_matrix(src);
    let t_dst = normalization_matrix(dst);

    // Two rows per correspondence; the ninth row stays zero so the SVD is square
    // and V^T carries the full null space.
    let mut a = SMatrix::<f64, 9, 9>::zeros();
    for i in 0..4 {
        let p = apply_affine(&t_src, &src[i]);
        let q = apply_affine(&t_dst, &dst[i]);
        let (x, y, u, v) = (p.x, p.y, q.x, q.y);

        let r = 2 * i;
        a[(r, 0)] = -x;
        a[(r, 1)] = -y;
        a[(r, 2)] = -1.0;
        a[(r, 6)] = u * x;
        a[(r, 7)] = u * y;
        a[(r, 8)] = u;

        a[(r + 1, 3)] = -x;
        a[(r + 1, 4)] = -y;
        a[(r + 1, 5)] = -1.0;
        a[(r + 1, 6)] = v * x;
        a[(r + 1, 7)] = v * y;
        a[(r + 1, 8)] = v;
    }

    let svd = a.svd(false, true);
    let v_t = svd
        .v_t
        .ok_or_else(|| Error::DegenerateGeometry("SVD of correspondence system failed".to_string()))?;

    let mut order: Vec<usize> = (0..9).collect();
    order.sort_by(|&i, &j| svd.singular_values[j].total_cmp(&svd.singular_values[i]));

    let largest = svd.singular_values[order[0]];
    let eighth = svd.singular_values[order[7]];
    if largest <= 0.0 || eighth / largest < CONDITION_THRESHOLD {
        return Err(Error::DegenerateGeometry(format!(
            "correspondence system is rank deficient (condition ratio {:e})",
            if largest > 0.0 { eighth / largest } else { 0.0 }
        )));
    }

    let h = v_t.row(order[8]);
    let h_norm = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

    let t_dst_inv = t_dst
        .try_inverse()
        .ok_or_else(|| Error::DegenerateGeometry("target normalization is singular".to_string()))?;
    let homography = t_dst_inv * h_norm * t_src;

    let scale = homography[(2, 2)];
    if scale.abs() < f64::EPSILON {
        return Err(Error::DegenerateGeometry(
            "homography maps the first image origin to infinity".to_string(),
        ));
    }

    Ok(homography / scale)
}
