//! Perspective projection of camera frames into a top-down view.
//!
//! The projector is calibrated once, from a fixed quadrilateral
//! correspondence: four points on the ground plane as seen by the camera,
//! mapped to four points of a known square in the top-down reference frame.
//! The homography between the two is estimated by the normalised DLT
//! algorithm and then applied in reverse to resample each output pixel from
//! the source frame.
//!
//! Warping also produces a field-of-view mask: output cells whose source
//! point falls outside the camera frame are untrustworthy and must be
//! excluded from obstacle classification.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use image::{Rgb, RgbImage};
use nalgebra::{DMatrix, Matrix3, Point2, Vector3};
use ndarray::Array2;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A plane projective transform, stored row-major.
#[derive(Debug, Clone, Copy)]
pub struct Homography {
    h: Matrix3<f64>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Homography {
    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            h: Matrix3::identity(),
        }
    }

    /// Apply the transform to a point.
    pub fn apply(&self, p: Point2<f64>) -> Point2<f64> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        Point2::new(v.x / v.z, v.y / v.z)
    }

    /// The inverse transform, or `None` if the matrix is singular.
    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(|h| Self { h })
    }

    /// Estimate the homography mapping `src` points onto `dst` points using
    /// the normalised direct linear transform.
    ///
    /// Returns `None` for degenerate correspondences (e.g. three collinear
    /// points), which is a calibration bug rather than a runtime condition.
    pub fn estimate(src: &[[f64; 2]; 4], dst: &[[f64; 2]; 4]) -> Option<Self> {
        let (src_norm, t_src) = normalise_points(src);
        let (dst_norm, t_dst) = normalise_points(dst);

        // Build the 2N x 9 DLT system. nalgebra's SVD is thin, so for the
        // minimal 4-point case the 8x9 system is padded with a zero row to
        // keep the null-space vector in V^T.
        let mut a = DMatrix::<f64>::zeros(9, 9);

        for k in 0..4 {
            let x = src_norm[k].x;
            let y = src_norm[k].y;
            let u = dst_norm[k].x;
            let v = dst_norm[k].y;

            // [ -x -y -1   0  0  0   u*x u*y u ]
            a[(2 * k, 0)] = -x;
            a[(2 * k, 1)] = -y;
            a[(2 * k, 2)] = -1.0;
            a[(2 * k, 6)] = u * x;
            a[(2 * k, 7)] = u * y;
            a[(2 * k, 8)] = u;

            // [ 0  0  0  -x -y -1   v*x v*y v ]
            a[(2 * k + 1, 3)] = -x;
            a[(2 * k + 1, 4)] = -y;
            a[(2 * k + 1, 5)] = -1.0;
            a[(2 * k + 1, 6)] = v * x;
            a[(2 * k + 1, 7)] = v * y;
            a[(2 * k + 1, 8)] = v;
        }

        // Solve Ah = 0: h is the right singular vector with the smallest
        // singular value, i.e. the last row of V^T
        let svd = a.svd(true, true);
        let vt = svd.v_t?;
        let h = vt.row(vt.nrows() - 1);

        let h_norm = Matrix3::from_row_slice(&[
            h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8],
        ]);

        // Denormalise: H = T_dst^-1 * Hn * T_src
        let h_full = t_dst.try_inverse()? * h_norm * t_src;

        // Normalise so the bottom-right element is 1
        let s = h_full[(2, 2)];
        if s.abs() < 1e-12 {
            return None;
        }

        let estimate = Self { h: h_full / s };

        // A degenerate correspondence (e.g. collinear points) still yields a
        // null vector, just not one that reproduces the quad. Reject it by
        // reprojection.
        for (sp, dp) in src.iter().zip(dst.iter()) {
            let got = estimate.apply(Point2::new(sp[0], sp[1]));

            let tolerance = 1e-6 * (1.0 + dp[0].abs().max(dp[1].abs()));
            if !((got.x - dp[0]).abs() < tolerance && (got.y - dp[1]).abs() < tolerance) {
                return None;
            }
        }

        Some(estimate)
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Warp a frame into the top-down view.
///
/// `h_src_from_dst` maps top-down (destination) pixels back into the source
/// frame; each destination pixel is bilinearly sampled from the source.
/// Output resolution equals input resolution; destination pixels whose
/// source point is outside the frame are black.
pub fn warp_frame(frame: &RgbImage, h_src_from_dst: &Homography) -> RgbImage {
    let (width, height) = frame.dimensions();

    RgbImage::from_fn(width, height, |x, y| {
        // Map the destination pixel centre into the source frame, then shift
        // back into sample space where integer coordinates are pixel centres
        let src = h_src_from_dst.apply(Point2::new(x as f64 + 0.5, y as f64 + 0.5));

        match sample_bilinear(frame, src.x - 0.5, src.y - 0.5) {
            Some(px) => px,
            None => Rgb([0, 0, 0]),
        }
    })
}

/// Compute the field-of-view mask for the warp.
///
/// A destination cell is 1 when its source point lies within the original
/// camera frame, 0 otherwise. This is equivalent to warping an all-ones
/// image through the homography.
pub fn fov_mask(width: u32, height: u32, h_src_from_dst: &Homography) -> Array2<u8> {
    let mut mask = Array2::zeros((height as usize, width as usize));

    for y in 0..height {
        for x in 0..width {
            let src = h_src_from_dst.apply(Point2::new(x as f64 + 0.5, y as f64 + 0.5));
            let (sx, sy) = (src.x - 0.5, src.y - 0.5);

            if sx >= 0.0
                && sy >= 0.0
                && sx <= (width - 1) as f64
                && sy <= (height - 1) as f64
            {
                mask[[y as usize, x as usize]] = 1;
            }
        }
    }

    mask
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Hartley normalisation: translate points to their centroid and scale so
/// the mean distance from it is sqrt(2).
fn normalise_points(pts: &[[f64; 2]; 4]) -> ([Point2<f64>; 4], Matrix3<f64>) {
    let n = pts.len() as f64;

    let cx = pts.iter().map(|p| p[0]).sum::<f64>() / n;
    let cy = pts.iter().map(|p| p[1]).sum::<f64>() / n;

    let mean_dist = pts
        .iter()
        .map(|p| ((p[0] - cx).powi(2) + (p[1] - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;

    let s = if mean_dist > 1e-12 {
        2.0f64.sqrt() / mean_dist
    } else {
        1.0
    };

    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);

    let mut out = [Point2::origin(); 4];
    for (i, p) in pts.iter().enumerate() {
        let v = t * Vector3::new(p[0], p[1], 1.0);
        out[i] = Point2::new(v.x, v.y);
    }

    (out, t)
}

/// Bilinearly sample the frame at a continuous position, or `None` if the
/// position is outside the frame.
fn sample_bilinear(frame: &RgbImage, x: f64, y: f64) -> Option<Rgb<u8>> {
    let (width, height) = frame.dimensions();

    if x < 0.0 || y < 0.0 || x > (width - 1) as f64 || y > (height - 1) as f64 {
        return None;
    }

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let p00 = frame.get_pixel(x0, y0);
    let p10 = frame.get_pixel(x1, y0);
    let p01 = frame.get_pixel(x0, y1);
    let p11 = frame.get_pixel(x1, y1);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = p00.0[c] as f64 * (1.0 - fx) + p10.0[c] as f64 * fx;
        let bottom = p01.0[c] as f64 * (1.0 - fx) + p11.0[c] as f64 * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round() as u8;
    }

    Some(Rgb(out))
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
