//! Coordinate transforms between image, rover-centric, polar and world frames.
//!
//! All functions here are pure and stateless. The chain per cycle is:
//! binary mask -> rover-centric cartesian -> (polar for steering, world for
//! mapping). The rover-centric frame has its origin at the bottom-centre of
//! the warped camera frame, x forward, y left.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use ndarray::{Array1, ArrayView2};

use crate::loc::Pose;

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Convert a binary mask into rover-centric coordinates of its set pixels.
///
/// x is the pixel's row distance from the bottom edge of the mask, y is the
/// left-positive offset from the mask's horizontal centre. The returned
/// arrays are parallel and have one entry per set pixel.
pub fn rover_coords(mask: ArrayView2<u8>) -> (Array1<f64>, Array1<f64>) {
    let (rows, cols) = mask.dim();
    let half_width = cols as f64 / 2.0;

    let mut x = Vec::new();
    let mut y = Vec::new();

    for ((row, col), &value) in mask.indexed_iter() {
        if value != 0 {
            x.push(rows as f64 - row as f64);
            y.push(half_width - col as f64);
        }
    }

    (Array1::from(x), Array1::from(y))
}

/// Convert rover-centric cartesian coordinates to polar (distance, angle).
///
/// Angles are in radians in the range (-pi, pi], 0 straight ahead, positive
/// to the left. Distances are always non-negative.
pub fn to_polar(x: &Array1<f64>, y: &Array1<f64>) -> (Array1<f64>, Array1<f64>) {
    let dist = x
        .iter()
        .zip(y.iter())
        .map(|(xp, yp)| xp.hypot(*yp))
        .collect();
    let angles = x
        .iter()
        .zip(y.iter())
        .map(|(xp, yp)| yp.atan2(*xp))
        .collect();

    (Array1::from_vec(dist), Array1::from_vec(angles))
}

/// Rotate rover-centric coordinates by the rover's yaw.
pub fn rotate(x: &Array1<f64>, y: &Array1<f64>, yaw_deg: f64) -> (Array1<f64>, Array1<f64>) {
    let yaw_rad = yaw_deg.to_radians();
    let (sin_yaw, cos_yaw) = yaw_rad.sin_cos();

    let x_rot = x
        .iter()
        .zip(y.iter())
        .map(|(xp, yp)| xp * cos_yaw - yp * sin_yaw)
        .collect();
    let y_rot = x
        .iter()
        .zip(y.iter())
        .map(|(xp, yp)| xp * sin_yaw + yp * cos_yaw)
        .collect();

    (Array1::from_vec(x_rot), Array1::from_vec(y_rot))
}

/// Scale rotated coordinates down to world cells and translate by the rover's
/// world position.
pub fn translate(
    x_rot: &Array1<f64>,
    y_rot: &Array1<f64>,
    pos: nalgebra::Point2<f64>,
    scale: f64,
) -> (Array1<f64>, Array1<f64>) {
    let x_tran = x_rot.iter().map(|xp| xp / scale + pos.x).collect();
    let y_tran = y_rot.iter().map(|yp| yp / scale + pos.y).collect();

    (Array1::from_vec(x_tran), Array1::from_vec(y_tran))
}

/// Convert rover-centric coordinates to integer world map cells.
///
/// Rotation is applied before translation - the reverse order is a
/// correctness bug. Results are floored and clipped into
/// `[0, world_size - 1]`, so any finite input maps to a valid cell.
pub fn to_world(
    x: &Array1<f64>,
    y: &Array1<f64>,
    pose: &Pose,
    world_size: usize,
    scale: f64,
) -> (Array1<usize>, Array1<usize>) {
    let (x_rot, y_rot) = rotate(x, y, pose.yaw_deg);
    let (x_tran, y_tran) = translate(&x_rot, &y_rot, pose.pos, scale);

    let max_cell = (world_size - 1) as f64;

    let clip = |v: f64| v.floor().max(0.0).min(max_cell) as usize;

    let x_world = x_tran.iter().map(|&v| clip(v)).collect();
    let y_world = y_tran.iter().map(|&v| clip(v)).collect();

    (Array1::from_vec(x_world), Array1::from_vec(y_world))
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
