//! Parameters structure for the perception module

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Parameters for the perception pipeline.
///
/// The calibration quad, the destination half-width and the map scale are
/// coupled: changing one without the others silently breaks the
/// field-of-view clipping. They therefore travel together in this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerParams {
    // ---- CAMERA ----

    /// Width of the camera frame.
    ///
    /// Units: pixels
    pub frame_width: u32,

    /// Height of the camera frame.
    ///
    /// Units: pixels
    pub frame_height: u32,

    // ---- CALIBRATION ----

    /// The four corners of the calibration square on the ground plane, as
    /// seen by the camera. Order: bottom-left, bottom-right, top-right,
    /// top-left.
    ///
    /// Units: pixels, source frame
    pub src_points: [[f64; 2]; 4],

    /// Half the side length of the calibration square in the top-down view.
    ///
    /// Units: pixels, destination frame
    pub dst_size: f64,

    /// Offset of the calibration square above the bottom edge of the
    /// top-down view, accounting for the square not being directly below
    /// the camera.
    ///
    /// Units: pixels, destination frame
    pub bottom_offset: f64,

    // ---- CLASSIFICATION ----

    /// Per-channel RGB threshold for navigable terrain. All channels must be
    /// strictly above these values.
    pub nav_rgb_thresh: [u8; 3],

    /// RGB threshold for target samples: red and green strictly above the
    /// first two values, blue strictly below the third.
    pub target_rgb_thresh: [u8; 3],

    /// Fraction of the warped frame rows, measured from the bottom, kept for
    /// navigable/obstacle classification. The far field is discarded as
    /// geometrically unreliable.
    pub near_field_fraction: f64,

    // ---- MAPPING ----

    /// Number of cells along each axis of the (square) world map.
    pub world_size: usize,

    /// Confidence added to the obstacle layer per classified pixel.
    pub obstacle_increment: u8,

    /// Confidence added to the navigable layer per classified pixel.
    pub navigable_increment: u8,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PerParams {
    /// Rover-centric pixels per world map cell.
    ///
    /// Coupled to the destination square: one map cell spans the full side
    /// length of the calibration square in the top-down view.
    pub fn scale(&self) -> f64 {
        2.0 * self.dst_size
    }

    /// The four corners of the calibration square in the top-down view,
    /// matching the order of `src_points`.
    pub fn dst_points(&self) -> [[f64; 2]; 4] {
        let half_width = self.frame_width as f64 / 2.0;
        let height = self.frame_height as f64;

        [
            [half_width - self.dst_size, height - self.bottom_offset],
            [half_width + self.dst_size, height - self.bottom_offset],
            [
                half_width + self.dst_size,
                height - 2.0 * self.dst_size - self.bottom_offset,
            ],
            [
                half_width - self.dst_size,
                height - 2.0 * self.dst_size - self.bottom_offset,
            ],
        ]
    }
}

impl Default for PerParams {
    /// The reference calibration for the simulator camera.
    fn default() -> Self {
        Self {
            frame_width: 320,
            frame_height: 160,
            src_points: [
                [14.0, 140.0],
                [301.0, 140.0],
                [200.0, 96.0],
                [118.0, 96.0],
            ],
            dst_size: 5.0,
            bottom_offset: 6.0,
            nav_rgb_thresh: [185, 170, 160],
            target_rgb_thresh: [150, 130, 30],
            near_field_fraction: 0.4,
            world_size: 200,
            obstacle_increment: 100,
            navigable_increment: 50,
        }
    }
}
