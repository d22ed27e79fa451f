//! # Perception module
//!
//! Converts camera frames into world map evidence and steering signals.
//!
//! Procedure per cycle, in order:
//!  - Warp the frame into a top-down view through the fixed calibration
//!    homography, together with its field-of-view mask
//!  - Classify navigable terrain, obstacles and target samples by colour
//!    threshold
//!  - Crop navigable/obstacle masks to the near field
//!  - Convert the masks to rover-centric coordinates, then to world cells,
//!    and accumulate them into the world map
//!  - Derive the polar navigable-direction data used for steering, and the
//!    closest target point when any target pixels are present
//!
//! Pitch and roll are accepted in the pose but not used to rectify the
//! frame: the pipeline assumes a flat ground plane and a level camera, a
//! known limitation of the reference design.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod params;
pub mod thresh;
pub mod transform;
pub mod warp;

pub use params::PerParams;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use image::{Rgb, RgbImage};
use log::trace;
use ndarray::{arr1, Array1, Array2};
use ndarray_stats::QuantileExt;
use serde::Serialize;

use crate::loc::Pose;
use crate::map::{WorldMap, WorldMapError, WorldMapLayer};
use util::{
    archive::{Archived, Archiver},
    module::State,
    session::Session,
};
use warp::Homography;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Manages the perception pipeline and owns the persistent world map.
pub struct PerMgr {
    pub params: PerParams,

    /// Maps top-down (destination) pixels back into the camera frame, used
    /// to resample the warp. Fixed at init from the calibration quad.
    h_src_from_dst: Homography,

    /// The persistent world map, accumulated over the whole session.
    world_map: WorldMap,

    /// Debug visualisation of the per-class masks. Cosmetic only.
    vision: RgbImage,

    report: PerStatusReport,
    arch_report: Archiver,
}

/// Input data to the perception pipeline for one cycle.
pub struct PerInput {
    /// The camera frame for this cycle.
    pub frame: RgbImage,

    /// The rover's pose at the time the frame was taken.
    pub pose: Pose,
}

/// Output of one perception cycle - the data the decision controller reads.
#[derive(Debug, Clone, Default)]
pub struct PerOutput {
    /// Distances of navigable terrain pixels from the rover.
    pub nav_dists: Array1<f64>,

    /// Angles of navigable terrain pixels, radians, 0 ahead, positive left.
    pub nav_angles: Array1<f64>,

    /// Angles of target-sample pixels. Empty unless `target_in_fov`.
    pub target_angles: Array1<f64>,

    /// True when any target-sample pixels were seen this cycle.
    pub target_in_fov: bool,
}

/// Status report for perception processing.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PerStatusReport {
    /// Navigable pixels after the near-field crop
    pub nav_px: usize,

    /// Obstacle pixels after the near-field crop
    pub obstacle_px: usize,

    /// Target pixels over the full warped frame
    pub target_px: usize,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Possible errors that can occur during perception.
#[derive(Debug, thiserror::Error)]
pub enum PerError {
    #[error(
        "The calibration quad is degenerate, no homography exists for it. \
        This is a configuration bug, check the perception parameter file."
    )]
    DegenerateCalibration,

    #[error("Failed to load perception parameters: {0}")]
    ParamLoadError(util::params::LoadError),

    #[error("Failed to initialise the perception archives: {0}")]
    ArchiveInitError(String),

    #[error("World map error: {0}")]
    WorldMapError(#[from] WorldMapError),

    #[error("Expected a {expected_width}x{expected_height} frame, got {width}x{height}")]
    FrameSizeMismatch {
        expected_width: u32,
        expected_height: u32,
        width: u32,
        height: u32,
    },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PerMgr {
    /// Build a manager from the given parameters.
    ///
    /// Fails if the calibration quad is degenerate or the world map size is
    /// invalid - both configuration bugs, fatal at startup.
    pub fn with_params(params: PerParams) -> Result<Self, PerError> {
        let h_dst_from_src = Homography::estimate(&params.src_points, &params.dst_points())
            .ok_or(PerError::DegenerateCalibration)?;
        let h_src_from_dst = h_dst_from_src
            .inverse()
            .ok_or(PerError::DegenerateCalibration)?;

        let world_map = WorldMap::new(params.world_size)?;
        let vision = RgbImage::new(params.frame_width, params.frame_height);

        Ok(Self {
            params,
            h_src_from_dst,
            world_map,
            vision,
            report: PerStatusReport::default(),
            arch_report: Archiver::default(),
        })
    }

    /// The persistent world map accumulated so far.
    pub fn world_map(&self) -> &WorldMap {
        &self.world_map
    }

    /// The debug visualisation of the last cycle's masks.
    pub fn vision(&self) -> &RgbImage {
        &self.vision
    }

    /// Paint the per-class masks into the debug visualisation: obstacles in
    /// red, targets in green, navigable terrain in blue.
    fn update_vision(&mut self, nav: &Array2<u8>, obstacle: &Array2<u8>, target: &Array2<u8>) {
        for y in 0..self.params.frame_height {
            for x in 0..self.params.frame_width {
                let idx = [y as usize, x as usize];
                let intensity = |v: u8| if v != 0 { u8::MAX } else { 0 };

                self.vision.put_pixel(
                    x,
                    y,
                    Rgb([
                        intensity(obstacle[idx]),
                        intensity(target[idx]),
                        intensity(nav[idx]),
                    ]),
                );
            }
        }
    }
}

impl State for PerMgr {
    type InitData = &'static str;
    type InitError = PerError;

    type InputData = PerInput;
    type OutputData = PerOutput;
    type StatusReport = PerStatusReport;
    type ProcError = PerError;

    /// Initialise the perception module.
    ///
    /// Expected init data is the path to the parameter file.
    fn init(&mut self, init_data: Self::InitData, session: &Session) -> Result<(), Self::InitError> {
        let params: PerParams =
            util::params::load(init_data).map_err(PerError::ParamLoadError)?;

        *self = Self::with_params(params)?;

        // Create the arch folder for per
        let mut arch_path = session.arch_root.clone();
        arch_path.push("per");
        std::fs::create_dir_all(arch_path)
            .map_err(|e| PerError::ArchiveInitError(e.to_string()))?;

        self.arch_report = Archiver::from_path(session, "per/status_report.csv")
            .map_err(|e| PerError::ArchiveInitError(e.to_string()))?;

        Ok(())
    }

    /// Perform cyclic processing of perception.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        let (width, height) = input_data.frame.dimensions();
        if width != self.params.frame_width || height != self.params.frame_height {
            return Err(PerError::FrameSizeMismatch {
                expected_width: self.params.frame_width,
                expected_height: self.params.frame_height,
                width,
                height,
            });
        }

        // Warp the frame into the top-down view, with its field-of-view mask
        let warped = warp::warp_frame(&input_data.frame, &self.h_src_from_dst);
        let fov = warp::fov_mask(width, height, &self.h_src_from_dst);

        // Classify the warped frame
        let nav = thresh::nav_thresh(&warped, self.params.nav_rgb_thresh);
        let target = thresh::target_thresh(&warped, self.params.target_rgb_thresh);
        let obstacle = thresh::obstacle_thresh(&nav, &fov);

        self.update_vision(&nav, &obstacle, &target);

        // Crop navigable/obstacle to the near field. Targets are not
        // cropped, distant samples are still worth recording.
        let nav_near = thresh::crop_near_field(&nav, self.params.near_field_fraction);
        let obstacle_near = thresh::crop_near_field(&obstacle, self.params.near_field_fraction);

        // Rover-centric coordinates of each class
        let (nav_x, nav_y) = transform::rover_coords(nav_near.view());
        let (obstacle_x, obstacle_y) = transform::rover_coords(obstacle_near.view());
        let (target_x, target_y) = transform::rover_coords(target.view());

        // Project into the world map and accumulate evidence
        let scale = self.params.scale();
        let world_size = self.params.world_size;

        let (obstacle_xw, obstacle_yw) =
            transform::to_world(&obstacle_x, &obstacle_y, &input_data.pose, world_size, scale);
        self.world_map.accumulate(
            WorldMapLayer::Obstacle,
            &obstacle_xw,
            &obstacle_yw,
            self.params.obstacle_increment,
        )?;

        let (nav_xw, nav_yw) =
            transform::to_world(&nav_x, &nav_y, &input_data.pose, world_size, scale);
        self.world_map.accumulate(
            WorldMapLayer::Navigable,
            &nav_xw,
            &nav_yw,
            self.params.navigable_increment,
        )?;

        // Polar navigable-direction data, the primary steering signal
        let (nav_dists, nav_angles) = transform::to_polar(&nav_x, &nav_y);

        // If any target pixels are present, collapse the cluster to its
        // closest point and mark that single cell in the map
        let mut target_angles = Array1::zeros(0);
        let mut target_in_fov = false;

        if !target_x.is_empty() {
            let (target_dists, angles) = transform::to_polar(&target_x, &target_y);

            if let Ok(closest) = target_dists.argmin() {
                let (xw, yw) = transform::to_world(
                    &arr1(&[target_x[closest]]),
                    &arr1(&[target_y[closest]]),
                    &input_data.pose,
                    world_size,
                    scale,
                );
                self.world_map.mark_target(xw[0], yw[0]);
            }

            target_angles = angles;
            target_in_fov = true;
        }

        self.report = PerStatusReport {
            nav_px: nav_x.len(),
            obstacle_px: obstacle_x.len(),
            target_px: target_x.len(),
        };

        trace!(
            "Per: {} nav px, {} obstacle px, {} target px",
            self.report.nav_px,
            self.report.obstacle_px,
            self.report.target_px
        );

        Ok((
            PerOutput {
                nav_dists,
                nav_angles,
                target_angles,
                target_in_fov,
            },
            self.report,
        ))
    }
}

impl Default for PerMgr {
    /// A placeholder manager with an identity homography and an empty map.
    /// Must be initialised via [`State::init`] before processing.
    fn default() -> Self {
        Self {
            params: PerParams::default(),
            h_src_from_dst: Homography::identity(),
            world_map: WorldMap::default(),
            vision: RgbImage::new(0, 0),
            report: PerStatusReport::default(),
            arch_report: Archiver::default(),
        }
    }
}

impl Archived for PerMgr {
    fn write(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.arch_report.serialise(self.report)
    }
}

impl PerOutput {
    /// Mean navigable-direction angle in degrees, or `None` when no
    /// navigable pixels were seen. The emptiness check keeps NaN out of the
    /// steering command path.
    pub fn mean_nav_angle_deg(&self) -> Option<f64> {
        self.nav_angles.mean().map(f64::to_degrees)
    }

    /// Mean target-direction angle in degrees, or `None` when no target is
    /// in view.
    pub fn mean_target_angle_deg(&self) -> Option<f64> {
        self.target_angles.mean().map(f64::to_degrees)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::Point2;

    /// A frame which warps to mostly bright ground with a dark band across
    /// the top and a golden target blob low in the view. The blob is wide in
    /// the source frame because the top-down warp compresses the near field
    /// heavily - a small blob would vanish below the warped pixel grid.
    fn synthetic_frame(params: &PerParams) -> RgbImage {
        RgbImage::from_fn(params.frame_width, params.frame_height, |x, y| {
            if y < 40 {
                Rgb([90, 70, 50])
            } else if x >= 120 && x < 220 && y >= 100 && y < 140 {
                Rgb([200, 180, 10])
            } else {
                Rgb([210, 190, 170])
            }
        })
    }

    fn centre_pose() -> Pose {
        Pose {
            pos: Point2::new(100.0, 100.0),
            yaw_deg: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_proc_produces_consistent_output() {
        let mut per_mgr = PerMgr::with_params(PerParams::default()).unwrap();

        let input = PerInput {
            frame: synthetic_frame(&per_mgr.params),
            pose: centre_pose(),
        };

        let (output, report) = per_mgr.proc(&input).unwrap();

        // Parallel arrays stay parallel
        assert_eq!(output.nav_dists.len(), output.nav_angles.len());
        assert_eq!(output.nav_dists.len(), report.nav_px);

        // Polar invariants
        for d in output.nav_dists.iter() {
            assert!(*d >= 0.0);
        }
        for a in output.nav_angles.iter() {
            assert!(*a > -std::f64::consts::PI && *a <= std::f64::consts::PI);
        }
    }

    #[test]
    fn test_proc_sees_target_and_marks_map() {
        let mut per_mgr = PerMgr::with_params(PerParams::default()).unwrap();

        let input = PerInput {
            frame: synthetic_frame(&per_mgr.params),
            pose: centre_pose(),
        };

        let (output, report) = per_mgr.proc(&input).unwrap();

        assert!(output.target_in_fov);
        assert!(report.target_px > 0);
        assert_eq!(output.target_angles.len(), report.target_px);

        // Exactly one cell carries the full-intensity target marker
        let target_cells = per_mgr
            .world_map()
            .layer_view(WorldMapLayer::Target)
            .iter()
            .filter(|&&v| v == 255)
            .count();
        assert_eq!(target_cells, 1);
    }

    #[test]
    fn test_proc_without_target() {
        let mut per_mgr = PerMgr::with_params(PerParams::default()).unwrap();

        // All ground, no target colours anywhere
        let frame = RgbImage::from_pixel(
            per_mgr.params.frame_width,
            per_mgr.params.frame_height,
            Rgb([210, 190, 170]),
        );

        let (output, _) = per_mgr
            .proc(&PerInput {
                frame,
                pose: centre_pose(),
            })
            .unwrap();

        assert!(!output.target_in_fov);
        assert!(output.target_angles.is_empty());
        assert_eq!(output.mean_target_angle_deg(), None);
        assert_eq!(per_mgr.world_map().count_nonzero(WorldMapLayer::Target), 0);
    }

    #[test]
    fn test_map_accumulates_across_cycles() {
        let mut per_mgr = PerMgr::with_params(PerParams::default()).unwrap();

        let input = PerInput {
            frame: synthetic_frame(&per_mgr.params),
            pose: centre_pose(),
        };

        per_mgr.proc(&input).unwrap();
        let after_one = per_mgr.world_map().count_nonzero(WorldMapLayer::Navigable);

        per_mgr.proc(&input).unwrap();
        let after_two = per_mgr.world_map().count_nonzero(WorldMapLayer::Navigable);

        assert!(after_one > 0);
        assert!(after_two >= after_one);
    }

    #[test]
    fn test_frame_size_mismatch_rejected() {
        let mut per_mgr = PerMgr::with_params(PerParams::default()).unwrap();

        let input = PerInput {
            frame: RgbImage::new(64, 64),
            pose: centre_pose(),
        };

        assert!(matches!(
            per_mgr.proc(&input),
            Err(PerError::FrameSizeMismatch { .. })
        ));
    }
}
