//! End-to-end test of one perception + decision cycle.
//!
//! Drives the same module interfaces the executive uses: a synthetic frame
//! goes through perception, the output feeds navigation control, and the
//! resulting command must be in range and consistent with the mode.

use image::{Rgb, RgbImage};
use nalgebra::Point2;
use rov_lib::{
    loc::Pose,
    map::WorldMapLayer,
    nav_ctrl::{NavCtrl, NavCtrlParams, NavInput, RoverMode},
    per::{PerInput, PerMgr, PerParams},
};
use util::module::State;

/// Open bright ground with a dark far band - plenty of navigable terrain.
fn open_ground_frame(params: &PerParams) -> RgbImage {
    RgbImage::from_fn(params.frame_width, params.frame_height, |_, y| {
        if y < 40 {
            Rgb([90, 70, 50])
        } else {
            Rgb([210, 190, 170])
        }
    })
}

/// The same scene with a golden target blob low in the view. The blob is
/// wide in the source frame because the top-down warp compresses the near
/// field heavily.
fn target_frame(params: &PerParams) -> RgbImage {
    RgbImage::from_fn(params.frame_width, params.frame_height, |x, y| {
        if x >= 120 && x < 220 && y >= 100 && y < 140 {
            Rgb([200, 180, 10])
        } else if y < 40 {
            Rgb([90, 70, 50])
        } else {
            Rgb([210, 190, 170])
        }
    })
}

fn pose() -> Pose {
    Pose {
        pos: Point2::new(100.0, 100.0),
        yaw_deg: 30.0,
        ..Default::default()
    }
}

fn cycle(
    per_mgr: &mut PerMgr,
    nav_ctrl: &mut NavCtrl,
    frame: RgbImage,
    vel: f64,
) -> (rov_lib::nav_ctrl::DriveCmd, RoverMode) {
    let (per_output, _) = per_mgr
        .proc(&PerInput {
            frame,
            pose: pose(),
        })
        .expect("perception failed");

    let (cmd, report) = nav_ctrl
        .proc(&NavInput {
            per: Some(per_output),
            vel,
            near_sample: false,
            picking_up: false,
            samples_collected: 0,
        })
        .expect("nav_ctrl failed");

    (cmd, report.mode)
}

#[test]
fn full_cycle_drives_on_open_ground() {
    let mut per_mgr = PerMgr::with_params(PerParams::default()).unwrap();
    let mut nav_ctrl = NavCtrl::with_params(NavCtrlParams::default()).unwrap();

    let (cmd, mode) = cycle(
        &mut per_mgr,
        &mut nav_ctrl,
        open_ground_frame(&PerParams::default()),
        1.0,
    );

    // Commands in range
    assert!(cmd.throttle >= 0.0);
    assert!(cmd.brake >= 0.0);
    assert!(cmd.steer_deg >= -15.0 && cmd.steer_deg <= 15.0);
    assert!(!cmd.pickup_request);

    // Open ground ahead keeps the rover in Forward and off the brakes
    assert_eq!(mode, RoverMode::Forward);
    assert_eq!(cmd.brake, 0.0);
    assert!(cmd.throttle > 0.0);

    // The map gained navigable evidence
    assert!(per_mgr.world_map().count_nonzero(WorldMapLayer::Navigable) > 0);
}

#[test]
fn full_cycle_switches_to_collecting_on_target() {
    let params = PerParams::default();
    let mut per_mgr = PerMgr::with_params(params.clone()).unwrap();
    let mut nav_ctrl = NavCtrl::with_params(NavCtrlParams::default()).unwrap();

    // First cycle sees the target: this cycle still acts on Forward, the
    // mode switch lands for the next one
    let (_, mode) = cycle(&mut per_mgr, &mut nav_ctrl, target_frame(&params), 1.0);
    assert_eq!(mode, RoverMode::Collecting);

    // Second cycle acts in Collecting: drive towards the target
    let (cmd, mode) = cycle(&mut per_mgr, &mut nav_ctrl, target_frame(&params), 1.0);
    assert_eq!(mode, RoverMode::Collecting);
    assert_eq!(cmd.brake, 0.0);
    assert!(cmd.throttle > 0.0);

    // The target marker is on the map
    assert!(per_mgr.world_map().count_nonzero(WorldMapLayer::Target) > 0);
}

#[test]
fn world_map_values_stay_in_range_over_many_cycles() {
    let params = PerParams::default();
    let mut per_mgr = PerMgr::with_params(params.clone()).unwrap();

    for _ in 0..30 {
        per_mgr
            .proc(&PerInput {
                frame: open_ground_frame(&params),
                pose: pose(),
            })
            .unwrap();
    }

    // u8 storage makes >255 unrepresentable; check saturation happened
    // rather than wrap-around by confirming full-intensity cells exist
    assert!(per_mgr
        .world_map()
        .layer_view(WorldMapLayer::Navigable)
        .iter()
        .any(|&v| v == 255));
}
