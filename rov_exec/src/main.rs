//! Main rover-side executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise all modules
//!     - Main loop:
//!         - System input acquisition (here, the built-in demo harness
//!           standing in for the simulator)
//!         - Perception processing - warp, classify, map
//!         - Navigation control processing - decide the drive command
//!         - Actuation (demo harness velocity/pose integration)
//!
//! In deployment the frame, pose and telemetry come from the simulator or
//! robot over whatever transport the harness provides; the core is agnostic
//! to it. The demo harness below drives the exact same module interfaces.
//!
//! # Modules
//!
//! All cyclic modules (`per`, `nav_ctrl`) shall meet the following
//! requirements:
//!     1. Provide a public struct implementing the `util::module::State`
//!        trait.

// ---------------------------------------------------------------------------
// USE MODULES FROM LIBRARY
// ---------------------------------------------------------------------------

use rov_lib::{
    data_store::{DataStore, SafeModeCause},
    loc::Pose,
    map::WorldMapLayer,
    nav_ctrl::{DriveCmd, NavInput},
    per::{PerInput, PerParams},
};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use image::{Rgb, RgbImage};
use log::{info, warn};
use nalgebra::Point2;
use std::thread;
use std::time::{Duration, Instant};

// Internal
use util::{
    archive::Archived,
    logger::{logger_init, LevelFilter},
    maths,
    module::State,
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Target period of one cycle.
const CYCLE_PERIOD_S: f64 = 0.10;

/// Number of cycles per second
const CYCLE_FREQUENCY_HZ: f64 = 1.0 / CYCLE_PERIOD_S;

/// Number of cycles the demo harness runs for.
const DEMO_NUM_CYCLES: u128 = 600;

/// Cycle on which the demo harness brings a target sample into view.
const DEMO_TARGET_APPEARS_CYCLE: u128 = 200;

/// Demo cycles of approach before the rover is considered to touch the
/// target.
const DEMO_TARGET_APPROACH_CYCLES: u128 = 60;

/// Demo cycles a pickup takes to complete.
const DEMO_PICKUP_CYCLES: u128 = 20;

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("rov_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Deimos Rover Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- MODULE INITIALISATION ----

    let mut ds = DataStore::default();

    ds.per_mgr
        .init("per.toml", &session)
        .wrap_err("Failed to initialise Per")?;
    ds.nav_ctrl
        .init("nav_ctrl.toml", &session)
        .wrap_err("Failed to initialise NavCtrl")?;

    info!("Modules initialised");

    // ---- DEMO HARNESS ----

    let mut harness = DemoHarness::new(ds.per_mgr.params.clone());

    info!("Demo harness ready, running {} cycles", DEMO_NUM_CYCLES);

    // ---- MAIN LOOP ----

    let mut num_consec_cycle_overruns = 0u64;

    while ds.num_cycles < DEMO_NUM_CYCLES {
        let cycle_start_instant = Instant::now();

        ds.cycle_start(CYCLE_FREQUENCY_HZ);

        // ---- INPUT ACQUISITION ----

        let (frame, pose) = harness.observe(ds.num_cycles);
        ds.rov_pose = Some(pose);
        ds.rov_vel_ms = harness.vel;
        ds.near_sample = harness.near_sample;
        ds.picking_up = harness.picking_up;
        ds.samples_collected = harness.samples_collected;

        // ---- PERCEPTION ----

        if !ds.safe {
            match ds.per_mgr.proc(&PerInput { frame, pose }) {
                Ok((output, report)) => {
                    ds.per_output = Some(output);
                    ds.per_status_rpt = report;
                }
                Err(e) => {
                    log::error!("Per::proc error: {}", e);
                    ds.make_safe(SafeModeCause::PerProcFailed);
                }
            }
        }

        // ---- NAVIGATION CONTROL ----

        if !ds.safe {
            ds.nav_ctrl_input = NavInput {
                per: ds.per_output.clone(),
                vel: ds.rov_vel_ms,
                near_sample: ds.near_sample,
                picking_up: ds.picking_up,
                samples_collected: ds.samples_collected,
            };

            match ds.nav_ctrl.proc(&ds.nav_ctrl_input) {
                Ok((output, report)) => {
                    ds.nav_ctrl_output = output;
                    ds.nav_ctrl_status_rpt = report;
                }
                Err(e) => {
                    log::error!("NavCtrl::proc error: {}", e);
                    ds.make_safe(SafeModeCause::NavCtrlProcFailed);
                }
            }
        }

        // ---- ACTUATION ----

        // In safe mode hold the neutral braked command rather than whatever
        // the cleared per-cycle output contains
        if ds.safe {
            ds.nav_ctrl_output = ds.nav_ctrl.make_safe();
        }

        harness.actuate(&ds.nav_ctrl_output, CYCLE_PERIOD_S);

        // ---- TELEMETRY ----

        if let Err(e) = ds.per_mgr.write() {
            warn!("Could not write Per archives: {}", e);
        }
        if let Err(e) = ds.nav_ctrl.write() {
            warn!("Could not write NavCtrl archives: {}", e);
        }

        if ds.is_1_hz_cycle {
            info!(
                "Cycle {}: mode {}, vel {:.2} m/s, map nav cells {}",
                ds.num_cycles,
                ds.nav_ctrl_status_rpt.mode,
                ds.rov_vel_ms,
                ds.per_mgr.world_map().count_nonzero(WorldMapLayer::Navigable)
            );
        }

        ds.num_cycles += 1;

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur_s = cycle_start_instant.elapsed().as_secs_f64();

        if cycle_dur_s < CYCLE_PERIOD_S {
            num_consec_cycle_overruns = 0;
            thread::sleep(Duration::from_secs_f64(CYCLE_PERIOD_S - cycle_dur_s));
        } else {
            num_consec_cycle_overruns += 1;
            warn!(
                "Cycle overran by {:.06} s ({} consecutive overruns)",
                cycle_dur_s - CYCLE_PERIOD_S,
                num_consec_cycle_overruns
            );
        }
    }

    // ---- SHUTDOWN ----

    info!(
        "Demo complete: {} samples located, {} collected",
        ds.nav_ctrl.samples_located(),
        ds.samples_collected
    );
    info!(
        "World map coverage: {} navigable cells, {} obstacle cells, {} target cells",
        ds.per_mgr.world_map().count_nonzero(WorldMapLayer::Navigable),
        ds.per_mgr.world_map().count_nonzero(WorldMapLayer::Obstacle),
        ds.per_mgr.world_map().count_nonzero(WorldMapLayer::Target)
    );

    // Persist the world map for inspection - a harness-side concern, the
    // core itself never touches the disk
    let map_path = session.session_root.join("world_map.json");
    let map_file =
        std::fs::File::create(&map_path).wrap_err("Failed to create the world map file")?;
    serde_json::to_writer(map_file, ds.per_mgr.world_map())
        .wrap_err("Failed to serialise the world map")?;

    info!("World map saved to {:?}", map_path);

    Ok(())
}

// ---------------------------------------------------------------------------
// DEMO HARNESS
// ---------------------------------------------------------------------------

/// A minimal stand-in for the simulator: renders synthetic camera frames
/// and integrates the rover's velocity and pose from the drive commands.
///
/// The scene is scripted: open ground with a dark horizon at first, then a
/// target sample comes into view, the rover closes on it, touches it, and
/// the pickup completes.
struct DemoHarness {
    params: PerParams,

    pose: Pose,
    vel: f64,

    near_sample: bool,
    picking_up: bool,
    samples_collected: u32,

    /// True while the scripted target was in the last rendered frame.
    target_shown: bool,

    /// Cycles of approach to the current target so far.
    approach_cycles: u128,

    /// Cycles remaining on the running pickup, 0 when idle.
    pickup_cycles_remaining: u128,
}

impl DemoHarness {
    fn new(params: PerParams) -> Self {
        Self {
            params,
            pose: Pose {
                pos: Point2::new(100.0, 100.0),
                ..Default::default()
            },
            vel: 0.0,
            near_sample: false,
            picking_up: false,
            samples_collected: 0,
            target_shown: false,
            approach_cycles: 0,
            pickup_cycles_remaining: 0,
        }
    }

    /// True while the scripted target is in the scene.
    fn target_visible(&self, cycle: u128) -> bool {
        cycle >= DEMO_TARGET_APPEARS_CYCLE && self.samples_collected == 0
    }

    /// Render the frame for this cycle and report the pose it was taken at.
    fn observe(&mut self, cycle: u128) -> (RgbImage, Pose) {
        let ground = Rgb([210, 190, 170]);
        let rock = Rgb([90, 70, 50]);
        let target = Rgb([200, 180, 10]);

        let show_target = self.target_visible(cycle);
        self.target_shown = show_target;

        // The target blob sits low-centre in the view and grows as the
        // rover closes on it. It is wide in the source frame because the
        // top-down warp compresses the near field heavily.
        let grow = (self.approach_cycles / 4).min(40) as u32;
        let (t_x0, t_x1) = (120 - grow, 220 + grow);
        let (t_y0, t_y1) = (100 - grow, 140);

        let frame = RgbImage::from_fn(self.params.frame_width, self.params.frame_height, |x, y| {
            if show_target && x >= t_x0 && x < t_x1 && y >= t_y0 && y < t_y1 {
                target
            } else if y < 40 {
                rock
            } else {
                ground
            }
        });

        (frame, self.pose)
    }

    /// Integrate the drive command over one cycle period.
    fn actuate(&mut self, cmd: &DriveCmd, dt: f64) {
        // Pickup lifecycle
        if cmd.pickup_request && !self.picking_up {
            self.picking_up = true;
            self.pickup_cycles_remaining = DEMO_PICKUP_CYCLES;
        }

        if self.picking_up {
            self.pickup_cycles_remaining = self.pickup_cycles_remaining.saturating_sub(1);
            if self.pickup_cycles_remaining == 0 {
                self.picking_up = false;
                self.near_sample = false;
                self.samples_collected += 1;
                self.approach_cycles = 0;
            }
            return;
        }

        // Longitudinal dynamics: throttle accelerates, brake overrides,
        // light drag otherwise
        if cmd.brake > 0.0 {
            self.vel = (self.vel - cmd.brake * 0.2 * dt).max(0.0);
            if self.vel < 0.05 {
                self.vel = 0.0;
            }
        } else {
            // Throttle maps linearly onto acceleration
            let accel_ms2 = maths::lin_map((0.0, 1.0), (0.0, 2.0), cmd.throttle);
            self.vel += (accel_ms2 - 0.05 * self.vel) * dt;
        }

        // Steering: a drive turn while moving, a point turn while stopped
        if self.vel > 0.0 {
            self.pose.yaw_deg += cmd.steer_deg * 0.5 * dt * self.vel;
        } else if cmd.brake == 0.0 && cmd.steer_deg != 0.0 {
            self.pose.yaw_deg += cmd.steer_deg * 2.0 * dt;
        }

        // Planar position integration, one map cell per meter
        let yaw_rad = self.pose.yaw_rad();
        self.pose.pos.x += self.vel * yaw_rad.cos() * dt;
        self.pose.pos.y += self.vel * yaw_rad.sin() * dt;

        // Approach script: once the target is visible and the rover is
        // moving towards it, count down to contact
        if self.target_shown && self.vel > 0.0 {
            self.approach_cycles += 1;
            if self.approach_cycles >= DEMO_TARGET_APPROACH_CYCLES {
                self.near_sample = true;
            }
        }
    }
}
