//! Implementations for the NavCtrl state structure

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{info, trace};
use serde::Serialize;
use std::fmt::Display;

// Internal
use super::{DriveCmd, NavCtrlError, NavCtrlParams};
use crate::per::PerOutput;
use util::{
    archive::{Archived, Archiver},
    maths::clamp,
    module::State,
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Navigation control module state
#[derive(Default)]
pub struct NavCtrl {
    pub(crate) params: NavCtrlParams,

    /// Current mode of the state machine.
    mode: RoverMode,

    /// Collected-sample count recorded when the last pickup was requested.
    /// Collecting mode compares against this to detect a completed pickup.
    last_samples_collected: u32,

    /// Number of pickup requests issued this session.
    samples_located: u32,

    report: NavCtrlStatusReport,
    arch_report: Archiver,

    output: DriveCmd,
    arch_output: Archiver,
}

/// Input data to navigation control.
#[derive(Debug, Clone, Default)]
pub struct NavInput {
    /// The perception output for this cycle, or `None` if perception has
    /// not produced data yet (e.g. the first cycle).
    pub per: Option<PerOutput>,

    /// Current rover velocity.
    ///
    /// Units: meters/second
    pub vel: f64,

    /// True when the harness reports the rover is touching a sample.
    pub near_sample: bool,

    /// True while the harness is executing a pickup.
    pub picking_up: bool,

    /// Total samples collected so far, from the harness.
    pub samples_collected: u32,
}

/// Status report for NavCtrl processing.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct NavCtrlStatusReport {
    /// Mode at the end of the cycle.
    pub mode: RoverMode,

    /// True if the steering demand was clamped to the limit this cycle.
    pub steer_limited: bool,

    /// Number of pickup requests issued this session.
    pub samples_located: u32,
}

/// The outcome of evaluating the decision rules for one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    /// The drive command to issue.
    pub cmd: DriveCmd,

    /// The mode for the next cycle.
    pub mode: RoverMode,

    /// True if the steering demand was clamped.
    pub steer_limited: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMERATIONS
// ------------------------------------------------------------------------------------------------

/// Modes of the decision state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RoverMode {
    /// Driving towards the mean navigable direction.
    Forward,

    /// Braking to a halt, or turning in place searching for a path.
    Stopped,

    /// Steering towards a visible target sample.
    Collecting,

    /// Reserved: returning collected samples to the start point. No
    /// transition produces this mode. If forced externally it behaves as
    /// `Stopped`.
    Returning,
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

/// Evaluate the decision rules for one cycle.
///
/// This is a pure function: `(mode, inputs) -> (command, new mode)`, with
/// the rules in a fixed priority order. The mode branch always reads the
/// pre-transition mode; the cross-cutting rules at the end may overwrite
/// the mode used on the *next* cycle. Keeping the evaluation atomic here
/// avoids the aliasing bugs of mutate-as-you-go designs.
pub fn decide(
    current_mode: RoverMode,
    last_samples_collected: u32,
    input: &NavInput,
    params: &NavCtrlParams,
) -> Decision {
    let mut cmd = DriveCmd::default();
    let mut mode = current_mode;
    let mut steer_limited = false;

    match input.per {
        // No perception data yet: crude forward creep rather than stalling
        None => {
            cmd.throttle = params.throttle_set;
        }

        Some(ref per) => {
            match current_mode {
                RoverMode::Forward => {
                    if per.nav_angles.len() >= params.stop_forward {
                        // Terrain looks good: accelerate to max velocity,
                        // then coast
                        cmd.throttle = if input.vel < params.max_vel {
                            params.throttle_set
                        } else {
                            0.0
                        };
                        cmd.brake = 0.0;

                        let (steer, limited) = steer_towards(per.mean_nav_angle_deg(), params);
                        cmd.steer_deg = steer;
                        steer_limited = limited;
                    } else {
                        // Lack of navigable terrain: hit the brakes
                        cmd.throttle = 0.0;
                        cmd.brake = params.brake_set;
                        cmd.steer_deg = 0.0;
                        mode = RoverMode::Stopped;
                    }
                }

                RoverMode::Stopped | RoverMode::Returning => {
                    if input.vel > params.stopped_vel_thresh {
                        // Still moving: keep braking. Terrain is not
                        // evaluated until the rover has physically stopped.
                        cmd.throttle = 0.0;
                        cmd.brake = params.brake_set;
                        cmd.steer_deg = 0.0;
                    } else if per.target_in_fov {
                        // Hold position while a target is in view, pending
                        // the switch to Collecting
                        cmd.throttle = 0.0;
                        cmd.brake = params.brake_set;
                        cmd.steer_deg = 0.0;
                    } else if per.nav_angles.len() < params.go_forward {
                        // No path ahead: release throttle and brake and
                        // turn in place to search. With the wheels stopped
                        // this is a 4-wheel point turn, not a drive.
                        cmd.throttle = 0.0;
                        cmd.brake = 0.0;
                        cmd.steer_deg = params.search_steer_deg;
                    } else {
                        // Sufficient navigable terrain ahead: go
                        cmd.throttle = params.throttle_set;
                        cmd.brake = 0.0;

                        let (steer, limited) = steer_towards(per.mean_nav_angle_deg(), params);
                        cmd.steer_deg = steer;
                        steer_limited = limited;

                        mode = RoverMode::Forward;
                    }
                }

                RoverMode::Collecting => {
                    if input.near_sample {
                        // Against the sample: stop to allow the pickup
                        cmd.throttle = 0.0;
                        cmd.brake = params.brake_set;
                        cmd.steer_deg = 0.0;
                    } else {
                        // Steer towards the target
                        cmd.throttle = params.throttle_set;
                        cmd.brake = 0.0;

                        let (steer, limited) = steer_towards(per.mean_target_angle_deg(), params);
                        cmd.steer_deg = steer;
                        steer_limited = limited;
                    }

                    // A new sample was collected, or the target was lost:
                    // abandon collection and resume mapping
                    if input.samples_collected > last_samples_collected || !per.target_in_fov {
                        mode = RoverMode::Stopped;
                    }
                }
            }

            // Cross-cutting: a visible target preempts the mode for the
            // next cycle. Evaluated after the mode branch - the branch
            // above always acts on the pre-transition mode.
            if per.target_in_fov && !input.near_sample && !input.picking_up {
                mode = RoverMode::Collecting;
            }
        }
    }

    // Cross-cutting: issue a one-shot pickup request once the rover is at
    // rest against a sample. The harness raises `picking_up` in response,
    // which keeps this rule from re-firing while the pickup runs.
    if input.near_sample && input.vel == 0.0 && !input.picking_up {
        cmd.pickup_request = true;
    }

    Decision {
        cmd,
        mode,
        steer_limited,
    }
}

/// Clamp a mean direction angle into the steering range.
///
/// `None` means there were no points to average - degenerate geometry is
/// answered with a straight-ahead steer, never a NaN.
fn steer_towards(mean_angle_deg: Option<f64>, params: &NavCtrlParams) -> (f64, bool) {
    match mean_angle_deg {
        Some(angle) => {
            let clamped = clamp(&angle, &-params.steer_limit_deg, &params.steer_limit_deg);
            (clamped, clamped != angle)
        }
        None => (0.0, false),
    }
}

impl NavCtrl {
    /// Build navigation control from the given parameters.
    pub fn with_params(params: NavCtrlParams) -> Result<Self, NavCtrlError> {
        params.validate().map_err(NavCtrlError::InvalidParams)?;

        Ok(Self {
            params,
            ..Default::default()
        })
    }

    /// Current mode of the state machine.
    pub fn mode(&self) -> RoverMode {
        self.mode
    }

    /// Number of pickup requests issued this session.
    pub fn samples_located(&self) -> u32 {
        self.samples_located
    }

    /// Force the module into the safe state: Stopped mode with the neutral
    /// braked command. Returns the command for the executive to issue.
    pub fn make_safe(&mut self) -> DriveCmd {
        self.mode = RoverMode::Stopped;
        self.output = DriveCmd::safe(self.params.brake_set);
        self.report.mode = self.mode;
        self.output
    }
}

impl State for NavCtrl {
    type InitData = &'static str;
    type InitError = NavCtrlError;

    type InputData = NavInput;
    type OutputData = DriveCmd;
    type StatusReport = NavCtrlStatusReport;
    type ProcError = NavCtrlError;

    /// Initialise the NavCtrl module.
    ///
    /// Expected init data is the path to the parameter file.
    fn init(&mut self, init_data: Self::InitData, session: &Session) -> Result<(), Self::InitError> {
        let params: NavCtrlParams =
            util::params::load(init_data).map_err(NavCtrlError::ParamLoadError)?;

        *self = Self::with_params(params)?;

        // Create the arch folder for nav_ctrl
        let mut arch_path = session.arch_root.clone();
        arch_path.push("nav_ctrl");
        std::fs::create_dir_all(arch_path)
            .map_err(|e| NavCtrlError::ArchiveInitError(e.to_string()))?;

        self.arch_report = Archiver::from_path(session, "nav_ctrl/status_report.csv")
            .map_err(|e| NavCtrlError::ArchiveInitError(e.to_string()))?;
        self.arch_output = Archiver::from_path(session, "nav_ctrl/output.csv")
            .map_err(|e| NavCtrlError::ArchiveInitError(e.to_string()))?;

        Ok(())
    }

    /// Perform cyclic processing of navigation control.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        let decision = decide(self.mode, self.last_samples_collected, input_data, &self.params);

        if decision.mode != self.mode {
            info!("NavCtrl mode change: {} -> {}", self.mode, decision.mode);
        }
        self.mode = decision.mode;

        if decision.cmd.pickup_request {
            // Record the pre-pickup count so Collecting can detect the
            // increment, and count the located sample
            self.last_samples_collected = input_data.samples_collected;
            self.samples_located += 1;

            info!(
                "Pickup requested, {} sample(s) located this session",
                self.samples_located
            );
        }

        self.report = NavCtrlStatusReport {
            mode: self.mode,
            steer_limited: decision.steer_limited,
            samples_located: self.samples_located,
        };
        self.output = decision.cmd;

        trace!(
            "NavCtrl output: throttle {:.2}, brake {:.2}, steer {:.1} deg",
            self.output.throttle,
            self.output.brake,
            self.output.steer_deg
        );

        Ok((self.output, self.report))
    }
}

impl Archived for NavCtrl {
    fn write(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.arch_report.serialise(self.report)?;
        self.arch_output.serialise(self.output)?;

        Ok(())
    }
}

impl Default for RoverMode {
    fn default() -> Self {
        RoverMode::Forward
    }
}

impl Display for RoverMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoverMode::Forward => write!(f, "Forward"),
            RoverMode::Stopped => write!(f, "Stopped"),
            RoverMode::Collecting => write!(f, "Collecting"),
            RoverMode::Returning => write!(f, "Returning"),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::Array1;

    /// Perception output with `n` navigable points all at `angle_rad`.
    fn per_with_nav(n: usize, angle_rad: f64) -> PerOutput {
        PerOutput {
            nav_dists: Array1::from_elem(n, 1.0),
            nav_angles: Array1::from_elem(n, angle_rad),
            target_angles: Array1::zeros(0),
            target_in_fov: false,
        }
    }

    /// Perception output with a visible target at `angle_rad` and plenty of
    /// navigable terrain.
    fn per_with_target(angle_rad: f64) -> PerOutput {
        PerOutput {
            nav_dists: Array1::from_elem(1000, 1.0),
            nav_angles: Array1::zeros(1000),
            target_angles: Array1::from_elem(5, angle_rad),
            target_in_fov: true,
        }
    }

    fn input_with(per: PerOutput, vel: f64) -> NavInput {
        NavInput {
            per: Some(per),
            vel,
            ..Default::default()
        }
    }

    #[test]
    fn test_no_per_data_creeps_forward() {
        let params = NavCtrlParams::default();

        let decision = decide(RoverMode::Forward, 0, &NavInput::default(), &params);

        assert_eq!(decision.cmd.throttle, params.throttle_set);
        assert_eq!(decision.cmd.brake, 0.0);
        assert_eq!(decision.cmd.steer_deg, 0.0);
        assert_eq!(decision.mode, RoverMode::Forward);
    }

    #[test]
    fn test_forward_with_terrain_keeps_driving() {
        let params = NavCtrlParams::default();
        let input = input_with(per_with_nav(1000, 0.1), 1.0);

        let decision = decide(RoverMode::Forward, 0, &input, &params);

        assert_eq!(decision.mode, RoverMode::Forward);
        assert_eq!(decision.cmd.throttle, params.throttle_set);
        assert_eq!(decision.cmd.brake, 0.0);
        assert!((decision.cmd.steer_deg - 0.1f64.to_degrees()).abs() < 1e-9);
    }

    #[test]
    fn test_forward_coasts_at_max_vel() {
        let params = NavCtrlParams::default();
        let input = input_with(per_with_nav(1000, 0.0), params.max_vel + 0.5);

        let decision = decide(RoverMode::Forward, 0, &input, &params);

        assert_eq!(decision.cmd.throttle, 0.0);
        assert_eq!(decision.cmd.brake, 0.0);
    }

    #[test]
    fn test_forward_without_terrain_stops() {
        let params = NavCtrlParams::default();
        let input = input_with(per_with_nav(0, 0.0), 1.5);

        let decision = decide(RoverMode::Forward, 0, &input, &params);

        assert_eq!(decision.mode, RoverMode::Stopped);
        assert_eq!(decision.cmd.throttle, 0.0);
        assert_eq!(decision.cmd.brake, params.brake_set);
        assert_eq!(decision.cmd.steer_deg, 0.0);
    }

    #[test]
    fn test_steer_clamped_to_limit() {
        let params = NavCtrlParams::default();

        // Degenerate terrain all at 90 degrees left
        let input = input_with(per_with_nav(1000, std::f64::consts::FRAC_PI_2), 1.0);

        let decision = decide(RoverMode::Forward, 0, &input, &params);

        assert_eq!(decision.cmd.steer_deg, params.steer_limit_deg);
        assert!(decision.steer_limited);
    }

    #[test]
    fn test_stopped_keeps_braking_while_moving() {
        let params = NavCtrlParams::default();

        // Plenty of terrain, but still rolling - terrain must not be
        // evaluated yet
        let input = input_with(per_with_nav(1000, 0.0), 0.5);

        let decision = decide(RoverMode::Stopped, 0, &input, &params);

        assert_eq!(decision.mode, RoverMode::Stopped);
        assert_eq!(decision.cmd.throttle, 0.0);
        assert_eq!(decision.cmd.brake, params.brake_set);
    }

    #[test]
    fn test_stopped_turns_in_place_without_path() {
        let params = NavCtrlParams::default();
        let input = input_with(per_with_nav(10, 0.0), 0.0);

        let decision = decide(RoverMode::Stopped, 0, &input, &params);

        assert_eq!(decision.mode, RoverMode::Stopped);
        assert_eq!(decision.cmd.throttle, 0.0);
        assert_eq!(decision.cmd.brake, 0.0);
        assert_eq!(decision.cmd.steer_deg, params.search_steer_deg);
    }

    #[test]
    fn test_stopped_resumes_with_sufficient_terrain() {
        let params = NavCtrlParams::default();
        let input = input_with(per_with_nav(params.go_forward, 0.05), 0.1);

        let decision = decide(RoverMode::Stopped, 0, &input, &params);

        assert_eq!(decision.mode, RoverMode::Forward);
        assert_eq!(decision.cmd.throttle, params.throttle_set);
        assert_eq!(decision.cmd.brake, 0.0);
    }

    #[test]
    fn test_target_preempts_forward() {
        let params = NavCtrlParams::default();
        let input = input_with(per_with_target(0.2), 1.0);

        let decision = decide(RoverMode::Forward, 0, &input, &params);

        // The Forward branch ran on the pre-transition mode, so this cycle
        // still drives on terrain; the mode switch lands next cycle
        assert_eq!(decision.mode, RoverMode::Collecting);
        assert_eq!(decision.cmd.throttle, params.throttle_set);
    }

    #[test]
    fn test_collecting_steers_towards_target() {
        let params = NavCtrlParams::default();
        let input = input_with(per_with_target(0.2), 1.0);

        let decision = decide(RoverMode::Collecting, 0, &input, &params);

        assert_eq!(decision.mode, RoverMode::Collecting);
        assert_eq!(decision.cmd.brake, 0.0);
        assert!((decision.cmd.steer_deg - 0.2f64.to_degrees()).abs() < 1e-9);
    }

    #[test]
    fn test_collecting_brakes_when_near_sample() {
        let params = NavCtrlParams::default();
        let mut input = input_with(per_with_target(0.0), 0.5);
        input.near_sample = true;

        let decision = decide(RoverMode::Collecting, 0, &input, &params);

        assert_eq!(decision.cmd.throttle, 0.0);
        assert_eq!(decision.cmd.brake, params.brake_set);
        assert_eq!(decision.cmd.steer_deg, 0.0);
        assert_eq!(decision.mode, RoverMode::Collecting);
    }

    #[test]
    fn test_collecting_exits_when_target_lost() {
        let params = NavCtrlParams::default();
        let input = input_with(per_with_nav(1000, 0.0), 0.5);

        let decision = decide(RoverMode::Collecting, 0, &input, &params);

        assert_eq!(decision.mode, RoverMode::Stopped);
    }

    #[test]
    fn test_collecting_exits_after_pickup() {
        let params = NavCtrlParams::default();

        let mut input = input_with(per_with_nav(1000, 0.0), 0.0);
        input.samples_collected = 1;

        // Snapshot was 0, a sample has arrived since
        let decision = decide(RoverMode::Collecting, 0, &input, &params);

        assert_eq!(decision.mode, RoverMode::Stopped);
    }

    #[test]
    fn test_pickup_request_fires_at_rest() {
        let params = NavCtrlParams::default();

        let mut input = input_with(per_with_target(0.0), 0.0);
        input.near_sample = true;

        let decision = decide(RoverMode::Collecting, 0, &input, &params);

        assert!(decision.cmd.pickup_request);
    }

    #[test]
    fn test_pickup_request_needs_exact_rest() {
        let params = NavCtrlParams::default();

        let mut input = input_with(per_with_target(0.0), 0.01);
        input.near_sample = true;

        let decision = decide(RoverMode::Collecting, 0, &input, &params);

        assert!(!decision.cmd.pickup_request);
    }

    #[test]
    fn test_pickup_request_is_one_shot() {
        let params = NavCtrlParams::default();
        let mut nav_ctrl = NavCtrl::with_params(params).unwrap();

        // Force into Collecting by showing a target
        let input = input_with(per_with_target(0.0), 1.0);
        nav_ctrl.proc(&input).unwrap();
        assert_eq!(nav_ctrl.mode(), RoverMode::Collecting);

        // At rest against the sample: request fired, snapshot recorded
        let mut input = input_with(per_with_target(0.0), 0.0);
        input.near_sample = true;
        input.samples_collected = 3;

        let (cmd, report) = nav_ctrl.proc(&input).unwrap();
        assert!(cmd.pickup_request);
        assert_eq!(report.samples_located, 1);
        assert_eq!(nav_ctrl.last_samples_collected, 3);

        // Harness starts the pickup: the request must not re-fire
        input.picking_up = true;

        let (cmd, report) = nav_ctrl.proc(&input).unwrap();
        assert!(!cmd.pickup_request);
        assert_eq!(report.samples_located, 1);
    }

    #[test]
    fn test_decide_is_deterministic() {
        let params = NavCtrlParams::default();
        let input = input_with(per_with_target(0.3), 0.7);

        let a = decide(RoverMode::Forward, 2, &input, &params);
        let b = decide(RoverMode::Forward, 2, &input, &params);

        assert_eq!(a, b);
    }

    #[test]
    fn test_make_safe_issues_neutral_command() {
        let params = NavCtrlParams::default();
        let brake_set = params.brake_set;
        let mut nav_ctrl = NavCtrl::with_params(params).unwrap();

        let cmd = nav_ctrl.make_safe();

        assert_eq!(nav_ctrl.mode(), RoverMode::Stopped);
        assert_eq!(cmd.throttle, 0.0);
        assert_eq!(cmd.brake, brake_set);
        assert_eq!(cmd.steer_deg, 0.0);
    }

    #[test]
    fn test_invalid_params_rejected() {
        let params = NavCtrlParams {
            brake_set: -1.0,
            ..Default::default()
        };

        assert!(matches!(
            NavCtrl::with_params(params),
            Err(NavCtrlError::InvalidParams(_))
        ));
    }
}
