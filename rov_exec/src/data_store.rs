//! # Data Store

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::warn;

use crate::{
    loc::Pose,
    nav_ctrl::{self, DriveCmd},
    per,
};

// ---------------------------------------------------------------------------
// ENUMS
// ---------------------------------------------------------------------------

/// Gives the reason the rover has been put into safe mode
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum SafeModeCause {
    MakeSafeRequested,
    PerProcFailed,
    NavCtrlProcFailed,
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Global data store for the executable.
///
/// This is the single mutable aggregate threaded through each cycle: the
/// harness telemetry comes in, both modules read and write their slices of
/// it, and the drive command goes out. It is passed explicitly, never held
/// in a global.
#[derive(Default)]
pub struct DataStore {
    // Cycle management
    /// Number of cycles already executed
    pub num_cycles: u128,

    /// True if this cycle falls on a 1Hz boundary
    pub is_1_hz_cycle: bool,

    // Safe mode variables
    /// Determines if the rover is in safe mode.
    pub safe: bool,

    /// Gives the reason for the rover being in safe mode.
    pub safe_cause: Option<SafeModeCause>,

    // Telemetry from the harness
    /// The rover's pose for this cycle, if one has been received yet.
    pub rov_pose: Option<Pose>,

    /// Current rover velocity in meters/second.
    pub rov_vel_ms: f64,

    /// True when the rover is touching a sample.
    pub near_sample: bool,

    /// True while a pickup is being executed.
    pub picking_up: bool,

    /// Total samples collected so far.
    pub samples_collected: u32,

    // Perception
    pub per_mgr: per::PerMgr,
    pub per_output: Option<per::PerOutput>,
    pub per_status_rpt: per::PerStatusReport,

    // NavCtrl
    pub nav_ctrl: nav_ctrl::NavCtrl,
    pub nav_ctrl_input: nav_ctrl::NavInput,
    pub nav_ctrl_output: DriveCmd,
    pub nav_ctrl_status_rpt: nav_ctrl::NavCtrlStatusReport,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl DataStore {
    /// Puts the rover into safe mode with the given cause.
    ///
    /// Safe mode forces the neutral braked command out of NavCtrl so that a
    /// failed cycle never propagates garbage to the actuation boundary.
    pub fn make_safe(&mut self, cause: SafeModeCause) {
        if !self.safe {
            warn!("Make safe requested, cause: {:?}", cause);
            self.safe = true;
            self.safe_cause = Some(cause);

            self.nav_ctrl_output = self.nav_ctrl.make_safe();
        }
    }

    /// Attempts to disable the safe mode by clearing the given cause.
    ///
    /// Returns `Ok(())` if this cause was cleared and safe mode was disabled,
    /// or `Err(())` otherwise. To remove safe mode the provided cause must
    /// match the initial reason for safe mode being enabled.
    ///
    /// If safe mode was not enabled `Ok(())` is returned
    pub fn make_unsafe(&mut self, cause: SafeModeCause) -> Result<(), ()> {
        if !self.safe {
            return Ok(());
        }

        match self.safe_cause {
            Some(root_cause) => {
                if cause == root_cause {
                    self.safe = false;
                    self.safe_cause = None;
                    Ok(())
                } else {
                    Err(())
                }
            }
            None => Ok(()),
        }
    }

    /// Perform actions required at the start of a cycle.
    ///
    /// Clears those items that need clearing at the start of a cycle, and
    /// sets the 1Hz cycle flag.
    pub fn cycle_start(&mut self, cycle_frequency_hz: f64) {
        self.is_1_hz_cycle = self.num_cycles % (cycle_frequency_hz as u128) == 0;

        self.per_output = None;
        self.nav_ctrl_input = nav_ctrl::NavInput::default();
        self.nav_ctrl_output = DriveCmd::default();
        self.nav_ctrl_status_rpt = nav_ctrl::NavCtrlStatusReport::default();
    }
}
