//! Parameters structure for NavCtrl

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Parameters for navigation control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavCtrlParams {
    // ---- TERRAIN THRESHOLDS ----

    /// Minimum number of navigable polar points for the rover to keep
    /// driving while in Forward mode. Below this the rover stops.
    pub stop_forward: usize,

    /// Minimum number of navigable polar points for the rover to resume
    /// driving from Stopped mode. Deliberately higher than `stop_forward`
    /// so the rover does not oscillate at the boundary.
    pub go_forward: usize,

    // ---- ACTUATION ----

    /// Throttle set-point applied while accelerating.
    ///
    /// Units: normalised
    pub throttle_set: f64,

    /// Brake set-point applied while stopping.
    ///
    /// Units: normalised
    pub brake_set: f64,

    /// Velocity above which the throttle is released to coast.
    ///
    /// Units: meters/second
    pub max_vel: f64,

    /// Velocity below which the rover is considered to have physically
    /// stopped while in Stopped mode.
    ///
    /// Units: meters/second
    pub stopped_vel_thresh: f64,

    // ---- STEERING ----

    /// Symmetric limit on the steering angle command.
    ///
    /// Units: degrees
    pub steer_limit_deg: f64,

    /// Fixed steering angle held during the in-place search turn.
    ///
    /// Units: degrees
    pub search_steer_deg: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl NavCtrlParams {
    /// Check the parameters are usable, returning a description of the
    /// first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.throttle_set < 0.0 {
            return Err(format!("throttle_set must be non-negative, got {}", self.throttle_set));
        }
        if self.brake_set < 0.0 {
            return Err(format!("brake_set must be non-negative, got {}", self.brake_set));
        }
        if self.max_vel <= 0.0 {
            return Err(format!("max_vel must be positive, got {}", self.max_vel));
        }
        if self.steer_limit_deg <= 0.0 {
            return Err(format!(
                "steer_limit_deg must be positive, got {}",
                self.steer_limit_deg
            ));
        }
        if self.search_steer_deg.abs() > self.steer_limit_deg {
            return Err(format!(
                "search_steer_deg ({}) exceeds steer_limit_deg ({})",
                self.search_steer_deg, self.steer_limit_deg
            ));
        }

        Ok(())
    }
}

impl Default for NavCtrlParams {
    fn default() -> Self {
        Self {
            stop_forward: 50,
            go_forward: 500,
            throttle_set: 0.2,
            brake_set: 10.0,
            max_vel: 2.0,
            stopped_vel_thresh: 0.2,
            steer_limit_deg: 15.0,
            search_steer_deg: -15.0,
        }
    }
}
