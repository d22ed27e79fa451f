//! Drive commands produced by NavCtrl

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Serialize;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// The actuation command for one cycle, consumed by the harness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DriveCmd {
    /// Throttle demand.
    ///
    /// Units: normalised, non-negative
    pub throttle: f64,

    /// Brake demand.
    ///
    /// Units: normalised, non-negative
    pub brake: f64,

    /// Steering angle demand. When the rover is stationary a non-zero value
    /// commands a 4-wheel point turn rather than a drive manouvre.
    ///
    /// Units: degrees, positive left
    pub steer_deg: f64,

    /// One-shot request for the harness to perform a target pickup.
    pub pickup_request: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl DriveCmd {
    /// The neutral safe command: no throttle, no steer, brake engaged.
    ///
    /// This is the output of a failed cycle - the safe state at the
    /// actuation boundary is a braked, stationary rover.
    pub fn safe(brake_set: f64) -> Self {
        Self {
            throttle: 0.0,
            brake: brake_set,
            steer_deg: 0.0,
            pickup_request: false,
        }
    }
}
