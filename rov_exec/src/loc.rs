//! # Localisation module
//!
//! Pose types for the rover. The pose is supplied once per cycle by the
//! external harness (simulator or robot telemetry), the core never estimates
//! it itself.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The current pose (position and attitude in the world frame) of the rover.
///
/// The world frame is the fixed global grid the world map accumulates into,
/// with x east and y north. Attitude angles are supplied by the harness in
/// degrees; pitch and roll are carried for completeness but are not used by
/// the reference perception pipeline.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub struct Pose {
    /// The position in the world frame.
    ///
    /// Units: world map cells (fractional)
    pub pos: Point2<f64>,

    /// Heading about the world frame vertical axis, 0 along world x,
    /// positive anticlockwise.
    ///
    /// Units: degrees
    pub yaw_deg: f64,

    /// Pitch of the rover body.
    ///
    /// Units: degrees
    pub pitch_deg: f64,

    /// Roll of the rover body.
    ///
    /// Units: degrees
    pub roll_deg: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Pose {
    /// Return the heading of the rover in radians.
    pub fn yaw_rad(&self) -> f64 {
        self.yaw_deg.to_radians()
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            pos: Point2::origin(),
            yaw_deg: 0.0,
            pitch_deg: 0.0,
            roll_deg: 0.0,
        }
    }
}
