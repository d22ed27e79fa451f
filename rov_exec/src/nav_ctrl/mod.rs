//! # Navigation control module
//!
//! This module implements the decision state machine of the rover. It reads
//! the navigable-direction data produced by perception, together with the
//! harness telemetry (velocity, proximity flags, collected-sample count),
//! and produces the drive command for the cycle: throttle, brake, steering
//! angle and the target-pickup request.
//!
//! The state machine is broken down into a number of modes:
//!
//! - `Forward` - The rover is driving towards the mean navigable direction.
//! - `Stopped` - The rover is braking to a halt, or turning in place to
//!   search for a path.
//! - `Collecting` - The rover is steering towards a visible target sample.
//! - `Returning` - Reserved for returning samples to the start point. No
//!   transition produces this mode; it is a documented extension point only.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod cmd;
mod params;
mod state;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// Internal
pub use cmd::*;
pub use params::*;
pub use state::*;

// ------------------------------------------------------------------------------------------------
// ENUMERATIONS
// ------------------------------------------------------------------------------------------------

/// Possible errors that can occur during NavCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum NavCtrlError {
    #[error("Failed to load NavCtrl parameters: {0}")]
    ParamLoadError(util::params::LoadError),

    #[error("Invalid NavCtrl parameters: {0}")]
    InvalidParams(String),

    #[error("Failed to initialise the NavCtrl archives: {0}")]
    ArchiveInitError(String),
}
