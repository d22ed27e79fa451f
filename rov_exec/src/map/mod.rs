//! # Map
//!
//! This module implements the [`WorldMap`] type, the persistent world-frame
//! occupancy map of the rover. The map is a fixed square grid of per-class
//! confidence counters, accumulated from classified camera pixels every
//! cycle and never decayed.

// ------------------------------------------------------------------------------------------------
// MODS
// ------------------------------------------------------------------------------------------------

/// Implements the [`WorldMap`] type
mod world_map;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use world_map::{WorldMap, WorldMapError, WorldMapLayer};
