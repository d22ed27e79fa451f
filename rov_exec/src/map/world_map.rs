//! # World Map
//!
//! [`WorldMap`] is a layered square grid inspired by
//! [grid_map](https://github.com/ANYbotics/grid_map) by ANYbotics: a single
//! 3D array indexed by (y cell, x cell, layer). Each cell holds an integer
//! confidence in [0, 255] per layer. Updates are additive and clipped, so
//! cell values are monotonically non-decreasing over a run, with one
//! exception: a detected target centre is force-set to full intensity in all
//! layers as a distinct marker.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use ndarray::{Array1, Array3, ArrayView2, s};
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of layers in the map.
pub const NUM_LAYERS: usize = 3;

/// The value a cell is force-set to when marked as a target centre.
const TARGET_MARKER_VALUE: u8 = u8::MAX;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The persistent world-frame occupancy map.
///
/// Created once at startup and mutated every cycle, never cleared during a
/// run. Persistence of the map to disk is the harness's concern, hence the
/// serde derives on the raw grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldMap {
    /// Number of cells along each axis of the (square) map
    world_size: usize,

    /// Raw map data, dimension order y cell, x cell, layer
    data: Array3<u8>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Layers of the world map.
///
/// The layer order matches the channel order of the rendered map image:
/// obstacle confidence in red, target markers in green, navigable confidence
/// in blue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorldMapLayer {
    /// Confidence that the cell contains an obstacle
    Obstacle,

    /// Marker layer for detected target samples
    Target,

    /// Confidence that the cell is navigable terrain
    Navigable,
}

/// Possible errors associated with the world map.
#[derive(Debug, thiserror::Error)]
pub enum WorldMapError {
    #[error("World map size must be non-zero")]
    ZeroSize,

    #[error("Coordinate arrays have mismatched lengths ({0} x values, {1} y values)")]
    MismatchedCoords(usize, usize),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl WorldMapLayer {
    /// Index of this layer into the data array.
    pub fn index(&self) -> usize {
        match self {
            WorldMapLayer::Obstacle => 0,
            WorldMapLayer::Target => 1,
            WorldMapLayer::Navigable => 2,
        }
    }
}

impl WorldMap {
    /// Create a new empty map of `world_size` x `world_size` cells.
    pub fn new(world_size: usize) -> Result<Self, WorldMapError> {
        if world_size == 0 {
            return Err(WorldMapError::ZeroSize);
        }

        Ok(Self {
            world_size,
            data: Array3::zeros((world_size, world_size, NUM_LAYERS)),
        })
    }

    /// Number of cells along each axis of the map.
    pub fn world_size(&self) -> usize {
        self.world_size
    }

    /// Accumulate evidence into the given layer.
    ///
    /// Each (x, y) cell listed in the coordinate arrays has `increment` added
    /// to its confidence, clipped to the top of the range. Coordinates are
    /// expected to be already clipped into the map, which the conversion in
    /// [`crate::per::transform::to_world`] guarantees.
    pub fn accumulate(
        &mut self,
        layer: WorldMapLayer,
        x_world: &Array1<usize>,
        y_world: &Array1<usize>,
        increment: u8,
    ) -> Result<(), WorldMapError> {
        if x_world.len() != y_world.len() {
            return Err(WorldMapError::MismatchedCoords(x_world.len(), y_world.len()));
        }

        let layer_idx = layer.index();

        for (x, y) in x_world.iter().zip(y_world.iter()) {
            let cell = &mut self.data[[*y, *x, layer_idx]];
            *cell = cell.saturating_add(increment);
        }

        Ok(())
    }

    /// Force-set all layers of a single cell to full intensity, marking a
    /// detected target centre.
    ///
    /// This is a distinct marker value, not an additive update: a noisy
    /// cluster of target-coloured pixels is deliberately collapsed to one
    /// map location for later goal-seeking.
    pub fn mark_target(&mut self, x_world: usize, y_world: usize) {
        self.data
            .slice_mut(s![y_world, x_world, ..])
            .fill(TARGET_MARKER_VALUE);
    }

    /// View of a single layer as a 2D (y, x) array.
    pub fn layer_view(&self, layer: WorldMapLayer) -> ArrayView2<u8> {
        self.data.slice(s![.., .., layer.index()])
    }

    /// The raw (y, x, layer) grid.
    pub fn grid(&self) -> &Array3<u8> {
        &self.data
    }

    /// Number of cells with any non-zero confidence in the given layer.
    pub fn count_nonzero(&self, layer: WorldMapLayer) -> usize {
        self.layer_view(layer).iter().filter(|&&v| v > 0).count()
    }
}

impl Default for WorldMap {
    /// An empty zero-size map, only useful as a placeholder before `init`.
    fn default() -> Self {
        Self {
            world_size: 0,
            data: Array3::zeros((0, 0, NUM_LAYERS)),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn test_zero_size_rejected() {
        assert!(matches!(WorldMap::new(0), Err(WorldMapError::ZeroSize)));
    }

    #[test]
    fn test_accumulate_clips_at_max() {
        let mut map = WorldMap::new(10).unwrap();

        let xs = arr1(&[3usize]);
        let ys = arr1(&[7usize]);

        // 5 * 100 would overflow well past 255 without clipping
        for _ in 0..5 {
            map.accumulate(WorldMapLayer::Obstacle, &xs, &ys, 100).unwrap();
        }

        assert_eq!(map.layer_view(WorldMapLayer::Obstacle)[[7, 3]], 255);

        // Other layers untouched
        assert_eq!(map.layer_view(WorldMapLayer::Navigable)[[7, 3]], 0);
        assert_eq!(map.layer_view(WorldMapLayer::Target)[[7, 3]], 0);
    }

    #[test]
    fn test_accumulate_is_monotonic() {
        let mut map = WorldMap::new(10).unwrap();

        let xs = arr1(&[1usize, 2, 3]);
        let ys = arr1(&[1usize, 1, 1]);

        let mut last = 0u8;
        for _ in 0..10 {
            map.accumulate(WorldMapLayer::Navigable, &xs, &ys, 50).unwrap();
            let v = map.layer_view(WorldMapLayer::Navigable)[[1, 2]];
            assert!(v >= last);
            last = v;
        }
    }

    #[test]
    fn test_mark_target_sets_all_layers() {
        let mut map = WorldMap::new(10).unwrap();

        map.mark_target(4, 9);

        assert_eq!(map.layer_view(WorldMapLayer::Obstacle)[[9, 4]], 255);
        assert_eq!(map.layer_view(WorldMapLayer::Target)[[9, 4]], 255);
        assert_eq!(map.layer_view(WorldMapLayer::Navigable)[[9, 4]], 255);
    }

    #[test]
    fn test_mismatched_coords_rejected() {
        let mut map = WorldMap::new(10).unwrap();

        let xs = arr1(&[1usize, 2]);
        let ys = arr1(&[1usize]);

        assert!(matches!(
            map.accumulate(WorldMapLayer::Obstacle, &xs, &ys, 100),
            Err(WorldMapError::MismatchedCoords(2, 1))
        ));
    }
}
