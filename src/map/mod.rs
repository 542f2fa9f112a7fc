//! The heightfield map data model: map metadata, the cell grid, and the
//! per-cell LOD tile quadtrees.

pub mod cell;
pub mod chunk;
mod loader;

pub use cell::{nw_child, Cell, DrawStatus, Morph, Tile};
pub use chunk::{Chunk, TerrainVertex, STRIP_RESTART_INDEX};
pub use loader::load_map;

use bevy::{math::DVec3, prelude::*};

/// Exponential fog parameters, present when the map declares a fog color.
#[derive(Clone, Copy, Debug, Default)]
pub struct Fog {
    pub color: Vec3,
    pub density: f32,
}

/// A loaded heightfield map. Immutable after load, apart from the transient
/// per-frame state of its tiles.
#[derive(Debug, Resource)]
pub struct Map {
    pub name: String,
    /// Horizontal world units per vertex-grid unit.
    pub h_scale: f32,
    /// Vertical world units per elevation unit.
    pub v_scale: f32,
    pub base_elev: f32,
    pub min_elev: f32,
    pub max_elev: f32,
    pub min_sky: f32,
    pub max_sky: f32,
    /// Map extent in vertex-grid units.
    pub width: u32,
    pub height: u32,
    /// Cell extent in vertex-grid units; a power of two dividing both map
    /// extents.
    pub cell_size: u32,
    pub n_rows: u32,
    pub n_cols: u32,
    pub has_color: bool,
    pub has_normals: bool,
    pub has_water: bool,
    pub sun_dir: Vec3,
    pub sun_intensity: Vec3,
    pub ambient: Vec3,
    pub fog: Option<Fog>,
    /// The cell grid in row-major order, north row first.
    pub cells: Vec<Cell>,
}

impl Map {
    pub fn n_cells(&self) -> usize {
        (self.n_rows * self.n_cols) as usize
    }

    fn cell_index(&self, row: u32, col: u32) -> usize {
        debug_assert!(row < self.n_rows && col < self.n_cols);
        (row * self.n_cols + col) as usize
    }

    pub fn cell(&self, row: u32, col: u32) -> &Cell {
        &self.cells[self.cell_index(row, col)]
    }

    pub fn cell_mut(&mut self, row: u32, col: u32) -> &mut Cell {
        let index = self.cell_index(row, col);
        &mut self.cells[index]
    }

    /// World position of the NW corner of cell `(row, col)` at base
    /// elevation.
    pub fn nw_cell_corner(&self, row: u32, col: u32) -> DVec3 {
        let span = self.cell_size as f64 * self.h_scale as f64;
        DVec3::new(
            col as f64 * span,
            self.base_elev as f64,
            row as f64 * span,
        )
    }
}
