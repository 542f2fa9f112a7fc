//! Packed mesh data for one tile of the LOD quadtree.

use bytemuck::{Pod, Zeroable};

/// The index value that restarts a triangle strip.
pub const STRIP_RESTART_INDEX: u16 = 0xffff;

/// One packed terrain vertex.
///
/// `x` and `z` are offsets from the cell's NW corner in horizontal-scale
/// units, `y` is the elevation in vertical-scale units, and `morph_delta` is
/// the `y` offset that would place this vertex on the surface of the parent
/// (next-coarser) tile. All four lanes are scaled in the vertex shader, the
/// last one by the tile's current morph phase.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct TerrainVertex {
    pub x: i16,
    pub y: i16,
    pub z: i16,
    pub morph_delta: i16,
}

/// The mesh chunk of one tile: a packed vertex array and a triangle-strip
/// index array (with 0xffff restarts), plus the recorded maximum geometric
/// error of this approximation in world units.
#[derive(Clone, Debug, Default)]
pub struct Chunk {
    pub max_error: f32,
    pub min_y: i16,
    pub max_y: i16,
    pub vertices: Vec<TerrainVertex>,
    pub indices: Vec<u16>,
}

impl Chunk {
    /// Raw bytes of the vertex array, as uploaded to the mesh buffer.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }
}
