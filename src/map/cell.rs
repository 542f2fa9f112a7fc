//! Cells and their LOD tile quadtrees.
//!
//! A cell owns the complete quadtree of its tiles as a flat array in
//! level order: index 0 is the root (coarsest) tile and the children of
//! node `i` start at `4i + 1`. Child lookup is pure index arithmetic and the
//! array owns every tile, so walking the tree allocates nothing.

use crate::{
    cache::{MeshSlot, TextureTicket, TqtId},
    map::chunk::Chunk,
    math::{quadtree_size, Aabbd},
};
use bevy::math::DVec3;

/// Per-frame visibility status of a tile.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DrawStatus {
    /// The tile's bounding box failed the frustum test.
    OutsideFrustum,
    /// Another level of the quadtree covers this tile's area.
    #[default]
    NotDrawn,
    /// The tile is part of the current cut and holds live resources.
    Drawn,
}

/// The morph a tile is currently participating in.
///
/// Geometry morphs run between a tile's own vertices and the surface of its
/// parent, driven by the tile's `current_t` phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Morph {
    #[default]
    None,
    /// A hand-off to the coarser level is in flight: the parent waits hidden
    /// while its drawn children blend onto the parent surface (phase 0 → 1).
    ToCoarser,
    /// This tile just took over from its parent and is relaxing from the
    /// parent surface onto its own geometry (phase 1 → 0).
    FromCoarser,
}

/// One node of a cell's LOD quadtree.
#[derive(Debug, Default)]
pub struct Tile {
    /// Index of this tile in the cell's tile array.
    pub id: u32,
    /// Row of this tile's NW vertex inside the cell.
    pub nw_row: u32,
    /// Column of this tile's NW vertex inside the cell.
    pub nw_col: u32,
    /// Level of detail, 0 is the coarsest.
    pub lod: u32,
    /// Width of this tile in vertex-grid units.
    pub width: u32,
    pub chunk: Chunk,
    /// World-space bounds, used for frustum culling and view distance.
    pub bbox: Aabbd,

    // transient per-frame state
    pub status: DrawStatus,
    pub morph: Morph,
    pub current_t: f32,
    pub mesh: Option<MeshSlot>,
    pub color: Option<TextureTicket>,
    pub normal: Option<TextureTicket>,
}

impl Tile {
    /// The texture-quadtree coordinates of this tile: its level plus the
    /// (row, column) of its area among the tiles of that level.
    pub fn tree_coords(&self) -> (u32, u32, u32) {
        (self.lod, self.nw_row / self.width, self.nw_col / self.width)
    }
}

/// One cell of the map grid, owning a complete tile quadtree plus optional
/// handles to the color and normal-map texture quadtrees that mirror it.
#[derive(Debug)]
pub struct Cell {
    /// Row of this cell in the map grid.
    pub row: u32,
    /// Column of this cell in the map grid.
    pub col: u32,
    /// Width of the cell in vertex-grid units.
    pub size: u32,
    /// Number of LOD levels; depth of the quadtree, 1..=9.
    pub depth: u32,
    /// The complete quadtree in level order.
    pub tiles: Vec<Tile>,
    pub color_tree: Option<TqtId>,
    pub normal_tree: Option<TqtId>,
}

/// Index of the NW child of quadtree node `id`; its siblings follow in
/// NW, NE, SW, SE order.
pub fn nw_child(id: usize) -> usize {
    4 * id + 1
}

impl Cell {
    /// Builds the cell from its level-ordered chunks, assigning tile
    /// identities and world-space bounds.
    ///
    /// `nw_corner` is the world position of the cell's NW corner at base
    /// elevation; `h_scale`/`v_scale` convert vertex-grid units into world
    /// units.
    pub fn assemble(
        row: u32,
        col: u32,
        size: u32,
        depth: u32,
        chunks: Vec<Chunk>,
        nw_corner: DVec3,
        h_scale: f32,
        v_scale: f32,
    ) -> Self {
        debug_assert_eq!(chunks.len(), quadtree_size(depth));

        let mut tiles: Vec<Tile> = chunks
            .into_iter()
            .map(|chunk| Tile {
                chunk,
                ..Default::default()
            })
            .collect();

        // walk the quadtree assigning identity, then derive bounds
        init_tile(&mut tiles, 0, 0, 0, 0, size, depth);

        for tile in &mut tiles {
            let h = h_scale as f64;
            let v = v_scale as f64;
            tile.bbox = Aabbd::new(
                nw_corner
                    + DVec3::new(
                        tile.nw_col as f64 * h,
                        tile.chunk.min_y as f64 * v,
                        tile.nw_row as f64 * h,
                    ),
                nw_corner
                    + DVec3::new(
                        (tile.nw_col + tile.width) as f64 * h,
                        tile.chunk.max_y as f64 * v,
                        (tile.nw_row + tile.width) as f64 * h,
                    ),
            );
        }

        Self {
            row,
            col,
            size,
            depth,
            tiles,
            color_tree: None,
            normal_tree: None,
        }
    }

    /// The four child indices of `id`, or `None` when the tile is a leaf.
    pub fn children(&self, id: usize) -> Option<[usize; 4]> {
        if self.tiles[id].lod + 1 < self.depth {
            let nw = nw_child(id);
            Some([nw, nw + 1, nw + 2, nw + 3])
        } else {
            None
        }
    }
}

fn init_tile(
    tiles: &mut [Tile],
    id: usize,
    row: u32,
    col: u32,
    lod: u32,
    width: u32,
    depth: u32,
) {
    let tile = &mut tiles[id];
    tile.id = id as u32;
    tile.nw_row = row;
    tile.nw_col = col;
    tile.lod = lod;
    tile.width = width;

    if lod + 1 < depth {
        let nw = nw_child(id);
        let half = width / 2;
        init_tile(tiles, nw, row, col, lod + 1, half, depth);
        init_tile(tiles, nw + 1, row, col + half, lod + 1, half, depth);
        init_tile(tiles, nw + 2, row + half, col, lod + 1, half, depth);
        init_tile(tiles, nw + 3, row + half, col + half, lod + 1, half, depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::chunk::Chunk;

    fn flat_chunks(depth: u32) -> Vec<Chunk> {
        (0..quadtree_size(depth))
            .map(|_| Chunk {
                min_y: 0,
                max_y: 100,
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn level_order_identity() {
        let cell = Cell::assemble(0, 0, 64, 3, flat_chunks(3), DVec3::ZERO, 1.0, 1.0);
        assert_eq!(cell.tiles.len(), 21);

        let root = &cell.tiles[0];
        assert_eq!((root.lod, root.nw_row, root.nw_col, root.width), (0, 0, 0, 64));

        // children of the root cover its quadrants in NW, NE, SW, SE order
        let [nw, ne, sw, se] = cell.children(0).unwrap();
        assert_eq!((cell.tiles[nw].nw_row, cell.tiles[nw].nw_col), (0, 0));
        assert_eq!((cell.tiles[ne].nw_row, cell.tiles[ne].nw_col), (0, 32));
        assert_eq!((cell.tiles[sw].nw_row, cell.tiles[sw].nw_col), (32, 0));
        assert_eq!((cell.tiles[se].nw_row, cell.tiles[se].nw_col), (32, 32));

        // the deepest level is all leaves
        for id in 5..21 {
            assert_eq!(cell.tiles[id].lod, 2);
            assert!(cell.children(id).is_none());
        }
    }

    #[test]
    fn tree_coords_follow_the_quadtree() {
        let cell = Cell::assemble(0, 0, 64, 3, flat_chunks(3), DVec3::ZERO, 1.0, 1.0);
        assert_eq!(cell.tiles[0].tree_coords(), (0, 0, 0));

        let [_, ne, _, se] = cell.children(0).unwrap();
        assert_eq!(cell.tiles[ne].tree_coords(), (1, 0, 1));
        assert_eq!(cell.tiles[se].tree_coords(), (1, 1, 1));

        // SE child of the SE child sits at the far corner of level 2
        let [.., se2] = cell.children(se).unwrap();
        assert_eq!(cell.tiles[se2].tree_coords(), (2, 3, 3));
    }

    #[test]
    fn bounds_are_in_world_units() {
        let origin = DVec3::new(1000.0, 10.0, 2000.0);
        let cell = Cell::assemble(1, 2, 64, 2, flat_chunks(2), origin, 2.0, 0.5);

        let root = &cell.tiles[0];
        assert_eq!(root.bbox.min, origin + DVec3::new(0.0, 0.0, 0.0));
        assert_eq!(root.bbox.max, origin + DVec3::new(128.0, 50.0, 128.0));

        let [_, _, sw, _] = cell.children(0).unwrap();
        let sw = &cell.tiles[sw];
        assert_eq!(sw.bbox.min, origin + DVec3::new(0.0, 0.0, 64.0));
        assert_eq!(sw.bbox.max, origin + DVec3::new(64.0, 50.0, 128.0));
    }
}
