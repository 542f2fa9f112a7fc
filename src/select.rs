//! Per-frame LOD selection and the geometry-morph state machine.
//!
//! Each frame, [`select_cell`] walks a cell's quadtree and decides for every
//! tile whether to draw it, descend into its children, or keep a morph in
//! flight, acquiring and releasing cache slots as the cut moves.
//! [`draw_cell`] then consumes the resulting cut, advances the morph phases,
//! and emits the frame's draw calls. Selection must complete for every cell
//! before any cell is drawn, so evictions triggered while selecting one cell
//! cannot reclaim a slot another cell still needs this frame.
//!
//! Morphs run over [`MORPH_TIME`] wall-clock seconds. A hand-off to the
//! coarser level keeps the parent hidden (`NotDrawn`, still holding its
//! resources) while its four drawn children blend onto the parent surface
//! (phase 0 → 1); each child releases itself on completion and the parent
//! promotes back to `Drawn` once all four are done. A hand-off to the finer
//! level releases the parent immediately and starts the children on the
//! parent surface (phase 1 → 0).

use crate::{
    cache::{MeshPool, MeshSlot, TextureCache, TextureKey, TextureSlot},
    camera::CameraState,
    frustum::Frustum,
    map::{Cell, DrawStatus, Morph},
};
use bevy::math::Vec4;

/// Duration of a geometry morph in seconds.
pub const MORPH_TIME: f32 = 2.5;

/// How a tile is being visited by the selection recursion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visit {
    /// Still searching for the tile to draw on this path.
    Search,
    /// An ancestor is drawn; everything below releases its resources.
    Found,
    /// An ancestor is outside the frustum; release and mark accordingly.
    OutsideFrustum,
    /// The parent was just released as too coarse; this subtree takes over
    /// with a morph from the parent surface.
    MorphDown,
    /// The parent is starting a hand-off to itself and needs exactly this
    /// tile drawn, regardless of the frustum and error tests.
    MorphUp,
}

/// Immutable view state plus the caches the selection pass draws slots from.
pub struct SelectParams<'a> {
    pub camera: &'a CameraState,
    pub frustum: &'a Frustum,
    /// Screen-space error tolerance in pixels.
    pub error_limit: f32,
    pub meshes: &'a mut MeshPool,
    pub textures: &'a mut TextureCache,
}

/// One draw call of the frame, in traversal order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawCall {
    pub cell: u32,
    pub tile: u32,
    pub mesh: MeshSlot,
    pub lod: u32,
    /// Per-axis vertex scale `(h, v, h, v * morph_phase)`; the w lane weighs
    /// each vertex's morph delta.
    pub scaling: Vec4,
    pub tile_width: u32,
    pub nw_row: u32,
    pub nw_col: u32,
    pub color: Option<TextureSlot>,
    pub normal: Option<TextureSlot>,
}

/// Frame timing and scales for the draw pass, plus the draw-call sink.
pub struct DrawParams<'a> {
    pub dt: f32,
    pub h_scale: f32,
    pub v_scale: f32,
    pub meshes: &'a mut MeshPool,
    pub textures: &'a mut TextureCache,
    pub out: &'a mut Vec<DrawCall>,
}

/// Runs the selection pass on a cell, starting at its root tile.
pub fn select_cell(cell: &mut Cell, cell_index: u32, p: &mut SelectParams) {
    tile_set(cell, cell_index, 0, Visit::Search, p);
}

/// Runs the draw pass on a cell, appending its draw calls in traversal
/// order.
pub fn draw_cell(cell: &mut Cell, cell_index: u32, p: &mut DrawParams) {
    draw_chunks(cell, cell_index, 0, p);
}

/// Acquires a mesh slot and the texture-quadtree nodes for a tile, schedules
/// the chunk upload, and marks the tile drawn.
fn acquire(cell: &mut Cell, cell_index: u32, id: usize, p: &mut SelectParams) {
    debug_assert!(cell.tiles[id].mesh.is_none(), "tile {id} acquired twice");

    let (level, row, col) = cell.tiles[id].tree_coords();
    let slot = p.meshes.acquire();
    p.meshes.load(slot, cell_index, id as u32);

    let color = cell.color_tree.map(|tree| {
        p.textures.acquire(TextureKey {
            tree,
            level,
            row,
            col,
        })
    });
    let normal = cell.normal_tree.map(|tree| {
        p.textures.acquire(TextureKey {
            tree,
            level,
            row,
            col,
        })
    });

    let tile = &mut cell.tiles[id];
    tile.mesh = Some(slot);
    tile.color = color;
    tile.normal = normal;
    tile.status = DrawStatus::Drawn;
}

/// Returns a tile's resources and resets its morph state.
fn release(
    cell: &mut Cell,
    id: usize,
    status: DrawStatus,
    meshes: &mut MeshPool,
    textures: &mut TextureCache,
) {
    let tile = &mut cell.tiles[id];
    tile.morph = Morph::None;
    tile.status = status;
    tile.current_t = 0.0;

    if let Some(slot) = tile.mesh.take() {
        meshes.release(slot);
    }
    if let Some(ticket) = tile.color.take() {
        textures.release(ticket);
    }
    if let Some(ticket) = tile.normal.take() {
        textures.release(ticket);
    }
}

/// Cancels any in-flight hand-off to the coarser level below this tile,
/// releasing the children that were blending out.
fn abort_morph_up(cell: &mut Cell, id: usize, p: &mut SelectParams) {
    let Some(children) = cell.children(id) else {
        return;
    };

    for child in children {
        if cell.tiles[child].morph == Morph::ToCoarser {
            release(cell, child, DrawStatus::NotDrawn, p.meshes, p.textures);
        }
    }
    for child in children {
        abort_morph_up(cell, child, p);
    }
}

fn tile_set(cell: &mut Cell, cell_index: u32, id: usize, visit: Visit, p: &mut SelectParams) {
    match visit {
        Visit::Search | Visit::MorphDown => {
            if !p.frustum.intersects_aabb(&cell.tiles[id].bbox) {
                outside_frustum(cell, cell_index, id, p);
                return;
            }

            let accurate = {
                let tile = &cell.tiles[id];
                let dist = tile.bbox.distance_to_point(p.camera.position());
                p.camera.screen_error(dist, tile.chunk.max_error) <= p.error_limit
            };

            if accurate {
                let needs_acquire = {
                    let tile = &cell.tiles[id];
                    tile.status != DrawStatus::Drawn && tile.morph != Morph::ToCoarser
                };
                if needs_acquire {
                    acquire(cell, cell_index, id, p);

                    // A finer level covered this area until now; arm the
                    // children and hand the area back to this tile.
                    if visit == Visit::Search && cell.tiles[id].morph == Morph::None {
                        if let Some(children) = cell.children(id) {
                            for child in children {
                                match cell.tiles[child].morph {
                                    Morph::None => {
                                        if cell.tiles[child].status != DrawStatus::Drawn {
                                            tile_set(cell, cell_index, child, Visit::MorphUp, p);
                                        }
                                        cell.tiles[child].morph = Morph::ToCoarser;
                                        cell.tiles[id].morph = Morph::ToCoarser;
                                        cell.tiles[id].status = DrawStatus::NotDrawn;
                                    }
                                    Morph::ToCoarser => {
                                        // the child is mid hand-off from its
                                        // own children; snap it back to drawn
                                        abort_morph_up(cell, child, p);
                                        cell.tiles[child].current_t = 0.0;
                                        cell.tiles[child].status = DrawStatus::Drawn;
                                    }
                                    Morph::FromCoarser => {}
                                }
                            }
                            return;
                        }
                    }
                }

                if visit == Visit::MorphDown {
                    let tile = &mut cell.tiles[id];
                    tile.status = DrawStatus::Drawn;
                    tile.current_t = 1.0;
                    tile.morph = Morph::FromCoarser;
                }

                // this tile covers its area; free everything beneath it
                if let Some(children) = cell.children(id) {
                    for child in children {
                        tile_set(cell, cell_index, child, Visit::Found, p);
                    }
                }
            } else {
                match cell.children(id) {
                    None => {
                        // deepest level; draw it regardless of the error
                        if cell.tiles[id].status != DrawStatus::Drawn {
                            acquire(cell, cell_index, id, p);
                        }
                    }
                    Some(children) => {
                        if cell.tiles[id].status == DrawStatus::Drawn {
                            // the drawn tile is too coarse now; hand its area
                            // to the children with a morph from its surface
                            release(cell, id, DrawStatus::NotDrawn, p.meshes, p.textures);
                            for child in children {
                                tile_set(cell, cell_index, child, Visit::MorphDown, p);
                            }
                        } else if cell.tiles[id].morph == Morph::ToCoarser {
                            // a hand-off to this tile is in flight, but the
                            // view moved back in; cancel it and re-arm the
                            // finer level
                            abort_morph_up(cell, id, p);
                            release(cell, id, DrawStatus::NotDrawn, p.meshes, p.textures);
                            for child in children {
                                tile_set(cell, cell_index, child, Visit::MorphUp, p);
                            }
                        } else {
                            cell.tiles[id].status = DrawStatus::NotDrawn;
                            for child in children {
                                tile_set(cell, cell_index, child, Visit::Search, p);
                            }
                        }
                    }
                }
            }
        }

        Visit::Found => {
            // a tile blending out is still needed by its parent's hand-off
            if cell.tiles[id].morph == Morph::ToCoarser {
                return;
            }

            if cell.tiles[id].status == DrawStatus::Drawn {
                release(cell, id, DrawStatus::NotDrawn, p.meshes, p.textures);
            }
            cell.tiles[id].status = DrawStatus::NotDrawn;

            if let Some(children) = cell.children(id) {
                for child in children {
                    tile_set(cell, cell_index, child, Visit::Found, p);
                }
            }
        }

        Visit::OutsideFrustum => {
            if cell.tiles[id].morph != Morph::ToCoarser {
                if cell.tiles[id].status == DrawStatus::Drawn {
                    release(cell, id, DrawStatus::OutsideFrustum, p.meshes, p.textures);
                }
                cell.tiles[id].status = DrawStatus::OutsideFrustum;
            }

            if let Some(children) = cell.children(id) {
                for child in children {
                    tile_set(cell, cell_index, child, Visit::OutsideFrustum, p);
                }
            }
        }

        Visit::MorphUp => {
            // the caller is arming exactly this tile; no recursion
            acquire(cell, cell_index, id, p);
        }
    }
}

/// The tile failed the frustum test while being searched.
fn outside_frustum(cell: &mut Cell, cell_index: u32, id: usize, p: &mut SelectParams) {
    {
        let tile = &cell.tiles[id];
        if tile.status == DrawStatus::Drawn && tile.morph != Morph::ToCoarser {
            release(cell, id, DrawStatus::OutsideFrustum, p.meshes, p.textures);
        }
    }

    if cell.tiles[id].status == DrawStatus::NotDrawn {
        if let Some(children) = cell.children(id) {
            for child in children {
                tile_set(cell, cell_index, child, Visit::OutsideFrustum, p);
            }
        }

        // a tile waiting on its hand-off keeps its state until the morph ends
        if cell.tiles[id].morph != Morph::ToCoarser {
            cell.tiles[id].status = DrawStatus::OutsideFrustum;
        }
    }
}

fn draw_chunks(cell: &mut Cell, cell_index: u32, id: usize, p: &mut DrawParams) {
    let status = cell.tiles[id].status;

    if status == DrawStatus::Drawn {
        draw(cell, cell_index, id, p);
    } else if status == DrawStatus::NotDrawn {
        if let Some(children) = cell.children(id) {
            for child in children {
                draw_chunks(cell, cell_index, child, p);
            }
        }
    }

    // hand-off completion: once all four children have finished blending
    // out, the hidden parent takes over and draws immediately
    if status == DrawStatus::NotDrawn && cell.tiles[id].morph == Morph::ToCoarser {
        if let Some(children) = cell.children(id) {
            if children
                .iter()
                .all(|&child| cell.tiles[child].morph == Morph::None)
            {
                cell.tiles[id].morph = Morph::None;
                cell.tiles[id].status = DrawStatus::Drawn;
                draw(cell, cell_index, id, p);
            }
        }
    }
}

/// Advances a drawn tile's morph phase and emits its draw call.
fn draw(cell: &mut Cell, cell_index: u32, id: usize, p: &mut DrawParams) {
    match cell.tiles[id].morph {
        Morph::FromCoarser => {
            let tile = &mut cell.tiles[id];
            tile.current_t -= p.dt / MORPH_TIME;
            if tile.current_t <= 0.0 {
                tile.morph = Morph::None;
                tile.current_t = 0.0;
            }
        }
        Morph::ToCoarser => {
            let tile = &mut cell.tiles[id];
            tile.current_t += p.dt / MORPH_TIME;
            if tile.current_t >= 1.0 {
                // fully blended onto the parent surface; the parent takes
                // over when all its children have finished
                release(cell, id, DrawStatus::NotDrawn, p.meshes, p.textures);
                return;
            }
        }
        Morph::None => {}
    }

    let tile = &cell.tiles[id];
    let mesh = tile.mesh.expect("drawing a tile without a mesh slot");
    p.out.push(DrawCall {
        cell: cell_index,
        tile: id as u32,
        mesh,
        lod: tile.lod,
        scaling: Vec4::new(
            p.h_scale,
            p.v_scale,
            p.h_scale,
            p.v_scale * tile.current_t,
        ),
        tile_width: tile.width,
        nw_row: tile.nw_row,
        nw_col: tile.nw_col,
        color: tile.color.map(|t| t.slot),
        normal: tile.normal.map(|t| t.slot),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::MeshUpload,
        map::{chunk::Chunk, Cell, Tile},
    };
    use bevy::math::DVec3;

    /// A single test cell (size 64, flat, unit scales) under an overhead
    /// camera. Chunk errors halve per level: 8, 4, 2, ... so the cut depth
    /// is steered with the camera altitude and the error limit.
    struct Rig {
        cell: Cell,
        camera: CameraState,
        frustum: Frustum,
        meshes: MeshPool,
        textures: TextureCache,
        error_limit: f32,
    }

    impl Rig {
        fn new(depth: u32, error_limit: f32, altitude: f64) -> Self {
            let mut chunks = Vec::new();
            for lod in 0..depth {
                for _ in 0..1usize << (2 * lod) {
                    chunks.push(Chunk {
                        max_error: 8.0 / (1 << lod) as f32,
                        ..Default::default()
                    });
                }
            }
            let cell = Cell::assemble(0, 0, 64, depth, chunks, DVec3::ZERO, 1.0, 1.0);

            let mut camera = CameraState::default();
            camera.set_fov(90.0);
            camera.set_viewport(1000, 1000);
            camera.set_near_far(1.0, 10000.0);

            let mut rig = Self {
                cell,
                camera,
                frustum: Frustum::default(),
                meshes: MeshPool::new(64),
                textures: TextureCache::new(64),
                error_limit,
            };
            rig.overhead(altitude);
            rig
        }

        /// Puts the camera straight above the cell center.
        fn overhead(&mut self, altitude: f64) {
            let center = DVec3::new(32.0, 0.0, 32.0);
            self.camera.move_to(
                center + DVec3::new(0.0, altitude, 0.0),
                center,
                DVec3::new(0.0, 0.0, -1.0),
            );
            self.frustum.update(&self.camera, 0.0);
        }

        /// Runs one frame: selection, then the draw pass. Returns the drained
        /// upload journal and the frame's draw calls.
        fn frame(&mut self, dt: f32) -> (Vec<MeshUpload>, Vec<DrawCall>) {
            select_cell(
                &mut self.cell,
                0,
                &mut SelectParams {
                    camera: &self.camera,
                    frustum: &self.frustum,
                    error_limit: self.error_limit,
                    meshes: &mut self.meshes,
                    textures: &mut self.textures,
                },
            );
            self.check_invariants();

            let mut calls = Vec::new();
            draw_cell(
                &mut self.cell,
                0,
                &mut DrawParams {
                    dt,
                    h_scale: 1.0,
                    v_scale: 1.0,
                    meshes: &mut self.meshes,
                    textures: &mut self.textures,
                    out: &mut calls,
                },
            );
            self.check_invariants();

            (std::mem::take(&mut self.meshes.uploads), calls)
        }

        /// Runs enough short frames to settle any in-flight morph.
        fn settle(&mut self) {
            for _ in 0..30 {
                self.frame(0.1);
            }
        }

        fn tile(&self, id: usize) -> &Tile {
            &self.cell.tiles[id]
        }

        fn drawn(&self) -> Vec<usize> {
            (0..self.cell.tiles.len())
                .filter(|&id| self.tile(id).status == DrawStatus::Drawn)
                .collect()
        }

        /// The antichain-with-morph and resource-balance frame invariants.
        fn check_invariants(&self) {
            let held = self
                .cell
                .tiles
                .iter()
                .filter(|tile| tile.mesh.is_some())
                .count();
            assert_eq!(held, self.meshes.in_use(), "mesh slots leaked");

            for (id, tile) in self.cell.tiles.iter().enumerate() {
                // only drawn tiles and parents waiting on a hand-off hold
                // resources
                let holder = tile.status == DrawStatus::Drawn
                    || (tile.status == DrawStatus::NotDrawn && tile.morph == Morph::ToCoarser);
                assert_eq!(tile.mesh.is_some(), holder, "tile {id} holds wrongly");

                // settled drawn tiles form an antichain
                if tile.status == DrawStatus::Drawn && tile.morph == Morph::None {
                    let mut cursor = id;
                    while cursor > 0 {
                        cursor = (cursor - 1) / 4;
                        let ancestor = &self.cell.tiles[cursor];
                        assert!(
                            !(ancestor.status == DrawStatus::Drawn
                                && ancestor.morph == Morph::None),
                            "tile {id} and ancestor {cursor} both drawn"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn startup_settles_on_the_root_alone() {
        let mut rig = Rig::new(2, 1000.0, 100.0);

        // the first frame arms the children for the initial hand-off: the
        // root holds its slot hidden while the children blend onto it
        let (uploads, calls) = rig.frame(0.1);
        assert_eq!(uploads.len(), 5);
        assert_eq!(rig.meshes.in_use(), 5);
        assert_eq!(rig.tile(0).status, DrawStatus::NotDrawn);
        assert_eq!(rig.tile(0).morph, Morph::ToCoarser);
        assert_eq!(calls.len(), 4);
        for id in 1..5 {
            assert_eq!(rig.tile(id).status, DrawStatus::Drawn);
            assert_eq!(rig.tile(id).morph, Morph::ToCoarser);
        }

        // after the morph interval only the root remains
        rig.settle();
        assert_eq!(rig.drawn(), vec![0]);
        assert_eq!(rig.meshes.in_use(), 1);
        assert_eq!(rig.tile(0).morph, Morph::None);

        // a steady frame draws the root exactly once, unmorphed
        let (uploads, calls) = rig.frame(0.016);
        assert!(uploads.is_empty());
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tile, 0);
        assert_eq!(calls[0].scaling, Vec4::new(1.0, 1.0, 1.0, 0.0));
    }

    #[test]
    fn zoom_in_hands_the_area_to_the_children() {
        let mut rig = Rig::new(2, 50.0, 100.0);
        rig.settle();
        assert_eq!(rig.drawn(), vec![0]);

        // at 50 units the root's 8-unit error projects to 80 px > 50, while
        // the children stay within tolerance
        rig.overhead(50.0);
        let (uploads, calls) = rig.frame(0.5);

        // the root released immediately; the children took over on the
        // root's surface and are relaxing onto their own geometry
        assert_eq!(uploads.len(), 4);
        assert_eq!(rig.tile(0).status, DrawStatus::NotDrawn);
        assert!(rig.tile(0).mesh.is_none());
        assert_eq!(calls.len(), 4);
        for id in 1..5 {
            assert_eq!(rig.tile(id).morph, Morph::FromCoarser);
        }

        // the phase falls by dt / MORPH_TIME per frame, monotonically, and
        // the terminal clamp lands it exactly on zero
        let mut last = calls[0].scaling.w;
        assert!((last - 0.8).abs() < 1e-6);
        let mut frames = 0;
        while rig.tile(1).morph != Morph::None {
            let (_, calls) = rig.frame(0.5);
            assert_eq!(calls.len(), 4);
            assert!(calls[0].scaling.w < last);
            last = calls[0].scaling.w;
            frames += 1;
            assert!(frames < 8, "morph never completed");
        }
        for id in 1..5 {
            assert_eq!(rig.tile(id).morph, Morph::None);
            assert_eq!(rig.tile(id).current_t, 0.0);
        }
    }

    #[test]
    fn zoom_out_hands_the_area_back_through_a_morph() {
        let mut rig = Rig::new(2, 50.0, 50.0);
        rig.settle();
        assert_eq!(rig.drawn(), vec![1, 2, 3, 4]);

        rig.overhead(100.0);
        let (uploads, calls) = rig.frame(0.25);

        // the root re-acquired and waits hidden while its children blend
        // onto its surface
        assert_eq!(uploads.len(), 1);
        assert_eq!(rig.meshes.in_use(), 5);
        assert_eq!(rig.tile(0).status, DrawStatus::NotDrawn);
        assert_eq!(rig.tile(0).morph, Morph::ToCoarser);
        assert_eq!(calls.len(), 4);
        for id in 1..5 {
            assert_eq!(rig.tile(id).status, DrawStatus::Drawn);
            assert_eq!(rig.tile(id).morph, Morph::ToCoarser);
            assert_eq!(rig.tile(id).current_t, 0.1);
        }

        // the phase climbs to one, the children release themselves, and the
        // parent takes over in the same pass
        let mut frames = 0;
        while rig.tile(0).status != DrawStatus::Drawn {
            rig.frame(0.25);
            frames += 1;
            assert!(frames < 12, "hand-off never completed");
        }
        assert_eq!(rig.drawn(), vec![0]);
        assert_eq!(rig.meshes.in_use(), 1);
        assert_eq!(rig.tile(0).morph, Morph::None);
    }

    #[test]
    fn zoom_in_during_the_hand_off_aborts_it() {
        let mut rig = Rig::new(2, 50.0, 50.0);
        rig.settle();

        // start the hand-off to the root, then advance the phase to 0.3
        rig.overhead(100.0);
        rig.frame(0.25);
        rig.frame(0.25);
        rig.frame(0.25);
        assert_eq!(rig.tile(1).current_t, 0.3);
        assert_eq!(rig.meshes.in_use(), 5);

        // moving back in cancels the morph: the children reset and re-arm,
        // the root releases its held slot
        rig.overhead(50.0);
        let (uploads, calls) = rig.frame(0.25);
        assert_eq!(rig.meshes.in_use(), 4);
        assert_eq!(rig.tile(0).status, DrawStatus::NotDrawn);
        assert_eq!(rig.tile(0).morph, Morph::None);
        assert!(rig.tile(0).mesh.is_none());
        assert_eq!(uploads.len(), 4);
        assert_eq!(calls.len(), 4);
        for id in 1..5 {
            assert_eq!(rig.tile(id).status, DrawStatus::Drawn);
            assert_eq!(rig.tile(id).morph, Morph::None);
            assert_eq!(rig.tile(id).current_t, 0.0);
        }
    }

    #[test]
    fn leaving_the_frustum_releases_everything() {
        let mut rig = Rig::new(2, 1000.0, 100.0);
        rig.settle();
        assert_eq!(rig.drawn(), vec![0]);

        // face away from the terrain
        rig.camera.look(bevy::math::Vec3::Y, bevy::math::Vec3::Z);
        rig.frustum.update(&rig.camera, 0.0);

        let (uploads, calls) = rig.frame(0.1);
        assert!(uploads.is_empty());
        assert!(calls.is_empty());
        assert_eq!(rig.meshes.in_use(), 0);
        assert_eq!(rig.tile(0).status, DrawStatus::OutsideFrustum);
    }

    #[test]
    fn leaving_the_frustum_clears_a_deep_cut() {
        let mut rig = Rig::new(2, 50.0, 50.0);
        rig.settle();
        assert_eq!(rig.drawn(), vec![1, 2, 3, 4]);

        rig.camera.look(bevy::math::Vec3::Y, bevy::math::Vec3::Z);
        rig.frustum.update(&rig.camera, 0.0);

        let (_, calls) = rig.frame(0.1);
        assert!(calls.is_empty());
        assert_eq!(rig.meshes.in_use(), 0);
        for id in 1..5 {
            assert_eq!(rig.tile(id).status, DrawStatus::OutsideFrustum);
        }
    }

    #[test]
    fn tighter_error_limit_deepens_the_cut_one_level() {
        let mut rig = Rig::new(3, 60.0, 50.0);
        rig.settle();
        // at 60 px tolerance the cut sits on the four level-1 tiles
        assert_eq!(rig.drawn(), vec![1, 2, 3, 4]);

        // three halvings of the tolerance: 60 / 2^1.5
        for _ in 0..3 {
            rig.error_limit *= std::f32::consts::FRAC_1_SQRT_2;
        }
        let (uploads, _) = rig.frame(0.5);

        // every level-1 tile handed its area to its children with a morph
        assert_eq!(uploads.len(), 16);
        for id in 1..5 {
            assert_eq!(rig.tile(id).status, DrawStatus::NotDrawn);
        }
        for id in 5..21 {
            assert_eq!(rig.tile(id).status, DrawStatus::Drawn);
            assert_eq!(rig.tile(id).morph, Morph::FromCoarser);
        }

        rig.settle();
        assert_eq!(rig.drawn().len(), 16);
        assert_eq!(rig.meshes.in_use(), 16);

        // the settled cut respects the error bound on every interior tile
        for &id in &rig.drawn() {
            let tile = rig.tile(id);
            if rig.cell.children(id).is_some() {
                let dist = tile.bbox.distance_to_point(rig.camera.position());
                assert!(rig.camera.screen_error(dist, tile.chunk.max_error) <= rig.error_limit);
            }
        }
    }

    #[test]
    fn leaves_draw_even_when_too_coarse() {
        // a tolerance nothing can meet pushes the cut to the deepest level
        let mut rig = Rig::new(2, 0.1, 50.0);
        rig.settle();
        assert_eq!(rig.drawn(), vec![1, 2, 3, 4]);
        for id in 1..5 {
            assert_eq!(rig.tile(id).morph, Morph::None);
        }
    }

    #[test]
    fn frame_time_jitter_still_lands_on_the_terminal_phase() {
        let mut rig = Rig::new(2, 50.0, 100.0);
        rig.settle();
        rig.overhead(50.0);

        let mut last = f32::INFINITY;
        let mut dts = [0.016, 0.5].iter().cycle();
        for _ in 0..40 {
            let (_, calls) = rig.frame(*dts.next().unwrap());
            if rig.tile(1).morph == Morph::None {
                break;
            }
            // the phase only ever moves toward its terminal value
            let t = rig.tile(1).current_t;
            assert!(t < last && t > 0.0);
            last = t;
            assert_eq!(calls.len(), 4);
        }
        assert_eq!(rig.tile(1).morph, Morph::None);
        assert_eq!(rig.tile(1).current_t, 0.0);
    }

    #[test]
    fn identical_inputs_replay_identically() {
        let script = |rig: &mut Rig| {
            let mut journal = Vec::new();
            for altitude in [100.0, 100.0, 50.0, 50.0, 50.0, 100.0, 100.0, 50.0] {
                rig.overhead(altitude);
                journal.push(rig.frame(0.25));
            }
            journal
        };

        let first = script(&mut Rig::new(3, 50.0, 100.0));
        let second = script(&mut Rig::new(3, 50.0, 100.0));
        assert_eq!(first, second);
    }
}
