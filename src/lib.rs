//! This crate renders very large heightfield terrains in real time with a
//! chunked level-of-detail scheme.
//!
//! # Background
//! The map is partitioned into a grid of cells, and every cell carries a
//! complete quadtree of mesh chunks at increasing resolution, precomputed
//! with the maximum geometric error of each approximation. Each frame the
//! selection pass walks every cell's quadtree and picks the cut whose
//! projected screen-space error stays under the current tolerance and whose
//! tiles pass the view-frustum test; see the [`select`] module for the
//! traversal and its morph state machine.
//!
//! Tiles never own GPU resources. The mesh pool and the texture cache (see
//! [`cache`]) hold a bounded number of slots and evict least-recently-used
//! unreferenced entries; a tile borrows its slots for exactly as long as it
//! is part of the cut. Level switches are not popped: geometry blends over a
//! fixed interval using a per-vertex morph delta stored alongside each
//! packed vertex (see [`map::chunk`]).
//!
//! The on-disk formats (`map.json`, binary `hf.cell` heightfields, `.tqt`
//! texture quadtrees) live in [`formats`]. The Bevy integration — slot
//! entities, the material with the morph uniform, keyboard controls, and the
//! frame driver — lives in [`render`] and [`controls`] and is wired up by
//! [`TerrainPlugin`].

use bevy::{pbr::wireframe::WireframePlugin, prelude::*};

pub mod cache;
pub mod camera;
pub mod controls;
pub mod formats;
pub mod frustum;
pub mod map;
pub mod math;
pub mod render;
pub mod select;
mod shaders;

pub mod prelude {
    //! `use chunked_terrain::prelude::*;` to import the common types.
    pub use crate::{
        cache::{MeshPool, TextureCache},
        camera::CameraState,
        controls::RenderToggles,
        frustum::Frustum,
        map::{load_map, Cell, DrawStatus, Map, Morph, Tile},
        select::{DrawCall, MORPH_TIME},
        ErrorLimit, TerrainPlugin, TerrainSettings,
    };
}

/// Tunables of the renderer.
///
/// The frustum bias is the inherited side-plane fudge factor; it is kept
/// configurable rather than baked in.
#[derive(Clone, Debug, Resource)]
pub struct TerrainSettings {
    /// How far the frustum side planes are relaxed along the view direction.
    pub frustum_bias: f64,
    /// Capacity of the mesh-buffer pool.
    pub mesh_slots: usize,
    /// Capacity of the texture cache.
    pub texture_slots: usize,
}

impl Default for TerrainSettings {
    fn default() -> Self {
        Self {
            frustum_bias: 0.18,
            mesh_slots: 256,
            texture_slots: 512,
        }
    }
}

/// The screen-space error tolerance of the LOD selection, in pixels.
///
/// Initialized to 1% of the framebuffer height and adjusted with `+`/`-`.
#[derive(Clone, Copy, Debug, Resource)]
pub struct ErrorLimit(pub f32);

/// The plugin for the terrain renderer.
///
/// Expects a loaded [`map::Map`] and its [`formats::tqt::TqtStore`] as
/// resources. The frame systems run chained: input, view update, the
/// selection pass over every cell, the draw pass over every cell, then the
/// apply pass that surfaces the result.
pub struct TerrainPlugin;

impl Plugin for TerrainPlugin {
    fn build(&self, app: &mut App) {
        shaders::load_terrain_shaders(app);

        app.add_plugins(MaterialPlugin::<render::material::TerrainMaterial>::default())
            .add_plugins(WireframePlugin)
            .insert_resource(bevy::pbr::wireframe::WireframeConfig {
                global: true,
                default_color: Color::WHITE,
            })
            .init_resource::<TerrainSettings>()
            .init_resource::<render::FrameDraws>()
            .add_systems(Startup, render::setup_terrain)
            .add_systems(
                Update,
                (
                    controls::terrain_controls,
                    render::update_view,
                    render::select_tiles,
                    render::emit_draw_calls,
                    render::apply_frame,
                )
                    .chain(),
            );
    }
}
