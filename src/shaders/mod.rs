use bevy::{asset::embedded_asset, prelude::*};

pub const TERRAIN_SHADER: &str = "embedded://chunked_terrain/shaders/terrain.wgsl";

pub(crate) fn load_terrain_shaders(app: &mut App) {
    embedded_asset!(app, "terrain.wgsl");
}
