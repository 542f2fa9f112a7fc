//! The terrain material: per-tile uniforms, the packed vertex layout, and
//! the morph-aware shader hookup.

use crate::shaders::TERRAIN_SHADER;
use bevy::{
    pbr::{Material, MaterialPipeline, MaterialPipelineKey},
    prelude::*,
    render::{
        mesh::{MeshVertexAttribute, MeshVertexBufferLayoutRef},
        render_resource::{
            AsBindGroup, IndexFormat, PrimitiveTopology, RenderPipelineDescriptor, ShaderRef,
            ShaderType, SpecializedMeshPipelineError, VertexFormat,
        },
    },
};

/// The packed 4 x i16 terrain vertex: x, y, z, morph delta.
pub const ATTRIBUTE_PACKED_VERTEX: MeshVertexAttribute =
    MeshVertexAttribute::new("PackedVertex", 932_716_054, VertexFormat::Sint16x4);

/// Shading flag bits mirrored in `terrain.wgsl`.
pub mod flags {
    pub const LIGHTING: u32 = 1;
    pub const FOG: u32 = 1 << 1;
    pub const RAIN: u32 = 1 << 2;
    pub const HAS_COLOR: u32 = 1 << 3;
    pub const HAS_NORMAL: u32 = 1 << 4;
    /// Skip shading and output the per-LOD mesh color (wireframe mode).
    pub const FLAT_SHADE: u32 = 1 << 5;
}

/// Uniform block of one drawn tile.
#[derive(Clone, Copy, Debug, Default, ShaderType)]
pub struct TerrainMaterialUniform {
    /// Per-axis vertex scale `(h, v, h, v * morph_phase)`.
    pub scaling: Vec4,
    /// Flat mesh color used in wireframe mode.
    pub wire_color: Vec4,
    pub sun_dir: Vec3,
    pub fog_density: f32,
    pub sun_intensity: Vec3,
    /// Tile width in vertex-grid units, for tile-local texture coordinates.
    pub tile_width: u32,
    pub ambient: Vec3,
    pub nw_row: u32,
    pub fog_color: Vec3,
    pub nw_col: u32,
    /// The tile's cell corner relative to the camera.
    pub nw_offset: Vec3,
    pub flags: u32,
}

#[derive(Asset, TypePath, AsBindGroup, Clone, Default)]
pub struct TerrainMaterial {
    #[uniform(0)]
    pub uniform: TerrainMaterialUniform,
    #[texture(1)]
    #[sampler(2)]
    pub color_texture: Option<Handle<Image>>,
    #[texture(3)]
    #[sampler(4)]
    pub normal_texture: Option<Handle<Image>>,
}

impl Material for TerrainMaterial {
    fn vertex_shader() -> ShaderRef {
        TERRAIN_SHADER.into()
    }

    fn fragment_shader() -> ShaderRef {
        TERRAIN_SHADER.into()
    }

    fn specialize(
        _pipeline: &MaterialPipeline<Self>,
        descriptor: &mut RenderPipelineDescriptor,
        layout: &MeshVertexBufferLayoutRef,
        _key: MaterialPipelineKey<Self>,
    ) -> Result<(), SpecializedMeshPipelineError> {
        let vertex_layout = layout
            .0
            .get_layout(&[ATTRIBUTE_PACKED_VERTEX.at_shader_location(0)])?;
        descriptor.vertex.buffers = vec![vertex_layout];

        // chunk index buffers are u16 strips with 0xffff restarts
        if descriptor.primitive.topology == PrimitiveTopology::TriangleStrip {
            descriptor.primitive.strip_index_format = Some(IndexFormat::Uint16);
        }
        descriptor.primitive.cull_mode = None;

        Ok(())
    }
}
