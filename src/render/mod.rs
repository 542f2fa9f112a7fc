//! The Bevy side of the renderer: slot entities for the mesh pool, GPU
//! uploads for the cache journals, and the per-frame apply pass that turns
//! the draw list into visible entities and material updates.

pub mod material;

use crate::{
    cache::{MeshPool, TextureCache},
    camera::CameraState,
    controls::RenderToggles,
    formats::tqt::TqtStore,
    frustum::Frustum,
    map::Map,
    render::material::{flags, TerrainMaterial, TerrainMaterialUniform, ATTRIBUTE_PACKED_VERTEX},
    select::{draw_cell, select_cell, DrawCall, DrawParams, SelectParams},
    ErrorLimit, TerrainSettings,
};
use bevy::{
    asset::RenderAssetUsages,
    math::DVec3,
    pbr::wireframe::WireframeColor,
    prelude::*,
    render::{
        mesh::{Indices, VertexAttributeValues},
        render_resource::{Extent3d, PrimitiveTopology, TextureDimension, TextureFormat},
        view::NoFrustumCulling,
    },
    window::{PrimaryWindow, WindowResized},
};
use image::{Rgba, RgbaImage};

/// Mesh colors by LOD, used for the wireframe view.
const MESH_COLORS: [[u8; 3]; 9] = [
    [255, 255, 0],
    [255, 0, 255],
    [0, 255, 255],
    [255, 128, 128],
    [128, 255, 128],
    [128, 128, 255],
    [255, 0, 0],
    [0, 255, 0],
    [0, 0, 255],
];

fn mesh_color(lod: u32) -> Color {
    let [r, g, b] = MESH_COLORS[(lod as usize).min(MESH_COLORS.len() - 1)];
    Color::srgb_u8(r, g, b)
}

/// Marks the renderable entity of one mesh-pool slot.
#[derive(Component)]
pub struct TerrainSlot;

/// GPU-side handles backing the cache slots, plus the slot entities.
#[derive(Resource)]
pub struct RenderSlots {
    pub meshes: Vec<Handle<Mesh>>,
    pub materials: Vec<Handle<TerrainMaterial>>,
    pub entities: Vec<Entity>,
    pub textures: Vec<Option<Handle<Image>>>,
}

/// The draw calls emitted by the draw pass this frame.
#[derive(Default, Resource)]
pub struct FrameDraws {
    pub calls: Vec<DrawCall>,
}

/// Spawns the viewer and the slot entities, and sizes the caches.
pub fn setup_terrain(
    mut commands: Commands,
    map: Res<Map>,
    settings: Res<TerrainSettings>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<TerrainMaterial>>,
    window: Query<&Window, With<PrimaryWindow>>,
) {
    // place the viewer above the first cell, facing the bulk of the terrain
    let mut camera = CameraState::default();
    let bb = map.cell(0, 0).tiles[0].bbox;
    let mut pos = bb.center();
    pos.y = bb.max.y + 0.01 * (bb.max.x - bb.min.x);
    let at = if map.n_rows == 1 && map.n_cols == 1 {
        pos + DVec3::new(1.0, -0.25, 1.0)
    } else {
        pos + DVec3::new((map.n_cols - 1) as f64, 0.0, (map.n_rows - 1) as f64)
    };
    camera.move_to(pos, at, DVec3::Y);
    camera.set_fov(60.0);

    let diagonal =
        1.02 * ((map.n_rows * map.n_rows + map.n_cols * map.n_cols) as f64).sqrt();
    camera.set_near_far(
        10.0,
        diagonal * map.cell_size as f64 * map.h_scale as f64,
    );

    let window = window.single();
    let (width, height) = (window.physical_width(), window.physical_height());
    camera.set_viewport(width, height);

    // the default tolerance is 1% of the viewport height
    commands.insert_resource(ErrorLimit(height as f32 / 100.0));

    let mut frustum = Frustum::default();
    frustum.update(&camera, settings.frustum_bias);

    // the Bevy camera stays at the origin; terrain positions are made
    // camera-relative before they reach the GPU
    commands.spawn((
        Camera3d::default(),
        Projection::Perspective(PerspectiveProjection {
            fov: vertical_fov(&camera),
            near: camera.near() as f32,
            far: camera.far() as f32,
            ..default()
        }),
        Transform::IDENTITY.looking_to(camera.direction(), camera.up()),
    ));

    // one renderable entity per mesh slot, surfaced only on frames whose
    // draw list includes it
    let mut slots = RenderSlots {
        meshes: Vec::with_capacity(settings.mesh_slots),
        materials: Vec::with_capacity(settings.mesh_slots),
        entities: Vec::with_capacity(settings.mesh_slots),
        textures: vec![None; settings.texture_slots],
    };
    for _ in 0..settings.mesh_slots {
        let mut mesh = Mesh::new(
            PrimitiveTopology::TriangleStrip,
            RenderAssetUsages::RENDER_WORLD | RenderAssetUsages::MAIN_WORLD,
        );
        mesh.insert_attribute(
            ATTRIBUTE_PACKED_VERTEX,
            VertexAttributeValues::Sint16x4(Vec::new()),
        );
        mesh.insert_indices(Indices::U16(Vec::new()));

        let mesh = meshes.add(mesh);
        let material = materials.add(TerrainMaterial::default());
        let entity = commands
            .spawn((
                Mesh3d(mesh.clone()),
                MeshMaterial3d(material.clone()),
                Transform::IDENTITY,
                Visibility::Hidden,
                NoFrustumCulling,
                TerrainSlot,
                WireframeColor {
                    color: Color::WHITE,
                },
            ))
            .id();

        slots.meshes.push(mesh);
        slots.materials.push(material);
        slots.entities.push(entity);
    }

    let toggles = {
        let mut toggles = RenderToggles::WIREFRAME | RenderToggles::LIGHTING;
        if map.fog.is_some() {
            toggles |= RenderToggles::FOG;
        }
        toggles
    };

    commands.insert_resource(camera);
    commands.insert_resource(frustum);
    commands.insert_resource(toggles);
    commands.insert_resource(MeshPool::new(settings.mesh_slots));
    commands.insert_resource(TextureCache::new(settings.texture_slots));
    commands.insert_resource(slots);
}

fn vertical_fov(camera: &CameraState) -> f32 {
    2.0 * (camera.aspect() * camera.half_fov().tan()).atan()
}

/// Rebuilds the frustum and syncs the Bevy camera after input, and follows
/// window resizes with the viewport-derived error tolerance.
pub fn update_view(
    settings: Res<TerrainSettings>,
    mut resized: EventReader<WindowResized>,
    mut camera: ResMut<CameraState>,
    mut frustum: ResMut<Frustum>,
    mut error_limit: ResMut<ErrorLimit>,
    mut view: Query<(&mut Transform, &mut Projection), With<Camera3d>>,
) {
    for event in resized.read() {
        camera.set_viewport(event.width as u32, event.height as u32);
        error_limit.0 = event.height / 100.0;
    }

    frustum.update(&camera, settings.frustum_bias);

    let (mut transform, mut projection) = view.single_mut();
    *transform = Transform::IDENTITY.looking_to(camera.direction(), camera.up());
    if let Projection::Perspective(perspective) = &mut *projection {
        perspective.fov = vertical_fov(&camera);
        perspective.near = camera.near() as f32;
        perspective.far = camera.far() as f32;
    }
}

/// The selection pass: every cell's root, before any draw call is emitted.
pub fn select_tiles(
    mut map: ResMut<Map>,
    camera: Res<CameraState>,
    frustum: Res<Frustum>,
    error_limit: Res<ErrorLimit>,
    mut meshes: ResMut<MeshPool>,
    mut textures: ResMut<TextureCache>,
) {
    let mut params = SelectParams {
        camera: &camera,
        frustum: &frustum,
        error_limit: error_limit.0,
        meshes: &mut meshes,
        textures: &mut textures,
    };
    for index in 0..map.cells.len() {
        select_cell(&mut map.cells[index], index as u32, &mut params);
    }
}

/// The draw pass: advances morphs and collects the frame's draw list.
pub fn emit_draw_calls(
    time: Res<Time>,
    mut map: ResMut<Map>,
    mut meshes: ResMut<MeshPool>,
    mut textures: ResMut<TextureCache>,
    mut draws: ResMut<FrameDraws>,
) {
    draws.calls.clear();
    let (h_scale, v_scale) = (map.h_scale, map.v_scale);
    let mut params = DrawParams {
        dt: time.delta_secs(),
        h_scale,
        v_scale,
        meshes: &mut meshes,
        textures: &mut textures,
        out: &mut draws.calls,
    };
    for index in 0..map.cells.len() {
        draw_cell(&mut map.cells[index], index as u32, &mut params);
    }
}

/// Applies the frame: uploads journaled chunks and textures, then surfaces
/// the slot entities named by the draw list with refreshed materials.
#[allow(clippy::too_many_arguments)]
pub fn apply_frame(
    map: Res<Map>,
    camera: Res<CameraState>,
    toggles: Res<RenderToggles>,
    draws: Res<FrameDraws>,
    mut pool: ResMut<MeshPool>,
    mut cache: ResMut<TextureCache>,
    mut tqts: ResMut<TqtStore>,
    mut slots: ResMut<RenderSlots>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<TerrainMaterial>>,
    mut images: ResMut<Assets<Image>>,
    mut slot_entities: Query<(&mut Visibility, &mut WireframeColor), With<TerrainSlot>>,
) {
    // upload freshly acquired chunks into their mesh slots
    for upload in pool.uploads.drain(..) {
        let chunk = &map.cells[upload.cell as usize].tiles[upload.tile as usize].chunk;
        let mesh = meshes
            .get_mut(&slots.meshes[upload.slot.0 as usize])
            .expect("mesh slot asset missing");
        mesh.insert_attribute(
            ATTRIBUTE_PACKED_VERTEX,
            VertexAttributeValues::Sint16x4(
                chunk
                    .vertices
                    .iter()
                    .map(|v| [v.x, v.y, v.z, v.morph_delta])
                    .collect(),
            ),
        );
        mesh.insert_indices(Indices::U16(chunk.indices.clone()));
    }

    // decode newly referenced texture-quadtree nodes
    for (slot, key) in cache.loads.drain(..) {
        let image = match tqts.get_mut(key.tree).load_image(key.level, key.row, key.col) {
            Ok(image) => image,
            Err(err) => {
                warn!("texture load failed: {err:#}");
                RgbaImage::from_pixel(1, 1, Rgba([255, 255, 255, 255]))
            }
        };
        let handle = images.add(Image::new(
            Extent3d {
                width: image.width(),
                height: image.height(),
                depth_or_array_layers: 1,
            },
            TextureDimension::D2,
            image.into_raw(),
            TextureFormat::Rgba8UnormSrgb,
            RenderAssetUsages::RENDER_WORLD,
        ));
        slots.textures[slot.0 as usize] = Some(handle);
    }

    let base_flags = {
        let mut bits = 0;
        if toggles.contains(RenderToggles::WIREFRAME) {
            bits |= flags::FLAT_SHADE;
        }
        if toggles.contains(RenderToggles::LIGHTING) {
            bits |= flags::LIGHTING;
        }
        if toggles.contains(RenderToggles::FOG) && map.fog.is_some() {
            bits |= flags::FOG;
        }
        if toggles.contains(RenderToggles::RAIN) {
            bits |= flags::RAIN;
        }
        bits
    };
    let fog = map.fog.unwrap_or_default();

    // hide every slot, then surface this frame's cut
    for (mut visibility, _) in &mut slot_entities {
        *visibility = Visibility::Hidden;
    }

    for call in &draws.calls {
        let cell = &map.cells[call.cell as usize];
        let corner = camera
            .translate(map.nw_cell_corner(cell.row, cell.col))
            .as_vec3();

        let mut call_flags = base_flags;
        if call.color.is_some() {
            call_flags |= flags::HAS_COLOR;
        }
        if call.normal.is_some() {
            call_flags |= flags::HAS_NORMAL;
        }

        let material = materials
            .get_mut(&slots.materials[call.mesh.0 as usize])
            .expect("material slot asset missing");
        material.uniform = TerrainMaterialUniform {
            scaling: call.scaling,
            wire_color: Vec4::from_array(mesh_color(call.lod).to_linear().to_f32_array()),
            sun_dir: map.sun_dir,
            fog_density: fog.density,
            sun_intensity: map.sun_intensity,
            tile_width: call.tile_width,
            ambient: map.ambient,
            nw_row: call.nw_row,
            fog_color: fog.color,
            nw_col: call.nw_col,
            nw_offset: corner,
            flags: call_flags,
        };
        material.color_texture = call
            .color
            .and_then(|slot| slots.textures[slot.0 as usize].clone());
        material.normal_texture = call
            .normal
            .and_then(|slot| slots.textures[slot.0 as usize].clone());

        let (mut visibility, mut wire_color) = slot_entities
            .get_mut(slots.entities[call.mesh.0 as usize])
            .expect("slot entity missing");
        *visibility = Visibility::Visible;
        wire_color.color = mesh_color(call.lod);
    }
}
