//! Keyboard input: camera movement, render toggles, and the error-limit
//! adjustment.
//!
//! Movement applies one fixed step per frame while a key is held, which
//! matches a synthesized key repeat; rotations move one degree per step and
//! translations scale with the map's world units.

use crate::{camera::CameraState, map::Map, ErrorLimit};
use bevy::{pbr::wireframe::WireframeConfig, prelude::*};
use bitflags::bitflags;
use std::f32::consts::{FRAC_1_SQRT_2, SQRT_2};

/// The error tolerance never drops below half a pixel.
const ERROR_LIMIT_FLOOR: f32 = 0.5;

/// Background color outside of fog (dark night blue).
const CLEAR_COLOR: Color = Color::Srgba(Srgba {
    red: 0.2,
    green: 0.2,
    blue: 0.4,
    alpha: 1.0,
});

bitflags! {
    /// Render-mode toggles driven by the keyboard.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Resource)]
    pub struct RenderToggles: u32 {
        const WIREFRAME = 1;
        const LIGHTING = 1 << 1;
        const FOG = 1 << 2;
        const RAIN = 1 << 3;
    }
}

pub fn terrain_controls(
    keyboard: Res<ButtonInput<KeyCode>>,
    map: Res<Map>,
    mut camera: ResMut<CameraState>,
    mut toggles: ResMut<RenderToggles>,
    mut error_limit: ResMut<ErrorLimit>,
    mut wireframe: ResMut<WireframeConfig>,
    mut clear_color: ResMut<ClearColor>,
    mut exit: EventWriter<AppExit>,
) {
    if keyboard.just_pressed(KeyCode::Escape) || keyboard.just_pressed(KeyCode::KeyQ) {
        exit.send(AppExit::Success);
        return;
    }

    if keyboard.just_pressed(KeyCode::KeyW) {
        toggles.toggle(RenderToggles::WIREFRAME);
        wireframe.global = toggles.contains(RenderToggles::WIREFRAME);
    }
    if keyboard.just_pressed(KeyCode::KeyL) && !toggles.contains(RenderToggles::WIREFRAME) {
        toggles.toggle(RenderToggles::LIGHTING);
    }
    if keyboard.just_pressed(KeyCode::KeyF)
        && !toggles.contains(RenderToggles::WIREFRAME)
        && map.fog.is_some()
    {
        toggles.toggle(RenderToggles::FOG);
    }
    if keyboard.just_pressed(KeyCode::KeyR) {
        toggles.toggle(RenderToggles::RAIN);
    }

    // fog fills the background whenever it is visible
    let fog_visible = !toggles.contains(RenderToggles::WIREFRAME)
        && toggles.contains(RenderToggles::FOG)
        && map.fog.is_some();
    clear_color.0 = match map.fog {
        Some(fog) if fog_visible => Color::srgb(fog.color.x, fog.color.y, fog.color.z),
        _ => CLEAR_COLOR,
    };

    // shift+'=' is '+': tighten the tolerance; '-' relaxes it
    let shift =
        keyboard.pressed(KeyCode::ShiftLeft) || keyboard.pressed(KeyCode::ShiftRight);
    if (keyboard.just_pressed(KeyCode::Equal) && shift)
        || keyboard.just_pressed(KeyCode::NumpadAdd)
    {
        if error_limit.0 > ERROR_LIMIT_FLOOR {
            error_limit.0 *= FRAC_1_SQRT_2;
        }
    }
    if (keyboard.just_pressed(KeyCode::Minus) && !shift)
        || keyboard.just_pressed(KeyCode::NumpadSubtract)
    {
        error_limit.0 *= SQRT_2;
    }

    let speed = (5.0 * (map.h_scale + map.v_scale) / 2.0) as f64;

    if keyboard.pressed(KeyCode::ArrowUp) {
        camera.pitch(1.0);
    }
    if keyboard.pressed(KeyCode::ArrowDown) {
        camera.pitch(-1.0);
    }
    if keyboard.pressed(KeyCode::ArrowLeft) {
        camera.yaw(-1.0);
    }
    if keyboard.pressed(KeyCode::ArrowRight) {
        camera.yaw(1.0);
    }
    if keyboard.pressed(KeyCode::KeyB) {
        camera.roll(1.0);
    }
    if keyboard.pressed(KeyCode::KeyN) {
        camera.roll(-1.0);
    }
    if keyboard.pressed(KeyCode::KeyY) {
        camera.longitudinal(speed);
    }
    if keyboard.pressed(KeyCode::KeyH) {
        camera.longitudinal(-speed);
    }
    if keyboard.pressed(KeyCode::KeyG) {
        camera.lateral(-speed);
    }
    if keyboard.pressed(KeyCode::KeyJ) {
        camera.lateral(speed);
    }
}
