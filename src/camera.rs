//! The terrain viewer state.
//!
//! The camera keeps its position in double precision so that screen-space
//! error stays meaningful on large maps. The view transform places the camera
//! at the origin; per-cell offsets are subtracted from cell corners before
//! they reach the f32 GPU path.

use bevy::{
    math::{DVec3, Mat4},
    prelude::*,
};

/// Position, orientation and projection parameters of the terrain viewer.
#[derive(Clone, Debug, Resource)]
pub struct CameraState {
    pos: DVec3,
    dir: Vec3,
    up: Vec3,
    /// Half of the horizontal field of view, in radians.
    half_fov: f32,
    /// Viewport aspect ratio as height / width.
    aspect: f32,
    near: f64,
    far: f64,
    /// Viewport width in pixels.
    width: u32,
    /// Cached `width / (2 tan half_fov)`, refreshed whenever the viewport or
    /// the field of view changes.
    error_factor: f32,
}

impl Default for CameraState {
    fn default() -> Self {
        let mut camera = Self {
            pos: DVec3::ZERO,
            dir: Vec3::NEG_Z,
            up: Vec3::Y,
            half_fov: 30f32.to_radians(),
            aspect: 0.75,
            near: 0.1,
            far: 1000.0,
            width: 1024,
            error_factor: 0.0,
        };
        camera.refresh_error_factor();
        camera
    }
}

impl CameraState {
    pub fn position(&self) -> DVec3 {
        self.pos
    }

    pub fn direction(&self) -> Vec3 {
        self.dir
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn near(&self) -> f64 {
        self.near
    }

    pub fn far(&self) -> f64 {
        self.far
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn half_fov(&self) -> f32 {
        self.half_fov
    }

    pub fn viewport_width(&self) -> u32 {
        self.width
    }

    /// Moves the camera to `pos`, looking at `at`, keeping `up` as the up
    /// direction.
    pub fn move_to(&mut self, pos: DVec3, at: DVec3, up: DVec3) {
        self.pos = pos;
        self.dir = (at - pos).normalize().as_vec3();
        self.up = up.normalize().as_vec3();
    }

    /// Changes the orientation without moving.
    pub fn look(&mut self, dir: Vec3, up: Vec3) {
        self.dir = dir.normalize();
        self.up = up.normalize();
    }

    /// Updates the cached viewport size; changes the aspect ratio but not the
    /// field of view.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.aspect = height as f32 / width as f32;
        self.width = width;
        self.refresh_error_factor();
    }

    /// Sets the horizontal field of view in degrees.
    pub fn set_fov(&mut self, degrees: f32) {
        self.half_fov = (0.5 * degrees).to_radians();
        self.refresh_error_factor();
    }

    pub fn set_near_far(&mut self, near: f64, far: f64) {
        debug_assert!(0.0 < near && near < far);
        self.near = near;
        self.far = far;
    }

    /// Translates a world point into the camera-at-origin coordinate system.
    pub fn translate(&self, p: DVec3) -> DVec3 {
        p - self.pos
    }

    /// The view matrix, assuming the camera sits at the origin.
    pub fn view_transform(&self) -> Mat4 {
        Mat4::look_to_rh(Vec3::ZERO, self.dir, self.up)
    }

    /// The projection matrix for the camera's symmetric frustum.
    pub fn proj_transform(&self) -> Mat4 {
        // The vertical extent of the frustum is aspect times the horizontal
        // one, so the vertical full angle is 2 atan(aspect tan(half_fov)).
        let fov_y = 2.0 * (self.aspect * self.half_fov.tan()).atan();
        Mat4::perspective_rh(fov_y, 1.0 / self.aspect, self.near as f32, self.far as f32)
    }

    /// The screen-space size in pixels of a world-space error `err` at
    /// distance `dist` from the camera.
    pub fn screen_error(&self, dist: f64, err: f32) -> f32 {
        self.error_factor * (err / dist as f32)
    }

    fn refresh_error_factor(&mut self) {
        self.error_factor = self.width as f32 / (2.0 * self.half_fov.tan());
    }

    /// Rotates the view around the camera's right axis.
    pub fn pitch(&mut self, degrees: f32) {
        let right = self.dir.cross(self.up).normalize();
        let rot = Quat::from_axis_angle(right, degrees.to_radians());
        self.dir = (rot * self.dir).normalize();
        self.up = (rot * self.up).normalize();
    }

    /// Rotates the view around the world's vertical axis.
    pub fn yaw(&mut self, degrees: f32) {
        let rot = Quat::from_rotation_y(degrees.to_radians());
        self.dir = (rot * self.dir).normalize();
        self.up = (rot * self.up).normalize();
    }

    /// Rotates the view around the camera's direction axis.
    pub fn roll(&mut self, degrees: f32) {
        let rot = Quat::from_axis_angle(self.dir, degrees.to_radians());
        self.up = (rot * self.up).normalize();
    }

    /// Moves the camera along its right axis.
    pub fn lateral(&mut self, step: f64) {
        let right = self.dir.cross(self.up).normalize().as_dvec3();
        self.pos += step * right;
    }

    /// Moves the camera along its direction axis.
    pub fn longitudinal(&mut self, step: f64) {
        self.pos += step * self.dir.normalize().as_dvec3();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f32, b: f32) {
        assert!((a - b).abs() < 1e-4, "{a} != {b}");
    }

    #[test]
    fn screen_error_scales_with_viewport() {
        let mut camera = CameraState::default();
        camera.set_fov(60.0);
        camera.set_viewport(1024, 768);

        // err / dist == tan(half_fov) projects to half the viewport width
        let err = (30f32.to_radians()).tan();
        assert_close(camera.screen_error(1.0, err), 512.0);

        // the cached factor follows a viewport change
        camera.set_viewport(2048, 1536);
        assert_close(camera.screen_error(1.0, err), 1024.0);

        // error halves with doubled distance
        assert_close(camera.screen_error(2.0, err), 512.0);
    }

    #[test]
    fn rotations_keep_the_frame_orthonormal() {
        let mut camera = CameraState::default();
        camera.move_to(DVec3::ZERO, DVec3::new(3.0, -1.0, 2.0), DVec3::Y);

        camera.pitch(10.0);
        camera.yaw(-35.0);
        camera.roll(4.0);

        assert_close(camera.direction().length(), 1.0);
        assert_close(camera.up().length(), 1.0);
        assert!(camera.direction().dot(camera.up()).abs() < 1e-4);
    }

    #[test]
    fn yaw_rotates_about_world_y() {
        let mut camera = CameraState::default();
        camera.look(Vec3::NEG_Z, Vec3::Y);
        camera.yaw(180.0);
        assert!((camera.direction() - Vec3::Z).length() < 1e-5);
    }

    #[test]
    fn movement_acts_in_the_local_frame() {
        let mut camera = CameraState::default();
        camera.look(Vec3::NEG_Z, Vec3::Y);

        camera.longitudinal(10.0);
        assert!((camera.position() - DVec3::new(0.0, 0.0, -10.0)).length() < 1e-9);

        camera.lateral(5.0);
        assert!((camera.position() - DVec3::new(5.0, 0.0, -10.0)).length() < 1e-9);
    }

    #[test]
    fn translate_recenters_on_the_camera() {
        let mut camera = CameraState::default();
        camera.move_to(DVec3::new(100.0, 50.0, -20.0), DVec3::ZERO, DVec3::Y);
        assert_eq!(
            camera.translate(DVec3::new(100.0, 50.0, -20.0)),
            DVec3::ZERO
        );
    }
}
