//! The view frustum used to cull tiles during LOD selection.

use crate::{camera::CameraState, math::Aabbd};
use bevy::{math::DVec3, prelude::*};

/// One oriented frustum plane, stored so that a point `p` lies behind the
/// plane exactly when `dot(normal, p) < -distance`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Plane {
    pub normal: DVec3,
    pub distance: f64,
}

impl Plane {
    fn through(normal: DVec3, point: DVec3) -> Self {
        Self {
            normal,
            distance: -normal.dot(point),
        }
    }

    pub fn is_behind(&self, p: DVec3) -> bool {
        self.normal.dot(p) < -self.distance
    }
}

/// The six view-frustum planes, ordered {top, right, bottom, left, near, far}.
///
/// The four side planes are relaxed by `side_bias` along the view direction,
/// so a tile that has just slipped past the screen edge is not culled
/// immediately; this hides edge flicker from LOD swaps.
#[derive(Clone, Debug, Default, Resource)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Rebuilds the planes from the camera state.
    pub fn update(&mut self, camera: &CameraState, side_bias: f64) {
        let dir = camera.direction().as_dvec3().normalize();
        let up = camera.up().as_dvec3().normalize();
        let right = dir.cross(up).normalize();
        let aspect = camera.aspect() as f64;
        let half_fov = camera.half_fov() as f64;

        let h_near = 2.0 * (aspect * half_fov).tan() * camera.near();
        let w_near = h_near / aspect;
        let h_far = 2.0 * (aspect * half_fov).tan() * camera.far();
        let w_far = h_far / aspect;

        let near_center = camera.position() + dir * camera.near();
        let far_center = camera.position() + dir * camera.far();

        // corner order: top-left, top-right, bottom-right, bottom-left
        let near = [
            near_center + up * (h_near / 2.0) - right * (w_near / 2.0),
            near_center + up * (h_near / 2.0) + right * (w_near / 2.0),
            near_center - up * (h_near / 2.0) + right * (w_near / 2.0),
            near_center - up * (h_near / 2.0) - right * (w_near / 2.0),
        ];
        let far = [
            far_center + up * (h_far / 2.0) - right * (w_far / 2.0),
            far_center + up * (h_far / 2.0) + right * (w_far / 2.0),
            far_center - up * (h_far / 2.0) + right * (w_far / 2.0),
            far_center - up * (h_far / 2.0) - right * (w_far / 2.0),
        ];

        let side = |a: DVec3, b: DVec3| (a.cross(b).normalize() + side_bias * dir).normalize();

        self.planes[0] = Plane::through(side(far[0] - near[0], near[1] - near[0]), near[0]);
        self.planes[1] = Plane::through(side(far[1] - near[1], near[2] - near[1]), near[1]);
        self.planes[2] = Plane::through(side(far[2] - near[2], near[3] - near[2]), near[2]);
        self.planes[3] = Plane::through(side(far[3] - near[3], near[0] - near[3]), near[3]);
        self.planes[4] = Plane::through(
            (near[3] - near[2]).cross(near[1] - near[2]).normalize(),
            near[0],
        );
        self.planes[5] = Plane::through(
            (far[3] - far[0]).cross(far[1] - far[0]).normalize(),
            far[0],
        );
    }

    /// Reports `true` when the box is inside or intersecting the frustum;
    /// `false` only when all eight corners lie behind one of the planes.
    pub fn intersects_aabb(&self, bbox: &Aabbd) -> bool {
        let corners = bbox.corners();
        for plane in &self.planes {
            if corners.iter().all(|&c| plane.is_behind(c)) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::math::DVec3;

    fn test_camera() -> CameraState {
        let mut camera = CameraState::default();
        camera.move_to(DVec3::ZERO, DVec3::new(0.0, 0.0, -1.0), DVec3::Y);
        camera.set_fov(90.0);
        camera.set_viewport(1000, 1000);
        camera.set_near_far(1.0, 100.0);
        camera
    }

    fn box_at(center: DVec3) -> Aabbd {
        Aabbd::new(center - DVec3::splat(0.5), center + DVec3::splat(0.5))
    }

    #[test]
    fn boxes_ahead_are_kept() {
        let mut frustum = Frustum::default();
        frustum.update(&test_camera(), 0.0);

        assert!(frustum.intersects_aabb(&box_at(DVec3::new(0.0, 0.0, -50.0))));
        assert!(frustum.intersects_aabb(&box_at(DVec3::new(20.0, 10.0, -40.0))));
    }

    #[test]
    fn boxes_outside_are_rejected() {
        let mut frustum = Frustum::default();
        frustum.update(&test_camera(), 0.0);

        // behind the camera
        assert!(!frustum.intersects_aabb(&box_at(DVec3::new(0.0, 0.0, 50.0))));
        // far beyond the far plane
        assert!(!frustum.intersects_aabb(&box_at(DVec3::new(0.0, 0.0, -500.0))));
        // way off to the side
        assert!(!frustum.intersects_aabb(&box_at(DVec3::new(500.0, 0.0, -50.0))));
    }

    #[test]
    fn straddling_boxes_are_kept() {
        let mut frustum = Frustum::default();
        frustum.update(&test_camera(), 0.0);

        // half in front of the near plane, half behind it
        let bb = Aabbd::new(DVec3::new(-1.0, -1.0, -2.0), DVec3::new(1.0, 1.0, 0.0));
        assert!(frustum.intersects_aabb(&bb));
    }

    #[test]
    fn side_bias_keeps_boxes_just_past_the_edge() {
        let camera = test_camera();
        let mut plain = Frustum::default();
        plain.update(&camera, 0.0);
        let mut biased = Frustum::default();
        biased.update(&camera, 0.18);

        // a box just beyond the left edge of the view is culled by the exact
        // frustum but survives the relaxed one
        let edge = box_at(DVec3::new(-60.0, 0.0, -50.0));
        assert!(!plain.intersects_aabb(&edge));
        assert!(biased.intersects_aabb(&edge));
    }
}
