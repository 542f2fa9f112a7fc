use bevy::math::DVec3;

/// An axis-aligned bounding box in double-precision world coordinates.
///
/// Tile bounds are kept in f64 so that large worlds do not lose precision;
/// the f32 path only starts once the camera position has been subtracted.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabbd {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabbd {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    pub fn center(&self) -> DVec3 {
        0.5 * (self.min + self.max)
    }

    /// The `i`th corner of the box, with bit 0 selecting max x, bit 1 max y
    /// and bit 2 max z.
    pub fn corner(&self, i: usize) -> DVec3 {
        debug_assert!(i < 8);
        DVec3::new(
            if i & 1 == 0 { self.min.x } else { self.max.x },
            if i & 2 == 0 { self.min.y } else { self.max.y },
            if i & 4 == 0 { self.min.z } else { self.max.z },
        )
    }

    pub fn corners(&self) -> [DVec3; 8] {
        std::array::from_fn(|i| self.corner(i))
    }

    /// The distance from `p` to the nearest point of the box; zero when `p`
    /// is inside.
    pub fn distance_to_point(&self, p: DVec3) -> f64 {
        p.distance(p.clamp(self.min, self.max))
    }
}
