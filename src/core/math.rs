// Math utilities and conversions between glam and the solver's nalgebra types

use glam::{Vec2, Vec3};
use rapier2d::prelude::{point, vector, Isometry, Point, Real, Vector};
use rapier2d::na as nalgebra;

/// Pose of an object in world space.
///
/// `position.x` and `position.z` lie in the solver plane, `position.y` is up.
/// `orientation` is the rotation around the vertical axis in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub orientation: f32,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        orientation: 0.0,
    };

    pub fn new(position: Vec3, orientation: f32) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Planar part of the position, as (x, z)
    pub fn planar(&self) -> Vec2 {
        Vec2::new(self.position.x, self.position.z)
    }

    /// Unit heading vector in the (x, z) plane
    pub fn sign_vector(&self) -> Vec2 {
        Vec2::from_angle(self.orientation)
    }

    /// Treat `local` as relative to `self` and return it in world space
    pub fn compose(&self, local: &Transform) -> Transform {
        let offset = rotate(local.planar(), self.orientation);
        Transform {
            position: Vec3::new(
                self.position.x + offset.x,
                self.position.y + local.position.y,
                self.position.z + offset.y,
            ),
            orientation: self.orientation + local.orientation,
        }
    }

    pub(crate) fn to_isometry(self) -> Isometry<Real> {
        Isometry::new(to_vector(self.planar()), self.orientation)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Rotate a planar vector by `angle` radians
pub fn rotate(v: Vec2, angle: f32) -> Vec2 {
    Vec2::from_angle(angle).rotate(v)
}

pub(crate) fn to_vector(v: Vec2) -> Vector<Real> {
    vector![v.x, v.y]
}

pub(crate) fn to_point(v: Vec2) -> Point<Real> {
    point![v.x, v.y]
}

pub(crate) fn from_vector(v: &Vector<Real>) -> Vec2 {
    Vec2::new(v.x, v.y)
}

pub(crate) fn from_point(p: &Point<Real>) -> Vec2 {
    Vec2::new(p.x, p.y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_sign_vector() {
        let transform = Transform::new(Vec3::ZERO, FRAC_PI_2);
        let sign = transform.sign_vector();
        assert_relative_eq!(sign.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(sign.y, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_compose_rotates_local_offset() {
        let parent = Transform::new(Vec3::new(10.0, 2.0, 5.0), FRAC_PI_2);
        let local = Transform::new(Vec3::new(1.0, 0.5, 0.0), 0.25);
        let world = parent.compose(&local);

        assert_relative_eq!(world.position.x, 10.0, epsilon = 1e-5);
        assert_relative_eq!(world.position.y, 2.5, epsilon = 1e-5);
        assert_relative_eq!(world.position.z, 6.0, epsilon = 1e-5);
        assert_relative_eq!(world.orientation, FRAC_PI_2 + 0.25, epsilon = 1e-6);
    }

    #[test]
    fn test_isometry_uses_xz_plane() {
        let transform = Transform::new(Vec3::new(3.0, 7.0, -4.0), 1.0);
        let iso = transform.to_isometry();
        assert_eq!(from_vector(&iso.translation.vector), Vec2::new(3.0, -4.0));
        assert_relative_eq!(iso.rotation.angle(), 1.0, epsilon = 1e-6);
    }
}
