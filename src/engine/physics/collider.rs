use bitflags::bitflags;
use glam::Vec2;
use rapier2d::prelude::*;

use super::collision::CollisionGroup;
use super::PhysicsError;
use crate::core::math::{to_point, to_vector};

/// Geometric shape of a collider, in body-local (x, z) coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CollisionShape {
    Circle { center: Vec2, radius: f32 },
    Edge { point0: Vec2, point1: Vec2 },
    Box { center: Vec2, half_extents: Vec2 },
}

impl CollisionShape {
    pub fn circle(radius: f32) -> Self {
        Self::Circle {
            center: Vec2::ZERO,
            radius,
        }
    }

    pub fn edge(point0: Vec2, point1: Vec2) -> Self {
        Self::Edge { point0, point1 }
    }

    pub fn cuboid(half_extents: Vec2) -> Self {
        Self::Box {
            center: Vec2::ZERO,
            half_extents,
        }
    }

    /// Reject shapes the solver cannot handle
    pub fn validate(&self) -> Result<(), PhysicsError> {
        let valid = match *self {
            CollisionShape::Circle { center, radius } => {
                center.is_finite() && radius.is_finite() && radius > 0.0
            }
            CollisionShape::Edge { point0, point1 } => {
                point0.is_finite() && point1.is_finite() && point0.distance_squared(point1) > 0.0
            }
            CollisionShape::Box {
                center,
                half_extents,
            } => center.is_finite() && half_extents.is_finite() && half_extents.min_element() > 0.0,
        };

        if valid {
            Ok(())
        } else {
            Err(PhysicsError::InvalidShape(format!("{:?}", self)))
        }
    }

    /// Solver shape plus its offset relative to the body
    pub(crate) fn to_shared_shape(self) -> (SharedShape, Isometry<Real>) {
        match self {
            CollisionShape::Circle { center, radius } => (
                SharedShape::ball(radius),
                Isometry::translation(center.x, center.y),
            ),
            CollisionShape::Edge { point0, point1 } => (
                SharedShape::segment(to_point(point0), to_point(point1)),
                Isometry::identity(),
            ),
            CollisionShape::Box {
                center,
                half_extents,
            } => (
                SharedShape::cuboid(half_extents.x, half_extents.y),
                Isometry::new(to_vector(center), 0.0),
            ),
        }
    }
}

/// Surface properties of a collider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsMaterial {
    /// Friction coefficient (0.0 = no friction)
    pub friction: f32,
    /// Bounciness (0.0 = no bounce, 1.0 = perfect bounce)
    pub restitution: f32,
    /// Mass is computed from shape area times density
    pub density: f32,
}

impl PhysicsMaterial {
    pub fn new(friction: f32, restitution: f32, density: f32) -> Self {
        Self {
            friction,
            restitution,
            density,
        }
    }
}

impl Default for PhysicsMaterial {
    fn default() -> Self {
        Self::new(0.5, 0.0, 1.0)
    }
}

bitflags! {
    /// Per-collider behaviour switches
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ColliderFlags: u32 {
        /// Detects overlaps but never produces contacts
        const SENSOR = 1 << 0;
    }
}

/// Everything needed to create a collider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColliderDesc {
    pub shape: CollisionShape,
    pub material: PhysicsMaterial,
    /// What this collider is
    pub group: CollisionGroup,
    /// What this collider collides with
    pub collides_with: CollisionGroup,
    pub flags: ColliderFlags,
}

impl ColliderDesc {
    pub fn new(shape: CollisionShape, group: CollisionGroup) -> Self {
        Self {
            shape,
            material: PhysicsMaterial::default(),
            group,
            collides_with: group.default_mask(),
            flags: ColliderFlags::empty(),
        }
    }

    pub fn material(mut self, material: PhysicsMaterial) -> Self {
        self.material = material;
        self
    }

    pub fn collides_with(mut self, mask: CollisionGroup) -> Self {
        self.collides_with = mask;
        self
    }

    pub fn sensor(mut self, is_sensor: bool) -> Self {
        self.flags.set(ColliderFlags::SENSOR, is_sensor);
        self
    }

    /// Build the solver collider
    pub(crate) fn build(&self) -> rapier2d::prelude::Collider {
        let (shape, offset) = self.shape.to_shared_shape();
        rapier2d::prelude::ColliderBuilder::new(shape)
            .position(offset)
            .collision_groups(self.group.to_interaction_groups(self.collides_with))
            .sensor(self.flags.contains(ColliderFlags::SENSOR))
            .friction(self.material.friction)
            .restitution(self.material.restitution)
            .density(self.material.density)
            .active_hooks(ActiveHooks::FILTER_CONTACT_PAIRS)
            .build()
    }
}

/// A collider owned by a physics body, addressed by its slot
#[derive(Debug, Clone, PartialEq)]
pub struct Collider {
    pub(crate) handle: ColliderHandle,
    slot: usize,
    shape: CollisionShape,
    material: PhysicsMaterial,
    group: CollisionGroup,
    collides_with: CollisionGroup,
    flags: ColliderFlags,
}

impl Collider {
    pub(crate) fn new(handle: ColliderHandle, slot: usize, desc: &ColliderDesc) -> Self {
        Self {
            handle,
            slot,
            shape: desc.shape,
            material: desc.material,
            group: desc.group,
            collides_with: desc.collides_with,
            flags: desc.flags,
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn shape(&self) -> CollisionShape {
        self.shape
    }

    pub fn material(&self) -> PhysicsMaterial {
        self.material
    }

    pub fn group(&self) -> CollisionGroup {
        self.group
    }

    pub fn collides_with(&self) -> CollisionGroup {
        self.collides_with
    }

    pub fn flags(&self) -> ColliderFlags {
        self.flags
    }

    pub fn is_sensor(&self) -> bool {
        self.flags.contains(ColliderFlags::SENSOR)
    }

    pub(crate) fn set_material(
        &mut self,
        material: PhysicsMaterial,
        co: &mut rapier2d::prelude::Collider,
    ) {
        self.material = material;
        co.set_friction(material.friction);
        co.set_restitution(material.restitution);
        co.set_density(material.density);
    }

    pub(crate) fn set_groups(
        &mut self,
        group: CollisionGroup,
        collides_with: CollisionGroup,
        co: &mut rapier2d::prelude::Collider,
    ) {
        self.group = group;
        self.collides_with = collides_with;
        co.set_collision_groups(group.to_interaction_groups(collides_with));
    }

    pub(crate) fn set_flags(&mut self, flags: ColliderFlags, co: &mut rapier2d::prelude::Collider) {
        self.flags = flags;
        co.set_sensor(flags.contains(ColliderFlags::SENSOR));
    }

    pub(crate) fn set_shape(
        &mut self,
        shape: CollisionShape,
        co: &mut rapier2d::prelude::Collider,
    ) -> Result<(), PhysicsError> {
        shape.validate()?;
        let (shared, offset) = shape.to_shared_shape();
        self.shape = shape;
        co.set_shape(shared);
        co.set_position_wrt_parent(offset);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_validation() {
        assert!(CollisionShape::circle(0.5).validate().is_ok());
        assert!(CollisionShape::circle(0.0).validate().is_err());
        assert!(CollisionShape::edge(Vec2::ONE, Vec2::ONE).validate().is_err());
        assert!(CollisionShape::cuboid(Vec2::new(1.0, 0.0)).validate().is_err());
        assert!(CollisionShape::circle(f32::NAN).validate().is_err());
    }

    #[test]
    fn test_collider_desc_build() {
        let desc = ColliderDesc::new(
            CollisionShape::cuboid(Vec2::new(1.0, 2.0)),
            CollisionGroup::VEHICLE,
        )
        .material(PhysicsMaterial::new(0.3, 0.1, 2.0));
        let collider = desc.build();

        assert!(!collider.is_sensor());
        assert_eq!(collider.friction(), 0.3);
        assert_eq!(collider.restitution(), 0.1);
        assert!(collider.active_hooks().contains(ActiveHooks::FILTER_CONTACT_PAIRS));
    }

    #[test]
    fn test_box_offset_applied() {
        let shape = CollisionShape::Box {
            center: Vec2::new(0.5, -1.0),
            half_extents: Vec2::ONE,
        };
        let (_, offset) = shape.to_shared_shape();
        assert_eq!(offset.translation.vector.x, 0.5);
        assert_eq!(offset.translation.vector.y, -1.0);
    }

    #[test]
    fn test_sensor_desc() {
        let desc =
            ColliderDesc::new(CollisionShape::circle(1.0), CollisionGroup::PEDESTRIAN).sensor(true);
        assert!(desc.flags.contains(ColliderFlags::SENSOR));
        assert!(desc.build().is_sensor());
    }
}
