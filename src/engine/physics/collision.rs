use bitflags::bitflags;
use glam::Vec2;
use rapier2d::prelude::{Group, InteractionGroups};

use super::contact::{ColliderRef, MAX_CONTACT_POINTS};
use super::map::MapBlockInfo;

bitflags! {
    /// Collision categories for filtering what objects can collide with each other
    ///
    /// A collider belongs to one or more groups and carries a separate mask of
    /// the groups it collides with. Two colliders interact only when each one's
    /// group intersects the other's mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CollisionGroup: u32 {
        /// Solid city blocks
        const MAP_BLOCK = 0b0000_0001;

        /// Free-standing walls and fences
        const WALL = 0b0000_0010;

        /// Pedestrians
        const PEDESTRIAN = 0b0000_0100;

        /// Cars, trucks, trams
        const VEHICLE = 0b0000_1000;

        /// Movable map objects (bins, crates, barrels)
        const OBSTACLE = 0b0001_0000;

        /// Bullets, rockets, thrown items
        const PROJECTILE = 0b0010_0000;

        /// Purely visual debris, never blocks anything
        const DECORATION = 0b0100_0000;
    }
}

impl CollisionGroup {
    /// Groups that spatial queries never report
    pub const QUERY_EXCLUDED: Self = Self::MAP_BLOCK.union(Self::WALL);

    /// Reasonable collides-with mask for a collider of this group
    pub fn default_mask(self) -> Self {
        if self.contains(Self::DECORATION) {
            // Decoration only rests on the map
            return Self::MAP_BLOCK | Self::WALL;
        }
        if self.contains(Self::PROJECTILE) {
            // Projectiles pass through each other
            return Self::all() - Self::PROJECTILE - Self::DECORATION;
        }
        Self::all() - Self::DECORATION
    }

    /// Convert to rapier2d's InteractionGroups
    pub fn to_interaction_groups(self, collides_with: CollisionGroup) -> InteractionGroups {
        InteractionGroups::new(
            Group::from_bits_truncate(self.bits()),
            Group::from_bits_truncate(collides_with.bits()),
        )
    }
}

/// Contact geometry copied out of the solver after a step
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ManifoldSnapshot {
    /// World normal pointing from the first collider to the second
    pub normal: Vec2,
    pub points: [ManifoldPoint; MAX_CONTACT_POINTS],
    pub point_count: usize,
}

impl ManifoldSnapshot {
    pub fn points(&self) -> &[ManifoldPoint] {
        &self.points[..self.point_count]
    }

    /// Append a point, silently ignoring points past the limit
    pub(crate) fn push(&mut self, point: ManifoldPoint) {
        if self.point_count < MAX_CONTACT_POINTS {
            self.points[self.point_count] = point;
            self.point_count += 1;
        }
    }

    /// Same manifold seen from the second collider
    pub fn flipped(&self) -> Self {
        Self {
            normal: -self.normal,
            ..*self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ManifoldPoint {
    /// World position in the solver plane
    pub position: Vec2,
    /// Negative when penetrating
    pub separation: f32,
}

/// A physically resolved contact recorded after the solver step
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CollisionEvent {
    /// Two object colliders pushed each other
    Objects {
        collider_a: ColliderRef,
        collider_b: ColliderRef,
        impulse: f32,
        manifold: ManifoldSnapshot,
    },

    /// An object collider hit a solid map block column
    Map {
        collider: ColliderRef,
        /// Block at the layer the contact was filtered on
        block: MapBlockInfo,
        block_x: i32,
        block_z: i32,
        impulse: f32,
        /// Normal points from the object into the map
        manifold: ManifoldSnapshot,
    },
}

impl CollisionEvent {
    /// Sum of the normal impulses the solver applied
    pub fn impulse(&self) -> f32 {
        match self {
            CollisionEvent::Objects { impulse, .. } | CollisionEvent::Map { impulse, .. } => {
                *impulse
            }
        }
    }
}

/// Queue for storing collision events between collection and dispatch
#[derive(Debug)]
pub struct CollisionEventQueue {
    events: Vec<CollisionEvent>,
}

impl CollisionEventQueue {
    pub fn new() -> Self {
        Self {
            events: Vec::with_capacity(32), // Pre-allocate for common case
        }
    }

    /// Add a collision event
    pub(crate) fn push(&mut self, event: CollisionEvent) {
        self.events.push(event);
    }

    /// Take every queued event, leaving the queue empty
    pub(crate) fn drain(&mut self) -> std::vec::Drain<'_, CollisionEvent> {
        self.events.drain(..)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl Default for CollisionEventQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Visual effect request for a hard impact (sparks, dust)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpactEffect {
    /// World position in the solver plane
    pub position: Vec2,
    /// Height of the impact
    pub position_y: f32,
    pub normal: Vec2,
    pub impulse: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collision_group_bits() {
        // Ensure each group has a unique bit
        let groups: Vec<CollisionGroup> = CollisionGroup::all().iter().collect();
        assert_eq!(groups.len(), 7);

        for (i, group1) in groups.iter().enumerate() {
            assert_eq!(group1.bits().count_ones(), 1);
            for (j, group2) in groups.iter().enumerate() {
                if i != j {
                    assert!(
                        !group1.intersects(*group2),
                        "Groups must have unique bits"
                    );
                }
            }
        }
    }

    #[test]
    fn test_projectile_ignores_projectile() {
        let mask = CollisionGroup::PROJECTILE.default_mask();
        assert!(!mask.contains(CollisionGroup::PROJECTILE));
        assert!(mask.contains(CollisionGroup::PEDESTRIAN));
    }

    #[test]
    fn test_interaction_groups_bits() {
        let groups = CollisionGroup::VEHICLE
            .to_interaction_groups(CollisionGroup::PEDESTRIAN | CollisionGroup::MAP_BLOCK);

        assert_eq!(groups.memberships.bits(), CollisionGroup::VEHICLE.bits());
        assert!(groups.filter.contains(Group::from_bits_truncate(
            CollisionGroup::PEDESTRIAN.bits()
        )));
        assert!(!groups.filter.contains(Group::from_bits_truncate(
            CollisionGroup::VEHICLE.bits()
        )));
    }

    #[test]
    fn test_manifold_push_caps_points() {
        let mut manifold = ManifoldSnapshot::default();
        for i in 0..4 {
            manifold.push(ManifoldPoint {
                position: Vec2::splat(i as f32),
                separation: -0.1,
            });
        }
        assert_eq!(manifold.points().len(), MAX_CONTACT_POINTS);
        assert_eq!(manifold.flipped().normal, -manifold.normal);
    }
}
