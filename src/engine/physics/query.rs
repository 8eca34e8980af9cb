use std::collections::HashMap;

use glam::Vec2;
use rapier2d::parry::shape::Cuboid;
use rapier2d::prelude::*;
use slotmap::SlotMap;

use super::body::{BodyHandle, PhysicsBody};
use super::collision::CollisionGroup;
use super::filter::FixtureOwner;
use super::object::ObjectId;
use crate::core::math::{from_point, from_vector, to_point, to_vector};

/// Upper bound on results of a single spatial query
pub const MAX_QUERY_ELEMENTS: usize = 32;

/// A body found by a box query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryElement {
    pub body: BodyHandle,
    pub object: ObjectId,
}

/// A body crossed by a line cast
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinecastHit {
    pub body: BodyHandle,
    pub object: ObjectId,
    /// Entry point in the solver plane
    pub point: Vec2,
    pub normal: Vec2,
}

/// Borrowed world state the queries run against
pub(crate) struct QueryScope<'a> {
    pub(crate) pipeline: &'a QueryPipeline,
    pub(crate) rigid_bodies: &'a RigidBodySet,
    pub(crate) colliders: &'a ColliderSet,
    pub(crate) fixture_owners: &'a HashMap<ColliderHandle, FixtureOwner>,
    pub(crate) bodies: &'a SlotMap<BodyHandle, PhysicsBody>,
}

impl QueryScope<'_> {
    /// Bodies overlapping an axis-aligned box, at most `MAX_QUERY_ELEMENTS`
    pub(crate) fn query_box(
        &self,
        center: Vec2,
        half_extents: Vec2,
        mask: CollisionGroup,
    ) -> Vec<QueryElement> {
        let mut results = Vec::new();
        if half_extents.min_element() <= 0.0 {
            return results;
        }

        let shape = Cuboid::new(to_vector(half_extents));
        let shape_pos = Isometry::translation(center.x, center.y);
        let predicate = |_: ColliderHandle, co: &Collider| matches_mask(co, mask);
        let filter = QueryFilter::new().exclude_sensors().predicate(&predicate);

        self.pipeline.intersections_with_shape(
            self.rigid_bodies,
            self.colliders,
            &shape_pos,
            &shape,
            filter,
            |handle| {
                if let Some(element) = self.element_for(handle) {
                    if !results.iter().any(|e: &QueryElement| e.body == element.body) {
                        results.push(element);
                    }
                }
                results.len() < MAX_QUERY_ELEMENTS
            },
        );
        results
    }

    /// Bodies crossed by the segment from `start` to `end`, in traversal order
    pub(crate) fn query_linecast(
        &self,
        start: Vec2,
        end: Vec2,
        mask: CollisionGroup,
    ) -> Vec<LinecastHit> {
        let mut hits: Vec<LinecastHit> = Vec::new();
        let direction = end - start;
        if direction.length_squared() <= f32::EPSILON {
            return hits;
        }

        // Unit parameter range covers exactly the segment
        let ray = Ray::new(to_point(start), to_vector(direction));
        let predicate = |_: ColliderHandle, co: &Collider| matches_mask(co, mask);
        let filter = QueryFilter::new().exclude_sensors().predicate(&predicate);

        self.pipeline.intersections_with_ray(
            self.rigid_bodies,
            self.colliders,
            &ray,
            1.0,
            true,
            filter,
            |handle, intersection| {
                if let Some(element) = self.element_for(handle) {
                    if !hits.iter().any(|h| h.body == element.body) {
                        hits.push(LinecastHit {
                            body: element.body,
                            object: element.object,
                            point: from_point(&ray.point_at(intersection.time_of_impact)),
                            normal: from_vector(&intersection.normal),
                        });
                    }
                }
                hits.len() < MAX_QUERY_ELEMENTS
            },
        );
        hits
    }

    fn element_for(&self, handle: ColliderHandle) -> Option<QueryElement> {
        match self.fixture_owners.get(&handle)? {
            FixtureOwner::Object { body, .. } => {
                let object = self.bodies.get(*body)?.object;
                Some(QueryElement {
                    body: *body,
                    object,
                })
            }
            FixtureOwner::MapBlock { .. } => None,
        }
    }
}

/// Collider belongs to a group in `mask` and is not map geometry
fn matches_mask(collider: &Collider, mask: CollisionGroup) -> bool {
    let group = CollisionGroup::from_bits_truncate(collider.collision_groups().memberships.bits());
    group.intersects(mask) && !group.intersects(CollisionGroup::QUERY_EXCLUDED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::physics::body::BodyFlags;
    use crate::engine::physics::collider::{ColliderDesc, CollisionShape};
    use crate::engine::physics::testing::{flat_world, spawn_circle, TestObject};
    use crate::engine::physics::object::GameObject;
    use crate::core::math::Transform;
    use glam::Vec3;
    use std::time::Duration;

    fn settle(world: &mut crate::engine::physics::PhysicsWorld) {
        let mut objects: HashMap<ObjectId, Box<dyn GameObject>> = HashMap::new();
        for id in 0..64 {
            objects.insert(id, Box::new(TestObject::default()));
        }
        let step = world.settings().step;
        world.advance_frame(step, &mut objects);
    }

    #[test]
    fn test_query_box_caps_results() {
        let mut world = flat_world();
        for i in 0..40 {
            let x = 2.0 + (i % 8) as f32 * 1.5;
            let z = 2.0 + (i / 8) as f32 * 1.5;
            let handle = spawn_circle(&mut world, i, Vec3::new(x, 0.0, z), 0.4);
            world
                .body_mut(handle)
                .unwrap()
                .change_flags(BodyFlags::STATIC, BodyFlags::empty())
                .unwrap();
        }
        settle(&mut world);

        let found = world.query_box(Vec2::new(8.0, 6.0), Vec2::splat(20.0), CollisionGroup::all());
        assert_eq!(found.len(), MAX_QUERY_ELEMENTS);

        let mut bodies: Vec<_> = found.iter().map(|e| e.body).collect();
        bodies.sort();
        bodies.dedup();
        assert_eq!(bodies.len(), MAX_QUERY_ELEMENTS);
    }

    #[test]
    fn test_query_box_respects_mask() {
        let mut world = flat_world();
        let ped = spawn_circle(&mut world, 1, Vec3::new(5.0, 0.0, 5.0), 0.4);
        let car = world
            .create_body_with_collider(
                2,
                Transform::new(Vec3::new(6.0, 0.0, 5.0), 0.0),
                &ColliderDesc::new(
                    CollisionShape::cuboid(Vec2::new(0.4, 0.8)),
                    CollisionGroup::VEHICLE,
                ),
                BodyFlags::STATIC,
            )
            .unwrap();
        world
            .body_mut(ped)
            .unwrap()
            .change_flags(BodyFlags::STATIC, BodyFlags::empty())
            .unwrap();
        settle(&mut world);

        let cars = world.query_box(Vec2::new(5.5, 5.0), Vec2::splat(2.0), CollisionGroup::VEHICLE);
        assert_eq!(cars.len(), 1);
        assert_eq!(cars[0].body, car);
        assert_eq!(cars[0].object, 2);

        let everything =
            world.query_box(Vec2::new(5.5, 5.0), Vec2::splat(2.0), CollisionGroup::all());
        assert_eq!(everything.len(), 2);
    }

    #[test]
    fn test_linecast_hits() {
        let mut world = flat_world();
        let target = spawn_circle(&mut world, 1, Vec3::new(5.0, 0.0, 5.0), 0.5);
        world
            .body_mut(target)
            .unwrap()
            .change_flags(BodyFlags::STATIC, BodyFlags::empty())
            .unwrap();
        settle(&mut world);

        let hits = world.query_linecast(
            Vec2::new(1.0, 5.0),
            Vec2::new(9.0, 5.0),
            CollisionGroup::PEDESTRIAN,
        );
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].body, target);
        assert!((hits[0].point.x - 4.5).abs() < 1e-3);
        assert!(hits[0].normal.x < 0.0);

        let short = world.query_linecast(
            Vec2::new(1.0, 5.0),
            Vec2::new(3.0, 5.0),
            CollisionGroup::PEDESTRIAN,
        );
        assert!(short.is_empty());

        let masked = world.query_linecast(
            Vec2::new(1.0, 5.0),
            Vec2::new(9.0, 5.0),
            CollisionGroup::VEHICLE,
        );
        assert!(masked.is_empty());
    }

    #[test]
    fn test_zero_length_linecast() {
        let world = flat_world();
        let hits = world.query_linecast(Vec2::ONE, Vec2::ONE, CollisionGroup::all());
        assert!(hits.is_empty());
    }
}
