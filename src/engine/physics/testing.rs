// Shared fixtures for physics tests

use std::collections::HashMap;
use std::sync::Arc;

use glam::{Vec2, Vec3};

use super::body::{BodyFlags, BodyHandle, BodyMut};
use super::collider::{ColliderDesc, CollisionShape};
use super::collision::CollisionGroup;
use super::contact::{Collision, MapCollision, SensorOverlap};
use super::map::{GridMap, GroundType};
use super::object::{GameObject, ObjectDirectory, ObjectId, ObjectKind};
use super::{PhysicsError, PhysicsSettings, PhysicsWorld};
use crate::core::math::Transform;

/// Scriptable game object that records every callback
#[derive(Debug, Default)]
pub(crate) struct TestObject {
    pub refuses_collisions: bool,
    pub marked_for_deletion: bool,
    pub impact_threshold: Option<f32>,
    /// Velocity written in every `simulation_step`
    pub drive_velocity: Option<Vec2>,
    /// Try to add a collider from inside `simulation_step`
    pub add_collider_in_step: bool,
    pub collider_error: Option<PhysicsError>,
    pub steps: u32,
    pub collisions: Vec<Collision>,
    pub map_collisions: Vec<MapCollision>,
    pub sensor_begins: Vec<SensorOverlap>,
    pub sensor_ends: Vec<SensorOverlap>,
    pub falling_starts: u32,
    pub ground_landings: Vec<f32>,
    pub water_landings: Vec<f32>,
    pub last_transform: Option<Transform>,
}

impl TestObject {
    pub fn refusing_collisions(mut self) -> Self {
        self.refuses_collisions = true;
        self
    }

    pub fn driving(mut self, velocity: Vec2) -> Self {
        self.drive_velocity = Some(velocity);
        self
    }
}

impl GameObject for TestObject {
    fn object_kind(&self) -> ObjectKind {
        ObjectKind::Pedestrian
    }

    fn simulation_step(&mut self, body: &mut BodyMut<'_>) {
        self.steps += 1;
        if let Some(velocity) = self.drive_velocity {
            body.set_linear_velocity(velocity);
        }
        if self.add_collider_in_step {
            if let Err(err) = body.add_collider(7, &circle_desc(0.1)) {
                self.collider_error = Some(err);
            }
        }
    }

    fn handle_collision(&mut self, collision: &Collision) {
        self.collisions.push(*collision);
    }

    fn handle_collision_with_map(&mut self, collision: &MapCollision) {
        self.map_collisions.push(*collision);
    }

    fn handle_sensor_begin(&mut self, overlap: &SensorOverlap) {
        self.sensor_begins.push(*overlap);
    }

    fn handle_sensor_end(&mut self, overlap: &SensorOverlap) {
        self.sensor_ends.push(*overlap);
    }

    fn handle_falling_starts(&mut self) {
        self.falling_starts += 1;
    }

    fn handle_falls_on_ground(&mut self, fall_distance: f32) {
        self.ground_landings.push(fall_distance);
    }

    fn handle_falls_on_water(&mut self, fall_distance: f32) {
        self.water_landings.push(fall_distance);
    }

    fn should_collide(&self, _other: &dyn GameObject) -> bool {
        !self.refuses_collisions
    }

    fn is_marked_for_deletion(&self) -> bool {
        self.marked_for_deletion
    }

    fn impact_effect_threshold(&self) -> Option<f32> {
        self.impact_threshold
    }

    fn sync_transform(&mut self, transform: &Transform) {
        self.last_transform = Some(*transform);
    }
}

/// Directory with concrete access to the test objects
#[derive(Debug, Default)]
pub(crate) struct TestDirectory {
    pub objects: HashMap<ObjectId, TestObject>,
}

impl TestDirectory {
    pub fn with(mut self, id: ObjectId, object: TestObject) -> Self {
        self.objects.insert(id, object);
        self
    }

    pub fn get(&self, id: ObjectId) -> &TestObject {
        &self.objects[&id]
    }
}

impl ObjectDirectory for TestDirectory {
    fn object(&self, id: ObjectId) -> Option<&dyn GameObject> {
        self.objects.get(&id).map(|o| o as &dyn GameObject)
    }

    fn object_mut(&mut self, id: ObjectId) -> Option<&mut dyn GameObject> {
        self.objects.get_mut(&id).map(|o| o as &mut dyn GameObject)
    }
}

pub(crate) fn circle_desc(radius: f32) -> ColliderDesc {
    ColliderDesc::new(CollisionShape::circle(radius), CollisionGroup::PEDESTRIAN)
}

/// 32x32 road map at height zero, default settings
pub(crate) fn flat_world() -> PhysicsWorld {
    world_with_map(GridMap::new(32, 32, 4, 1.0).with_ground(GroundType::Road))
}

pub(crate) fn world_with_map(map: GridMap) -> PhysicsWorld {
    world_with(map, PhysicsSettings::default())
}

pub(crate) fn world_with(map: GridMap, settings: PhysicsSettings) -> PhysicsWorld {
    PhysicsWorld::new(settings, Arc::new(map))
}

/// Dynamic pedestrian-group circle body
pub(crate) fn spawn_circle(
    world: &mut PhysicsWorld,
    object: ObjectId,
    position: Vec3,
    radius: f32,
) -> BodyHandle {
    world
        .create_body_with_collider(
            object,
            Transform::new(position, 0.0),
            &circle_desc(radius),
            BodyFlags::empty(),
        )
        .expect("valid test body")
}
