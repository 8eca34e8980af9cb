// Sample game objects driven by the physics world

use glam::{Vec2, Vec3};

use crate::core::math::Transform;
use crate::engine::physics::{
    BodyFlags, BodyHandle, BodyMut, ColliderDesc, Collision, CollisionGroup, CollisionShape,
    GameObject, MapCollision, ObjectId, ObjectKind, PhysicsError, PhysicsMaterial, PhysicsWorld,
};

/// Falls shorter than this do not hurt
const SAFE_FALL_DISTANCE: f32 = 2.0;

/// Health lost per unit of fall distance above the safe distance
const FALL_DAMAGE_PER_UNIT: f32 = 25.0;

/// A walking person
#[derive(Debug)]
pub struct Pedestrian {
    /// Unique identifier
    pub id: ObjectId,
    /// Physics body, set once spawned
    pub body: Option<BodyHandle>,
    /// Desired walking direction in the (x, z) plane
    pub walk_direction: Vec2,
    /// Walking speed in units per second
    pub walk_speed: f32,
    pub health: f32,
    /// Impulse a vehicle hit needs to hurt
    pub knockdown_impulse: f32,
    pub is_falling: bool,
    pub is_drowning: bool,
    /// Last simulated pose
    pub transform: Transform,
}

impl Pedestrian {
    pub fn new(id: ObjectId) -> Self {
        Self {
            id,
            body: None,
            walk_direction: Vec2::ZERO,
            walk_speed: 1.4,
            health: 100.0,
            knockdown_impulse: 2.0,
            is_falling: false,
            is_drowning: false,
            transform: Transform::IDENTITY,
        }
    }

    /// Create the pedestrian's body at `position`
    pub fn spawn(
        &mut self,
        world: &mut PhysicsWorld,
        position: Vec3,
    ) -> Result<BodyHandle, PhysicsError> {
        let desc = ColliderDesc::new(CollisionShape::circle(0.25), CollisionGroup::PEDESTRIAN)
            .material(PhysicsMaterial::new(0.3, 0.0, 1.0));
        let handle = world.create_body_with_collider(
            self.id,
            Transform::new(position, 0.0),
            &desc,
            BodyFlags::FIX_ROTATION,
        )?;
        self.body = Some(handle);
        self.transform = Transform::new(position, 0.0);
        Ok(handle)
    }

    pub fn is_dead(&self) -> bool {
        self.health <= 0.0
    }
}

impl GameObject for Pedestrian {
    fn object_kind(&self) -> ObjectKind {
        ObjectKind::Pedestrian
    }

    fn simulation_step(&mut self, body: &mut BodyMut<'_>) {
        if self.is_dead() || self.is_falling || self.is_drowning {
            body.set_linear_velocity(Vec2::ZERO);
            return;
        }
        body.set_linear_velocity(self.walk_direction * self.walk_speed);
        body.set_sign_vector(self.walk_direction);
    }

    fn handle_collision(&mut self, collision: &Collision) {
        let other = collision.contact.that_collider();
        let from_vehicle = other.group.contains(CollisionGroup::VEHICLE);
        if from_vehicle && collision.impulse > self.knockdown_impulse {
            self.health -= collision.impulse * 10.0;
            log::debug!(
                "Pedestrian {} hit by vehicle, impulse {:.2}",
                self.id,
                collision.impulse
            );
        }
    }

    fn handle_falling_starts(&mut self) {
        self.is_falling = true;
    }

    fn handle_falls_on_ground(&mut self, fall_distance: f32) {
        self.is_falling = false;
        if fall_distance > SAFE_FALL_DISTANCE {
            self.health -= (fall_distance - SAFE_FALL_DISTANCE) * FALL_DAMAGE_PER_UNIT;
        }
    }

    fn handle_falls_on_water(&mut self, _fall_distance: f32) {
        self.is_falling = false;
        self.is_drowning = true;
    }

    fn should_collide(&self, other: &dyn GameObject) -> bool {
        other.object_kind() != ObjectKind::Decoration
    }

    fn is_marked_for_deletion(&self) -> bool {
        self.is_dead()
    }

    fn sync_transform(&mut self, transform: &Transform) {
        self.transform = *transform;
    }
}

/// A car with a simple engine and tyre model
#[derive(Debug)]
pub struct Vehicle {
    /// Unique identifier
    pub id: ObjectId,
    /// Physics body, set once spawned
    pub body: Option<BodyHandle>,
    /// Engine input in [-1, 1]
    pub throttle: f32,
    /// Steering input in [-1, 1]
    pub steering: f32,
    pub engine_force: f32,
    pub steering_torque: f32,
    /// Fraction of sideways velocity removed each step
    pub grip: f32,
    /// Accumulated crash impulse
    pub damage: f32,
    pub transform: Transform,
}

impl Vehicle {
    pub fn new(id: ObjectId) -> Self {
        Self {
            id,
            body: None,
            throttle: 0.0,
            steering: 0.0,
            engine_force: 4000.0,
            steering_torque: 1500.0,
            grip: 0.8,
            damage: 0.0,
            transform: Transform::IDENTITY,
        }
    }

    /// Create the vehicle's body at `position`, heading along `orientation`
    pub fn spawn(
        &mut self,
        world: &mut PhysicsWorld,
        position: Vec3,
        orientation: f32,
    ) -> Result<BodyHandle, PhysicsError> {
        // Long axis along the heading
        let desc = ColliderDesc::new(
            CollisionShape::cuboid(Vec2::new(2.2, 0.9)),
            CollisionGroup::VEHICLE,
        )
        .material(PhysicsMaterial::new(0.6, 0.1, 150.0));
        let transform = Transform::new(position, orientation);
        let handle =
            world.create_body_with_collider(self.id, transform, &desc, BodyFlags::empty())?;
        self.body = Some(handle);
        self.transform = transform;
        Ok(handle)
    }
}

impl GameObject for Vehicle {
    fn object_kind(&self) -> ObjectKind {
        ObjectKind::Vehicle
    }

    fn simulation_step(&mut self, body: &mut BodyMut<'_>) {
        let (heading, velocity, mass) = {
            let view = body.view();
            (view.sign_vector(), view.linear_velocity(), view.mass())
        };

        let sideways = velocity - heading * velocity.dot(heading);
        body.apply_linear_impulse(-sideways * self.grip * mass);
        body.apply_force(heading * self.throttle.clamp(-1.0, 1.0) * self.engine_force);
        body.apply_torque(self.steering.clamp(-1.0, 1.0) * self.steering_torque);
    }

    fn handle_collision(&mut self, collision: &Collision) {
        self.damage += collision.impulse;
    }

    fn handle_collision_with_map(&mut self, collision: &MapCollision) {
        self.damage += collision.impulse;
        log::debug!(
            "Vehicle {} hit block ({}, {}), impulse {:.2}",
            self.id,
            collision.block_x,
            collision.block_z,
            collision.impulse
        );
    }

    fn impact_effect_threshold(&self) -> Option<f32> {
        Some(500.0)
    }

    fn sync_transform(&mut self, transform: &Transform) {
        self.transform = *transform;
    }
}

/// A fast bullet that hits the first object it touches
///
/// Projectiles never push other bodies; hits are read from the touching
/// contacts of the previous step.
#[derive(Debug)]
pub struct Projectile {
    pub id: ObjectId,
    pub body: Option<BodyHandle>,
    /// Object that fired the projectile, never hit
    pub owner: Option<ObjectId>,
    pub velocity: Vec2,
    /// Steps left before the projectile expires
    pub lifetime_steps: u32,
    /// Object hit, if any
    pub hit: Option<ObjectId>,
    pub transform: Transform,
}

impl Projectile {
    pub fn new(id: ObjectId, owner: Option<ObjectId>, velocity: Vec2) -> Self {
        Self {
            id,
            body: None,
            owner,
            velocity,
            lifetime_steps: 120,
            hit: None,
            transform: Transform::IDENTITY,
        }
    }

    pub fn spawn(
        &mut self,
        world: &mut PhysicsWorld,
        position: Vec3,
    ) -> Result<BodyHandle, PhysicsError> {
        let desc = ColliderDesc::new(CollisionShape::circle(0.05), CollisionGroup::PROJECTILE)
            .collides_with(CollisionGroup::PEDESTRIAN | CollisionGroup::VEHICLE);
        let handle = world.create_body_with_collider(
            self.id,
            Transform::new(position, self.velocity.y.atan2(self.velocity.x)),
            &desc,
            BodyFlags::NO_GRAVITY | BodyFlags::FIX_ROTATION,
        )?;
        self.body = Some(handle);
        Ok(handle)
    }

    pub fn is_expired(&self) -> bool {
        self.hit.is_some() || self.lifetime_steps == 0
    }
}

impl GameObject for Projectile {
    fn object_kind(&self) -> ObjectKind {
        ObjectKind::Projectile
    }

    fn simulation_step(&mut self, body: &mut BodyMut<'_>) {
        if self.is_expired() {
            return;
        }

        self.hit = body
            .contacts()
            .iter()
            .map(|contact| contact.that_collider().object)
            .find(|object| Some(*object) != self.owner);
        if let Some(object) = self.hit {
            log::debug!("Projectile {} hit object {}", self.id, object);
            body.set_linear_velocity(Vec2::ZERO);
            return;
        }

        self.lifetime_steps -= 1;
        body.set_linear_velocity(self.velocity);
    }

    fn handle_falls_on_ground(&mut self, _fall_distance: f32) {
        self.lifetime_steps = 0;
    }

    fn should_collide(&self, _other: &dyn GameObject) -> bool {
        false
    }

    fn is_marked_for_deletion(&self) -> bool {
        self.is_expired()
    }

    fn sync_transform(&mut self, transform: &Transform) {
        self.transform = *transform;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::physics::{GridMap, GroundType, ObjectDirectory, PhysicsSettings};
    use approx::assert_relative_eq;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn city() -> PhysicsWorld {
        let map = GridMap::new(32, 32, 3, 1.0).with_ground(GroundType::Road);
        PhysicsWorld::new(PhysicsSettings::default(), Arc::new(map))
    }

    fn run(world: &mut PhysicsWorld, objects: &mut dyn ObjectDirectory, steps: u32) {
        let step = world.settings().step;
        for _ in 0..steps {
            world.advance_frame(step, objects);
        }
    }

    #[test]
    fn test_pedestrian_walks() {
        let mut world = city();
        let mut walker = Pedestrian::new(1);
        walker.walk_direction = Vec2::X;
        let handle = walker.spawn(&mut world, Vec3::new(5.0, 0.0, 5.0)).unwrap();

        let mut objects: HashMap<ObjectId, Box<dyn GameObject>> = HashMap::new();
        objects.insert(1, Box::new(walker));
        run(&mut world, &mut objects, 60);

        let body = world.body(handle).unwrap();
        assert_relative_eq!(body.position().x, 5.0 + 1.4, epsilon = 0.05);
        assert_relative_eq!(body.position().z, 5.0, epsilon = 1e-3);
    }

    #[test]
    fn test_pedestrian_fall_damage() {
        let mut walker = Pedestrian::new(1);
        walker.handle_falling_starts();
        assert!(walker.is_falling);

        walker.handle_falls_on_ground(4.0);
        assert!(!walker.is_falling);
        assert_relative_eq!(walker.health, 50.0);

        walker.handle_falls_on_ground(1.0);
        assert_relative_eq!(walker.health, 50.0);

        walker.handle_falls_on_ground(6.0);
        assert!(walker.is_dead());
        assert!(walker.is_marked_for_deletion());
    }

    #[test]
    fn test_vehicle_drives_forward() {
        let mut world = city();
        let mut car = Vehicle::new(1);
        car.throttle = 1.0;
        let handle = car.spawn(&mut world, Vec3::new(5.0, 0.0, 16.0), 0.0).unwrap();

        let mut objects: HashMap<ObjectId, Box<dyn GameObject>> = HashMap::new();
        objects.insert(1, Box::new(car));
        run(&mut world, &mut objects, 60);

        let body = world.body(handle).unwrap();
        assert!(body.position().x > 5.0);
        assert!(body.linear_velocity().x > 0.0);
        assert_relative_eq!(body.position().z, 16.0, epsilon = 1e-2);
    }

    #[test]
    fn test_projectile_hits_target_without_pushing() {
        let mut world = city();
        let mut target = Pedestrian::new(1);
        let target_handle = target.spawn(&mut world, Vec3::new(10.0, 0.0, 5.0)).unwrap();
        let mut bullet = Projectile::new(2, Some(3), Vec2::new(30.0, 0.0));
        bullet.spawn(&mut world, Vec3::new(8.1, 0.0, 5.0)).unwrap();

        let mut objects: HashMap<ObjectId, Box<dyn GameObject>> = HashMap::new();
        objects.insert(1, Box::new(target));
        objects.insert(2, Box::new(bullet));
        run(&mut world, &mut objects, 20);

        assert!(objects.object(2).unwrap().is_marked_for_deletion());
        assert!(!objects.object(1).unwrap().is_marked_for_deletion());
        let target_body = world.body(target_handle).unwrap();
        assert_relative_eq!(target_body.position().x, 10.0, epsilon = 1e-4);
    }

    #[test]
    fn test_projectile_ignores_owner() {
        let mut bullet = Projectile::new(2, Some(1), Vec2::X);
        assert!(!bullet.should_collide(&Pedestrian::new(1)));
        bullet.handle_falls_on_ground(0.5);
        assert!(bullet.is_expired());
    }
}
