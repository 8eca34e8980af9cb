use std::collections::HashMap;

use super::body::BodyMut;
use super::contact::{Collision, MapCollision, SensorOverlap};
use crate::core::math::Transform;

/// Unique identifier of a game object owning a physics body
pub type ObjectId = u64;

/// Coarse object category used by collision rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Pedestrian,
    Vehicle,
    Projectile,
    Obstacle,
    Decoration,
}

/// Callbacks the physics world invokes on the owner of a body
///
/// Every hook except `object_kind` has a no-op default so objects only
/// implement what they react to.
pub trait GameObject: Send + Sync {
    fn object_kind(&self) -> ObjectKind;

    /// Called once per fixed step before the solver runs
    fn simulation_step(&mut self, _body: &mut BodyMut<'_>) {}

    /// Physically resolved contact with another object
    fn handle_collision(&mut self, _collision: &Collision) {}

    /// Physically resolved contact with a solid map block
    fn handle_collision_with_map(&mut self, _collision: &MapCollision) {}

    /// A sensor started overlapping another object's collider
    fn handle_sensor_begin(&mut self, _overlap: &SensorOverlap) {}

    /// A previously reported sensor overlap ended
    fn handle_sensor_end(&mut self, _overlap: &SensorOverlap) {}

    fn handle_falling_starts(&mut self) {}

    fn handle_falls_on_ground(&mut self, _fall_distance: f32) {}

    fn handle_falls_on_water(&mut self, _fall_distance: f32) {}

    /// Whether contacts with `other` should push the bodies apart
    ///
    /// Both sides must agree. A vetoed pair is still reported as touching.
    fn should_collide(&self, _other: &dyn GameObject) -> bool {
        true
    }

    /// Objects marked for deletion are ignored by contact filtering
    fn is_marked_for_deletion(&self) -> bool {
        false
    }

    /// Impulse above which an impact effect is spawned, `None` disables effects
    fn impact_effect_threshold(&self) -> Option<f32> {
        None
    }

    /// Latest simulated pose of the body, after every fixed step
    fn sync_transform(&mut self, _transform: &Transform) {}
}

/// Resolves object ids to game objects
pub trait ObjectDirectory: Send + Sync {
    fn object(&self, id: ObjectId) -> Option<&dyn GameObject>;

    fn object_mut(&mut self, id: ObjectId) -> Option<&mut dyn GameObject>;
}

impl ObjectDirectory for HashMap<ObjectId, Box<dyn GameObject>> {
    fn object(&self, id: ObjectId) -> Option<&dyn GameObject> {
        self.get(&id).map(|object| object.as_ref())
    }

    fn object_mut(&mut self, id: ObjectId) -> Option<&mut dyn GameObject> {
        match self.get_mut(&id) {
            Some(object) => Some(object.as_mut()),
            None => None,
        }
    }
}
