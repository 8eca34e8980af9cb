// Physics system using rapier2d
//
// Planar rigid-body simulation in the (x, z) plane with a separate vertical
// gravity model, map collision shape, contact filtering and spatial queries.

pub mod body;
pub mod collider;
pub mod collision;
pub mod contact;
mod filter;
pub mod height;
pub mod map;
pub mod object;
pub mod query;
pub mod settings;
mod world;

#[cfg(test)]
mod testing;

pub use body::{BodyFlags, BodyHandle, BodyMut, BodyRef, HeightState, PhysicsBody};
pub use collider::{Collider, ColliderDesc, ColliderFlags, CollisionShape, PhysicsMaterial};
pub use collision::{
    CollisionEvent, CollisionEventQueue, CollisionGroup, ImpactEffect, ManifoldPoint,
    ManifoldSnapshot,
};
pub use contact::{
    ColliderRef, Collision, Contact, ContactPoint, MapCollision, SensorOverlap,
};
pub use filter::ContactVerdict;
pub use map::{GridMap, GroundType, MapBlockInfo, MapData, MapDimensions};
pub use object::{GameObject, ObjectDirectory, ObjectId, ObjectKind};
pub use query::{LinecastHit, QueryElement, MAX_QUERY_ELEMENTS};
pub use settings::PhysicsSettings;
pub use world::PhysicsWorld;

/// Physics world errors
#[derive(Debug, thiserror::Error)]
pub enum PhysicsError {
    #[error("World cannot be modified during a simulation step")]
    StepInProgress,

    #[error("Body does not exist")]
    InvalidBody,

    #[error("Collider slot already occupied: {0}")]
    SlotOccupied(usize),

    #[error("Collider slot is empty: {0}")]
    SlotEmpty(usize),

    #[error("Conflicting body flags: {0:?}")]
    ConflictingFlags(BodyFlags),

    #[error("Attachment would create a cycle")]
    AttachmentCycle,

    #[error("Invalid collision shape: {0}")]
    InvalidShape(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_physics_error_display() {
        let err = PhysicsError::SlotOccupied(3);
        assert_eq!(err.to_string(), "Collider slot already occupied: 3");

        let err = PhysicsError::InvalidShape("negative radius".to_string());
        assert_eq!(err.to_string(), "Invalid collision shape: negative radius");
    }
}
