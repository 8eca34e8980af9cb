use glam::Vec2;

use super::body::BodyHandle;
use super::collision::CollisionGroup;
use super::map::MapBlockInfo;
use super::object::ObjectId;

/// Maximum number of points reported per contact
pub const MAX_CONTACT_POINTS: usize = 2;

/// Identifies one collider of one body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColliderRef {
    pub body: BodyHandle,
    pub object: ObjectId,
    pub slot: usize,
    pub group: CollisionGroup,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ContactPoint {
    /// World position in the solver plane
    pub position: Vec2,
    /// Points from "this" collider towards "that" collider
    pub normal: Vec2,
    /// Height of the "this" body
    pub position_y: f32,
    /// Negative when penetrating
    pub separation: f32,
    /// Velocity of "this" body relative to "that" body at the point
    pub relative_velocity: Vec2,
}

/// A pairing between two colliders seen from one side
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    this: ColliderRef,
    that: ColliderRef,
    points: [ContactPoint; MAX_CONTACT_POINTS],
    point_count: usize,
}

impl Contact {
    /// Points past `MAX_CONTACT_POINTS` are dropped
    pub fn new(this: ColliderRef, that: ColliderRef, points: &[ContactPoint]) -> Self {
        let mut contact = Self {
            this,
            that,
            points: [ContactPoint::default(); MAX_CONTACT_POINTS],
            point_count: points.len().min(MAX_CONTACT_POINTS),
        };
        contact.points[..contact.point_count].copy_from_slice(&points[..contact.point_count]);
        contact
    }

    pub fn this_collider(&self) -> &ColliderRef {
        &self.this
    }

    pub fn that_collider(&self) -> &ColliderRef {
        &self.that
    }

    pub fn points(&self) -> &[ContactPoint] {
        &self.points[..self.point_count]
    }

    pub fn point(&self, index: usize) -> Option<&ContactPoint> {
        self.points().get(index)
    }

    pub fn has_contact_points(&self) -> bool {
        self.point_count > 0
    }

    /// Same contact seen from "that" side, whose body sits at `that_y`
    pub fn swapped(&self, that_y: f32) -> Self {
        let mut swapped = Self {
            this: self.that,
            that: self.this,
            ..*self
        };
        for point in &mut swapped.points[..swapped.point_count] {
            point.normal = -point.normal;
            point.relative_velocity = -point.relative_velocity;
            point.position_y = that_y;
        }
        swapped
    }

    /// Whether the other side of this contact belongs to `object`
    pub fn involves_object(&self, object: ObjectId) -> bool {
        self.that.object == object
    }
}

/// Physically resolved contact between two objects, delivered once per side
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Collision {
    pub contact: Contact,
    /// Sum of the normal impulses over all points
    pub impulse: f32,
}

/// Physically resolved contact between an object and a map block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapCollision {
    pub collider: ColliderRef,
    pub block: MapBlockInfo,
    pub block_x: i32,
    pub block_z: i32,
    points: [ContactPoint; MAX_CONTACT_POINTS],
    point_count: usize,
    pub impulse: f32,
}

impl MapCollision {
    pub fn new(
        collider: ColliderRef,
        block: MapBlockInfo,
        block_x: i32,
        block_z: i32,
        points: &[ContactPoint],
        impulse: f32,
    ) -> Self {
        let point_count = points.len().min(MAX_CONTACT_POINTS);
        let mut stored = [ContactPoint::default(); MAX_CONTACT_POINTS];
        stored[..point_count].copy_from_slice(&points[..point_count]);
        Self {
            collider,
            block,
            block_x,
            block_z,
            points: stored,
            point_count,
            impulse,
        }
    }

    pub fn points(&self) -> &[ContactPoint] {
        &self.points[..self.point_count]
    }

    pub fn has_contact_points(&self) -> bool {
        self.point_count > 0
    }
}

/// Overlap between a sensor collider and a solid collider of another object
///
/// Delivered to both owners with the same orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SensorOverlap {
    pub sensor: ColliderRef,
    pub other: ColliderRef,
}

impl SensorOverlap {
    /// The collider of `object` taking part in the overlap
    pub fn collider_of(&self, object: ObjectId) -> Option<&ColliderRef> {
        if self.sensor.object == object {
            Some(&self.sensor)
        } else if self.other.object == object {
            Some(&self.other)
        } else {
            None
        }
    }
}
