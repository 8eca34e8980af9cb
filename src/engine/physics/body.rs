use std::collections::HashMap;
use std::ops::Deref;

use bitflags::bitflags;
use glam::{Vec2, Vec3};
use rapier2d::prelude::*;
use slotmap::new_key_type;

use super::collider::{Collider, ColliderDesc, ColliderFlags, CollisionShape, PhysicsMaterial};
use super::collision::CollisionGroup;
use super::contact::Contact;
use super::filter::FixtureOwner;
use super::object::ObjectId;
use super::PhysicsError;
use crate::core::math::{from_point, from_vector, to_point, to_vector, Transform};

new_key_type! {
    /// Handle to a body in the physics world
    pub struct BodyHandle;
}

bitflags! {
    /// Body-level behaviour switches
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BodyFlags: u32 {
        /// Never moves
        const STATIC = 1 << 0;
        /// Moved by code or by a parent body, not by forces
        const LINKED = 1 << 1;
        /// Excluded from simulation and contacts
        const DISABLED = 1 << 2;
        /// Ignores vertical gravity
        const NO_GRAVITY = 1 << 3;
        /// Rotation is locked
        const FIX_ROTATION = 1 << 4;
        /// Continuous collision detection for fast movers
        const BULLET = 1 << 5;
    }
}

impl BodyFlags {
    pub(crate) fn validate(self) -> Result<(), PhysicsError> {
        if self.contains(BodyFlags::STATIC | BodyFlags::LINKED) {
            return Err(PhysicsError::ConflictingFlags(self));
        }
        Ok(())
    }

    /// Solver motion type; linked wins over static
    pub(crate) fn body_type(self) -> RigidBodyType {
        if self.contains(BodyFlags::LINKED) {
            RigidBodyType::KinematicPositionBased
        } else if self.contains(BodyFlags::STATIC) {
            RigidBodyType::Fixed
        } else {
            RigidBodyType::Dynamic
        }
    }
}

/// Vertical state of a body
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum HeightState {
    #[default]
    Grounded,
    Falling {
        start_height: f32,
    },
    /// Landed in water; stays until gameplay clears it
    WaterContact,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Attachment {
    pub(crate) parent: BodyHandle,
    /// Pose relative to the parent
    pub(crate) local: Transform,
    /// Flags to restore on detach
    pub(crate) restore_flags: BodyFlags,
}

/// Physics state of one game object
#[derive(Debug)]
pub struct PhysicsBody {
    pub(crate) object: ObjectId,
    pub(crate) rigid_body: RigidBodyHandle,
    /// Sparse, indexed by slot
    pub(crate) colliders: Vec<Option<Collider>>,
    pub(crate) flags: BodyFlags,
    pub(crate) attachment: Option<Attachment>,
    pub(crate) children: Vec<BodyHandle>,
    pub(crate) position_y: f32,
    pub(crate) height_state: HeightState,
    /// Touching contacts of the current step
    pub(crate) contacts: Vec<Contact>,
    pub(crate) transform: Transform,
    pub(crate) smooth_transform: Transform,
}

impl PhysicsBody {
    pub(crate) fn new(
        object: ObjectId,
        rigid_body: RigidBodyHandle,
        transform: Transform,
        flags: BodyFlags,
    ) -> Self {
        Self {
            object,
            rigid_body,
            colliders: Vec::new(),
            flags,
            attachment: None,
            children: Vec::new(),
            position_y: transform.position.y,
            height_state: HeightState::Grounded,
            contacts: Vec::new(),
            transform,
            smooth_transform: transform,
        }
    }

    /// Build the solver body for the given pose and flags
    pub(crate) fn build_rigid_body(transform: &Transform, flags: BodyFlags) -> RigidBody {
        let mut locked_axes = LockedAxes::empty();
        if flags.contains(BodyFlags::FIX_ROTATION) {
            locked_axes = LockedAxes::ROTATION_LOCKED;
        }

        RigidBodyBuilder::new(flags.body_type())
            .position(transform.to_isometry())
            .locked_axes(locked_axes)
            .ccd_enabled(flags.contains(BodyFlags::BULLET))
            .enabled(!flags.contains(BodyFlags::DISABLED))
            .build()
    }

    /// Id of the owning game object
    pub fn object(&self) -> ObjectId {
        self.object
    }

    pub fn flags(&self) -> BodyFlags {
        self.flags
    }

    pub fn is_disabled(&self) -> bool {
        self.flags.contains(BodyFlags::DISABLED)
    }

    /// Vertical coordinate
    pub fn position_y(&self) -> f32 {
        self.position_y
    }

    pub fn height_state(&self) -> HeightState {
        self.height_state
    }

    pub fn is_falling(&self) -> bool {
        matches!(self.height_state, HeightState::Falling { .. })
    }

    pub fn has_water_contact(&self) -> bool {
        self.height_state == HeightState::WaterContact
    }

    /// Collider in `slot`, if any
    pub fn collider(&self, slot: usize) -> Option<&Collider> {
        self.colliders.get(slot).and_then(|c| c.as_ref())
    }

    /// All colliders in slot order
    pub fn colliders(&self) -> impl Iterator<Item = &Collider> {
        self.colliders.iter().flatten()
    }

    pub fn collider_count(&self) -> usize {
        self.colliders().count()
    }

    /// Non-physical contacts recorded during the last step
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    /// Whether this body touched any collider of `object` during the last step
    pub fn is_touching(&self, object: ObjectId) -> bool {
        self.contacts.iter().any(|c| c.involves_object(object))
    }

    pub fn is_attached(&self) -> bool {
        self.attachment.is_some()
    }

    pub fn parent(&self) -> Option<BodyHandle> {
        self.attachment.map(|a| a.parent)
    }

    pub fn children(&self) -> &[BodyHandle] {
        &self.children
    }

    /// Pose after the last completed step
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Pose extrapolated to the current render time
    pub fn smooth_transform(&self) -> &Transform {
        &self.smooth_transform
    }
}

/// Read access to a body together with its solver state
#[derive(Clone, Copy)]
pub struct BodyRef<'w> {
    handle: BodyHandle,
    body: &'w PhysicsBody,
    rigid_body: &'w RigidBody,
}

impl<'w> BodyRef<'w> {
    pub(crate) fn new(
        handle: BodyHandle,
        body: &'w PhysicsBody,
        rigid_body: &'w RigidBody,
    ) -> Self {
        Self {
            handle,
            body,
            rigid_body,
        }
    }

    pub fn handle(&self) -> BodyHandle {
        self.handle
    }

    /// Current position, solver plane plus vertical coordinate
    pub fn position(&self) -> Vec3 {
        let planar = self.planar_position();
        Vec3::new(planar.x, self.body.position_y, planar.y)
    }

    pub fn planar_position(&self) -> Vec2 {
        from_vector(self.rigid_body.translation())
    }

    pub fn orientation(&self) -> f32 {
        self.rigid_body.rotation().angle()
    }

    /// Unit heading vector, (cos, sin) of the orientation
    pub fn sign_vector(&self) -> Vec2 {
        Vec2::from_angle(self.orientation())
    }

    pub fn linear_velocity(&self) -> Vec2 {
        from_vector(self.rigid_body.linvel())
    }

    pub fn angular_velocity(&self) -> f32 {
        self.rigid_body.angvel()
    }

    /// Velocity of the body at a world point
    pub fn linear_velocity_from_world_point(&self, point: Vec2) -> Vec2 {
        from_vector(&self.rigid_body.velocity_at_point(&to_point(point)))
    }

    /// Velocity of the body at a body-local point
    pub fn linear_velocity_from_local_point(&self, point: Vec2) -> Vec2 {
        self.linear_velocity_from_world_point(self.world_point(point))
    }

    pub fn world_point(&self, local: Vec2) -> Vec2 {
        from_point(&(self.rigid_body.position() * to_point(local)))
    }

    pub fn local_point(&self, world: Vec2) -> Vec2 {
        from_point(&self.rigid_body.position().inverse_transform_point(&to_point(world)))
    }

    pub fn world_vector(&self, local: Vec2) -> Vec2 {
        from_vector(&(self.rigid_body.position() * to_vector(local)))
    }

    pub fn local_vector(&self, world: Vec2) -> Vec2 {
        from_vector(&self.rigid_body.position().inverse_transform_vector(&to_vector(world)))
    }

    pub fn mass(&self) -> f32 {
        self.rigid_body.mass()
    }

    pub fn is_awake(&self) -> bool {
        !self.rigid_body.is_sleeping()
    }
}

impl Deref for BodyRef<'_> {
    type Target = PhysicsBody;

    fn deref(&self) -> &PhysicsBody {
        self.body
    }
}

/// Mutable access to a body and the solver sets it lives in
pub struct BodyMut<'w> {
    handle: BodyHandle,
    body: &'w mut PhysicsBody,
    rigid_bodies: &'w mut RigidBodySet,
    colliders: &'w mut ColliderSet,
    islands: &'w mut IslandManager,
    fixture_owners: &'w mut HashMap<ColliderHandle, FixtureOwner>,
    /// Set while a simulation step is running
    locked: bool,
}

impl<'w> BodyMut<'w> {
    pub(crate) fn new(
        handle: BodyHandle,
        body: &'w mut PhysicsBody,
        rigid_bodies: &'w mut RigidBodySet,
        colliders: &'w mut ColliderSet,
        islands: &'w mut IslandManager,
        fixture_owners: &'w mut HashMap<ColliderHandle, FixtureOwner>,
        locked: bool,
    ) -> Self {
        Self {
            handle,
            body,
            rigid_bodies,
            colliders,
            islands,
            fixture_owners,
            locked,
        }
    }

    pub fn handle(&self) -> BodyHandle {
        self.handle
    }

    /// Read-only view with solver state
    pub fn view(&self) -> BodyRef<'_> {
        BodyRef::new(
            self.handle,
            &*self.body,
            &self.rigid_bodies[self.body.rigid_body],
        )
    }

    fn rigid_body_mut(&mut self) -> &mut RigidBody {
        &mut self.rigid_bodies[self.body.rigid_body]
    }

    fn ensure_unlocked(&self) -> Result<(), PhysicsError> {
        if self.locked {
            log::error!("Collider change on body of object {} during a step", self.body.object);
            return Err(PhysicsError::StepInProgress);
        }
        Ok(())
    }

    /// Attach a new collider in `slot`; slots may be sparse
    pub fn add_collider(&mut self, slot: usize, desc: &ColliderDesc) -> Result<(), PhysicsError> {
        self.ensure_unlocked()?;
        desc.shape.validate()?;

        if self.body.collider(slot).is_some() {
            return Err(PhysicsError::SlotOccupied(slot));
        }
        if self.body.colliders.len() <= slot {
            self.body.colliders.resize_with(slot + 1, || None);
        }

        let handle =
            self.colliders
                .insert_with_parent(desc.build(), self.body.rigid_body, self.rigid_bodies);
        self.fixture_owners.insert(
            handle,
            FixtureOwner::Object {
                body: self.handle,
                slot,
            },
        );
        self.body.colliders[slot] = Some(Collider::new(handle, slot, desc));
        self.refresh_mass();
        Ok(())
    }

    /// Remove the collider in `slot`
    pub fn delete_collider(&mut self, slot: usize) -> Result<(), PhysicsError> {
        self.ensure_unlocked()?;

        let collider = self
            .body
            .colliders
            .get_mut(slot)
            .and_then(|c| c.take())
            .ok_or(PhysicsError::SlotEmpty(slot))?;
        self.remove_solver_collider(collider.handle);

        // Keep the slot vector tight at the end
        while matches!(self.body.colliders.last(), Some(None)) {
            self.body.colliders.pop();
        }
        Ok(())
    }

    pub fn delete_all_colliders(&mut self) -> Result<(), PhysicsError> {
        self.ensure_unlocked()?;

        let handles: Vec<ColliderHandle> = self.body.colliders().map(|c| c.handle).collect();
        for handle in handles {
            self.remove_solver_collider(handle);
        }
        self.body.colliders.clear();
        Ok(())
    }

    fn remove_solver_collider(&mut self, handle: ColliderHandle) {
        self.fixture_owners.remove(&handle);
        self.colliders
            .remove(handle, self.islands, self.rigid_bodies, true);
        self.refresh_mass();
    }

    /// Mass is otherwise only recomputed by the next solver step
    fn refresh_mass(&mut self) {
        if let Some(rb) = self.rigid_bodies.get_mut(self.body.rigid_body) {
            rb.recompute_mass_properties_from_colliders(self.colliders);
        }
    }

    fn collider_parts(
        &mut self,
        slot: usize,
    ) -> Result<(&mut Collider, &mut rapier2d::prelude::Collider), PhysicsError> {
        let collider = self
            .body
            .colliders
            .get_mut(slot)
            .and_then(|c| c.as_mut())
            .ok_or(PhysicsError::SlotEmpty(slot))?;
        let solver_collider = self
            .colliders
            .get_mut(collider.handle)
            .ok_or(PhysicsError::SlotEmpty(slot))?;
        Ok((collider, solver_collider))
    }

    pub fn set_collider_material(
        &mut self,
        slot: usize,
        material: PhysicsMaterial,
    ) -> Result<(), PhysicsError> {
        let (collider, co) = self.collider_parts(slot)?;
        collider.set_material(material, co);
        self.refresh_mass();
        Ok(())
    }

    pub fn set_collider_groups(
        &mut self,
        slot: usize,
        group: CollisionGroup,
        collides_with: CollisionGroup,
    ) -> Result<(), PhysicsError> {
        let (collider, co) = self.collider_parts(slot)?;
        collider.set_groups(group, collides_with, co);
        Ok(())
    }

    pub fn set_collider_flags(
        &mut self,
        slot: usize,
        flags: ColliderFlags,
    ) -> Result<(), PhysicsError> {
        let (collider, co) = self.collider_parts(slot)?;
        collider.set_flags(flags, co);
        Ok(())
    }

    pub fn set_collider_shape(
        &mut self,
        slot: usize,
        shape: CollisionShape,
    ) -> Result<(), PhysicsError> {
        let (collider, co) = self.collider_parts(slot)?;
        collider.set_shape(shape, co)?;
        self.refresh_mass();
        Ok(())
    }

    /// Teleport the body; keeps the current orientation when `orientation` is `None`
    pub fn set_transform(&mut self, position: Vec3, orientation: Option<f32>) {
        let rb = self.rigid_body_mut();
        let angle = orientation.unwrap_or_else(|| rb.rotation().angle());
        rb.set_position(Isometry::new(vector![position.x, position.z], angle), true);

        self.body.position_y = position.y;
        self.body.transform = Transform::new(position, angle);
        self.body.smooth_transform = self.body.transform;
    }

    pub fn set_orientation(&mut self, angle: f32) {
        let position = self.view().position();
        self.set_transform(position, Some(angle));
    }

    /// Point the body along `direction`; zero vectors are ignored
    pub fn set_sign_vector(&mut self, direction: Vec2) {
        if direction.length_squared() <= f32::EPSILON {
            return;
        }
        self.set_orientation(direction.y.atan2(direction.x));
    }

    /// Set `enable` flags and clear `disable` flags
    pub fn change_flags(
        &mut self,
        enable: BodyFlags,
        disable: BodyFlags,
    ) -> Result<(), PhysicsError> {
        let flags = (self.body.flags | enable) - disable;
        flags.validate()?;

        let previous = self.body.flags;
        self.body.flags = flags;

        let rb = self.rigid_body_mut();
        rb.set_body_type(flags.body_type(), true);
        rb.lock_rotations(flags.contains(BodyFlags::FIX_ROTATION), true);
        rb.enable_ccd(flags.contains(BodyFlags::BULLET));
        rb.set_enabled(!flags.contains(BodyFlags::DISABLED));

        // Toggling DISABLED or switching gravity off ends a fall in place
        let disabled_toggled =
            previous.contains(BodyFlags::DISABLED) != flags.contains(BodyFlags::DISABLED);
        let gravity_removed =
            !previous.contains(BodyFlags::NO_GRAVITY) && flags.contains(BodyFlags::NO_GRAVITY);
        if (disabled_toggled || gravity_removed) && self.body.is_falling() {
            self.body.height_state = HeightState::Grounded;
        }
        Ok(())
    }

    pub fn set_linear_velocity(&mut self, velocity: Vec2) {
        self.rigid_body_mut().set_linvel(to_vector(velocity), true);
    }

    pub fn set_angular_velocity(&mut self, velocity: f32) {
        self.rigid_body_mut().set_angvel(velocity, true);
    }

    pub fn apply_linear_impulse(&mut self, impulse: Vec2) {
        if impulse.length_squared() <= f32::EPSILON {
            return;
        }
        self.rigid_body_mut().apply_impulse(to_vector(impulse), true);
    }

    /// Impulse at a world point, may add spin
    pub fn apply_linear_impulse_at(&mut self, impulse: Vec2, point: Vec2) {
        if impulse.length_squared() <= f32::EPSILON {
            return;
        }
        self.rigid_body_mut()
            .apply_impulse_at_point(to_vector(impulse), to_point(point), true);
    }

    pub fn apply_angular_impulse(&mut self, impulse: f32) {
        if impulse == 0.0 {
            return;
        }
        self.rigid_body_mut().apply_torque_impulse(impulse, true);
    }

    /// Force applied during the next step only
    pub fn apply_force(&mut self, force: Vec2) {
        if force.length_squared() <= f32::EPSILON {
            return;
        }
        self.rigid_body_mut().add_force(to_vector(force), true);
    }

    pub fn apply_force_at(&mut self, force: Vec2, point: Vec2) {
        if force.length_squared() <= f32::EPSILON {
            return;
        }
        self.rigid_body_mut()
            .add_force_at_point(to_vector(force), to_point(point), true);
    }

    pub fn apply_torque(&mut self, torque: f32) {
        if torque == 0.0 {
            return;
        }
        self.rigid_body_mut().add_torque(torque, true);
    }

    /// Stop all motion and drop pending forces
    pub fn clear_forces(&mut self) {
        let rb = self.rigid_body_mut();
        rb.reset_forces(false);
        rb.reset_torques(false);
        rb.set_linvel(Vector::zeros(), false);
        rb.set_angvel(0.0, false);
    }

    pub fn set_awake(&mut self, awake: bool) {
        let rb = self.rigid_body_mut();
        if awake {
            rb.wake_up(true);
        } else {
            rb.sleep();
        }
    }

    /// Leave the water state; the body falls or snaps on the next step
    pub fn clear_water_contact(&mut self) {
        if self.body.has_water_contact() {
            self.body.height_state = HeightState::Grounded;
        }
    }

    /// Gameplay-driven fall, e.g. jumping off a roof
    pub fn set_position_y(&mut self, y: f32) {
        self.body.position_y = y;
        self.body.transform.position.y = y;
        self.rigid_body_mut().wake_up(true);
    }
}

impl Deref for BodyMut<'_> {
    type Target = PhysicsBody;

    fn deref(&self) -> &PhysicsBody {
        &*self.body
    }
}
