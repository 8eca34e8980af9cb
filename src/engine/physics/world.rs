use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use glam::{Vec2, Vec3};
use rapier2d::prelude::*;
use slotmap::SlotMap;

use super::body::{Attachment, BodyFlags, BodyHandle, BodyMut, BodyRef, PhysicsBody};
use super::collider::ColliderDesc;
use super::collision::{
    CollisionEvent, CollisionEventQueue, CollisionGroup, ImpactEffect, ManifoldPoint,
    ManifoldSnapshot,
};
use super::contact::{
    ColliderRef, Collision, Contact, ContactPoint, MapCollision, SensorOverlap,
};
use super::filter::{ContactFilter, ContactVerdict, FixtureOwner};
use super::height::{integrate_height, HeightEvent};
use super::map::{layer_at_height, solid_columns, MapData};
use super::object::{ObjectDirectory, ObjectId};
use super::query::{LinecastHit, QueryElement, QueryScope};
use super::settings::PhysicsSettings;
use super::PhysicsError;
use crate::core::math::{from_point, from_vector, to_point, Transform};
use crate::engine::game_loop::{FixedTimestep, DEFAULT_STEP};

/// Physics world that manages all physics simulation
///
/// Advances bodies in fixed steps, simulates the vertical axis on top of the
/// planar solver and dispatches collisions to the owning game objects.
pub struct PhysicsWorld {
    /// World tuning
    settings: PhysicsSettings,

    /// Integration parameters for the physics simulation
    integration_parameters: IntegrationParameters,

    /// Physics pipeline handles collision detection and solving
    physics_pipeline: PhysicsPipeline,

    /// Island manager for sleeping bodies
    island_manager: IslandManager,

    /// Broad phase collision detection
    broad_phase: DefaultBroadPhase,

    /// Narrow phase collision detection
    narrow_phase: NarrowPhase,

    /// Impulse joint set
    impulse_joint_set: ImpulseJointSet,

    /// Multibody joint set
    multibody_joint_set: MultibodyJointSet,

    /// CCD solver for fast-moving objects
    ccd_solver: CCDSolver,

    /// Query pipeline for box queries and line casts
    query_pipeline: QueryPipeline,

    /// Rigid body set
    rigid_body_set: RigidBodySet,

    /// Collider set
    collider_set: ColliderSet,

    /// Terrain the world is built on
    map: Arc<dyn MapData>,

    /// Static body carrying one collider per solid block column
    map_body: RigidBodyHandle,

    /// Map collider per block column
    map_colliders: HashMap<(i32, i32), ColliderHandle>,

    /// All game object bodies
    bodies: SlotMap<BodyHandle, PhysicsBody>,

    /// Registration order, used for every per-body pass
    body_order: Vec<BodyHandle>,

    /// Owner of every solver collider
    fixture_owners: HashMap<ColliderHandle, FixtureOwner>,

    /// Events collected after the solver, dispatched at the end of the step
    collision_event_queue: CollisionEventQueue,

    /// Impact effects waiting to be picked up by gameplay
    impact_effects: Vec<ImpactEffect>,

    /// Sensor overlaps reported as begun, keyed by (sensor, other) collider
    sensor_overlaps: Vec<SensorPair>,

    /// Fixed step accumulator
    timestep: FixedTimestep,

    /// Set while a fixed step executes
    stepping: bool,
}

type SensorPair = ((ColliderHandle, ColliderHandle), SensorOverlap);

impl PhysicsWorld {
    /// Create a world and build the collision shape of `map`
    ///
    /// A zero step length is replaced by the default step.
    pub fn new(mut settings: PhysicsSettings, map: Arc<dyn MapData>) -> Self {
        if settings.step.is_zero() {
            log::error!("Physics step must be non-zero, using {:?}", DEFAULT_STEP);
            settings.step = DEFAULT_STEP;
        }

        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = settings.step_secs();
        if let Some(iterations) = NonZeroUsize::new(settings.velocity_iterations) {
            integration_parameters.num_solver_iterations = iterations;
        }
        integration_parameters.num_internal_pgs_iterations = settings.position_iterations.max(1);

        let timestep = FixedTimestep::new(settings.step, settings.max_steps_per_frame);

        let mut rigid_body_set = RigidBodySet::new();
        let map_body = rigid_body_set.insert(RigidBodyBuilder::fixed().build());

        let mut world = Self {
            settings,
            integration_parameters,
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            rigid_body_set,
            collider_set: ColliderSet::new(),
            map,
            map_body,
            map_colliders: HashMap::new(),
            bodies: SlotMap::with_key(),
            body_order: Vec::new(),
            fixture_owners: HashMap::new(),
            collision_event_queue: CollisionEventQueue::new(),
            impact_effects: Vec::new(),
            sensor_overlaps: Vec::new(),
            timestep,
            stepping: false,
        };
        world.build_map_shape();
        world
    }

    /// One box collider per reachable solid block column
    fn build_map_shape(&mut self) {
        let length = self.map.block_length();
        let half = length * 0.5;
        let map_groups = CollisionGroup::MAP_BLOCK
            .to_interaction_groups(CollisionGroup::all() - CollisionGroup::MAP_BLOCK);

        for (x, z) in solid_columns(self.map.as_ref()) {
            let collider = ColliderBuilder::cuboid(half, half)
                .position(Isometry::translation(
                    x as f32 * length + half,
                    z as f32 * length + half,
                ))
                .collision_groups(map_groups)
                .friction(0.5)
                .active_hooks(ActiveHooks::FILTER_CONTACT_PAIRS)
                .build();
            let handle =
                self.collider_set
                    .insert_with_parent(collider, self.map_body, &mut self.rigid_body_set);
            self.fixture_owners
                .insert(handle, FixtureOwner::MapBlock { x, z });
            self.map_colliders.insert((x, z), handle);
        }

        log::info!(
            "Map collision shape built with {} block fixtures",
            self.map_colliders.len()
        );
    }

    fn ensure_not_stepping(&self) -> Result<(), PhysicsError> {
        if self.stepping {
            log::error!("World modified during a simulation step");
            return Err(PhysicsError::StepInProgress);
        }
        Ok(())
    }

    /// Create a body without colliders
    pub fn create_body(
        &mut self,
        object: ObjectId,
        transform: Transform,
        flags: BodyFlags,
    ) -> Result<BodyHandle, PhysicsError> {
        self.ensure_not_stepping()?;
        flags.validate()?;

        let rigid_body = self
            .rigid_body_set
            .insert(PhysicsBody::build_rigid_body(&transform, flags));
        let handle = self
            .bodies
            .insert(PhysicsBody::new(object, rigid_body, transform, flags));
        self.body_order.push(handle);

        log::debug!("Created body {:?} for object {}", handle, object);
        Ok(handle)
    }

    /// Create a body with `desc` attached in slot 0
    pub fn create_body_with_collider(
        &mut self,
        object: ObjectId,
        transform: Transform,
        desc: &ColliderDesc,
        flags: BodyFlags,
    ) -> Result<BodyHandle, PhysicsError> {
        let handle = self.create_body(object, transform, flags)?;
        let added = match self.body_mut(handle) {
            Some(mut body) => body.add_collider(0, desc),
            None => Err(PhysicsError::InvalidBody),
        };
        if let Err(err) = added {
            self.destroy_body(handle)?;
            return Err(err);
        }
        Ok(handle)
    }

    /// Remove a body, its colliders and every contact that refers to it
    pub fn destroy_body(&mut self, handle: BodyHandle) -> Result<(), PhysicsError> {
        self.ensure_not_stepping()?;

        let children = self
            .bodies
            .get(handle)
            .ok_or(PhysicsError::InvalidBody)?
            .children
            .clone();
        for child in children {
            self.detach_body(child)?;
        }
        self.detach_body(handle)?;

        let Some(body) = self.bodies.remove(handle) else {
            return Err(PhysicsError::InvalidBody);
        };
        for collider in body.colliders() {
            self.fixture_owners.remove(&collider.handle);
        }
        self.rigid_body_set.remove(
            body.rigid_body,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true, // remove attached colliders
        );
        self.body_order.retain(|h| *h != handle);
        self.sensor_overlaps
            .retain(|(_, overlap)| overlap.sensor.body != handle && overlap.other.body != handle);
        for other in self.bodies.values_mut() {
            other
                .contacts
                .retain(|contact| contact.that_collider().body != handle);
        }

        log::debug!("Destroyed body {:?} of object {}", handle, body.object);
        Ok(())
    }

    /// Destroy every object body; the map shape stays
    pub fn clear_world(&mut self) -> Result<(), PhysicsError> {
        self.ensure_not_stepping()?;

        let count = self.body_order.len();
        for handle in self.body_order.clone() {
            if self.bodies.contains_key(handle) {
                self.destroy_body(handle)?;
            }
        }
        self.collision_event_queue.clear();
        self.impact_effects.clear();
        self.sensor_overlaps.clear();

        log::info!("Physics world cleared, {} bodies destroyed", count);
        Ok(())
    }

    /// Drive `child` from `parent`, at `local` relative to the parent's pose
    ///
    /// The child becomes a linked body until it is detached.
    pub fn attach_body(
        &mut self,
        child: BodyHandle,
        parent: BodyHandle,
        local: Transform,
    ) -> Result<(), PhysicsError> {
        self.ensure_not_stepping()?;
        if !self.bodies.contains_key(child) || !self.bodies.contains_key(parent) {
            return Err(PhysicsError::InvalidBody);
        }

        let mut cursor = Some(parent);
        while let Some(ancestor) = cursor {
            if ancestor == child {
                return Err(PhysicsError::AttachmentCycle);
            }
            cursor = self.bodies.get(ancestor).and_then(|b| b.parent());
        }

        self.detach_body(child)?;

        let restore_flags = self.bodies[child].flags;
        if let Some(mut body) = self.body_mut(child) {
            body.change_flags(BodyFlags::LINKED, BodyFlags::STATIC)?;
        }
        self.bodies[child].attachment = Some(Attachment {
            parent,
            local,
            restore_flags,
        });
        self.bodies[parent].children.push(child);

        self.cascade_children(parent, false);
        self.cascade_children(parent, true);

        log::debug!("Attached body {:?} to {:?}", child, parent);
        Ok(())
    }

    /// Release `child` from its parent; no-op for unattached bodies
    pub fn detach_body(&mut self, child: BodyHandle) -> Result<(), PhysicsError> {
        self.ensure_not_stepping()?;

        let Some(attachment) = self
            .bodies
            .get_mut(child)
            .ok_or(PhysicsError::InvalidBody)?
            .attachment
            .take()
        else {
            return Ok(());
        };

        if let Some(parent) = self.bodies.get_mut(attachment.parent) {
            parent.children.retain(|h| *h != child);
        }
        let restore = attachment.restore_flags;
        if let Some(mut body) = self.body_mut(child) {
            body.change_flags(restore, BodyFlags::all() - restore)?;
        }

        log::debug!("Detached body {:?} from {:?}", child, attachment.parent);
        Ok(())
    }

    /// Read access to a body
    pub fn body(&self, handle: BodyHandle) -> Option<BodyRef<'_>> {
        let body = self.bodies.get(handle)?;
        let rigid_body = self.rigid_body_set.get(body.rigid_body)?;
        Some(BodyRef::new(handle, body, rigid_body))
    }

    /// Mutable access to a body
    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<BodyMut<'_>> {
        let body = self.bodies.get_mut(handle)?;
        Some(BodyMut::new(
            handle,
            body,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.island_manager,
            &mut self.fixture_owners,
            self.stepping,
        ))
    }

    /// Handles of all bodies in registration order
    pub fn body_handles(&self) -> &[BodyHandle] {
        &self.body_order
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn settings(&self) -> &PhysicsSettings {
        &self.settings
    }

    pub fn map(&self) -> &dyn MapData {
        self.map.as_ref()
    }

    pub fn is_simulation_step_in_progress(&self) -> bool {
        self.stepping
    }

    /// Blend factor between the last step and the next, in [0, 1)
    pub fn interpolation_factor(&self) -> f32 {
        self.timestep.alpha()
    }

    /// Total fixed steps executed
    pub fn total_steps(&self) -> u64 {
        self.timestep.total_steps()
    }

    /// Total fixed steps skipped by the per-frame catch-up cap
    pub fn dropped_steps(&self) -> u64 {
        self.timestep.dropped_steps()
    }

    /// Impact effects raised since the last call
    pub fn take_impact_effects(&mut self) -> Vec<ImpactEffect> {
        std::mem::take(&mut self.impact_effects)
    }

    /// Bodies overlapping a box in the solver plane
    ///
    /// Sees the world as of the last completed step.
    pub fn query_box(
        &self,
        center: Vec2,
        half_extents: Vec2,
        mask: CollisionGroup,
    ) -> Vec<QueryElement> {
        self.query_scope().query_box(center, half_extents, mask)
    }

    /// Bodies crossed by the segment `start` to `end`, unsorted
    pub fn query_linecast(&self, start: Vec2, end: Vec2, mask: CollisionGroup) -> Vec<LinecastHit> {
        self.query_scope().query_linecast(start, end, mask)
    }

    fn query_scope(&self) -> QueryScope<'_> {
        QueryScope {
            pipeline: &self.query_pipeline,
            rigid_bodies: &self.rigid_body_set,
            colliders: &self.collider_set,
            fixture_owners: &self.fixture_owners,
            bodies: &self.bodies,
        }
    }

    /// Advance the simulation by `delta` of wall time
    ///
    /// Runs as many fixed steps as are due, then refreshes the smoothed
    /// transforms. Returns the number of steps executed.
    pub fn advance_frame(&mut self, delta: Duration, objects: &mut dyn ObjectDirectory) -> u32 {
        let steps = self.timestep.accumulate(delta);
        for _ in 0..steps {
            self.stepping = true;
            self.simulation_step(objects);
            self.stepping = false;
        }
        self.interpolate();
        steps
    }

    fn simulation_step(&mut self, objects: &mut dyn ObjectDirectory) {
        let dt = self.settings.step_secs();
        log::trace!("Physics step {}", self.timestep.total_steps());

        self.run_object_hooks(objects);

        for body in self.bodies.values_mut() {
            body.contacts.clear();
            if !body.is_disabled() {
                if let Some(rb) = self.rigid_body_set.get_mut(body.rigid_body) {
                    rb.wake_up(true);
                }
            }
        }

        let (touching, sensor_overlaps) = {
            let filter = ContactFilter::new(
                &self.bodies,
                &self.fixture_owners,
                &*objects,
                self.map.as_ref(),
                &self.settings,
            );
            self.physics_pipeline.step(
                &Vector::zeros(),
                &self.integration_parameters,
                &mut self.island_manager,
                &mut self.broad_phase,
                &mut self.narrow_phase,
                &mut self.rigid_body_set,
                &mut self.collider_set,
                &mut self.impulse_joint_set,
                &mut self.multibody_joint_set,
                &mut self.ccd_solver,
                Some(&mut self.query_pipeline),
                &filter,
                &(),
            );
            let overlaps = collect_sensor_overlaps(
                &self.narrow_phase,
                &self.collider_set,
                &self.fixture_owners,
                &self.bodies,
                &filter,
            );
            (filter.into_touching(), overlaps)
        };

        // Forces only act for the step they were applied in
        for (_, rb) in self.rigid_body_set.iter_mut() {
            rb.reset_forces(false);
            rb.reset_torques(false);
        }

        let events = collect_collision_events(
            &self.narrow_phase,
            &self.fixture_owners,
            &self.bodies,
            self.map.as_ref(),
        );
        for event in events {
            if let Some(effect) = self.impact_effect(&event, &*objects) {
                self.impact_effects.push(effect);
            }
            self.collision_event_queue.push(event);
        }

        self.record_touching_contacts(&touching);
        self.integrate_heights(objects, dt);
        self.dispatch_collision_events(objects);
        self.dispatch_sensor_overlaps(sensor_overlaps, objects);
        self.sync_transforms(objects);
    }

    fn run_object_hooks(&mut self, objects: &mut dyn ObjectDirectory) {
        for index in 0..self.body_order.len() {
            let handle = self.body_order[index];
            let Some(body) = self.bodies.get_mut(handle) else {
                continue;
            };
            if body.is_disabled() {
                continue;
            }
            let Some(object) = objects.object_mut(body.object) else {
                log::warn!("Body {:?} has no owner object {}", handle, body.object);
                continue;
            };

            let mut view = BodyMut::new(
                handle,
                body,
                &mut self.rigid_body_set,
                &mut self.collider_set,
                &mut self.island_manager,
                &mut self.fixture_owners,
                true,
            );
            object.simulation_step(&mut view);
        }
    }

    /// Store predicate-vetoed contacts on both bodies
    fn record_touching_contacts(&mut self, touching: &[(ColliderHandle, ColliderHandle)]) {
        let mut recorded = Vec::new();

        for &(collider1, collider2) in touching {
            let Some(pair) = self.narrow_phase.contact_pair(collider1, collider2) else {
                continue;
            };
            let (Some(this), Some(that)) = (
                self.collider_ref(pair.collider1),
                self.collider_ref(pair.collider2),
            ) else {
                continue;
            };
            let Some(solver_collider) = self.collider_set.get(pair.collider1) else {
                continue;
            };

            let mut manifold = ManifoldSnapshot::default();
            for solver_manifold in &pair.manifolds {
                for point in &solver_manifold.points {
                    if point.dist <= 0.0 {
                        if manifold.point_count == 0 {
                            manifold.normal = from_vector(&solver_manifold.data.normal);
                        }
                        manifold.push(ManifoldPoint {
                            position: from_point(&(solver_collider.position() * point.local_p1)),
                            separation: point.dist,
                        });
                    }
                }
            }
            if manifold.point_count == 0 {
                continue;
            }

            let points = self.contact_points(this.body, Some(that.body), &manifold);
            let contact = Contact::new(this, that, &points);
            let that_y = self.bodies.get(that.body).map_or(0.0, |b| b.position_y);
            recorded.push((this.body, contact));
            recorded.push((that.body, contact.swapped(that_y)));
        }

        for (handle, contact) in recorded {
            if let Some(body) = self.bodies.get_mut(handle) {
                body.contacts.push(contact);
            }
        }
    }

    fn integrate_heights(&mut self, objects: &mut dyn ObjectDirectory, dt: f32) {
        let gravity_enabled = self.settings.gravity_enabled;

        for index in 0..self.body_order.len() {
            let handle = self.body_order[index];
            let Some(body) = self.bodies.get_mut(handle) else {
                continue;
            };
            if body.is_disabled() || body.is_attached() {
                continue;
            }
            let Some(rb) = self.rigid_body_set.get_mut(body.rigid_body) else {
                continue;
            };

            let gravity_applies = gravity_enabled && !body.flags.contains(BodyFlags::NO_GRAVITY);
            let update = integrate_height(
                &mut body.position_y,
                &mut body.height_state,
                from_vector(rb.translation()),
                gravity_applies,
                self.map.as_ref(),
                &self.settings,
                dt,
            );
            if update.moved {
                rb.wake_up(true);
            }

            let Some(event) = update.event else {
                continue;
            };
            let Some(object) = objects.object_mut(body.object) else {
                log::warn!("Height event for body {:?} without owner", handle);
                continue;
            };
            match event {
                HeightEvent::FallingStarts => object.handle_falling_starts(),
                HeightEvent::FallsOnGround { fall_distance } => {
                    object.handle_falls_on_ground(fall_distance)
                }
                HeightEvent::FallsOnWater { fall_distance } => {
                    object.handle_falls_on_water(fall_distance)
                }
            }
        }
    }

    fn dispatch_collision_events(&mut self, objects: &mut dyn ObjectDirectory) {
        let events: Vec<CollisionEvent> = self.collision_event_queue.drain().collect();

        for event in events {
            match event {
                CollisionEvent::Map {
                    collider,
                    block,
                    block_x,
                    block_z,
                    impulse,
                    manifold,
                } => {
                    let points = self.contact_points(collider.body, None, &manifold);
                    let collision =
                        MapCollision::new(collider, block, block_x, block_z, &points, impulse);

                    if let Some(object) = objects.object_mut(collider.object) {
                        object.handle_collision_with_map(&collision);
                    }
                }
                CollisionEvent::Objects {
                    collider_a,
                    collider_b,
                    impulse,
                    manifold,
                } => {
                    let points =
                        self.contact_points(collider_a.body, Some(collider_b.body), &manifold);
                    let contact = Contact::new(collider_a, collider_b, &points);
                    let b_y = self.bodies.get(collider_b.body).map_or(0.0, |b| b.position_y);

                    if let Some(object) = objects.object_mut(collider_a.object) {
                        object.handle_collision(&Collision { contact, impulse });
                    }
                    if let Some(object) = objects.object_mut(collider_b.object) {
                        object.handle_collision(&Collision {
                            contact: contact.swapped(b_y),
                            impulse,
                        });
                    }
                }
            }
        }
    }

    /// Report overlaps that ended, then overlaps that began, to both owners
    fn dispatch_sensor_overlaps(
        &mut self,
        current: Vec<SensorPair>,
        objects: &mut dyn ObjectDirectory,
    ) {
        let previous = std::mem::replace(&mut self.sensor_overlaps, current);
        let contains = |pairs: &[SensorPair], key: (ColliderHandle, ColliderHandle)| {
            pairs.iter().any(|(k, _)| *k == key)
        };

        for (key, overlap) in &previous {
            if contains(&self.sensor_overlaps, *key) {
                continue;
            }
            for object in [overlap.sensor.object, overlap.other.object] {
                if let Some(object) = objects.object_mut(object) {
                    object.handle_sensor_end(overlap);
                }
            }
        }
        for (key, overlap) in &self.sensor_overlaps {
            if contains(&previous, *key) {
                continue;
            }
            for object in [overlap.sensor.object, overlap.other.object] {
                if let Some(object) = objects.object_mut(object) {
                    object.handle_sensor_begin(overlap);
                }
            }
        }
    }

    fn sync_transforms(&mut self, objects: &mut dyn ObjectDirectory) {
        for index in 0..self.body_order.len() {
            let handle = self.body_order[index];
            let Some(body) = self.bodies.get_mut(handle) else {
                continue;
            };
            if body.is_attached() {
                continue;
            }
            if let Some(rb) = self.rigid_body_set.get(body.rigid_body) {
                let planar = from_vector(rb.translation());
                body.transform = Transform::new(
                    Vec3::new(planar.x, body.position_y, planar.y),
                    rb.rotation().angle(),
                );
            }
            if !body.children.is_empty() {
                self.cascade_children(handle, false);
            }
        }

        for handle in &self.body_order {
            let Some(body) = self.bodies.get(*handle) else {
                continue;
            };
            if let Some(object) = objects.object_mut(body.object) {
                object.sync_transform(&body.transform);
            }
        }
    }

    /// Place every descendant of `root` relative to its parent
    ///
    /// With `smooth` only the smoothed transforms are updated, otherwise the
    /// simulated pose, height and solver body follow the parent.
    fn cascade_children(&mut self, root: BodyHandle, smooth: bool) {
        let mut stack = vec![root];
        while let Some(parent) = stack.pop() {
            let Some(parent_body) = self.bodies.get(parent) else {
                continue;
            };
            let parent_pose = if smooth {
                parent_body.smooth_transform
            } else {
                parent_body.transform
            };

            for child in parent_body.children.clone() {
                let Some(child_body) = self.bodies.get_mut(child) else {
                    continue;
                };
                let Some(attachment) = child_body.attachment else {
                    continue;
                };
                let pose = parent_pose.compose(&attachment.local);

                if smooth {
                    child_body.smooth_transform = pose;
                } else {
                    child_body.transform = pose;
                    child_body.position_y = pose.position.y;
                    if let Some(rb) = self.rigid_body_set.get_mut(child_body.rigid_body) {
                        rb.set_position(pose.to_isometry(), true);
                    }
                }
                stack.push(child);
            }
        }
    }

    /// Extrapolate root transforms by the leftover fraction of a step
    fn interpolate(&mut self) {
        let mix = self.timestep.alpha();
        let lookahead = mix * self.settings.step_secs();

        for index in 0..self.body_order.len() {
            let handle = self.body_order[index];
            let Some(body) = self.bodies.get_mut(handle) else {
                continue;
            };
            if body.is_attached() {
                continue;
            }

            body.smooth_transform = body.transform;
            if mix > 0.0 {
                if let Some(rb) = self.rigid_body_set.get(body.rigid_body) {
                    let velocity = from_vector(rb.linvel()) * lookahead;
                    body.smooth_transform.position.x += velocity.x;
                    body.smooth_transform.position.z += velocity.y;
                    body.smooth_transform.orientation += rb.angvel() * lookahead;
                }
            }
            if !body.children.is_empty() {
                self.cascade_children(handle, true);
            }
        }
    }

    fn collider_ref(&self, handle: ColliderHandle) -> Option<ColliderRef> {
        match self.fixture_owners.get(&handle)? {
            FixtureOwner::Object { body, slot } => collider_ref(&self.bodies, *body, *slot),
            FixtureOwner::MapBlock { .. } => None,
        }
    }

    /// Expand a manifold into contact points seen from `this`
    fn contact_points(
        &self,
        this: BodyHandle,
        that: Option<BodyHandle>,
        manifold: &ManifoldSnapshot,
    ) -> Vec<ContactPoint> {
        let rigid_body_of = |handle: BodyHandle| {
            self.bodies
                .get(handle)
                .and_then(|b| self.rigid_body_set.get(b.rigid_body))
        };
        let this_rb = rigid_body_of(this);
        let that_rb = that.and_then(rigid_body_of);
        let this_y = self.bodies.get(this).map_or(0.0, |b| b.position_y);

        manifold
            .points()
            .iter()
            .map(|point| {
                let at = to_point(point.position);
                let velocity_of = |rb: Option<&RigidBody>| {
                    rb.map_or(Vec2::ZERO, |rb| from_vector(&rb.velocity_at_point(&at)))
                };
                ContactPoint {
                    position: point.position,
                    normal: manifold.normal,
                    position_y: this_y,
                    separation: point.separation,
                    relative_velocity: velocity_of(this_rb) - velocity_of(that_rb),
                }
            })
            .collect()
    }

    fn impact_effect(
        &self,
        event: &CollisionEvent,
        objects: &dyn ObjectDirectory,
    ) -> Option<ImpactEffect> {
        let (first, second, manifold) = match event {
            CollisionEvent::Objects {
                collider_a,
                collider_b,
                manifold,
                ..
            } => (collider_a, Some(collider_b), manifold),
            CollisionEvent::Map {
                collider, manifold, ..
            } => (collider, None, manifold),
        };

        let impulse = event.impulse();
        let exceeds = |collider: &ColliderRef| {
            objects
                .object(collider.object)
                .and_then(|o| o.impact_effect_threshold())
                .is_some_and(|threshold| impulse > threshold)
        };
        if !exceeds(first) && !second.is_some_and(exceeds) {
            return None;
        }

        let point = manifold.points().first()?;
        Some(ImpactEffect {
            position: point.position,
            position_y: self.bodies.get(first.body).map_or(0.0, |b| b.position_y),
            normal: manifold.normal,
            impulse,
        })
    }

    #[cfg(test)]
    pub(crate) fn contact_filter<'a>(
        &'a self,
        objects: &'a dyn ObjectDirectory,
    ) -> ContactFilter<'a> {
        ContactFilter::new(
            &self.bodies,
            &self.fixture_owners,
            objects,
            self.map.as_ref(),
            &self.settings,
        )
    }

    #[cfg(test)]
    pub(crate) fn map_collider_at(&self, x: i32, z: i32) -> Option<ColliderHandle> {
        self.map_colliders.get(&(x, z)).copied()
    }
}

fn collider_ref(
    bodies: &SlotMap<BodyHandle, PhysicsBody>,
    body: BodyHandle,
    slot: usize,
) -> Option<ColliderRef> {
    let physics_body = bodies.get(body)?;
    let collider = physics_body.collider(slot)?;
    Some(ColliderRef {
        body,
        object: physics_body.object,
        slot,
        group: collider.group(),
    })
}

/// One event per contact pair the solver actually pushed apart
fn collect_collision_events(
    narrow_phase: &NarrowPhase,
    fixture_owners: &HashMap<ColliderHandle, FixtureOwner>,
    bodies: &SlotMap<BodyHandle, PhysicsBody>,
    map: &dyn MapData,
) -> Vec<CollisionEvent> {
    // Heights have not been integrated yet, so this is the layer the filter saw
    let block_at = |body: BodyHandle, x: i32, z: i32| {
        let height = bodies.get(body).map_or(0.0, |b| b.position_y);
        map.block_info(x, layer_at_height(map, height), z)
    };

    let mut events = Vec::new();

    for pair in narrow_phase.contact_pairs() {
        let mut manifold = ManifoldSnapshot::default();
        let mut impulse = 0.0;
        let mut active = false;

        for solver_manifold in &pair.manifolds {
            let data = &solver_manifold.data;
            if !data.solver_flags.contains(SolverFlags::COMPUTE_IMPULSES)
                || data.solver_contacts.is_empty()
            {
                continue;
            }
            if !active {
                manifold.normal = from_vector(&data.normal);
                active = true;
            }
            impulse += solver_manifold
                .points
                .iter()
                .map(|point| point.data.impulse)
                .sum::<f32>();
            for solver_contact in &data.solver_contacts {
                manifold.push(ManifoldPoint {
                    position: from_point(&solver_contact.point),
                    separation: solver_contact.dist,
                });
            }
        }
        if !active {
            continue;
        }

        let (Some(owner1), Some(owner2)) = (
            fixture_owners.get(&pair.collider1),
            fixture_owners.get(&pair.collider2),
        ) else {
            continue;
        };

        let event = match (*owner1, *owner2) {
            (
                FixtureOwner::Object { body: body1, slot: slot1 },
                FixtureOwner::Object { body: body2, slot: slot2 },
            ) => {
                let (Some(collider_a), Some(collider_b)) = (
                    collider_ref(bodies, body1, slot1),
                    collider_ref(bodies, body2, slot2),
                ) else {
                    continue;
                };
                CollisionEvent::Objects {
                    collider_a,
                    collider_b,
                    impulse,
                    manifold,
                }
            }
            (FixtureOwner::Object { body, slot }, FixtureOwner::MapBlock { x, z }) => {
                let Some(collider) = collider_ref(bodies, body, slot) else {
                    continue;
                };
                CollisionEvent::Map {
                    collider,
                    block: block_at(body, x, z),
                    block_x: x,
                    block_z: z,
                    impulse,
                    manifold,
                }
            }
            (FixtureOwner::MapBlock { x, z }, FixtureOwner::Object { body, slot }) => {
                let Some(collider) = collider_ref(bodies, body, slot) else {
                    continue;
                };
                // Normal must point from the object into the map
                CollisionEvent::Map {
                    collider,
                    block: block_at(body, x, z),
                    block_x: x,
                    block_z: z,
                    impulse,
                    manifold: manifold.flipped(),
                }
            }
            (FixtureOwner::MapBlock { .. }, FixtureOwner::MapBlock { .. }) => continue,
        };
        events.push(event);
    }

    events
}

/// Object pairs where exactly one collider is a sensor and the shapes overlap
fn collect_sensor_overlaps(
    narrow_phase: &NarrowPhase,
    colliders: &ColliderSet,
    fixture_owners: &HashMap<ColliderHandle, FixtureOwner>,
    bodies: &SlotMap<BodyHandle, PhysicsBody>,
    filter: &ContactFilter<'_>,
) -> Vec<SensorPair> {
    let mut overlaps = Vec::new();

    for (collider1, collider2, intersecting) in narrow_phase.intersection_pairs() {
        if !intersecting {
            continue;
        }
        let (Some(co1), Some(co2)) = (colliders.get(collider1), colliders.get(collider2)) else {
            continue;
        };
        let (sensor, other) = match (co1.is_sensor(), co2.is_sensor()) {
            (true, false) => (collider1, collider2),
            (false, true) => (collider2, collider1),
            _ => continue,
        };
        if filter.classify(sensor, other) == ContactVerdict::Ignored {
            continue;
        }

        let (
            Some(FixtureOwner::Object { body: sensor_body, slot: sensor_slot }),
            Some(FixtureOwner::Object { body: other_body, slot: other_slot }),
        ) = (fixture_owners.get(&sensor), fixture_owners.get(&other))
        else {
            continue;
        };
        let (Some(sensor_ref), Some(other_ref)) = (
            collider_ref(bodies, *sensor_body, *sensor_slot),
            collider_ref(bodies, *other_body, *other_slot),
        ) else {
            continue;
        };
        overlaps.push((
            (sensor, other),
            SensorOverlap {
                sensor: sensor_ref,
                other: other_ref,
            },
        ));
    }

    overlaps
}
