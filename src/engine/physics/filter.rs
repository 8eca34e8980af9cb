use std::collections::HashMap;
use std::sync::Mutex;

use rapier2d::prelude::{ColliderHandle, PairFilterContext, PhysicsHooks, SolverFlags};
use slotmap::SlotMap;

use super::body::{BodyHandle, PhysicsBody};
use super::map::{layer_at_height, MapData};
use super::object::ObjectDirectory;
use super::settings::PhysicsSettings;

/// What a solver collider belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FixtureOwner {
    Object { body: BodyHandle, slot: usize },
    MapBlock { x: i32, z: i32 },
}

/// Outcome of contact filtering for one collider pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactVerdict {
    /// The solver pushes the bodies apart
    Physical,
    /// No response, but both bodies record the contact
    Touching,
    /// No response and no record
    Ignored,
}

/// Pre-solve pair filter installed as the solver's physics hooks
pub(crate) struct ContactFilter<'a> {
    bodies: &'a SlotMap<BodyHandle, PhysicsBody>,
    fixture_owners: &'a HashMap<ColliderHandle, FixtureOwner>,
    objects: &'a dyn ObjectDirectory,
    map: &'a dyn MapData,
    settings: &'a PhysicsSettings,
    /// Pairs vetoed by object predicates during this step
    touching: Mutex<Vec<(ColliderHandle, ColliderHandle)>>,
}

impl<'a> ContactFilter<'a> {
    pub(crate) fn new(
        bodies: &'a SlotMap<BodyHandle, PhysicsBody>,
        fixture_owners: &'a HashMap<ColliderHandle, FixtureOwner>,
        objects: &'a dyn ObjectDirectory,
        map: &'a dyn MapData,
        settings: &'a PhysicsSettings,
    ) -> Self {
        Self {
            bodies,
            fixture_owners,
            objects,
            map,
            settings,
            touching: Mutex::new(Vec::new()),
        }
    }

    /// Decide how the solver treats a contact between two colliders
    pub(crate) fn classify(
        &self,
        collider1: ColliderHandle,
        collider2: ColliderHandle,
    ) -> ContactVerdict {
        let (Some(owner1), Some(owner2)) = (
            self.fixture_owners.get(&collider1),
            self.fixture_owners.get(&collider2),
        ) else {
            return ContactVerdict::Ignored;
        };

        match (*owner1, *owner2) {
            (FixtureOwner::Object { body, .. }, FixtureOwner::MapBlock { x, z })
            | (FixtureOwner::MapBlock { x, z }, FixtureOwner::Object { body, .. }) => {
                self.classify_with_map(body, x, z)
            }
            (
                FixtureOwner::Object { body: body1, .. },
                FixtureOwner::Object { body: body2, .. },
            ) => self.classify_objects(body1, body2),
            (FixtureOwner::MapBlock { .. }, FixtureOwner::MapBlock { .. }) => {
                ContactVerdict::Ignored
            }
        }
    }

    /// Objects only hit map blocks that are solid at their current layer
    fn classify_with_map(&self, handle: BodyHandle, x: i32, z: i32) -> ContactVerdict {
        let Some(body) = self.bodies.get(handle) else {
            return ContactVerdict::Ignored;
        };
        if body.is_disabled() {
            return ContactVerdict::Ignored;
        }

        let layer = layer_at_height(self.map, body.position_y);
        if self.map.block_info(x, layer, z).ground_type.is_solid() {
            ContactVerdict::Physical
        } else {
            ContactVerdict::Ignored
        }
    }

    fn classify_objects(&self, handle1: BodyHandle, handle2: BodyHandle) -> ContactVerdict {
        let (Some(body1), Some(body2)) = (self.bodies.get(handle1), self.bodies.get(handle2)) else {
            return ContactVerdict::Ignored;
        };

        if body1.is_disabled() || body2.is_disabled() || body1.object == body2.object {
            return ContactVerdict::Ignored;
        }
        if (body1.position_y - body2.position_y).abs() > self.settings.vertical_overlap_tolerance {
            return ContactVerdict::Ignored;
        }
        if self.root_of(handle1) == self.root_of(handle2) {
            return ContactVerdict::Ignored;
        }

        let (Some(object1), Some(object2)) =
            (self.objects.object(body1.object), self.objects.object(body2.object))
        else {
            return ContactVerdict::Ignored;
        };
        if object1.is_marked_for_deletion() || object2.is_marked_for_deletion() {
            return ContactVerdict::Ignored;
        }

        if object1.should_collide(object2) && object2.should_collide(object1) {
            ContactVerdict::Physical
        } else {
            ContactVerdict::Touching
        }
    }

    /// Topmost ancestor in the attachment hierarchy
    fn root_of(&self, mut handle: BodyHandle) -> BodyHandle {
        while let Some(parent) = self.bodies.get(handle).and_then(|b| b.parent()) {
            handle = parent;
        }
        handle
    }

    /// Collider pairs recorded as touching during the step
    pub(crate) fn into_touching(self) -> Vec<(ColliderHandle, ColliderHandle)> {
        let mut pairs = self.touching.into_inner().unwrap_or_default();
        pairs.sort_unstable_by_key(|(a, b)| (a.into_raw_parts(), b.into_raw_parts()));
        pairs.dedup();
        pairs
    }

    fn record_touching(&self, collider1: ColliderHandle, collider2: ColliderHandle) {
        if let Ok(mut touching) = self.touching.lock() {
            touching.push((collider1, collider2));
        }
    }
}

impl PhysicsHooks for ContactFilter<'_> {
    fn filter_contact_pair(&self, context: &PairFilterContext) -> Option<SolverFlags> {
        // Always keep the manifold so its geometry stays current for this step
        match self.classify(context.collider1, context.collider2) {
            ContactVerdict::Physical => Some(SolverFlags::COMPUTE_IMPULSES),
            ContactVerdict::Touching => {
                self.record_touching(context.collider1, context.collider2);
                Some(SolverFlags::empty())
            }
            ContactVerdict::Ignored => Some(SolverFlags::empty()),
        }
    }
}
