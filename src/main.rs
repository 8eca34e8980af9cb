use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use glam::{Vec2, Vec3};
use log::info;

use gridlock::engine::physics::{
    BodyHandle, GameObject, GridMap, GroundType, ObjectId, PhysicsSettings, PhysicsWorld,
};
use gridlock::game::{Pedestrian, Projectile, Vehicle};

/// Simulated wall time of the demo
const DEMO_SECONDS: u32 = 10;

fn build_city() -> GridMap {
    let mut map = GridMap::new(48, 48, 4, 1.0).with_ground(GroundType::Pavement);

    // Two blocks of buildings along a road
    for z in 0..48 {
        for x in 20..24 {
            map.set_block(x, 0, z, GroundType::Road);
        }
    }
    for z in 4..12 {
        for x in 10..16 {
            map.add_building(x, z, 3);
            map.set_height(x, z, 3.0);
        }
        for x in 28..34 {
            map.add_building(x, z, 2);
            map.set_height(x, z, 2.0);
        }
    }

    // Canal
    for z in 30..34 {
        for x in 0..48 {
            map.set_block(x, 0, z, GroundType::Water);
            map.set_height(x, z, -1.0);
            map.set_water_level(x, z, Some(-0.5));
        }
    }
    map
}

fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("Starting Gridlock demo...");

    let settings = PhysicsSettings::default();
    let mut world = PhysicsWorld::new(settings, Arc::new(build_city()));
    let mut objects: HashMap<ObjectId, Box<dyn GameObject>> = HashMap::new();
    let mut bodies: HashMap<ObjectId, BodyHandle> = HashMap::new();

    for i in 0..6 {
        let id = i as ObjectId + 1;
        let mut walker = Pedestrian::new(id);
        walker.walk_direction = Vec2::from_angle(i as f32 * 1.1);
        let handle = walker.spawn(&mut world, Vec3::new(18.0 + i as f32, 0.0, 20.0))?;
        bodies.insert(id, handle);
        objects.insert(id, Box::new(walker));
    }

    // Pedestrian stepping off a roof
    let mut jumper = Pedestrian::new(10);
    jumper.walk_direction = Vec2::Y;
    let handle = jumper.spawn(&mut world, Vec3::new(12.5, 3.0, 11.5))?;
    bodies.insert(10, handle);
    objects.insert(10, Box::new(jumper));

    let mut car = Vehicle::new(20);
    car.throttle = 1.0;
    let handle = car.spawn(&mut world, Vec3::new(22.0, 0.0, 2.0), std::f32::consts::FRAC_PI_2)?;
    bodies.insert(20, handle);
    objects.insert(20, Box::new(car));

    let mut bullet = Projectile::new(30, Some(20), Vec2::new(-25.0, 0.0));
    let handle = bullet.spawn(&mut world, Vec3::new(30.0, 0.0, 20.0))?;
    bodies.insert(30, handle);
    objects.insert(30, Box::new(bullet));

    info!("Spawned {} bodies", world.body_count());

    // Uneven frame times, as a renderer would produce
    let frames = [
        Duration::from_millis(16),
        Duration::from_millis(17),
        Duration::from_millis(15),
        Duration::from_millis(33),
    ];
    let mut elapsed = Duration::ZERO;
    let mut frame = 0;
    while elapsed < Duration::from_secs(DEMO_SECONDS as u64) {
        let delta = frames[frame % frames.len()];
        world.advance_frame(delta, &mut objects);
        elapsed += delta;
        frame += 1;

        for effect in world.take_impact_effects() {
            info!(
                "Impact at ({:.1}, {:.1}, {:.1}), impulse {:.0}",
                effect.position.x, effect.position_y, effect.position.y, effect.impulse
            );
        }

        let doomed: Vec<ObjectId> = objects
            .iter()
            .filter(|(_, object)| object.is_marked_for_deletion())
            .map(|(id, _)| *id)
            .collect();
        for id in doomed {
            objects.remove(&id);
            if let Some(handle) = bodies.remove(&id) {
                world.destroy_body(handle)?;
            }
            info!("Object {} removed after {:.2}s", id, elapsed.as_secs_f32());
        }
    }

    info!(
        "Simulated {:.1}s in {} steps over {} frames, {} bodies left",
        elapsed.as_secs_f32(),
        world.total_steps(),
        frame,
        world.body_count()
    );
    for (id, handle) in &bodies {
        if let Some(body) = world.body(*handle) {
            let position = body.position();
            info!(
                "Object {} at ({:.2}, {:.2}, {:.2})",
                id, position.x, position.y, position.z
            );
        }
    }

    world.clear_world()?;
    Ok(())
}
