// Game objects
//
// Sample gameplay objects that own physics bodies and react to the
// world's callbacks:
// - Pedestrians walking, falling and getting run over
// - Vehicles with a simple engine and tyre model
// - Projectiles detecting hits through touching contacts

pub mod objects;

pub use objects::{Pedestrian, Projectile, Vehicle};
