// 2.5D physics layer for a top-down city sandbox.
//
// The solver plane is world (x, z); the vertical axis y is simulated
// separately per body (falling, ground snapping, water).

pub mod core;
pub mod engine;
pub mod game;

pub use engine::physics::{PhysicsError, PhysicsSettings, PhysicsWorld};
