// Core types shared by the engine and game modules

pub mod math;

pub use math::Transform;
