use std::time::Duration;

use crate::engine::game_loop::{DEFAULT_MAX_STEPS_PER_FRAME, DEFAULT_STEP};

/// Tunable parameters of the physics world
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicsSettings {
    /// Length of one fixed simulation step
    pub step: Duration,

    /// Catch-up cap per frame, `None` runs every due step
    pub max_steps_per_frame: Option<u32>,

    /// Solver velocity iterations per step
    pub velocity_iterations: usize,

    /// Solver position (stabilization) iterations per step
    pub position_iterations: usize,

    /// World-wide switch for vertical gravity
    pub gravity_enabled: bool,

    /// Descent speed while falling, in units per second
    pub gravity: f32,

    /// Height gap above which a grounded body starts to fall
    pub fall_threshold: f32,

    /// How far below the surface a body sits after landing in water
    pub water_submerge_depth: f32,

    /// Maximum height difference at which two objects still interact
    pub vertical_overlap_tolerance: f32,
}

impl PhysicsSettings {
    pub fn with_step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    pub fn with_max_steps_per_frame(mut self, max_steps: Option<u32>) -> Self {
        self.max_steps_per_frame = max_steps;
        self
    }

    pub fn with_iterations(mut self, velocity: usize, position: usize) -> Self {
        self.velocity_iterations = velocity;
        self.position_iterations = position;
        self
    }

    pub fn with_gravity(mut self, gravity: f32) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_gravity_enabled(mut self, enabled: bool) -> Self {
        self.gravity_enabled = enabled;
        self
    }

    pub fn with_fall_threshold(mut self, threshold: f32) -> Self {
        self.fall_threshold = threshold;
        self
    }

    pub fn with_water_submerge_depth(mut self, depth: f32) -> Self {
        self.water_submerge_depth = depth;
        self
    }

    pub fn with_vertical_overlap_tolerance(mut self, tolerance: f32) -> Self {
        self.vertical_overlap_tolerance = tolerance;
        self
    }

    /// Step length in seconds
    pub fn step_secs(&self) -> f32 {
        self.step.as_secs_f32()
    }
}

impl Default for PhysicsSettings {
    fn default() -> Self {
        Self {
            step: DEFAULT_STEP,
            max_steps_per_frame: Some(DEFAULT_MAX_STEPS_PER_FRAME),
            velocity_iterations: 3,
            position_iterations: 2,
            gravity_enabled: true,
            gravity: 9.8,
            fall_threshold: 0.1,
            water_submerge_depth: 0.3,
            vertical_overlap_tolerance: 1.0,
        }
    }
}
