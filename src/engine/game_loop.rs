/// Fixed timestep accumulator
///
/// Converts variable frame times into a whole number of fixed simulation
/// steps. Time is accumulated as a `Duration`, so splitting the same elapsed
/// time into different frame chunks always yields the same number of steps.
use std::time::Duration;

/// Default simulation rate (60 steps per second)
pub const DEFAULT_STEP: Duration = Duration::from_nanos(16_666_667);

/// Default cap on catch-up steps to prevent spiral of death
pub const DEFAULT_MAX_STEPS_PER_FRAME: u32 = 5;

/// Fixed-step timing state
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    /// Length of one simulation step
    step: Duration,

    /// Time not yet consumed by a step
    accumulator: Duration,

    /// Catch-up cap, `None` runs every due step
    max_steps_per_frame: Option<u32>,

    /// Total steps handed out since creation
    total_steps: u64,

    /// Total whole steps discarded by the catch-up cap
    dropped_steps: u64,
}

impl FixedTimestep {
    /// Create a timer with the given step length and catch-up cap
    ///
    /// A zero step falls back to `DEFAULT_STEP`.
    pub fn new(step: Duration, max_steps_per_frame: Option<u32>) -> Self {
        let step = if step.is_zero() {
            log::error!("Fixed step must be non-zero, using {:?}", DEFAULT_STEP);
            DEFAULT_STEP
        } else {
            step
        };
        Self {
            step,
            accumulator: Duration::ZERO,
            max_steps_per_frame,
            total_steps: 0,
            dropped_steps: 0,
        }
    }

    /// Add elapsed frame time, returns the number of fixed steps to run now
    ///
    /// When the cap is reached the remaining whole-step backlog is dropped and
    /// only the sub-step remainder is kept, so `alpha()` stays below 1.
    pub fn accumulate(&mut self, delta: Duration) -> u32 {
        self.accumulator += delta;

        let mut steps = 0;
        while self.accumulator >= self.step {
            if let Some(cap) = self.max_steps_per_frame {
                if steps >= cap {
                    let backlog = (self.accumulator.as_nanos() / self.step.as_nanos()) as u64;
                    self.accumulator = Duration::from_nanos(
                        (self.accumulator.as_nanos() % self.step.as_nanos()) as u64,
                    );
                    self.dropped_steps += backlog;
                    log::warn!(
                        "Simulation falling behind, dropped {} step(s) after {} this frame",
                        backlog,
                        cap
                    );
                    break;
                }
            }
            self.accumulator -= self.step;
            steps += 1;
        }

        self.total_steps += steps as u64;
        steps
    }

    /// Get the fixed step length
    pub fn step(&self) -> Duration {
        self.step
    }

    /// Get the fixed step length in seconds
    pub fn step_secs(&self) -> f32 {
        self.step.as_secs_f32()
    }

    /// Interpolation factor between the last step and the next, in [0, 1)
    pub fn alpha(&self) -> f32 {
        let alpha = (self.accumulator.as_nanos() as f64 / self.step.as_nanos() as f64) as f32;
        // f64 -> f32 rounding can land exactly on 1.0
        alpha.min(1.0 - f32::EPSILON)
    }

    /// Time left over after the last step
    pub fn accumulator(&self) -> Duration {
        self.accumulator
    }

    /// Total number of steps executed
    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    /// Total number of steps discarded by the catch-up cap
    pub fn dropped_steps(&self) -> u64 {
        self.dropped_steps
    }
}

impl Default for FixedTimestep {
    fn default() -> Self {
        Self::new(DEFAULT_STEP, Some(DEFAULT_MAX_STEPS_PER_FRAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP: Duration = Duration::from_nanos(15_625_000); // 1/64 s

    #[test]
    fn test_fixed_timestep_creation() {
        let timer = FixedTimestep::default();
        assert_eq!(timer.total_steps(), 0);
        assert_eq!(timer.step(), DEFAULT_STEP);
        assert!((timer.step_secs() - 1.0 / 60.0).abs() < 0.0001);
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let mut fine = FixedTimestep::new(STEP, None);
        let mut coarse = FixedTimestep::new(STEP, None);

        let fine_steps: u32 = (0..128)
            .map(|_| fine.accumulate(Duration::from_nanos(7_812_500)))
            .sum();
        let coarse_steps: u32 = (0..32)
            .map(|_| coarse.accumulate(Duration::from_nanos(31_250_000)))
            .sum();

        assert_eq!(fine_steps, 64);
        assert_eq!(coarse_steps, 64);
        assert_eq!(fine.accumulator(), coarse.accumulator());
    }

    #[test]
    fn test_partial_step_accumulates() {
        let mut timer = FixedTimestep::new(STEP, None);
        assert_eq!(timer.accumulate(STEP / 2), 0);
        assert!((timer.alpha() - 0.5).abs() < 1e-6);
        assert_eq!(timer.accumulate(STEP / 2), 1);
        assert_eq!(timer.alpha(), 0.0);
    }

    #[test]
    fn test_max_steps_limit() {
        let mut timer = FixedTimestep::new(STEP, Some(5));

        // 20 steps worth of time plus a quarter step
        let steps = timer.accumulate(STEP * 20 + STEP / 4);
        assert_eq!(steps, 5);
        assert_eq!(timer.dropped_steps(), 15);
        assert!((timer.alpha() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_zero_step_uses_default() {
        let mut timer = FixedTimestep::new(Duration::ZERO, None);
        assert_eq!(timer.step(), DEFAULT_STEP);
        assert_eq!(timer.accumulate(DEFAULT_STEP * 3), 3);
    }

    #[test]
    fn test_alpha_range() {
        let mut timer = FixedTimestep::new(STEP, Some(5));
        for i in 1..50u64 {
            timer.accumulate(Duration::from_nanos(i * 1_234_567));
            let alpha = timer.alpha();
            assert!((0.0..1.0).contains(&alpha));
        }
    }
}
