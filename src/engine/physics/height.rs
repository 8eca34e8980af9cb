// Vertical gravity simulation on top of the planar solver

use glam::Vec2;

use super::body::HeightState;
use super::map::MapData;
use super::settings::PhysicsSettings;

/// Notification raised by a height step
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HeightEvent {
    FallingStarts,
    FallsOnGround { fall_distance: f32 },
    FallsOnWater { fall_distance: f32 },
}

/// Result of one height step
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HeightUpdate {
    /// The vertical coordinate changed
    pub moved: bool,
    pub event: Option<HeightEvent>,
}

/// Advance the vertical state of one body by `dt` seconds
///
/// `gravity_applies` is false when gravity is off for the world or the body.
pub fn integrate_height(
    position_y: &mut f32,
    state: &mut HeightState,
    planar: Vec2,
    gravity_applies: bool,
    map: &dyn MapData,
    settings: &PhysicsSettings,
    dt: f32,
) -> HeightUpdate {
    let ground = map.height_at_position(planar, false);
    let previous_y = *position_y;
    let mut event = None;

    match *state {
        HeightState::WaterContact => {}
        HeightState::Grounded => {
            if (ground - *position_y).abs() <= settings.fall_threshold {
                *position_y = ground;
            } else if gravity_applies {
                *state = HeightState::Falling {
                    start_height: *position_y,
                };
                event = Some(HeightEvent::FallingStarts);
            }
        }
        HeightState::Falling { .. } if !gravity_applies => {
            // Gravity switched off mid-fall, the body hovers where it is
            *state = HeightState::Grounded;
        }
        HeightState::Falling { start_height } => {
            *position_y = ground.max(*position_y - settings.gravity * dt);

            if *position_y <= ground {
                let fall_distance = (start_height - ground).max(0.0);
                let in_water = map
                    .water_level_at_position(planar)
                    .is_some_and(|level| level >= ground);

                if in_water {
                    *state = HeightState::WaterContact;
                    *position_y = ground - settings.water_submerge_depth;
                    event = Some(HeightEvent::FallsOnWater { fall_distance });
                } else {
                    *state = HeightState::Grounded;
                    event = Some(HeightEvent::FallsOnGround { fall_distance });
                }
            }
        }
    }

    HeightUpdate {
        moved: *position_y != previous_y,
        event,
    }
}
