// Engine modules: fixed-step timing and physics

pub mod game_loop;
pub mod physics;
