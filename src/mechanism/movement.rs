//! Advancing agents through space and time

use crate::agent::state::MutableAgentState;
use crate::core::config::UniverseSettings;
use crate::core::types::Double4D;

/// Move one tick forward along the agent's velocity.
///
/// Positions stay inside the grid: an agent hitting a wall stops there and
/// loses the velocity component pointing into it.
pub fn advance(state: &mut MutableAgentState, settings: &UniverseSettings) {
    let pos = state.double4d;
    let mut velocity = state.velocity;

    let x = clamp_axis(pos.x, &mut velocity.vx, settings.x_dim);
    let y = clamp_axis(pos.y, &mut velocity.vy, settings.y_dim);
    let z = clamp_axis(pos.z, &mut velocity.vz, settings.z_dim);

    state.velocity = velocity;
    state.set_position(Double4D::new(f64::from(state.int4d.t + 1), x, y, z), settings);
}

fn clamp_axis(coord: f64, v: &mut f64, dim: i32) -> f64 {
    // Largest coordinate that still floors into the last cell
    let upper = f64::from(dim) - f64::EPSILON * f64::from(dim).max(1.0) * 4.0;
    let next = coord + *v;
    if next < 0.0 {
        *v = 0.0;
        0.0
    } else if next > upper {
        *v = 0.0;
        upper
    } else {
        next
    }
}
