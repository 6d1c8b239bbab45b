//! Proper time accrued by moving agents

use serde::{Deserialize, Serialize};

use crate::core::config::UniverseSettings;
use crate::core::types::{Double4D, Velocity};

/// Fraction of a tick of proper time accrued during one universe tick.
///
/// Flat spacetime, so only the speed matters: `sqrt(1 - v^2 / c^2)`, zero at
/// or beyond light speed.
pub fn dilation(_position: Double4D, velocity: Velocity, settings: &UniverseSettings) -> f64 {
    let beta = velocity.magnitude() / settings.speed_of_light;
    if beta >= 1.0 {
        return 0.0;
    }
    (1.0 - beta * beta).sqrt()
}

/// Proper-time accumulator deciding an agent's action ticks
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProperTime {
    pub accumulated: f64,
    pub is_action_tick: bool,
}

impl Default for ProperTime {
    fn default() -> Self {
        Self {
            accumulated: 0.0,
            is_action_tick: true,
        }
    }
}

impl ProperTime {
    /// Add one tick's worth of proper time and flip the action flag
    pub fn advance(&mut self, fraction: f64) {
        self.accumulated += fraction;
        if self.accumulated >= 1.0 {
            self.accumulated -= 1.0;
            self.is_action_tick = true;
        } else {
            self.is_action_tick = false;
        }
    }
}
