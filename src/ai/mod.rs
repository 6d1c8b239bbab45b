//! Controllers for AI-driven agents
//!
//! An AI sees exactly what its agent sees and answers with commands, which
//! go through the same post-phase checks as human input.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::command::catalog::Command;
use crate::command::envelope::CommandEnvelope;
use crate::core::types::{AgentId, Velocity};
use crate::history::view::AgentVisibilityView;

pub trait Ai: Send + Sync {
    fn name(&self) -> &'static str;

    /// Commands `agent` wants to send this tick
    fn compute(
        &self,
        agent: AgentId,
        view: &AgentVisibilityView,
        rng: &mut ChaCha8Rng,
    ) -> Vec<CommandEnvelope>;
}

/// Never does anything
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyAi;

impl Ai for EmptyAi {
    fn name(&self) -> &'static str {
        "Empty"
    }

    fn compute(&self, _: AgentId, _: &AgentVisibilityView, _: &mut ChaCha8Rng) -> Vec<CommandEnvelope> {
        Vec::new()
    }
}

/// Occasionally gifts resources to a visible neighbour or changes course
#[derive(Debug, Clone, Copy)]
pub struct RandomTraderAi {
    pub trade_chance: f64,
    /// Share of the agent's resources given away per trade
    pub trade_share: f64,
    pub retention: f64,
    pub steer_chance: f64,
    /// Fraction of light speed used for random course changes
    pub max_speed: f64,
}

impl Default for RandomTraderAi {
    fn default() -> Self {
        Self {
            trade_chance: 0.2,
            trade_share: 0.1,
            retention: 0.99,
            steer_chance: 0.05,
            max_speed: 0.5,
        }
    }
}

impl Ai for RandomTraderAi {
    fn name(&self) -> &'static str {
        "RandomTrader"
    }

    fn compute(
        &self,
        agent: AgentId,
        view: &AgentVisibilityView,
        rng: &mut ChaCha8Rng,
    ) -> Vec<CommandEnvelope> {
        let Some(me) = view.get(agent) else {
            return Vec::new();
        };
        let mut commands = Vec::new();

        if rng.gen_bool(self.trade_chance) && me.internal.resources > 0.0 {
            let partners: Vec<AgentId> = view.ids().filter(|id| *id != agent).collect();
            if !partners.is_empty() {
                let partner = partners[rng.gen_range(0..partners.len())];
                commands.push(CommandEnvelope::new(
                    partner,
                    agent,
                    me.int4d,
                    Command::send_resource(me.internal.resources * self.trade_share, self.retention),
                ));
            }
        }

        if rng.gen_bool(self.steer_chance) {
            let speed = self.max_speed * rng.gen::<f64>();
            let angle = rng.gen_range(0.0..std::f64::consts::TAU);
            commands.push(CommandEnvelope::new(
                agent,
                agent,
                me.int4d,
                Command::change_velocity(Velocity::new(speed * angle.cos(), speed * angle.sin(), 0.0)),
            ));
        }

        commands
    }
}
