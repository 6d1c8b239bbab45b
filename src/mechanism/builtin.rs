//! Built-in per-agent mechanisms

use rand_chacha::ChaCha8Rng;

use crate::agent::state::MutableAgentState;
use crate::command::envelope::CommandEnvelope;
use crate::core::config::UniverseSettings;
use crate::history::view::AgentVisibilityView;
use crate::mechanism::global::GlobalState;
use crate::mechanism::pipeline::{Mechanism, MechanismError};

/// Pour `available` into buckets in order, each up to its capacity.
///
/// Returns the amount placed in each bucket and what is left over.
pub fn waterfall(available: f64, capacities: &[f64]) -> (Vec<f64>, f64) {
    let mut remaining = available.max(0.0);
    let filled = capacities
        .iter()
        .map(|capacity| {
            let take = remaining.min(capacity.max(0.0));
            remaining -= take;
            take
        })
        .collect();
    (filled, remaining)
}

/// Population produces resources and eats some of them.
///
/// Upkeep is paid first from the stock plus this tick's production; an
/// unpaid share of upkeep costs the same share of population.
#[derive(Debug, Clone, Copy)]
pub struct ResourceProduction {
    pub production_rate: f64,
    pub upkeep: f64,
}

impl Default for ResourceProduction {
    fn default() -> Self {
        Self {
            production_rate: 1.0,
            upkeep: 0.5,
        }
    }
}

impl Mechanism for ResourceProduction {
    fn name(&self) -> &'static str {
        "ResourceProduction"
    }

    fn dilated(&self) -> bool {
        true
    }

    fn process(
        &self,
        state: &mut MutableAgentState,
        _: &AgentVisibilityView,
        _: &UniverseSettings,
        _: &GlobalState,
        _: &mut ChaCha8Rng,
    ) -> Result<Vec<CommandEnvelope>, MechanismError> {
        let internal = &mut state.internal;
        if !internal.population.is_finite() || !internal.resources.is_finite() {
            return Err(MechanismError::Invariant {
                agent: state.id,
                reason: format!(
                    "non-finite assets: resources {}, population {}",
                    internal.resources, internal.population
                ),
            });
        }
        if internal.population <= 0.0 {
            return Ok(Vec::new());
        }

        let produced = internal.population * self.production_rate;
        let need = internal.population * self.upkeep;
        let (paid, left) = waterfall(internal.resources + produced, &[need]);
        internal.resources = left;
        if need > 0.0 && paid[0] < need {
            internal.population *= paid[0] / need;
        }
        Ok(Vec::new())
    }
}

/// Keeps war records consistent with what the agent can see.
///
/// A war is dropped when the opponent is no longer visible. It is also
/// dropped when the opponent still shows no matching record after twice the
/// light delay plus one tick: silence from the other side is taken as peace,
/// even if its answer might still be in transit.
#[derive(Debug, Clone, Copy, Default)]
pub struct WarSync;

impl Mechanism for WarSync {
    fn name(&self) -> &'static str {
        "WarSync"
    }

    fn process(
        &self,
        state: &mut MutableAgentState,
        view: &AgentVisibilityView,
        settings: &UniverseSettings,
        _: &GlobalState,
        _: &mut ChaCha8Rng,
    ) -> Result<Vec<CommandEnvelope>, MechanismError> {
        if state.internal.wars.contains_key(&state.id) {
            tracing::error!(agent = %state.id, "agent at war with itself");
            state.internal.wars.remove(&state.id);
        }

        let id = state.id;
        let now = state.current_time();
        let here = state.int4d.to_int3d();
        state.internal.wars.retain(|opponent, record| {
            let Some(seen) = view.get(*opponent) else {
                tracing::debug!(agent = %id, opponent = %opponent, "opponent gone, war dropped");
                return false;
            };
            if seen.internal.wars.contains_key(&id) {
                return true;
            }
            let round_trip = 2 * settings.delay(here, seen.int4d.to_int3d()) + 1;
            if now - record.start_time > round_trip {
                tracing::debug!(agent = %id, opponent = %opponent, "no answer, implicit peace");
                return false;
            }
            true
        });
        Ok(Vec::new())
    }
}
