//! Ordered per-agent mechanism list with per-mechanism isolation

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use rand_chacha::ChaCha8Rng;
use thiserror::Error;

use crate::agent::state::MutableAgentState;
use crate::command::envelope::CommandEnvelope;
use crate::core::config::UniverseSettings;
use crate::core::types::AgentId;
use crate::history::view::AgentVisibilityView;
use crate::mechanism::global::GlobalState;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MechanismError {
    #[error("invariant violated for {agent}: {reason}")]
    Invariant { agent: AgentId, reason: String },
}

/// One rule applied to every live agent each tick.
///
/// Must be deterministic given the same inputs and RNG stream, and may only
/// mutate `state`. Expected edge cases (no resources, empty view) are normal
/// states, not errors.
pub trait Mechanism: Send + Sync {
    fn name(&self) -> &'static str;

    /// Dilated mechanisms only run on the agent's action ticks
    fn dilated(&self) -> bool {
        false
    }

    fn process(
        &self,
        state: &mut MutableAgentState,
        view: &AgentVisibilityView,
        settings: &UniverseSettings,
        global: &GlobalState,
        rng: &mut ChaCha8Rng,
    ) -> Result<Vec<CommandEnvelope>, MechanismError>;
}

/// Commands produced for one agent and the mechanisms that failed on it
#[derive(Debug, Default)]
pub struct PipelineOutcome {
    pub commands: Vec<CommandEnvelope>,
    pub failed: Vec<&'static str>,
}

#[derive(Clone, Default)]
pub struct MechanismPipeline {
    mechanisms: Vec<Arc<dyn Mechanism>>,
}

impl MechanismPipeline {
    pub fn new(mechanisms: Vec<Arc<dyn Mechanism>>) -> Self {
        Self { mechanisms }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.mechanisms.iter().map(|m| m.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.mechanisms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mechanisms.is_empty()
    }

    /// Run every mechanism in order on one agent.
    ///
    /// A mechanism that errors or panics is skipped: its changes to `state`
    /// are undone and its commands discarded. Emitted envelopes are stamped
    /// with the agent's id and position at emission.
    pub fn run(
        &self,
        state: &mut MutableAgentState,
        view: &AgentVisibilityView,
        settings: &UniverseSettings,
        global: &GlobalState,
        rng: &mut ChaCha8Rng,
    ) -> PipelineOutcome {
        let mut outcome = PipelineOutcome::default();

        for mechanism in &self.mechanisms {
            if mechanism.dilated() && !state.proper_time.is_action_tick {
                continue;
            }

            let before = state.clone();
            let result = catch_unwind(AssertUnwindSafe(|| {
                mechanism.process(state, view, settings, global, rng)
            }));
            match result {
                Ok(Ok(commands)) => {
                    outcome
                        .commands
                        .extend(commands.into_iter().map(|mut envelope| {
                            envelope.from_id = state.id;
                            envelope.from_int4d = state.int4d;
                            envelope
                        }));
                }
                Ok(Err(err)) => {
                    *state = before;
                    tracing::error!(agent = %state.id, mechanism = mechanism.name(), %err, "mechanism failed, skipped");
                    outcome.failed.push(mechanism.name());
                }
                Err(_) => {
                    *state = before;
                    tracing::error!(agent = %state.id, mechanism = mechanism.name(), "mechanism panicked, skipped");
                    outcome.failed.push(mechanism.name());
                }
            }
        }

        outcome
    }
}

impl std::fmt::Debug for MechanismPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
