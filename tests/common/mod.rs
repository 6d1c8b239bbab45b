//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use lightcone_sim::agent::{AgentIdAllocator, AgentInternal, AgentSpawn, MutableAgentState};
use lightcone_sim::command::{Command, CommandEnvelope, CommandMailbox};
use lightcone_sim::core::config::RuntimeOptions;
use lightcone_sim::core::types::{AgentId, AgentType, Double4D, Velocity};
use lightcone_sim::history::{HistorySlice, HistoryStore};
use lightcone_sim::mechanism::GlobalState;
use lightcone_sim::universe::{
    Clock, CommandBatch, RngStreams, StepReport, UniverseData,
};
use lightcone_sim::{Registry, Universe, UniverseSettings};

pub const STARTING_RESOURCES: f64 = 100.0;
pub const STARTING_POPULATION: f64 = 10.0;

/// Default grid with every pluggable collection switched off
pub fn quiet_settings(name: &str) -> UniverseSettings {
    UniverseSettings {
        universe_name: name.to_string(),
        mechanism_collection: "Empty".into(),
        global_mechanism_collection: "Empty".into(),
        ai_collection: "Empty".into(),
        ..UniverseSettings::default()
    }
}

/// A universe at time zero with one resting AI agent per position; ids
/// start at 1 in the given order
pub fn universe_at(
    settings: UniverseSettings,
    positions: &[(f64, f64, f64)],
    registry: &Registry,
) -> Universe {
    let mut ids = AgentIdAllocator::default();
    let agents: BTreeMap<AgentId, MutableAgentState> = positions
        .iter()
        .map(|&(x, y, z)| {
            let id = ids.next_id();
            let state = MutableAgentState::spawn(
                id,
                AgentSpawn {
                    name: format!("agent-{}", id.0),
                    agent_type: AgentType::Ai,
                    velocity: Velocity::default(),
                    internal: AgentInternal {
                        resources: STARTING_RESOURCES,
                        population: STARTING_POPULATION,
                        ..AgentInternal::default()
                    },
                },
                Double4D::new(0.0, x, y, z),
                &settings,
            );
            (id, state)
        })
        .collect();

    let initial = HistorySlice::capture(&agents, None, 0, settings.after_image_duration);
    let data = UniverseData {
        history: HistoryStore::new(settings.t_dim as usize, 0, initial),
        clock: Clock {
            time: 0,
            ids,
            rng: RngStreams::from_seed(settings.random_seed, settings.cell_count()),
        },
        mailbox: CommandMailbox::new(),
        global: GlobalState::default(),
        settings,
    };
    let config = registry.resolve(&data.settings).expect("registered collections");
    Universe::new(data, config, &RuntimeOptions::default()).expect("valid universe")
}

pub fn run_idle(universe: &mut Universe, steps: usize) -> Vec<StepReport> {
    (0..steps)
        .map(|_| universe.step(CommandBatch::new()).expect("step"))
        .collect()
}

/// One full step in which `from` sends `command` to `to` as a human order
pub fn step_with_order(
    universe: &mut Universe,
    from: AgentId,
    to: AgentId,
    command: Command,
) -> StepReport {
    let pre = universe.pre_process().expect("pre phase");
    let sender = universe.agent(from).expect("sender alive");
    let human = BTreeMap::from([(from, vec![CommandEnvelope::from_agent(sender, to, command)])]);
    let ai = universe.compute_ai_commands();
    let post = universe.post_process(human, ai).expect("post phase");
    StepReport { pre, post }
}

pub fn temp_root(prefix: &str) -> PathBuf {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    std::env::temp_dir().join(format!("{prefix}-{}-{timestamp}", std::process::id()))
}
