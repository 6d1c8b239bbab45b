//! Two-phase step state machine
//!
//! Each tick is `pre_process` (mechanisms, mailbox delivery) followed by
//! `post_process` (external commands, movement). Between the two the latest
//! history slice reflects the mechanism results, so controllers decide on
//! what their agents can already see of this tick.

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::agent::index::AgentIndex;
use crate::agent::state::MutableAgentState;
use crate::command::catalog::CommandRejection;
use crate::command::envelope::CommandEnvelope;
use crate::command::router::{self, CellAgents, CellDispatch, CommandRouter, SelfTargets, SendRejection};
use crate::core::config::{RuntimeOptions, UniverseSettings};
use crate::core::error::{Result, UniverseError};
use crate::core::types::{AgentId, AgentType, Int3D, Tick};
use crate::history::slice::HistorySlice;
use crate::history::store::HistoryStore;
use crate::history::view::AgentVisibilityView;
use crate::mechanism::global::GlobalState;
use crate::mechanism::movement;
use crate::mechanism::pipeline::MechanismPipeline;
use crate::persistence::UniverseStore;
use crate::spacetime;
use crate::universe::config::{Registry, SimulationConfig};
use crate::universe::data::UniverseData;
use crate::universe::fan_out::{self, CellTask};
use crate::universe::generation::{self, GenerationParams};
use crate::universe::report::{PhaseKind, PhaseReport, SliceCommit};

/// Commands submitted per sender
pub type CommandBatch = BTreeMap<AgentId, Vec<CommandEnvelope>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    /// Ready for `pre_process`
    Idle,
    /// Pre phase done, waiting for `post_process`
    AwaitingCommands,
}

impl StepPhase {
    fn name(&self) -> &'static str {
        match self {
            StepPhase::Idle => "idle",
            StepPhase::AwaitingCommands => "awaiting commands",
        }
    }
}

/// Both phase reports of one full step
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub pre: PhaseReport,
    pub post: PhaseReport,
}

pub struct Universe {
    data: UniverseData,
    config: SimulationConfig,
    index: AgentIndex,
    /// Working state of every live agent
    agents: BTreeMap<AgentId, MutableAgentState>,
    phase: StepPhase,
    pool: rayon::ThreadPool,
}

impl Universe {
    /// Resume from existing data. Live agents are the latest slice's
    /// snapshots taken at the current time; older ones are after-images.
    pub fn new(data: UniverseData, config: SimulationConfig, options: &RuntimeOptions) -> Result<Self> {
        data.settings.validate()?;
        let now = data.clock.time;
        if data.history.latest_time() != now {
            return Err(UniverseError::Inconsistent(format!(
                "history ends at {} but the clock is at {now}",
                data.history.latest_time()
            )));
        }
        if data.clock.rng.cells.len() != data.settings.cell_count() {
            return Err(UniverseError::Inconsistent(format!(
                "{} cell random streams for {} cells",
                data.clock.rng.cells.len(),
                data.settings.cell_count()
            )));
        }

        let agents: BTreeMap<AgentId, MutableAgentState> = data
            .history
            .latest()
            .snapshots()
            .filter(|snapshot| snapshot.int4d.t == now)
            .map(|snapshot| (snapshot.id, MutableAgentState::from_snapshot(snapshot)))
            .collect();
        let mut index = AgentIndex::new();
        index.rebuild(agents.values());

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.worker_threads)
            .thread_name(|i| format!("lightcone-cell-{i}"))
            .build()?;

        tracing::info!(
            universe = %data.settings.universe_name,
            time = now,
            agents = agents.len(),
            threads = pool.current_num_threads(),
            "universe ready"
        );

        Ok(Self {
            data,
            config,
            index,
            agents,
            phase: StepPhase::Idle,
            pool,
        })
    }

    /// Create a new universe at time zero
    pub fn generate(
        settings: UniverseSettings,
        params: &GenerationParams,
        registry: &Registry,
        options: &RuntimeOptions,
    ) -> Result<Self> {
        let config = registry.resolve(&settings)?;
        let data = generation::initial_data(settings, params)?;
        Self::new(data, config, options)
    }

    /// Load a saved universe, optionally with a fresh random seed
    pub fn load(
        store: &UniverseStore,
        name: &str,
        registry: &Registry,
        options: &RuntimeOptions,
        randomize_seed: bool,
    ) -> Result<Self> {
        let mut data = store.load(name)?;
        if randomize_seed {
            let seed = rand::random::<u64>();
            tracing::info!(universe = name, seed, "randomized seed on load");
            data.reseed(seed);
        }
        let config = registry.resolve(&data.settings)?;
        Self::new(data, config, options)
    }

    pub fn save_all(&self, store: &UniverseStore) -> Result<()> {
        self.expect_phase(StepPhase::Idle)?;
        store.save_all(&self.data)
    }

    pub fn save_latest(&self, store: &UniverseStore) -> Result<()> {
        self.expect_phase(StepPhase::Idle)?;
        store.save_latest(&self.data)
    }

    pub fn data(&self) -> &UniverseData {
        &self.data
    }

    pub fn settings(&self) -> &UniverseSettings {
        &self.data.settings
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn time(&self) -> Tick {
        self.data.clock.time
    }

    pub fn phase(&self) -> StepPhase {
        self.phase
    }

    pub fn history(&self) -> &HistoryStore {
        &self.data.history
    }

    pub fn global(&self) -> &GlobalState {
        &self.data.global
    }

    pub fn index(&self) -> &AgentIndex {
        &self.index
    }

    pub fn agent(&self, id: AgentId) -> Option<&MutableAgentState> {
        self.agents.get(&id)
    }

    pub fn agents(&self) -> impl Iterator<Item = &MutableAgentState> {
        self.agents.values()
    }

    pub fn pending_commands(&self) -> usize {
        self.data.mailbox.len()
    }

    /// What `id` sees from where it stands now
    pub fn get_view(&self, id: AgentId) -> Result<AgentVisibilityView> {
        let state = self.agents.get(&id).ok_or(UniverseError::UnknownAgent(id))?;
        Ok(self.data.history.view_at(state.int4d, &self.data.settings))
    }

    fn expect_phase(&self, expected: StepPhase) -> Result<()> {
        if self.phase != expected {
            return Err(UniverseError::PhaseOrder {
                expected: expected.name(),
                found: self.phase.name(),
            });
        }
        Ok(())
    }

    /// Global mechanisms, proper time, per-agent mechanisms and mailbox
    /// delivery. Replaces the latest slice; the clock does not move.
    pub fn pre_process(&mut self) -> Result<PhaseReport> {
        self.expect_phase(StepPhase::Idle)?;
        let Universe {
            data,
            config,
            index,
            agents,
            phase,
            pool,
        } = self;
        let UniverseData {
            settings,
            history,
            clock,
            mailbox,
            global,
        } = data;
        let settings: &UniverseSettings = settings;
        let time = clock.time;
        let mut report = PhaseReport::new(PhaseKind::Pre, time);

        for mechanism in &config.global_mechanisms {
            mechanism.process(global, history, settings, &mut clock.rng.master);
        }

        for state in agents.values_mut() {
            let fraction = spacetime::dilation(state.double4d, state.velocity, settings);
            state.proper_time.advance(fraction);
        }

        let dispatches = {
            let router = CommandRouter::new(index, settings);
            let tasks = fan_out::cell_tasks(agents, &mut clock.rng.cells, settings);
            run_mechanisms(pool, tasks, &router, &config.pipeline, history, settings, global)
        };
        for mut dispatch in dispatches {
            report.queued += dispatch.remote.len();
            for envelope in dispatch.remote.drain(..) {
                mailbox.push(envelope);
            }
            report.absorb(dispatch);
        }

        for envelope in mailbox.release(time, index, settings) {
            let Some(target) = agents.get_mut(&envelope.to_id) else {
                tracing::error!(to = %envelope.to_id, "released mail for an unindexed agent");
                continue;
            };
            let (delivery, rolled_back) = router::deliver(&envelope, target, settings);
            if rolled_back {
                report.rolled_back.insert(envelope.to_id);
            }
            report.deliveries.push(delivery);
        }

        let reconciliation = index.reconcile(agents, config.death_rule, &mut clock.ids, settings);
        report.died = reconciliation.died;
        report.born = reconciliation.born;

        let slice = HistorySlice::capture(
            agents,
            Some(history.latest()),
            time,
            settings.after_image_duration,
        );
        history.replace_latest(slice);
        report.commit = SliceCommit {
            time,
            agents: agents.len(),
            appended: false,
        };

        *phase = StepPhase::AwaitingCommands;
        tracing::debug!(
            time,
            deliveries = report.deliveries.len(),
            queued = report.queued,
            died = report.died.len(),
            born = report.born.len(),
            "pre phase done"
        );
        Ok(report)
    }

    /// Commands for every AI-controlled agent, from what each one sees
    pub fn compute_ai_commands(&mut self) -> CommandBatch {
        let mut batch = CommandBatch::new();
        for state in self.agents.values().filter(|s| s.agent_type == AgentType::Ai) {
            let view = self.data.history.view_at(state.int4d, &self.data.settings);
            let commands = self
                .config
                .ai
                .compute(state.id, &view, &mut self.data.clock.rng.ai);
            if !commands.is_empty() {
                batch.insert(state.id, commands);
            }
        }
        batch
    }

    /// Apply external commands, move every agent and append a new slice.
    ///
    /// When both batches carry commands for the same sender, the human batch
    /// wins. Commands from or to agents that are gone, and kinds outside the
    /// universe's command set, never reach the router.
    pub fn post_process(&mut self, human: CommandBatch, ai: CommandBatch) -> Result<PhaseReport> {
        self.expect_phase(StepPhase::AwaitingCommands)?;
        let Universe {
            data,
            config,
            index,
            agents,
            phase,
            pool,
        } = self;
        let UniverseData {
            settings,
            history,
            clock,
            mailbox,
            ..
        } = data;
        let settings: &UniverseSettings = settings;
        let time = clock.time;
        let mut report = PhaseReport::new(PhaseKind::Post, time);

        let mut batch = human;
        for (sender, commands) in ai {
            if batch.contains_key(&sender) {
                tracing::debug!(agent = %sender, "human commands override AI");
                continue;
            }
            batch.insert(sender, commands);
        }

        let mut by_cell: BTreeMap<Int3D, CommandBatch> = BTreeMap::new();
        for (sender_id, envelopes) in batch {
            let Some(sender) = agents.get(&sender_id) else {
                tracing::debug!(agent = %sender_id, "commands from a dead agent dropped");
                continue;
            };
            for mut envelope in envelopes {
                if envelope.from_id != sender_id {
                    tracing::warn!(
                        agent = %sender_id,
                        claimed = %envelope.from_id,
                        "command filed under another sender, dropped"
                    );
                    continue;
                }
                if !index.contains(envelope.to_id) {
                    tracing::debug!(from = %sender_id, to = %envelope.to_id, "command to a dead agent dropped");
                    continue;
                }
                if !config.availability.allows(envelope.kind()) {
                    report.rejections.push(SendRejection {
                        from_id: sender_id,
                        to_id: envelope.to_id,
                        rejection: CommandRejection::new(
                            envelope.kind(),
                            format!("not available in {}", config.availability.name()),
                        ),
                    });
                    continue;
                }
                envelope.from_int4d = sender.int4d;
                by_cell
                    .entry(sender.int4d.to_int3d())
                    .or_default()
                    .entry(sender_id)
                    .or_default()
                    .push(envelope);
            }
        }

        let dispatches = {
            let router = CommandRouter::new(index, settings);
            let work: Vec<(CellTask<'_>, CommandBatch)> =
                fan_out::cell_tasks(agents, &mut clock.rng.cells, settings)
                    .into_iter()
                    .filter_map(|task| {
                        let outgoing = by_cell.remove(&task.cell)?;
                        Some((task, outgoing))
                    })
                    .collect();
            run_commands(pool, work, &router)
        };
        for mut dispatch in dispatches {
            report.queued += dispatch.remote.len();
            for envelope in dispatch.remote.drain(..) {
                mailbox.push(envelope);
            }
            report.absorb(dispatch);
        }

        pool.install(|| {
            agents
                .par_iter_mut()
                .for_each(|(_, state)| movement::advance(state, settings));
        });

        let reconciliation = index.reconcile(agents, config.death_rule, &mut clock.ids, settings);
        report.died = reconciliation.died;
        report.born = reconciliation.born;

        clock.time += 1;
        let slice = HistorySlice::capture(
            agents,
            Some(history.latest()),
            clock.time,
            settings.after_image_duration,
        );
        history.append(slice);
        report.commit = SliceCommit {
            time: clock.time,
            agents: agents.len(),
            appended: true,
        };

        *phase = StepPhase::Idle;
        tracing::debug!(
            time = clock.time,
            deliveries = report.deliveries.len(),
            rejections = report.rejections.len(),
            queued = report.queued,
            "post phase done"
        );
        Ok(report)
    }

    /// One full tick: pre phase, AI decisions, post phase
    pub fn step(&mut self, human: CommandBatch) -> Result<StepReport> {
        let pre = self.pre_process()?;
        let ai = self.compute_ai_commands();
        let post = self.post_process(human, ai)?;
        Ok(StepReport { pre, post })
    }
}

/// Parallel per-cell mechanism run followed by in-cell dispatch
fn run_mechanisms(
    pool: &rayon::ThreadPool,
    tasks: Vec<CellTask<'_>>,
    router: &CommandRouter<'_>,
    pipeline: &MechanismPipeline,
    history: &HistoryStore,
    settings: &UniverseSettings,
    global: &GlobalState,
) -> Vec<CellDispatch> {
    pool.install(|| {
        tasks
            .into_par_iter()
            .map(|task| {
                let CellTask {
                    cell,
                    agents: mut states,
                    rng,
                } = task;
                let mut outgoing = CommandBatch::new();
                let mut failed = Vec::new();
                for state in states.iter_mut() {
                    let view = history.view_at(state.int4d, settings);
                    let outcome = pipeline.run(state, &view, settings, global, rng);
                    if !outcome.failed.is_empty() {
                        failed.push(state.id);
                    }
                    if !outcome.commands.is_empty() {
                        outgoing.insert(state.id, outcome.commands);
                    }
                }

                let mut cell_agents = CellAgents::new(cell, states);
                let mut dispatch = router.dispatch(&mut cell_agents, outgoing, SelfTargets::Routed, rng);
                dispatch.rolled_back.extend(failed);
                dispatch
            })
            .collect()
    })
}

/// Parallel per-cell dispatch of external commands
fn run_commands(
    pool: &rayon::ThreadPool,
    work: Vec<(CellTask<'_>, CommandBatch)>,
    router: &CommandRouter<'_>,
) -> Vec<CellDispatch> {
    pool.install(|| {
        work.into_par_iter()
            .map(|(task, outgoing)| {
                let mut cell_agents = CellAgents::new(task.cell, task.agents);
                router.dispatch(&mut cell_agents, outgoing, SelfTargets::Immediate, task.rng)
            })
            .collect()
    })
}
