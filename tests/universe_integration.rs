//! Whole-universe properties: determinism, causality, index consistency,
//! phase ordering and failure isolation

mod common;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use common::{quiet_settings, run_idle, universe_at};
use lightcone_sim::agent::MutableAgentState;
use lightcone_sim::command::{Command, CommandEnvelope, CommandKind, DeclareWarCommand};
use lightcone_sim::core::config::RuntimeOptions;
use lightcone_sim::core::types::{AgentId, Velocity};
use lightcone_sim::history::AgentVisibilityView;
use lightcone_sim::mechanism::{GlobalState, Mechanism, MechanismError, MechanismPipeline};
use lightcone_sim::universe::{CommandBatch, GenerationParams};
use lightcone_sim::{Registry, Universe, UniverseError, UniverseSettings};
use rand_chacha::ChaCha8Rng;

fn trading_settings(name: &str) -> UniverseSettings {
    UniverseSettings {
        universe_name: name.to_string(),
        ai_collection: "RandomTrader".into(),
        x_dim: 6,
        y_dim: 6,
        z_dim: 2,
        t_dim: 9,
        random_seed: 2024,
        ..UniverseSettings::default()
    }
}

fn trading_universe(name: &str, threads: usize) -> Universe {
    let options = RuntimeOptions {
        worker_threads: threads,
        ..RuntimeOptions::default()
    };
    let params = GenerationParams {
        agent_count: 30,
        ..GenerationParams::default()
    };
    Universe::generate(trading_settings(name), &params, &Registry::with_builtins(), &options)
        .expect("valid universe")
}

#[test]
fn test_same_seed_same_history() {
    let mut first = trading_universe("det", 1);
    let mut second = trading_universe("det", 4);
    run_idle(&mut first, 25);
    run_idle(&mut second, 25);

    assert_eq!(first.time(), 25);
    assert_eq!(first.data(), second.data());
}

#[test]
fn test_different_seed_diverges() {
    let mut first = trading_universe("seed-a", 2);
    let mut settings = trading_settings("seed-b");
    settings.random_seed = 7;
    let mut second = Universe::generate(
        settings,
        &GenerationParams {
            agent_count: 30,
            ..GenerationParams::default()
        },
        &Registry::with_builtins(),
        &RuntimeOptions::default(),
    )
    .expect("valid universe");
    run_idle(&mut first, 5);
    run_idle(&mut second, 5);

    assert_ne!(first.history().latest(), second.history().latest());
}

#[test]
fn test_no_command_arrives_before_its_light() {
    let mut universe = trading_universe("causality", 0);
    let settings = universe.settings().clone();
    let mut remote = 0;

    for report in run_idle(&mut universe, 30) {
        for delivery in report.pre.deliveries.iter().chain(&report.post.deliveries) {
            let delay = settings.delay(delivery.sent_at.to_int3d(), delivery.delivered_at.to_int3d());
            assert!(
                delivery.delivered_at.t - delivery.sent_at.t >= delay,
                "{} -> {} delivered early: {:?}",
                delivery.from_id,
                delivery.to_id,
                delivery
            );
            if delay > 0 {
                remote += 1;
            }
        }
    }
    assert!(remote > 0, "no remote traffic was exercised");
}

#[test]
fn test_index_matches_latest_slice_after_every_phase() {
    let mut universe = trading_universe("orphans", 0);
    for _ in 0..12 {
        universe.pre_process().expect("pre");
        assert_eq!(universe.index().all_live_ids(), universe.history().latest().ids());

        let ai = universe.compute_ai_commands();
        universe.post_process(CommandBatch::new(), ai).expect("post");
        assert_eq!(universe.index().all_live_ids(), universe.history().latest().ids());
        let live: BTreeSet<AgentId> = universe.agents().map(|a| a.id).collect();
        assert_eq!(universe.index().all_live_ids(), live);
    }
}

#[test]
fn test_history_window_is_bounded() {
    let mut universe = trading_universe("window", 0);
    run_idle(&mut universe, 20);
    let history = universe.history();
    assert_eq!(history.len(), 9);
    assert_eq!(history.latest_time(), 20);
    assert_eq!(history.oldest_time(), 12);
}

#[test]
fn test_phases_must_alternate() {
    let registry = Registry::with_builtins();
    let mut universe = universe_at(quiet_settings("phases"), &[(0.5, 0.5, 0.5)], &registry);

    assert!(matches!(
        universe.post_process(CommandBatch::new(), CommandBatch::new()),
        Err(UniverseError::PhaseOrder { .. })
    ));
    universe.pre_process().expect("pre");
    assert!(matches!(universe.pre_process(), Err(UniverseError::PhaseOrder { .. })));
    assert_eq!(universe.time(), 0);

    universe
        .post_process(CommandBatch::new(), CommandBatch::new())
        .expect("post");
    assert_eq!(universe.time(), 1);
}

#[test]
fn test_human_orders_override_ai() {
    let registry = Registry::with_builtins();
    let spot = (3.5, 3.5, 0.5);
    let mut universe = universe_at(quiet_settings("precedence"), &[spot, spot], &registry);
    universe.pre_process().expect("pre");

    let me = universe.agent(AgentId(1)).expect("alive");
    let human = BTreeMap::from([(
        me.id,
        vec![CommandEnvelope::to_self(me, Command::change_velocity(Velocity::new(0.1, 0.0, 0.0)))],
    )]);
    let ai = BTreeMap::from([(
        me.id,
        vec![CommandEnvelope::to_self(me, Command::change_velocity(Velocity::new(0.0, 0.2, 0.0)))],
    )]);
    let report = universe.post_process(human, ai).expect("post");

    assert_eq!(report.executed().count(), 1);
    assert_eq!(
        universe.agent(AgentId(1)).map(|a| a.velocity),
        Some(Velocity::new(0.1, 0.0, 0.0))
    );
}

#[test]
fn test_unavailable_and_invalid_orders_are_rejected() {
    let registry = Registry::with_builtins();
    let settings = UniverseSettings {
        command_collection: "Peaceful".into(),
        ..quiet_settings("peaceful")
    };
    let mut universe = universe_at(settings, &[(1.5, 1.5, 0.5), (2.5, 1.5, 0.5)], &registry);
    universe.pre_process().expect("pre");

    let me = universe.agent(AgentId(1)).expect("alive");
    let human = BTreeMap::from([(
        me.id,
        vec![
            CommandEnvelope::from_agent(me, AgentId(2), Command::DeclareWar(DeclareWarCommand)),
            CommandEnvelope::from_agent(me, AgentId(2), Command::send_resource(1e9, 1.0)),
            CommandEnvelope::from_agent(me, AgentId(99), Command::send_resource(1.0, 1.0)),
        ],
    )]);
    let report = universe.post_process(human, CommandBatch::new()).expect("post");

    let kinds: Vec<CommandKind> = report.rejections.iter().map(|r| r.rejection.kind).collect();
    assert_eq!(kinds, vec![CommandKind::DeclareWar, CommandKind::SendResource]);
    assert_eq!(report.queued, 0);
    let me = universe.agent(AgentId(1)).expect("alive");
    assert!(me.internal.wars.is_empty());
    assert_eq!(me.internal.resources, common::STARTING_RESOURCES);
}

#[test]
fn test_same_cell_other_group_goes_through_mailbox() {
    let registry = Registry::with_builtins();
    let settings = UniverseSettings {
        group_edge_length: 0.5,
        ..quiet_settings("sub-groups")
    };
    // Cell (1, 1, 0), lower and upper x half
    let mut universe = universe_at(settings, &[(1.2, 1.2, 0.2), (1.8, 1.2, 0.2)], &registry);
    assert!(!universe.index().is_local(AgentId(1), AgentId(2)));
    assert_eq!(universe.index().cell_of(AgentId(1)), universe.index().cell_of(AgentId(2)));

    universe.pre_process().expect("pre");
    let me = universe.agent(AgentId(1)).expect("alive");
    let human = BTreeMap::from([(
        me.id,
        vec![CommandEnvelope::from_agent(me, AgentId(2), Command::send_resource(10.0, 0.99))],
    )]);
    let sent = universe.post_process(human, CommandBatch::new()).expect("post");

    assert_eq!(sent.queued, 1);
    assert!(sent.deliveries.is_empty());
    assert_eq!(universe.pending_commands(), 1);
    let base = common::STARTING_RESOURCES;
    assert_eq!(universe.agent(AgentId(1)).map(|a| a.internal.resources), Some(base - 10.0));
    assert_eq!(universe.agent(AgentId(2)).map(|a| a.internal.resources), Some(base));

    // Zero delay inside a cell: released by the next pre phase
    let released = universe.pre_process().expect("pre");
    assert_eq!(released.deliveries.len(), 1);
    let delivery = &released.deliveries[0];
    assert_eq!((delivery.from_id, delivery.to_id), (AgentId(1), AgentId(2)));
    assert_eq!((delivery.sent_at.t, delivery.delivered_at.t), (0, 1));
    assert!(delivery.outcome.is_ok());
    assert_eq!(universe.pending_commands(), 0);
    let received = universe.agent(AgentId(2)).map(|b| b.internal.resources).expect("alive");
    assert!((received - (base + 9.9)).abs() < 1e-9);
}

struct GiftFrom(AgentId);

impl Mechanism for GiftFrom {
    fn name(&self) -> &'static str {
        "GiftFrom"
    }

    fn process(
        &self,
        state: &mut MutableAgentState,
        view: &AgentVisibilityView,
        _: &UniverseSettings,
        _: &GlobalState,
        _: &mut ChaCha8Rng,
    ) -> Result<Vec<CommandEnvelope>, MechanismError> {
        if state.id != self.0 {
            return Ok(Vec::new());
        }
        Ok(view
            .ids()
            .filter(|&id| id != state.id)
            .map(|id| CommandEnvelope::from_agent(state, id, Command::send_resource(1.0, 1.0)))
            .collect())
    }
}

#[test]
fn test_mechanism_mail_inside_a_cell_lands_in_the_same_pre_phase() {
    let mut registry = Registry::with_builtins();
    let gift: Vec<Arc<dyn Mechanism>> = vec![Arc::new(GiftFrom(AgentId(1)))];
    registry.register_mechanisms("Gift", MechanismPipeline::new(gift));
    let settings = UniverseSettings {
        group_edge_length: 0.5,
        mechanism_collection: "Gift".into(),
        ..quiet_settings("gift")
    };
    let mut universe = universe_at(settings, &[(1.2, 1.2, 0.2), (1.8, 1.2, 0.2)], &registry);

    let report = universe.pre_process().expect("pre");
    assert_eq!(report.queued, 1);
    assert_eq!(report.deliveries.len(), 1);
    assert_eq!(report.deliveries[0].delivered_at.t, 0);
    assert_eq!(universe.pending_commands(), 0);
    let base = common::STARTING_RESOURCES;
    assert_eq!(universe.agent(AgentId(2)).map(|b| b.internal.resources), Some(base + 1.0));
}

struct FaultyFor(AgentId);

impl Mechanism for FaultyFor {
    fn name(&self) -> &'static str {
        "FaultyFor"
    }

    fn process(
        &self,
        state: &mut MutableAgentState,
        _: &AgentVisibilityView,
        _: &UniverseSettings,
        _: &GlobalState,
        _: &mut ChaCha8Rng,
    ) -> Result<Vec<CommandEnvelope>, MechanismError> {
        state.internal.resources += 1.0;
        if state.id == self.0 {
            panic!("faulty mechanism");
        }
        Ok(Vec::new())
    }
}

#[test]
fn test_failing_agent_does_not_stop_the_step() {
    let mut registry = Registry::with_builtins();
    let faulty: Vec<Arc<dyn Mechanism>> = vec![Arc::new(FaultyFor(AgentId(2)))];
    registry.register_mechanisms("Faulty", MechanismPipeline::new(faulty));
    let settings = UniverseSettings {
        mechanism_collection: "Faulty".into(),
        ..quiet_settings("faulty")
    };
    let mut universe = universe_at(
        settings,
        &[(0.5, 0.5, 0.5), (0.5, 0.5, 0.5), (5.5, 5.5, 1.5)],
        &registry,
    );

    let report = universe.pre_process().expect("pre survives a panicking mechanism");
    assert_eq!(report.rolled_back, BTreeSet::from([AgentId(2)]));

    let resources: Vec<f64> = universe.agents().map(|a| a.internal.resources).collect();
    let base = common::STARTING_RESOURCES;
    assert_eq!(resources, vec![base + 1.0, base, base + 1.0]);
}
