//! Local/remote command split and in-cell execution

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::agent::index::AgentIndex;
use crate::agent::state::MutableAgentState;
use crate::command::catalog::{CommandKind, CommandRejection, CommandResult};
use crate::command::envelope::CommandEnvelope;
use crate::core::config::UniverseSettings;
use crate::core::types::{AgentId, Int3D, Int4D};

/// Where an envelope goes after leaving its sender
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Same cell and sub-group: executed this tick
    Local,
    /// Parked in the target's mailbox
    Remote,
    /// Target unknown or dead
    Dropped,
}

/// How envelopes addressed to their own sender are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfTargets {
    /// Through the shuffled local path like any other local command
    Routed,
    /// Executed right after the sender-side check
    Immediate,
}

/// A command that reached its target
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub from_id: AgentId,
    pub to_id: AgentId,
    pub kind: CommandKind,
    pub sent_at: Int4D,
    pub delivered_at: Int4D,
    pub outcome: CommandResult,
}

/// A command refused by its sender-side check
#[derive(Debug, Clone, PartialEq)]
pub struct SendRejection {
    pub from_id: AgentId,
    pub to_id: AgentId,
    pub rejection: CommandRejection,
}

/// Outcome of dispatching one cell's outgoing commands
#[derive(Debug, Default)]
pub struct CellDispatch {
    pub remote: Vec<CommandEnvelope>,
    pub deliveries: Vec<Delivery>,
    pub rejections: Vec<SendRejection>,
    pub rolled_back: Vec<AgentId>,
}

impl CellDispatch {
    pub fn merge(&mut self, other: CellDispatch) {
        self.remote.extend(other.remote);
        self.deliveries.extend(other.deliveries);
        self.rejections.extend(other.rejections);
        self.rolled_back.extend(other.rolled_back);
    }
}

/// Exclusive access to the agents of one cell, sorted by id
pub struct CellAgents<'a> {
    cell: Int3D,
    agents: Vec<&'a mut MutableAgentState>,
}

impl<'a> CellAgents<'a> {
    pub fn new(cell: Int3D, mut agents: Vec<&'a mut MutableAgentState>) -> Self {
        agents.sort_by_key(|state| state.id);
        Self { cell, agents }
    }

    pub fn cell(&self) -> Int3D {
        self.cell
    }

    pub fn ids(&self) -> Vec<AgentId> {
        self.agents.iter().map(|state| state.id).collect()
    }

    pub fn get_mut(&mut self, id: AgentId) -> Option<&mut MutableAgentState> {
        let pos = self.agents.binary_search_by_key(&id, |state| state.id).ok()?;
        Some(&mut *self.agents[pos])
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// Run `check_and_execute` on `target`, restoring it if the command panics
pub fn deliver(
    envelope: &CommandEnvelope,
    target: &mut MutableAgentState,
    settings: &UniverseSettings,
) -> (Delivery, bool) {
    let before = target.clone();
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        envelope.check_and_execute(target, settings)
    }));
    let (outcome, rolled_back) = match outcome {
        Ok(result) => (result, false),
        Err(_) => {
            *target = before;
            tracing::error!(
                agent = %target.id,
                from = %envelope.from_id,
                command = %envelope.kind(),
                "command panicked, target rolled back"
            );
            (
                Err(CommandRejection::new(envelope.kind(), "execution panicked")),
                true,
            )
        }
    };
    if let Err(rejection) = &outcome {
        tracing::debug!(agent = %target.id, %rejection, "command not executed");
    }

    let delivery = Delivery {
        from_id: envelope.from_id,
        to_id: envelope.to_id,
        kind: envelope.kind(),
        sent_at: envelope.from_int4d,
        delivered_at: target.int4d,
        outcome,
    };
    (delivery, rolled_back)
}

/// Sender-side check and effect, restoring the sender on panic
fn send(
    envelope: &CommandEnvelope,
    sender: &mut MutableAgentState,
    settings: &UniverseSettings,
) -> (CommandResult, bool) {
    let before = sender.clone();
    match catch_unwind(AssertUnwindSafe(|| {
        envelope.check_and_self_execute_before_send(sender, settings)
    })) {
        Ok(result) => (result, false),
        Err(_) => {
            *sender = before;
            tracing::error!(
                agent = %sender.id,
                command = %envelope.kind(),
                "send check panicked, sender rolled back"
            );
            (
                Err(CommandRejection::new(envelope.kind(), "send check panicked")),
                true,
            )
        }
    }
}

/// Splits commands into local and remote using a read-only agent index.
///
/// Shared by every cell worker of a phase; it never mutates the index.
pub struct CommandRouter<'a> {
    index: &'a AgentIndex,
    settings: &'a UniverseSettings,
}

impl<'a> CommandRouter<'a> {
    pub fn new(index: &'a AgentIndex, settings: &'a UniverseSettings) -> Self {
        Self { index, settings }
    }

    pub fn route(&self, envelope: &CommandEnvelope) -> Route {
        if !self.index.contains(envelope.to_id) {
            Route::Dropped
        } else if self.index.is_local(envelope.from_id, envelope.to_id) {
            Route::Local
        } else {
            Route::Remote
        }
    }

    /// Dispatch the commands sent by agents of one cell.
    ///
    /// Every envelope passes the sender-side check first. Local commands then
    /// run grouped by sender, in a sender order shuffled from the sorted ids
    /// with the cell's RNG; remote commands are returned for the mailbox.
    pub fn dispatch(
        &self,
        cell: &mut CellAgents<'_>,
        outgoing: BTreeMap<AgentId, Vec<CommandEnvelope>>,
        self_targets: SelfTargets,
        rng: &mut ChaCha8Rng,
    ) -> CellDispatch {
        let mut out = CellDispatch::default();
        let mut local: BTreeMap<AgentId, Vec<CommandEnvelope>> = BTreeMap::new();

        for (sender_id, envelopes) in outgoing {
            for envelope in envelopes {
                let route = self.route(&envelope);
                if route == Route::Dropped {
                    tracing::warn!(
                        from = %sender_id,
                        to = %envelope.to_id,
                        command = %envelope.kind(),
                        "dropping command to unknown agent"
                    );
                    continue;
                }
                let Some(sender) = cell.get_mut(sender_id) else {
                    tracing::warn!(agent = %sender_id, cell = %cell.cell(), "sender not in cell");
                    continue;
                };

                let (result, rolled_back) = send(&envelope, sender, self.settings);
                if rolled_back {
                    out.rolled_back.push(sender_id);
                }
                if let Err(rejection) = result {
                    tracing::debug!(agent = %sender_id, %rejection, "command refused by sender");
                    out.rejections.push(SendRejection {
                        from_id: sender_id,
                        to_id: envelope.to_id,
                        rejection,
                    });
                    continue;
                }

                if self_targets == SelfTargets::Immediate && envelope.is_self_targeted() {
                    let (delivery, rolled_back) = deliver(&envelope, sender, self.settings);
                    if rolled_back {
                        out.rolled_back.push(sender_id);
                    }
                    out.deliveries.push(delivery);
                    continue;
                }

                match route {
                    Route::Local => local.entry(sender_id).or_default().push(envelope),
                    _ => out.remote.push(envelope),
                }
            }
        }

        let mut order: Vec<AgentId> = local.keys().copied().collect();
        order.shuffle(rng);
        for sender_id in order {
            for envelope in local.remove(&sender_id).unwrap_or_default() {
                let Some(target) = cell.get_mut(envelope.to_id) else {
                    tracing::error!(
                        to = %envelope.to_id,
                        cell = %cell.cell(),
                        "local target missing from its cell"
                    );
                    continue;
                };
                let (delivery, rolled_back) = deliver(&envelope, target, self.settings);
                if rolled_back {
                    out.rolled_back.push(envelope.to_id);
                }
                out.deliveries.push(delivery);
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::state::{AgentInternal, AgentSpawn};
    use crate::command::catalog::Command;
    use crate::core::types::{AgentType, Double4D, Velocity};
    use rand::SeedableRng;

    fn agent_at(id: u32, x: f64, resources: f64) -> MutableAgentState {
        MutableAgentState::spawn(
            AgentId(id),
            AgentSpawn {
                name: format!("agent-{id}"),
                agent_type: AgentType::Ai,
                velocity: Velocity::default(),
                internal: AgentInternal {
                    resources,
                    population: 1.0,
                    ..AgentInternal::default()
                },
            },
            Double4D::new(0.0, x, 0.505, 0.505),
            &UniverseSettings::default(),
        )
    }

    fn velocity_order(seed: u64) -> Vec<AgentId> {
        let settings = UniverseSettings::default();
        let mut states: Vec<MutableAgentState> =
            (1..=5).map(|id| agent_at(id, 0.505, 0.0)).collect();
        let mut index = AgentIndex::new();
        index.rebuild(states.iter());
        let router = CommandRouter::new(&index, &settings);

        // Every agent pushes its own id as the target's velocity onto agent 1
        let outgoing = states
            .iter()
            .map(|s| {
                let v = Velocity::new(f64::from(s.id.0) / 10.0, 0.0, 0.0);
                (s.id, vec![CommandEnvelope::from_agent(s, AgentId(1), Command::change_velocity(v))])
            })
            .collect();

        let mut cell = CellAgents::new(Int3D::default(), states.iter_mut().collect());
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let out = router.dispatch(&mut cell, outgoing, SelfTargets::Routed, &mut rng);
        assert!(out.remote.is_empty());
        out.deliveries.iter().map(|d| d.from_id).collect()
    }

    #[test]
    fn test_local_order_is_reproducible() {
        let first = velocity_order(42);
        assert_eq!(first.len(), 5);
        assert_eq!(first, velocity_order(42));

        let mut sorted = first.clone();
        sorted.sort();
        assert_eq!(sorted, (1..=5).map(AgentId).collect::<Vec<_>>());
    }

    #[test]
    fn test_remote_and_dropped_commands() {
        let settings = UniverseSettings::default();
        let mut near = agent_at(1, 0.505, 100.0);
        let far = agent_at(2, 5.505, 0.0);
        let mut index = AgentIndex::new();
        index.rebuild([&near, &far].into_iter());
        let router = CommandRouter::new(&index, &settings);

        let outgoing = BTreeMap::from([(
            near.id,
            vec![
                CommandEnvelope::from_agent(&near, far.id, Command::send_resource(10.0, 0.99)),
                CommandEnvelope::from_agent(&near, AgentId(77), Command::send_resource(10.0, 0.99)),
            ],
        )]);
        let mut cell = CellAgents::new(Int3D::default(), vec![&mut near]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let out = router.dispatch(&mut cell, outgoing, SelfTargets::Routed, &mut rng);

        assert_eq!(out.remote.len(), 1);
        assert_eq!(out.remote[0].to_id, AgentId(2));
        assert!(out.deliveries.is_empty());
        // Only the routed transfer was paid for
        assert_eq!(near.internal.resources, 90.0);
    }

    #[test]
    fn test_sender_rejection_is_reported() {
        let settings = UniverseSettings::default();
        let mut a = agent_at(1, 0.505, 1.0);
        let b = agent_at(2, 0.505, 0.0);
        let mut index = AgentIndex::new();
        index.rebuild([&a, &b].into_iter());
        let router = CommandRouter::new(&index, &settings);

        let outgoing = BTreeMap::from([(
            a.id,
            vec![CommandEnvelope::from_agent(&a, b.id, Command::send_resource(10.0, 1.0))],
        )]);
        let mut cell = CellAgents::new(Int3D::default(), vec![&mut a]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let out = router.dispatch(&mut cell, outgoing, SelfTargets::Routed, &mut rng);

        assert_eq!(out.rejections.len(), 1);
        assert_eq!(out.rejections[0].rejection.kind, CommandKind::SendResource);
        assert_eq!(a.internal.resources, 1.0);
    }

    #[test]
    fn test_immediate_self_target() {
        let settings = UniverseSettings::default();
        let mut a = agent_at(1, 0.505, 50.0);
        let mut index = AgentIndex::new();
        index.insert(&a);
        let router = CommandRouter::new(&index, &settings);

        let outgoing = BTreeMap::from([(a.id, vec![CommandEnvelope::to_self(&a, Command::split_agent(0.1, "child"))])]);
        let mut cell = CellAgents::new(Int3D::default(), vec![&mut a]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let out = router.dispatch(&mut cell, outgoing, SelfTargets::Immediate, &mut rng);

        assert_eq!(out.deliveries.len(), 1);
        assert!(out.deliveries[0].outcome.is_ok());
        assert_eq!(a.spawn_queue.len(), 1);
    }
}
