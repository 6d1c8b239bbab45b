//! Per-target queues of commands still travelling at light speed

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::agent::index::AgentIndex;
use crate::command::envelope::CommandEnvelope;
use crate::core::config::UniverseSettings;
use crate::core::types::{AgentId, Tick};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandMailbox {
    pending: BTreeMap<AgentId, Vec<CommandEnvelope>>,
}

impl CommandMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an envelope for its target
    pub fn push(&mut self, envelope: CommandEnvelope) {
        self.pending
            .entry(envelope.to_id)
            .or_default()
            .push(envelope);
    }

    pub fn pending_for(&self, target: AgentId) -> &[CommandEnvelope] {
        self.pending.get(&target).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandEnvelope> {
        self.pending.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take every envelope whose light delay has elapsed by `now`.
    ///
    /// The delay is measured from the sender's cell at send time to the
    /// target's cell now. Envelopes for targets missing from `index` are
    /// discarded. The result is ordered by target id, then arrival order.
    pub fn release(
        &mut self,
        now: Tick,
        index: &AgentIndex,
        settings: &UniverseSettings,
    ) -> Vec<CommandEnvelope> {
        let mut released = Vec::new();
        let mut dropped = 0usize;

        self.pending.retain(|target, queue| {
            let Some(target_cell) = index.cell_of(*target) else {
                dropped += queue.len();
                return false;
            };
            let (ready, waiting): (Vec<_>, Vec<_>) =
                std::mem::take(queue).into_iter().partition(|envelope| {
                    let delay = settings.delay(envelope.from_int4d.to_int3d(), target_cell);
                    now - envelope.from_int4d.t >= delay
                });
            released.extend(ready);
            *queue = waiting;
            !queue.is_empty()
        });

        if dropped > 0 {
            tracing::debug!(time = now, dropped, "discarded mail for dead agents");
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::state::{AgentInternal, AgentSpawn, MutableAgentState};
    use crate::command::catalog::DummyCommand;
    use crate::command::Command;
    use crate::core::types::{AgentType, Double4D, Int4D, Velocity};

    fn agent_at(id: u32, x: f64) -> MutableAgentState {
        MutableAgentState::spawn(
            AgentId(id),
            AgentSpawn {
                name: format!("agent-{id}"),
                agent_type: AgentType::Ai,
                velocity: Velocity::default(),
                internal: AgentInternal::default(),
            },
            Double4D::new(0.0, x, 0.5, 0.5),
            &UniverseSettings::default(),
        )
    }

    fn dummy(to: u32, from: u32, sent: Int4D) -> CommandEnvelope {
        CommandEnvelope::new(AgentId(to), AgentId(from), sent, Command::Dummy(DummyCommand))
    }

    #[test]
    fn test_release_waits_for_light_delay() {
        let settings = UniverseSettings::default();
        let mut index = AgentIndex::new();
        index.insert(&agent_at(2, 3.5));

        let mut mailbox = CommandMailbox::new();
        // Sent from cell (0,0,0) at t=0 to an agent in (3,0,0): delay 3
        mailbox.push(dummy(2, 1, Int4D::new(0, 0, 0, 0)));

        assert!(mailbox.release(2, &index, &settings).is_empty());
        assert_eq!(mailbox.len(), 1);

        let released = mailbox.release(3, &index, &settings);
        assert_eq!(released.len(), 1);
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_release_drops_mail_for_dead_targets() {
        let settings = UniverseSettings::default();
        let index = AgentIndex::new();
        let mut mailbox = CommandMailbox::new();
        mailbox.push(dummy(9, 1, Int4D::new(0, 0, 0, 0)));

        assert!(mailbox.release(100, &index, &settings).is_empty());
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_release_keeps_arrival_order() {
        let settings = UniverseSettings::default();
        let mut index = AgentIndex::new();
        index.insert(&agent_at(2, 1.5));

        let mut mailbox = CommandMailbox::new();
        mailbox.push(dummy(2, 7, Int4D::new(0, 0, 0, 0)));
        mailbox.push(dummy(2, 3, Int4D::new(0, 0, 0, 0)));
        mailbox.push(dummy(2, 5, Int4D::new(1, 0, 0, 0)));

        let released = mailbox.release(1, &index, &settings);
        let senders: Vec<_> = released.iter().map(|e| e.from_id).collect();
        assert_eq!(senders, vec![AgentId(7), AgentId(3)]);
        assert_eq!(mailbox.pending_for(AgentId(2)).len(), 1);
    }
}
