//! Agent state: immutable snapshots and the mutable per-step working copy

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::config::UniverseSettings;
use crate::core::types::{AgentId, AgentType, Double4D, GroupId, Int4D, Tick, Velocity};
use crate::spacetime::ProperTime;

/// Game-layer data carried by every agent.
///
/// The engine never reads these fields itself; mechanisms, commands and the
/// death rule do.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentInternal {
    pub resources: f64,
    pub population: f64,
    /// Opponents this agent believes it is at war with
    pub wars: BTreeMap<AgentId, WarRecord>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarRecord {
    /// Tick at which this side entered the war
    pub start_time: Tick,
    /// True for the declaring side
    pub initiator: bool,
}

/// Frozen agent state at one spacetime coordinate, as stored in history
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: AgentId,
    pub name: String,
    pub agent_type: AgentType,
    pub int4d: Int4D,
    pub double4d: Double4D,
    pub group_id: GroupId,
    pub velocity: Velocity,
    pub proper_time: ProperTime,
    pub internal: AgentInternal,
}

/// Request to create a new agent next to its parent at reconciliation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentSpawn {
    pub name: String,
    pub agent_type: AgentType,
    pub velocity: Velocity,
    pub internal: AgentInternal,
}

/// Working copy of one agent during a phase
#[derive(Clone, Debug, PartialEq)]
pub struct MutableAgentState {
    pub id: AgentId,
    pub name: String,
    pub agent_type: AgentType,
    pub int4d: Int4D,
    pub double4d: Double4D,
    pub group_id: GroupId,
    pub velocity: Velocity,
    pub proper_time: ProperTime,
    pub internal: AgentInternal,
    /// Agents to create at the next reconciliation
    pub spawn_queue: Vec<AgentSpawn>,
}

impl MutableAgentState {
    /// Build a fresh agent at `position`
    pub fn spawn(
        id: AgentId,
        spawn: AgentSpawn,
        position: Double4D,
        settings: &UniverseSettings,
    ) -> Self {
        Self {
            id,
            name: spawn.name,
            agent_type: spawn.agent_type,
            int4d: position.to_int4d(),
            double4d: position,
            group_id: position.group_id(settings.group_edge_length),
            velocity: spawn.velocity,
            proper_time: ProperTime::default(),
            internal: spawn.internal,
            spawn_queue: Vec::new(),
        }
    }

    pub fn from_snapshot(snapshot: &AgentSnapshot) -> Self {
        Self {
            id: snapshot.id,
            name: snapshot.name.clone(),
            agent_type: snapshot.agent_type,
            int4d: snapshot.int4d,
            double4d: snapshot.double4d,
            group_id: snapshot.group_id,
            velocity: snapshot.velocity,
            proper_time: snapshot.proper_time,
            internal: snapshot.internal.clone(),
            spawn_queue: Vec::new(),
        }
    }

    /// Freeze into a history snapshot. Pending spawns are not part of history.
    pub fn freeze(&self) -> AgentSnapshot {
        AgentSnapshot {
            id: self.id,
            name: self.name.clone(),
            agent_type: self.agent_type,
            int4d: self.int4d,
            double4d: self.double4d,
            group_id: self.group_id,
            velocity: self.velocity,
            proper_time: self.proper_time,
            internal: self.internal.clone(),
        }
    }

    /// Move to a new continuous position, keeping cell and group in sync
    pub fn set_position(&mut self, position: Double4D, settings: &UniverseSettings) {
        self.double4d = position;
        self.int4d = position.to_int4d();
        self.group_id = position.group_id(settings.group_edge_length);
    }

    pub fn current_time(&self) -> Tick {
        self.int4d.t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_spawn() -> AgentSpawn {
        AgentSpawn {
            name: "alpha".into(),
            agent_type: AgentType::Ai,
            velocity: Velocity::new(0.1, 0.0, 0.0),
            internal: AgentInternal {
                resources: 5.0,
                population: 10.0,
                wars: BTreeMap::new(),
            },
        }
    }

    #[test]
    fn test_freeze_thaw_preserves_fields() {
        let settings = UniverseSettings::default();
        let mut state = MutableAgentState::spawn(
            AgentId(3),
            sample_spawn(),
            Double4D::new(2.0, 1.5, 2.25, 0.5),
            &settings,
        );
        state.spawn_queue.push(sample_spawn());

        let snapshot = state.freeze();
        let thawed = MutableAgentState::from_snapshot(&snapshot);

        assert_eq!(snapshot.int4d, Int4D::new(2, 1, 2, 0));
        assert!(thawed.spawn_queue.is_empty());
        assert_eq!(thawed.freeze(), snapshot);
    }

    #[test]
    fn test_set_position_updates_cell_and_group() {
        let settings = UniverseSettings {
            group_edge_length: 0.5,
            ..UniverseSettings::default()
        };
        let mut state = MutableAgentState::spawn(
            AgentId(1),
            sample_spawn(),
            Double4D::new(0.0, 0.1, 0.1, 0.1),
            &settings,
        );
        assert_eq!(state.group_id, 0);

        state.set_position(Double4D::new(1.0, 3.9, 0.1, 0.1), &settings);
        assert_eq!(state.int4d, Int4D::new(1, 3, 0, 0));
        assert_eq!(state.group_id, 4);
        assert_eq!(state.current_time(), 1);
    }
}
