//! Spatial index of live agents by grid cell

use std::collections::{BTreeMap, BTreeSet};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::agent::state::MutableAgentState;
use crate::core::config::UniverseSettings;
use crate::core::types::{AgentId, GroupId, Int3D, Int4D};

/// Where an agent was last recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentLocation {
    pub int4d: Int4D,
    pub group: GroupId,
}

impl AgentLocation {
    pub fn of(state: &MutableAgentState) -> Self {
        Self {
            int4d: state.int4d,
            group: state.group_id,
        }
    }

    pub fn cell(&self) -> Int3D {
        self.int4d.to_int3d()
    }
}

/// Hands out agent ids in increasing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdAllocator {
    next: u32,
}

impl AgentIdAllocator {
    pub fn starting_at(next: u32) -> Self {
        Self { next }
    }

    pub fn next_id(&mut self) -> AgentId {
        let id = AgentId(self.next);
        self.next += 1;
        id
    }

    pub fn peek(&self) -> AgentId {
        AgentId(self.next)
    }
}

impl Default for AgentIdAllocator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub died: Vec<AgentId>,
    /// (parent, child) pairs in creation order
    pub born: Vec<(AgentId, AgentId)>,
}

/// Grid cell -> live agent ids.
///
/// Reads are lock-free `&self` calls, so parallel workers can share it while
/// no reconciliation is running.
#[derive(Debug, Clone, Default)]
pub struct AgentIndex {
    cells: BTreeMap<Int3D, BTreeSet<AgentId>>,
    locations: AHashMap<AgentId, AgentLocation>,
}

impl AgentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every agent in `agents`, discarding previous content
    pub fn rebuild<'a>(&mut self, agents: impl Iterator<Item = &'a MutableAgentState>) {
        self.cells.clear();
        self.locations.clear();
        for state in agents {
            self.insert(state);
        }
    }

    /// Add an agent. An already indexed id is moved instead.
    pub fn insert(&mut self, state: &MutableAgentState) {
        let location = AgentLocation::of(state);
        if self.locations.contains_key(&state.id) {
            tracing::warn!(agent = %state.id, "insert of indexed agent, moving instead");
            self.move_to(state.id, location);
            return;
        }
        self.cells.entry(location.cell()).or_default().insert(state.id);
        self.locations.insert(state.id, location);
    }

    pub fn remove(&mut self, id: AgentId) -> Option<AgentLocation> {
        let location = self.locations.remove(&id)?;
        self.detach(id, location.cell());
        Some(location)
    }

    /// Record a new location; returns false for unknown ids
    pub fn move_to(&mut self, id: AgentId, location: AgentLocation) -> bool {
        let Some(old) = self.locations.get_mut(&id) else {
            return false;
        };
        let old_cell = old.cell();
        *old = location;
        if old_cell != location.cell() {
            self.detach(id, old_cell);
            self.cells.entry(location.cell()).or_default().insert(id);
        }
        true
    }

    fn detach(&mut self, id: AgentId, cell: Int3D) {
        if let Some(bucket) = self.cells.get_mut(&cell) {
            bucket.remove(&id);
            if bucket.is_empty() {
                self.cells.remove(&cell);
            }
        }
    }

    pub fn contains(&self, id: AgentId) -> bool {
        self.locations.contains_key(&id)
    }

    pub fn location(&self, id: AgentId) -> Option<AgentLocation> {
        self.locations.get(&id).copied()
    }

    pub fn cell_of(&self, id: AgentId) -> Option<Int3D> {
        self.locations.get(&id).map(AgentLocation::cell)
    }

    pub fn ids_in_cell(&self, cell: Int3D) -> BTreeSet<AgentId> {
        self.cells.get(&cell).cloned().unwrap_or_default()
    }

    pub fn all_live_ids(&self) -> BTreeSet<AgentId> {
        self.cells.values().flatten().copied().collect()
    }

    pub fn occupied_cells(&self) -> impl Iterator<Item = Int3D> + '_ {
        self.cells.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Same cell and same sub-group
    pub fn is_local(&self, a: AgentId, b: AgentId) -> bool {
        match (self.location(a), self.location(b)) {
            (Some(la), Some(lb)) => la.cell() == lb.cell() && la.group == lb.group,
            _ => false,
        }
    }

    /// Apply deaths and births, then resync every location.
    ///
    /// Dead agents are removed from both `agents` and the index. Spawn requests
    /// of survivors become new agents placed at their parent's position, with
    /// ids handed out in parent-id order so the result is reproducible.
    pub fn reconcile(
        &mut self,
        agents: &mut BTreeMap<AgentId, MutableAgentState>,
        is_dead: impl Fn(&MutableAgentState) -> bool,
        ids: &mut AgentIdAllocator,
        settings: &UniverseSettings,
    ) -> Reconciliation {
        let mut result = Reconciliation::default();

        result.died = agents
            .values()
            .filter(|state| is_dead(*state))
            .map(|state| state.id)
            .collect();
        for id in &result.died {
            agents.remove(id);
            self.remove(*id);
        }

        let mut newborn = Vec::new();
        for parent in agents.values_mut() {
            for spawn in std::mem::take(&mut parent.spawn_queue) {
                let child_id = ids.next_id();
                newborn.push(MutableAgentState::spawn(
                    child_id,
                    spawn,
                    parent.double4d,
                    settings,
                ));
                result.born.push((parent.id, child_id));
            }
        }
        for child in newborn {
            agents.insert(child.id, child);
        }

        for state in agents.values() {
            let location = AgentLocation::of(state);
            if self.location(state.id) != Some(location) && !self.move_to(state.id, location) {
                self.insert(state);
            }
        }

        if self.len() != agents.len() {
            tracing::error!(
                indexed = self.len(),
                live = agents.len(),
                "agent index out of sync, rebuilding"
            );
            self.rebuild(agents.values());
        }

        result
    }
}
