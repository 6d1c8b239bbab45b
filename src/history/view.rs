//! Per-observer view through the light cone

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::agent::state::AgentSnapshot;
use crate::core::types::{AgentId, Int3D, Int4D};

/// Immutable picture of the universe as seen from one spacetime point.
///
/// Built before a parallel phase starts and only read by workers.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentVisibilityView {
    center: Int4D,
    agents: BTreeMap<AgentId, Arc<AgentSnapshot>>,
    cells: BTreeMap<Int3D, BTreeSet<AgentId>>,
}

impl AgentVisibilityView {
    pub fn new(center: Int4D, agents: BTreeMap<AgentId, Arc<AgentSnapshot>>) -> Self {
        let mut cells: BTreeMap<Int3D, BTreeSet<AgentId>> = BTreeMap::new();
        for snapshot in agents.values() {
            cells
                .entry(snapshot.int4d.to_int3d())
                .or_default()
                .insert(snapshot.id);
        }
        Self {
            center,
            agents,
            cells,
        }
    }

    /// Observer position and time
    pub fn center(&self) -> Int4D {
        self.center
    }

    pub fn get(&self, id: AgentId) -> Option<&AgentSnapshot> {
        self.agents.get(&id).map(Arc::as_ref)
    }

    pub fn contains(&self, id: AgentId) -> bool {
        self.agents.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.agents.keys().copied()
    }

    pub fn agents(&self) -> impl Iterator<Item = &AgentSnapshot> {
        self.agents.values().map(Arc::as_ref)
    }

    pub fn ids_in_cell(&self, cell: Int3D) -> BTreeSet<AgentId> {
        self.cells.get(&cell).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
