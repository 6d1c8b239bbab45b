//! Splitting live agents into disjoint per-cell work units

use std::collections::BTreeMap;

use rand_chacha::ChaCha8Rng;

use crate::agent::state::MutableAgentState;
use crate::core::config::UniverseSettings;
use crate::core::types::{AgentId, Int3D};

/// One cell's agents (id order) and its random stream, owned by one worker
pub struct CellTask<'a> {
    pub cell: Int3D,
    pub agents: Vec<&'a mut MutableAgentState>,
    pub rng: &'a mut ChaCha8Rng,
}

/// Tasks for every occupied cell, in cell order.
///
/// `rngs` holds one stream per cell in flat index order. Agents outside the
/// grid get no task.
pub fn cell_tasks<'a>(
    agents: &'a mut BTreeMap<AgentId, MutableAgentState>,
    rngs: &'a mut [ChaCha8Rng],
    settings: &UniverseSettings,
) -> Vec<CellTask<'a>> {
    let mut by_cell: BTreeMap<usize, Vec<&'a mut MutableAgentState>> = BTreeMap::new();
    for state in agents.values_mut() {
        let cell = state.int4d.to_int3d();
        match settings.cell_index(cell) {
            Some(index) => by_cell.entry(index).or_default().push(state),
            None => tracing::error!(agent = %state.id, %cell, "agent outside the grid, skipped"),
        }
    }

    rngs.iter_mut()
        .enumerate()
        .filter_map(|(index, rng)| {
            let agents = by_cell.remove(&index)?;
            Some(CellTask {
                cell: settings.cell_at(index),
                agents,
                rng,
            })
        })
        .collect()
}
