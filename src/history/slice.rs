//! One time slice: grid cell -> agent id -> snapshots

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::agent::state::{AgentSnapshot, MutableAgentState};
use crate::core::types::{AgentId, Int3D, Tick};

/// Every snapshot visible in the universe at one tick.
///
/// An id maps to a list because after-images of an agent that left a cell
/// coexist with its current snapshot elsewhere (or, transiently, in the same
/// cell under a later time).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HistorySlice {
    cells: BTreeMap<Int3D, BTreeMap<AgentId, Vec<Arc<AgentSnapshot>>>>,
}

impl HistorySlice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshots(snapshots: impl IntoIterator<Item = Arc<AgentSnapshot>>) -> Self {
        let mut slice = Self::new();
        for snapshot in snapshots {
            slice.insert(snapshot);
        }
        slice
    }

    /// Freeze the live population at `time`, carrying after-images over from
    /// `previous`.
    ///
    /// A snapshot from `previous` is carried when its agent is still alive,
    /// now sits in another cell, and the snapshot is at most
    /// `after_image_duration` ticks old.
    pub fn capture(
        live: &BTreeMap<AgentId, MutableAgentState>,
        previous: Option<&HistorySlice>,
        time: Tick,
        after_image_duration: Tick,
    ) -> Self {
        let mut slice = Self::from_snapshots(live.values().map(|s| Arc::new(s.freeze())));

        let Some(previous) = previous else {
            return slice;
        };
        if after_image_duration <= 0 {
            return slice;
        }

        let carried: Vec<Arc<AgentSnapshot>> = previous
            .snapshots()
            .filter(|snap| {
                let Some(state) = live.get(&snap.id) else {
                    return false;
                };
                snap.int4d.t < time
                    && time - snap.int4d.t <= after_image_duration
                    && snap.int4d.to_int3d() != state.int4d.to_int3d()
            })
            .cloned()
            .collect();
        for snapshot in carried {
            slice.insert(snapshot);
        }
        slice
    }

    /// Insert under the snapshot's own cell, keeping each id's list time-ordered
    pub fn insert(&mut self, snapshot: Arc<AgentSnapshot>) {
        let list = self
            .cells
            .entry(snapshot.int4d.to_int3d())
            .or_default()
            .entry(snapshot.id)
            .or_default();
        let at = list.partition_point(|s| s.int4d.t <= snapshot.int4d.t);
        list.insert(at, snapshot);
    }

    pub fn cells(&self) -> impl Iterator<Item = (&Int3D, &BTreeMap<AgentId, Vec<Arc<AgentSnapshot>>>)> {
        self.cells.iter()
    }

    pub fn cell(&self, cell: Int3D) -> Option<&BTreeMap<AgentId, Vec<Arc<AgentSnapshot>>>> {
        self.cells.get(&cell)
    }

    /// All snapshots ordered by (cell, id, time)
    pub fn snapshots(&self) -> impl Iterator<Item = &Arc<AgentSnapshot>> {
        self.cells.values().flat_map(|ids| ids.values().flatten())
    }

    pub fn ids(&self) -> BTreeSet<AgentId> {
        self.cells.values().flat_map(|ids| ids.keys().copied()).collect()
    }

    /// Most recent snapshot of `id` anywhere in this slice
    pub fn latest_of(&self, id: AgentId) -> Option<&Arc<AgentSnapshot>> {
        self.cells
            .values()
            .filter_map(|ids| ids.get(&id))
            .flatten()
            .max_by_key(|snap| snap.int4d.t)
    }

    /// Number of stored snapshots, after-images included
    pub fn len(&self) -> usize {
        self.snapshots().count()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::state::{AgentInternal, AgentSpawn};
    use crate::core::config::UniverseSettings;
    use crate::core::types::{AgentType, Double4D, Velocity};

    fn state(id: u32, t: f64, x: f64) -> MutableAgentState {
        MutableAgentState::spawn(
            AgentId(id),
            AgentSpawn {
                name: format!("a{id}"),
                agent_type: AgentType::Ai,
                velocity: Velocity::default(),
                internal: AgentInternal::default(),
            },
            Double4D::new(t, x, 0.5, 0.5),
            &UniverseSettings::default(),
        )
    }

    fn live(list: Vec<MutableAgentState>) -> BTreeMap<AgentId, MutableAgentState> {
        list.into_iter().map(|s| (s.id, s)).collect()
    }

    #[test]
    fn test_capture_without_previous() {
        let slice = HistorySlice::capture(&live(vec![state(1, 0.0, 0.5), state(2, 0.0, 3.5)]), None, 0, 4);
        assert_eq!(slice.len(), 2);
        assert_eq!(slice.ids(), [AgentId(1), AgentId(2)].into_iter().collect());
        assert!(slice.cell(Int3D::new(3, 0, 0)).is_some());
    }

    #[test]
    fn test_after_image_follows_moved_agent() {
        let before = HistorySlice::capture(&live(vec![state(1, 0.0, 0.5)]), None, 0, 2);

        // Agent moved one cell over
        let after = HistorySlice::capture(&live(vec![state(1, 1.0, 1.5)]), Some(&before), 1, 2);
        assert_eq!(after.len(), 2);
        let ghost = &after.cell(Int3D::new(0, 0, 0)).expect("after-image")[&AgentId(1)];
        assert_eq!(ghost[0].int4d.t, 0);
        assert_eq!(after.latest_of(AgentId(1)).map(|s| s.int4d.t), Some(1));

        // Still there one tick later, gone after the duration runs out
        let later = HistorySlice::capture(&live(vec![state(1, 2.0, 1.5)]), Some(&after), 2, 2);
        assert_eq!(later.len(), 2);
        let gone = HistorySlice::capture(&live(vec![state(1, 3.0, 1.5)]), Some(&later), 3, 2);
        assert_eq!(gone.len(), 1);
    }

    #[test]
    fn test_after_image_dropped_for_dead_agent() {
        let before = HistorySlice::capture(&live(vec![state(1, 0.0, 0.5), state(2, 0.0, 4.5)]), None, 0, 4);
        let after = HistorySlice::capture(&live(vec![state(2, 1.0, 4.5)]), Some(&before), 1, 4);
        assert_eq!(after.ids(), [AgentId(2)].into_iter().collect());
    }

    #[test]
    fn test_after_images_disabled() {
        let before = HistorySlice::capture(&live(vec![state(1, 0.0, 0.5)]), None, 0, 0);
        let after = HistorySlice::capture(&live(vec![state(1, 1.0, 1.5)]), Some(&before), 1, 0);
        assert_eq!(after.len(), 1);
    }
}
