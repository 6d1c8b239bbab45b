//! Fixed-window sequence of history slices

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use crate::agent::state::AgentSnapshot;
use crate::core::config::UniverseSettings;
use crate::core::types::{AgentId, Int4D, Tick};
use crate::history::slice::HistorySlice;
use crate::history::view::AgentVisibilityView;

/// The last `t_dim` slices, newest at `latest_time`.
///
/// At generation the whole window is filled with the initial slice so that
/// observers looking back past tick zero still find the starting population.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryStore {
    t_dim: usize,
    latest_time: Tick,
    /// Slices older than the latest, oldest first
    past: VecDeque<HistorySlice>,
    latest: HistorySlice,
}

impl HistoryStore {
    pub fn new(t_dim: usize, initial_time: Tick, initial: HistorySlice) -> Self {
        let t_dim = t_dim.max(1);
        Self {
            t_dim,
            latest_time: initial_time,
            past: std::iter::repeat(initial.clone()).take(t_dim - 1).collect(),
            latest: initial,
        }
    }

    /// Rebuild from slices ordered oldest to newest, the last at `latest_time`
    pub fn from_slices(t_dim: usize, latest_time: Tick, mut slices: Vec<HistorySlice>) -> Self {
        let latest = slices.pop().unwrap_or_default();
        let mut store = Self {
            t_dim: t_dim.max(1),
            latest_time,
            past: slices.into(),
            latest,
        };
        store.trim();
        store
    }

    pub fn t_dim(&self) -> usize {
        self.t_dim
    }

    pub fn latest_time(&self) -> Tick {
        self.latest_time
    }

    pub fn oldest_time(&self) -> Tick {
        self.latest_time - self.past.len() as Tick
    }

    pub fn len(&self) -> usize {
        self.past.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn latest(&self) -> &HistorySlice {
        &self.latest
    }

    pub fn slice_at(&self, time: Tick) -> Option<&HistorySlice> {
        if time == self.latest_time {
            return Some(&self.latest);
        }
        let offset = time - self.oldest_time();
        if offset < 0 {
            return None;
        }
        self.past.get(offset as usize)
    }

    /// Slices with their times, oldest first
    pub fn slices(&self) -> impl Iterator<Item = (Tick, &HistorySlice)> {
        let oldest = self.oldest_time();
        self.past
            .iter()
            .chain(std::iter::once(&self.latest))
            .enumerate()
            .map(move |(i, slice)| (oldest + i as Tick, slice))
    }

    /// Push a slice for `latest_time + 1`, dropping the oldest beyond the window
    pub fn append(&mut self, slice: HistorySlice) {
        let previous = std::mem::replace(&mut self.latest, slice);
        self.past.push_back(previous);
        self.latest_time += 1;
        self.trim();
    }

    /// Overwrite the newest slice in place; the clock does not move
    pub fn replace_latest(&mut self, slice: HistorySlice) {
        self.latest = slice;
    }

    fn trim(&mut self) {
        while self.past.len() + 1 > self.t_dim {
            self.past.pop_front();
        }
    }

    /// What an observer at `center` can see: every cell read at the slice
    /// light from it has reached, `center.t - delay(center, cell)`.
    ///
    /// Look-backs beyond the window are clamped to the oldest slice. When an
    /// id shows up more than once (after-images), the newest snapshot wins.
    pub fn view_at(&self, center: Int4D, settings: &UniverseSettings) -> AgentVisibilityView {
        let origin = center.to_int3d();
        let oldest = self.oldest_time();
        let newest = self.latest_time;
        let mut seen: BTreeMap<AgentId, Arc<AgentSnapshot>> = BTreeMap::new();

        for (time, slice) in self.slices() {
            for (cell, ids) in slice.cells() {
                let seen_at = (center.t - settings.delay(origin, *cell)).clamp(oldest, newest);
                if seen_at != time {
                    continue;
                }
                for snapshot in ids.values().flatten() {
                    let newer = seen
                        .get(&snapshot.id)
                        .map_or(true, |kept| snapshot.int4d.t > kept.int4d.t);
                    if newer {
                        seen.insert(snapshot.id, Arc::clone(snapshot));
                    }
                }
            }
        }

        AgentVisibilityView::new(center, seen)
    }
}
