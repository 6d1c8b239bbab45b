//! What a phase did, returned to the caller instead of broadcast

use std::collections::BTreeSet;

use crate::command::router::{CellDispatch, Delivery, SendRejection};
use crate::core::types::{AgentId, Tick};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    Pre,
    Post,
}

/// The history slice written at the end of a phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceCommit {
    pub time: Tick,
    /// Live agents in the slice
    pub agents: usize,
    /// False when the latest slice was replaced in place
    pub appended: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhaseReport {
    pub phase: PhaseKind,
    /// Universe time the phase ran at
    pub time: Tick,
    pub deliveries: Vec<Delivery>,
    pub rejections: Vec<SendRejection>,
    /// Commands parked in mailboxes during this phase
    pub queued: usize,
    /// Agents with at least one change undone after a failure
    pub rolled_back: BTreeSet<AgentId>,
    pub died: Vec<AgentId>,
    /// (parent, child)
    pub born: Vec<(AgentId, AgentId)>,
    pub commit: SliceCommit,
}

impl PhaseReport {
    pub(crate) fn new(phase: PhaseKind, time: Tick) -> Self {
        Self {
            phase,
            time,
            deliveries: Vec::new(),
            rejections: Vec::new(),
            queued: 0,
            rolled_back: BTreeSet::new(),
            died: Vec::new(),
            born: Vec::new(),
            commit: SliceCommit {
                time,
                agents: 0,
                appended: false,
            },
        }
    }

    /// Merge a cell's results; its remote commands must already be queued
    pub(crate) fn absorb(&mut self, dispatch: CellDispatch) {
        self.deliveries.extend(dispatch.deliveries);
        self.rejections.extend(dispatch.rejections);
        self.rolled_back.extend(dispatch.rolled_back);
    }

    /// Deliveries that passed their target-side checks
    pub fn executed(&self) -> impl Iterator<Item = &Delivery> {
        self.deliveries.iter().filter(|d| d.outcome.is_ok())
    }
}
