use serde::{Deserialize, Serialize};

use crate::agent::index::AgentIdAllocator;
use crate::command::mailbox::CommandMailbox;
use crate::core::config::UniverseSettings;
use crate::core::types::Tick;
use crate::history::store::HistoryStore;
use crate::mechanism::global::GlobalState;
use crate::universe::rng::RngStreams;

/// Simulation clock: current time, id counter and random streams
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clock {
    pub time: Tick,
    pub ids: AgentIdAllocator,
    pub rng: RngStreams,
}

/// Everything that defines a universe between two steps; this is what gets
/// saved and loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct UniverseData {
    pub settings: UniverseSettings,
    pub history: HistoryStore,
    pub clock: Clock,
    pub mailbox: CommandMailbox,
    pub global: GlobalState,
}

impl UniverseData {
    pub fn time(&self) -> Tick {
        self.clock.time
    }

    /// Replace the seed and re-derive every random stream from it
    pub fn reseed(&mut self, seed: u64) {
        self.settings.random_seed = seed;
        self.clock.rng = RngStreams::from_seed(seed, self.settings.cell_count());
    }
}
