//! Whole-universe mechanisms and the state they keep

use std::sync::Arc;

use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::core::config::UniverseSettings;
use crate::core::types::Tick;
use crate::history::store::HistoryStore;

/// Universe-wide data persisted once per tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalState {
    pub time: Tick,
    pub agent_count: usize,
    pub total_resources: f64,
    pub total_population: f64,
}

/// Runs once per pre phase, before any per-agent mechanism
pub trait GlobalMechanism: Send + Sync {
    fn name(&self) -> &'static str;

    fn process(
        &self,
        global: &mut GlobalState,
        history: &HistoryStore,
        settings: &UniverseSettings,
        rng: &mut ChaCha8Rng,
    );
}

pub type GlobalMechanisms = Vec<Arc<dyn GlobalMechanism>>;

/// Totals over the agents alive in the newest slice
pub struct Census;

impl GlobalMechanism for Census {
    fn name(&self) -> &'static str {
        "Census"
    }

    fn process(
        &self,
        global: &mut GlobalState,
        history: &HistoryStore,
        _: &UniverseSettings,
        _: &mut ChaCha8Rng,
    ) {
        let now = history.latest_time();
        let latest = history.latest();
        let live: Vec<_> = latest
            .ids()
            .into_iter()
            .filter_map(|id| latest.latest_of(id))
            .filter(|snapshot| snapshot.int4d.t == now)
            .collect();

        *global = GlobalState {
            time: now,
            agent_count: live.len(),
            total_resources: live.iter().map(|s| s.internal.resources).sum(),
            total_population: live.iter().map(|s| s.internal.population).sum(),
        };
    }
}
