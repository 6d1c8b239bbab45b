//! Initial population of a new universe

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::agent::index::AgentIdAllocator;
use crate::agent::state::{AgentInternal, AgentSpawn, MutableAgentState};
use crate::command::mailbox::CommandMailbox;
use crate::core::config::UniverseSettings;
use crate::core::error::Result;
use crate::core::types::{AgentType, Double4D, Velocity};
use crate::history::slice::HistorySlice;
use crate::history::store::HistoryStore;
use crate::mechanism::global::GlobalState;
use crate::universe::data::{Clock, UniverseData};
use crate::universe::rng::RngStreams;

/// How starting positions are chosen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenerationMethod {
    /// Uniformly over the whole grid
    #[default]
    Random,
    /// Evenly spaced along the x axis through the middle of the grid
    Line,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    pub agent_count: usize,
    /// The first `human_count` agents are human-controlled
    pub human_count: usize,
    pub method: GenerationMethod,
    pub initial_resources: f64,
    pub initial_population: f64,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            agent_count: 20,
            human_count: 0,
            method: GenerationMethod::Random,
            initial_resources: 100.0,
            initial_population: 10.0,
        }
    }
}

/// Build the data of a fresh universe at time zero.
///
/// Placement draws from the master stream after the child streams have
/// been derived, so the same settings always produce the same universe.
pub fn initial_data(settings: UniverseSettings, params: &GenerationParams) -> Result<UniverseData> {
    settings.validate()?;

    let mut rng = RngStreams::from_seed(settings.random_seed, settings.cell_count());
    let mut ids = AgentIdAllocator::default();
    let (x_dim, y_dim, z_dim) = (
        f64::from(settings.x_dim),
        f64::from(settings.y_dim),
        f64::from(settings.z_dim),
    );

    let mut agents = BTreeMap::new();
    for i in 0..params.agent_count {
        let position = match params.method {
            GenerationMethod::Random => Double4D::new(
                0.0,
                rng.master.gen_range(0.0..x_dim),
                rng.master.gen_range(0.0..y_dim),
                rng.master.gen_range(0.0..z_dim),
            ),
            GenerationMethod::Line => Double4D::new(
                0.0,
                (i as f64 + 0.5) * x_dim / params.agent_count as f64,
                y_dim / 2.0,
                z_dim / 2.0,
            ),
        };
        let agent_type = if i < params.human_count {
            AgentType::Human
        } else {
            AgentType::Ai
        };
        let id = ids.next_id();
        let state = MutableAgentState::spawn(
            id,
            AgentSpawn {
                name: format!("agent-{}", id.0),
                agent_type,
                velocity: Velocity::default(),
                internal: AgentInternal {
                    resources: params.initial_resources,
                    population: params.initial_population,
                    ..AgentInternal::default()
                },
            },
            position,
            &settings,
        );
        agents.insert(id, state);
    }

    let initial = HistorySlice::capture(&agents, None, 0, settings.after_image_duration);
    let history = HistoryStore::new(settings.t_dim as usize, 0, initial);

    tracing::info!(
        universe = %settings.universe_name,
        agents = agents.len(),
        method = ?params.method,
        "generated universe"
    );

    Ok(UniverseData {
        settings,
        history,
        clock: Clock {
            time: 0,
            ids,
            rng,
        },
        mailbox: CommandMailbox::new(),
        global: GlobalState::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Int3D;

    #[test]
    fn test_generation_is_seeded() {
        let params = GenerationParams::default();
        let a = initial_data(UniverseSettings::default(), &params).expect("valid");
        let b = initial_data(UniverseSettings::default(), &params).expect("valid");
        assert_eq!(a, b);
        assert_eq!(a.history.latest().ids().len(), 20);
        assert_eq!(a.history.len(), 14);
        assert_eq!(a.clock.ids.peek().0, 21);
    }

    #[test]
    fn test_line_placement() {
        let params = GenerationParams {
            agent_count: 5,
            human_count: 2,
            method: GenerationMethod::Line,
            ..GenerationParams::default()
        };
        let data = initial_data(UniverseSettings::default(), &params).expect("valid");
        let cells: Vec<Int3D> = data
            .history
            .latest()
            .snapshots()
            .map(|s| s.int4d.to_int3d())
            .collect();
        assert_eq!(
            cells,
            vec![
                Int3D::new(1, 5, 1),
                Int3D::new(3, 5, 1),
                Int3D::new(5, 5, 1),
                Int3D::new(7, 5, 1),
                Int3D::new(9, 5, 1),
            ]
        );
        let humans = data
            .history
            .latest()
            .snapshots()
            .filter(|s| s.agent_type == AgentType::Human)
            .count();
        assert_eq!(humans, 2);
    }

    #[test]
    fn test_invalid_settings_refused() {
        let settings = UniverseSettings {
            x_dim: 0,
            ..UniverseSettings::default()
        };
        assert!(initial_data(settings, &GenerationParams::default()).is_err());
    }
}
