//! Named collections and the resolved per-universe configuration
//!
//! Mechanisms, AIs and command sets are registered under stable names once at
//! startup. A universe's settings name the collections it uses; resolving
//! them yields a `SimulationConfig` owned by that universe.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::agent::state::MutableAgentState;
use crate::ai::{Ai, EmptyAi, RandomTraderAi};
use crate::command::availability::CommandAvailability;
use crate::core::config::UniverseSettings;
use crate::core::error::{Result, UniverseError};
use crate::mechanism::{
    Census, GlobalMechanisms, Mechanism, MechanismPipeline, ResourceProduction, WarSync,
};

/// Decides which agents are removed at reconciliation
pub type DeathRule = fn(&MutableAgentState) -> bool;

/// An agent with no population left is dead
pub fn population_exhausted(state: &MutableAgentState) -> bool {
    state.internal.population <= 0.0
}

/// Everything a universe needs besides its data
#[derive(Clone)]
pub struct SimulationConfig {
    pub pipeline: MechanismPipeline,
    pub global_mechanisms: GlobalMechanisms,
    pub ai: Arc<dyn Ai>,
    pub availability: CommandAvailability,
    pub death_rule: DeathRule,
}

impl std::fmt::Debug for SimulationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationConfig")
            .field("pipeline", &self.pipeline)
            .field(
                "global_mechanisms",
                &self.global_mechanisms.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .field("ai", &self.ai.name())
            .field("availability", &self.availability.name())
            .finish()
    }
}

#[derive(Clone)]
pub struct Registry {
    mechanisms: BTreeMap<String, MechanismPipeline>,
    global_mechanisms: BTreeMap<String, GlobalMechanisms>,
    ais: BTreeMap<String, Arc<dyn Ai>>,
    commands: BTreeMap<String, CommandAvailability>,
}

impl Registry {
    /// A registry with nothing in it
    pub fn empty() -> Self {
        Self {
            mechanisms: BTreeMap::new(),
            global_mechanisms: BTreeMap::new(),
            ais: BTreeMap::new(),
            commands: BTreeMap::new(),
        }
    }

    /// The built-in collections:
    /// - mechanisms `Default` (production, war bookkeeping) and `Empty`
    /// - global mechanisms `Default` (census) and `Empty`
    /// - AIs `Empty` and `RandomTrader`
    /// - command sets `All` and `Peaceful`
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        let default_pipeline: Vec<Arc<dyn Mechanism>> =
            vec![Arc::new(ResourceProduction::default()), Arc::new(WarSync)];
        registry.register_mechanisms("Default", MechanismPipeline::new(default_pipeline));
        registry.register_mechanisms("Empty", MechanismPipeline::default());
        registry.register_global_mechanisms("Default", vec![Arc::new(Census)]);
        registry.register_global_mechanisms("Empty", Vec::new());
        registry.register_ai("Empty", Arc::new(EmptyAi));
        registry.register_ai("RandomTrader", Arc::new(RandomTraderAi::default()));
        registry.register_commands(CommandAvailability::all());
        registry.register_commands(CommandAvailability::peaceful());
        registry
    }

    pub fn register_mechanisms(&mut self, name: impl Into<String>, pipeline: MechanismPipeline) {
        self.mechanisms.insert(name.into(), pipeline);
    }

    pub fn register_global_mechanisms(
        &mut self,
        name: impl Into<String>,
        mechanisms: GlobalMechanisms,
    ) {
        self.global_mechanisms.insert(name.into(), mechanisms);
    }

    pub fn register_ai(&mut self, name: impl Into<String>, ai: Arc<dyn Ai>) {
        self.ais.insert(name.into(), ai);
    }

    /// Registered under the availability set's own name
    pub fn register_commands(&mut self, availability: CommandAvailability) {
        self.commands
            .insert(availability.name().to_string(), availability);
    }

    pub fn ai_names(&self) -> impl Iterator<Item = &str> {
        self.ais.keys().map(String::as_str)
    }

    /// Look up every collection named by `settings`
    pub fn resolve(&self, settings: &UniverseSettings) -> Result<SimulationConfig> {
        fn lookup<T: Clone>(
            map: &BTreeMap<String, T>,
            kind: &'static str,
            name: &str,
        ) -> Result<T> {
            map.get(name)
                .cloned()
                .ok_or_else(|| UniverseError::UnknownCollection {
                    kind,
                    name: name.to_string(),
                })
        }

        Ok(SimulationConfig {
            pipeline: lookup(&self.mechanisms, "mechanism", &settings.mechanism_collection)?,
            global_mechanisms: lookup(
                &self.global_mechanisms,
                "global mechanism",
                &settings.global_mechanism_collection,
            )?,
            ai: lookup(&self.ais, "AI", &settings.ai_collection)?,
            availability: lookup(&self.commands, "command", &settings.command_collection)?,
            death_rule: population_exhausted,
        })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_builtins() {
        let registry = Registry::with_builtins();
        let config = registry
            .resolve(&UniverseSettings::default())
            .expect("default collections exist");
        assert_eq!(config.pipeline.names(), vec!["ResourceProduction", "WarSync"]);
        assert_eq!(config.ai.name(), "Empty");
        assert_eq!(config.availability.name(), "All");
    }

    #[test]
    fn test_unknown_collection_is_reported() {
        let settings = UniverseSettings {
            ai_collection: "Oracle".into(),
            ..UniverseSettings::default()
        };
        let err = Registry::with_builtins()
            .resolve(&settings)
            .expect_err("no such AI");
        assert!(matches!(
            err,
            UniverseError::UnknownCollection { kind: "AI", ref name } if name == "Oracle"
        ));
    }
}
