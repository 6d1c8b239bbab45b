//! Lightcone - deterministic universe stepping with causal command delivery

pub mod agent;
pub mod ai;
pub mod command;
pub mod core;
pub mod history;
pub mod mechanism;
pub mod persistence;
pub mod spacetime;
pub mod universe;

pub use crate::core::config::UniverseSettings;
pub use crate::core::error::{Result, UniverseError};
pub use crate::universe::{Registry, SimulationConfig, Universe};
