//! The universe and its step orchestration

pub mod config;
pub mod data;
pub mod fan_out;
pub mod generation;
pub mod orchestrator;
pub mod report;
pub mod rng;

pub use config::{population_exhausted, DeathRule, Registry, SimulationConfig};
pub use data::{Clock, UniverseData};
pub use generation::{GenerationMethod, GenerationParams};
pub use orchestrator::{CommandBatch, StepPhase, StepReport, Universe};
pub use report::{PhaseKind, PhaseReport, SliceCommit};
pub use rng::RngStreams;
