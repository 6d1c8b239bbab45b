//! Agents: frozen snapshots, per-step working state, and the spatial index

pub mod index;
pub mod state;

pub use index::{AgentIdAllocator, AgentIndex, AgentLocation, Reconciliation};
pub use state::{AgentInternal, AgentSnapshot, AgentSpawn, MutableAgentState, WarRecord};
