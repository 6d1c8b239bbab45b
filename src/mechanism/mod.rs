//! Per-agent and whole-universe mechanisms
//!
//! Mechanisms are the rules that run every tick without external input:
//! production, war bookkeeping, movement. Per-agent mechanisms may only
//! mutate the agent they are given and talk to others through commands.

pub mod builtin;
pub mod global;
pub mod movement;
pub mod pipeline;

pub use builtin::{waterfall, ResourceProduction, WarSync};
pub use global::{Census, GlobalMechanism, GlobalMechanisms, GlobalState};
pub use movement::advance;
pub use pipeline::{Mechanism, MechanismError, MechanismPipeline, PipelineOutcome};
