pub mod config;
pub mod error;
pub mod types;

pub use config::{RuntimeOptions, UniverseSettings};
pub use error::{Result, UniverseError};
pub use types::{AgentId, AgentType, Double4D, GroupId, Int3D, Int4D, Tick, Velocity};
