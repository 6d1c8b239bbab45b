use std::path::PathBuf;

use thiserror::Error;

use crate::core::types::AgentId;

#[derive(Error, Debug)]
pub enum UniverseError {
    #[error("Agent not found: {0}")]
    UnknownAgent(AgentId),

    #[error("Unknown {kind} collection: {name}")]
    UnknownCollection { kind: &'static str, name: String },

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Phase order violated: expected {expected}, found {found}")]
    PhaseOrder {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Inconsistent universe state: {0}")]
    Inconsistent(String),

    #[error("Missing save artifact: {0}")]
    MissingArtifact(PathBuf),

    #[error("Corrupt save artifact {path}: {source}")]
    CorruptArtifact {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, UniverseError>;
