//! Universe settings with documented constants
//!
//! Settings are fixed when a universe is generated and never mutated after
//! that. A loaded copy may carry a fresh random seed, nothing else.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::error::{Result, UniverseError};
use crate::core::types::{groups_per_axis, Int3D, Tick, MAX_GROUPS_PER_AXIS};
use crate::spacetime;

/// Immutable parameters of one universe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UniverseSettings {
    /// Name of the universe; also the save directory name
    pub universe_name: String,

    // === PLUGGABLE COLLECTIONS ===
    /// Registered name of the per-agent mechanism pipeline
    pub mechanism_collection: String,
    /// Registered name of the whole-universe mechanism list
    pub global_mechanism_collection: String,
    /// Registered name of the AI used for AI-controlled agents
    pub ai_collection: String,
    /// Registered name of the command availability set for external commands
    pub command_collection: String,

    // === GRID ===
    pub x_dim: i32,
    pub y_dim: i32,
    pub z_dim: i32,

    /// Number of history slices kept in memory.
    ///
    /// Must be at least `min_t_dim()`: an observer in one corner looks back
    /// `delay(corner, opposite corner)` ticks into history.
    pub t_dim: i32,

    /// Information propagation speed in cells per tick
    pub speed_of_light: f64,

    /// Edge length of the sub-group cubes inside one cell (cell edge = 1.0).
    ///
    /// Agents in the same cell but a different sub-group exchange commands
    /// through the mailbox instead of executing them immediately.
    pub group_edge_length: f64,

    /// How many ticks an agent's old snapshot lingers in a cell it has left.
    ///
    /// Zero disables after-images.
    pub after_image_duration: i32,

    /// Seed of the master RNG
    pub random_seed: u64,
}

impl Default for UniverseSettings {
    fn default() -> Self {
        Self {
            universe_name: "default".to_string(),
            mechanism_collection: "Default".to_string(),
            global_mechanism_collection: "Default".to_string(),
            ai_collection: "Empty".to_string(),
            command_collection: "All".to_string(),
            x_dim: 10,
            y_dim: 10,
            z_dim: 3,
            // delay((0,0,0), (9,9,2)) = ceil(12.88) = 13
            t_dim: 14,
            speed_of_light: 1.0,
            group_edge_length: 0.01,
            after_image_duration: 4,
            random_seed: 100,
        }
    }
}

impl UniverseSettings {
    /// Parse settings from TOML; missing keys take default values
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: UniverseSettings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Smallest history window that covers the longest light delay in the grid
    pub fn min_t_dim(&self) -> i32 {
        let far_corner = Int3D::new(self.x_dim - 1, self.y_dim - 1, self.z_dim - 1);
        spacetime::delay(Int3D::default(), far_corner, self.speed_of_light) + 1
    }

    /// Validate settings for internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.x_dim <= 0 || self.y_dim <= 0 || self.z_dim <= 0 {
            return Err(UniverseError::InvalidSettings(format!(
                "grid dimensions must be positive, got {}x{}x{}",
                self.x_dim, self.y_dim, self.z_dim
            )));
        }

        let cells = self
            .x_dim
            .checked_mul(self.y_dim)
            .and_then(|xy| xy.checked_mul(self.z_dim));
        if cells.is_none() {
            return Err(UniverseError::InvalidSettings(format!(
                "grid of {}x{}x{} cells is too large",
                self.x_dim, self.y_dim, self.z_dim
            )));
        }

        if !(self.speed_of_light > 0.0 && self.speed_of_light.is_finite()) {
            return Err(UniverseError::InvalidSettings(format!(
                "speed_of_light must be positive and finite, got {}",
                self.speed_of_light
            )));
        }

        if self.t_dim < self.min_t_dim() {
            return Err(UniverseError::InvalidSettings(format!(
                "t_dim ({}) must be >= {} for this grid and speed of light",
                self.t_dim,
                self.min_t_dim()
            )));
        }

        if !(self.group_edge_length > 0.0 && self.group_edge_length <= 1.0) {
            return Err(UniverseError::InvalidSettings(format!(
                "group_edge_length must be in (0, 1], got {}",
                self.group_edge_length
            )));
        }

        if groups_per_axis(self.group_edge_length) > MAX_GROUPS_PER_AXIS {
            return Err(UniverseError::InvalidSettings(format!(
                "group_edge_length {} gives more than {} groups per axis",
                self.group_edge_length, MAX_GROUPS_PER_AXIS
            )));
        }

        if self.after_image_duration < 0 {
            return Err(UniverseError::InvalidSettings(
                "after_image_duration must not be negative".into(),
            ));
        }

        Ok(())
    }

    pub fn cell_count(&self) -> usize {
        (self.x_dim * self.y_dim * self.z_dim) as usize
    }

    pub fn contains(&self, cell: Int3D) -> bool {
        (0..self.x_dim).contains(&cell.x)
            && (0..self.y_dim).contains(&cell.y)
            && (0..self.z_dim).contains(&cell.z)
    }

    /// Flat x-major index of a cell, `None` outside the grid
    pub fn cell_index(&self, cell: Int3D) -> Option<usize> {
        if !self.contains(cell) {
            return None;
        }
        Some(((cell.x * self.y_dim + cell.y) * self.z_dim + cell.z) as usize)
    }

    /// Inverse of `cell_index`
    pub fn cell_at(&self, index: usize) -> Int3D {
        let index = index as i32;
        let z = index % self.z_dim;
        let y = (index / self.z_dim) % self.y_dim;
        let x = index / (self.z_dim * self.y_dim);
        Int3D::new(x, y, z)
    }

    /// Light delay between two cells under these settings
    pub fn delay(&self, from: Int3D, to: Int3D) -> Tick {
        spacetime::delay(from, to, self.speed_of_light)
    }
}

/// Runtime knobs that are not part of the universe itself
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Worker threads for per-cell fan-out (0 = rayon default)
    pub worker_threads: usize,
    /// Root directory holding one sub-directory per saved universe
    pub save_root: PathBuf,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            save_root: PathBuf::from("saves"),
        }
    }
}
