//! Core type definitions used throughout the codebase

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub u32);

impl AgentId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Universe tick counter. Signed because the pre-history window sits below zero.
pub type Tick = i32;

/// Sub-group index of an agent inside its grid cell
pub type GroupId = u64;

/// Who submits external commands for an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AgentType {
    Human,
    #[default]
    Ai,
    /// Driven by mechanisms only
    Passive,
}

/// Integer grid cell coordinate.
///
/// Field order matters: the derived `Ord` is lexicographic on (x, y, z), which
/// matches the flat cell index used for per-cell RNG streams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Int3D {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Int3D {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance between cell coordinates
    pub fn distance(&self, other: &Self) -> f64 {
        let dx = f64::from(self.x - other.x);
        let dy = f64::from(self.y - other.y);
        let dz = f64::from(self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl fmt::Display for Int3D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Time plus grid cell
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Int4D {
    pub t: Tick,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Int4D {
    pub fn new(t: Tick, x: i32, y: i32, z: i32) -> Self {
        Self { t, x, y, z }
    }

    pub fn from_cell(t: Tick, cell: Int3D) -> Self {
        Self { t, x: cell.x, y: cell.y, z: cell.z }
    }

    pub fn to_int3d(&self) -> Int3D {
        Int3D::new(self.x, self.y, self.z)
    }
}

impl fmt::Display for Int4D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[t={} ({}, {}, {})]", self.t, self.x, self.y, self.z)
    }
}

/// Continuous position in spacetime (grid units, ticks)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Double4D {
    pub t: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Double4D {
    pub fn new(t: f64, x: f64, y: f64, z: f64) -> Self {
        Self { t, x, y, z }
    }

    pub fn to_int4d(&self) -> Int4D {
        Int4D::new(
            self.t.floor() as Tick,
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.z.floor() as i32,
        )
    }

    /// Index of the sub-group this position falls into inside its cell.
    ///
    /// The unit cell is cut into cubes of `edge_length`; groups are numbered
    /// x-major like cells.
    pub fn group_id(&self, edge_length: f64) -> GroupId {
        let per_axis = groups_per_axis(edge_length);
        let bucket = |v: f64| -> GroupId {
            let frac = v - v.floor();
            ((frac / edge_length).floor() as GroupId).min(per_axis - 1)
        };
        (bucket(self.x) * per_axis + bucket(self.y)) * per_axis + bucket(self.z)
    }
}

/// Largest sub-group count per axis whose cube still fits a `GroupId`
pub const MAX_GROUPS_PER_AXIS: GroupId = 1 << 21;

/// Number of sub-groups along one axis of a cell
pub fn groups_per_axis(edge_length: f64) -> GroupId {
    ((1.0 / edge_length).ceil() as GroupId).max(1)
}

/// Velocity in grid cells per tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub vx: f64,
    pub vy: f64,
    pub vz: f64,
}

impl Velocity {
    pub fn new(vx: f64, vy: f64, vz: f64) -> Self {
        Self { vx, vy, vz }
    }

    pub fn magnitude(&self) -> f64 {
        (self.vx * self.vx + self.vy * self.vy + self.vz * self.vz).sqrt()
    }

    /// Rescale so the magnitude does not exceed `max`
    pub fn clamp_magnitude(&self, max: f64) -> Self {
        let mag = self.magnitude();
        if mag > max && mag > 0.0 {
            let k = max / mag;
            Self::new(self.vx * k, self.vy * k, self.vz * k)
        } else {
            *self
        }
    }
}
