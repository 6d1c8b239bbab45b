//! Information propagation delay between grid cells

use crate::core::types::{Int3D, Int4D, Tick};

/// Ticks needed for information to travel from one cell to another.
///
/// `ceil(distance / speed_of_light)`: symmetric, zero only for the same cell,
/// and non-decreasing in Euclidean distance.
pub fn delay(from: Int3D, to: Int3D, speed_of_light: f64) -> Tick {
    if from == to {
        return 0;
    }
    (from.distance(&to) / speed_of_light).ceil() as Tick
}

/// True when an event at `sent` can influence `receiver`
pub fn is_causally_reachable(sent: Int4D, receiver: Int4D, speed_of_light: f64) -> bool {
    receiver.t - sent.t >= delay(sent.to_int3d(), receiver.to_int3d(), speed_of_light)
}
