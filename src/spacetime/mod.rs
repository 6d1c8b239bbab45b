//! Light-delay and time-dilation functions
//!
//! Pure functions of grid positions and physical constants. No state.

mod delay;
mod dilation;

pub use delay::{delay, is_causally_reachable};
pub use dilation::{dilation, ProperTime};
