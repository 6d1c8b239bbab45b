//! Windowed history of full-population snapshots
//!
//! The store keeps `t_dim` consecutive slices. Observers never read live
//! state of other cells; they read the slice that light from each cell has
//! reached by now.

pub mod slice;
pub mod store;
pub mod view;

pub use slice::HistorySlice;
pub use store::HistoryStore;
pub use view::AgentVisibilityView;
