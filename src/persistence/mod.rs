//! Saving and loading universes as JSON artifacts

pub mod store;

pub use store::UniverseStore;
