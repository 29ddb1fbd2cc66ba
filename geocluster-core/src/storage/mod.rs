//! Entity storage shared across pipeline phases

pub mod shared_store;

pub use shared_store::{GeoPoint, SharedDataStore};
