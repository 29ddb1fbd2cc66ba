//! Async runtime management

pub mod executor;

pub use executor::{PipelineRuntime, RuntimeConfig};
