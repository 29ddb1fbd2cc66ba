//! geocluster core
//!
//! Two-phase concurrent pipeline:
//! - Rate-limited, multi-worker acquisition of paginated city records
//! - Parallel iterative k-means over the acquired coordinates
//!
//! Both phases share one flat per-entity store indexed by entity position.

pub mod cluster;
pub mod config;
pub mod error;
pub mod fetch;
pub mod metrics;
pub mod pipeline;
pub mod runtime;
pub mod storage;

pub use config::PipelineConfig;
pub use error::{GeoClusterError, Result};
pub use pipeline::{Pipeline, PipelineOutcome};
pub use runtime::PipelineRuntime;
pub use storage::{GeoPoint, SharedDataStore};
