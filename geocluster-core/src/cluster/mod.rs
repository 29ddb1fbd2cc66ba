//! Clustering phase
//!
//! Parallel, iterative k-means over the shared store.

pub mod centroid;
pub mod orchestrator;
pub mod pool;
pub mod seeding;
pub mod worker;

pub use centroid::{distance, nearest_centroid, squared_distance, Centroid, PartialAggregate};
pub use orchestrator::{
    chunk_ranges, ClusterConfig, ClusterOrchestrator, ClusterOutcome, ClusterPhase, RoundOutcome,
    RoundStats,
};
pub use pool::ClusterPool;
pub use worker::{assign_chunk, map_chunk, ChunkAssignments, ChunkPartials};
