//! Error types for geocluster
//!
//! Covers the upstream source, the shared store, partitioning, worker
//! faults in both pipeline phases, and configuration.

use std::fmt;
use thiserror::Error;

/// Pipeline phase a worker fault belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Fetch,
    Cluster,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Fetch => write!(f, "fetch"),
            Phase::Cluster => write!(f, "cluster"),
        }
    }
}

/// Primary error type for all geocluster operations
#[derive(Debug, Error)]
pub enum GeoClusterError {
    // ========== Source Errors ==========

    /// Transport-level request failure
    #[error("Request to {url} failed: {reason}")]
    RequestFailed { url: String, reason: String },

    /// Upstream answered with a non-success status
    #[error("Unexpected status {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },

    /// Response body could not be decoded
    #[error("Invalid payload from {url}: {reason}")]
    InvalidPayload { url: String, reason: String },

    // ========== Store Errors ==========

    /// Index outside the store
    #[error("Index {index} out of range for store of {len} entities")]
    IndexOutOfRange { index: usize, len: usize },

    /// Two writers touched the same slot
    #[error("Slot {index} already populated")]
    IndexCollision { index: usize },

    /// Store length does not match the configured entity count
    #[error("Store holds {actual} entities, expected {expected}")]
    StoreSizeMismatch { expected: usize, actual: usize },

    // ========== Partition Errors ==========

    /// Work partition does not cover the space exactly once
    #[error("Invalid partition: {reason}")]
    InvalidPartition { reason: String },

    // ========== Worker Errors ==========

    /// A worker reported an unrecoverable fault
    #[error("{phase} worker {worker_id} failed: {message}")]
    WorkerFault {
        phase: Phase,
        worker_id: usize,
        message: String,
    },

    /// Worker pool could not be created or reached
    #[error("Worker pool error: {reason}")]
    PoolUnavailable { reason: String },

    // ========== Configuration / Dataset Errors ==========

    /// Configuration rejected by validation
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Local dataset could not be read
    #[error("Failed to read dataset {path}: {reason}")]
    DatasetUnreadable { path: String, reason: String },

    // ========== Runtime Errors ==========

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl GeoClusterError {
    /// Returns true if the page request may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GeoClusterError::RequestFailed { .. }
                | GeoClusterError::UnexpectedStatus { .. }
                | GeoClusterError::InvalidPayload { .. }
        )
    }

    /// Returns true if this error means a whole phase has failed
    pub fn is_phase_fatal(&self) -> bool {
        matches!(
            self,
            GeoClusterError::WorkerFault { .. } | GeoClusterError::PoolUnavailable { .. }
        )
    }
}

/// Result type alias for geocluster operations
pub type Result<T> = std::result::Result<T, GeoClusterError>;
