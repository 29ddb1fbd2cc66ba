//! Fetch phase
//!
//! Rate-limited, multi-worker acquisition of paginated city records into
//! the shared store.

pub mod local;
pub mod orchestrator;
pub mod partition;
pub mod rate_limiter;
pub mod record;
pub mod source;
pub mod worker;

pub use local::LocalDataset;
pub use orchestrator::{FetchConfig, FetchOrchestrator, FetchOutcome, FetchProgress};
pub use partition::PageAssigner;
pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use record::{CityRecord, RawCity};
pub use source::{HttpPageSource, HttpSourceConfig, PageResponse, PageSource};
pub use worker::{FetchEvent, FetchWorker};
