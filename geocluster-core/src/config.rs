//! Pipeline configuration
//!
//! Component configs with defaults, overridable from `GEOCLUSTER_*`
//! environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::cluster::ClusterConfig;
use crate::error::{GeoClusterError, Result};
use crate::fetch::FetchConfig;
use crate::runtime::RuntimeConfig;

/// Header carrying the upstream API key
pub const API_KEY_HEADER: &str = "x-rapidapi-key";
/// Header naming the upstream API host
pub const API_HOST_HEADER: &str = "x-rapidapi-host";

/// Full pipeline configuration
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub fetch: FetchConfig,
    pub cluster: ClusterConfig,
    pub runtime: RuntimeConfig,
    /// Local dataset to cluster instead of fetching
    pub dataset: Option<PathBuf>,
}

impl PipelineConfig {
    /// Defaults overridden by process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns per variable name
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let fetch = &mut config.fetch;

        if let Some(url) = lookup("GEOCLUSTER_BASE_URL") {
            fetch.http.base_url = url;
        }
        if let Some(key) = lookup("GEOCLUSTER_API_KEY") {
            fetch.http.headers.insert(API_KEY_HEADER.into(), key);
        }
        if let Some(host) = lookup("GEOCLUSTER_API_HOST") {
            fetch.http.headers.insert(API_HOST_HEADER.into(), host);
        }
        if let Some(sort) = lookup("GEOCLUSTER_SORT") {
            fetch.http.sort = sort;
        }
        if let Some(v) = parse(&lookup, "GEOCLUSTER_TARGET_ENTITIES")? {
            fetch.total_entities = v;
        }
        if let Some(v) = parse(&lookup, "GEOCLUSTER_PAGE_LIMIT")? {
            fetch.page_limit = v;
        }
        if let Some(ms) = parse(&lookup, "GEOCLUSTER_RATE_LIMIT_MS")? {
            fetch.rate_limit.base_interval = Duration::from_millis(ms);
        }
        if let Some(v) = parse(&lookup, "GEOCLUSTER_MAX_RETRIES")? {
            fetch.max_retries = v;
        }
        if let Some(ms) = parse(&lookup, "GEOCLUSTER_THROTTLE_PENALTY_MS")? {
            fetch.throttle_penalty = Duration::from_millis(ms);
        }
        if let Some(v) = parse(&lookup, "GEOCLUSTER_FETCH_WORKERS")? {
            fetch.num_workers = v;
        }

        let cluster = &mut config.cluster;
        if let Some(v) = parse(&lookup, "GEOCLUSTER_K")? {
            cluster.k = v;
        }
        if let Some(v) = parse(&lookup, "GEOCLUSTER_MAX_ITERATIONS")? {
            cluster.max_iterations = v;
        }
        if let Some(v) = parse(&lookup, "GEOCLUSTER_CONVERGENCE_THRESHOLD")? {
            cluster.convergence_threshold = v;
        }
        if let Some(v) = parse(&lookup, "GEOCLUSTER_CLUSTER_WORKERS")? {
            cluster.num_workers = v;
        }
        if let Some(v) = parse(&lookup, "GEOCLUSTER_SEED")? {
            cluster.seed = Some(v);
        }

        if let Some(v) = parse(&lookup, "GEOCLUSTER_IO_THREADS")? {
            config.runtime.io_threads = v;
        }
        config.dataset = lookup("GEOCLUSTER_DATASET").map(PathBuf::from);

        config.validate()?;
        Ok(config)
    }

    /// Reject settings no pipeline run can honour
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| {
            Err(GeoClusterError::InvalidConfig {
                reason: reason.to_string(),
            })
        };

        if self.cluster.k == 0 {
            return invalid("k must be at least 1");
        }
        if self.cluster.num_workers == 0 {
            return invalid("cluster worker count must be at least 1");
        }
        let threshold = self.cluster.convergence_threshold;
        if threshold.is_nan() || threshold < 0.0 {
            return invalid("convergence threshold must be a non-negative number");
        }
        if self.fetch.num_workers == 0 {
            return invalid("fetch worker count must be at least 1");
        }
        if self.fetch.page_limit == 0 {
            return invalid("page limit must be at least 1");
        }
        if self.fetch.total_entities == 0 && self.dataset.is_none() {
            return invalid("target entity count must be at least 1");
        }
        Ok(())
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| GeoClusterError::InvalidConfig {
                reason: format!("{}={:?}: {}", key, raw, e),
            }),
    }
}
