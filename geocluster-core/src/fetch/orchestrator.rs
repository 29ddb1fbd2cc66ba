//! Fetch orchestrator
//!
//! Splits the page range across a pool of fetch workers, tracks their
//! progress, waits for every worker to report, and assembles the ordered
//! entity list.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use super::partition::{total_pages, PageAssigner};
use super::rate_limiter::{RateLimiter, RateLimiterConfig};
use super::record::CityRecord;
use super::source::{HttpSourceConfig, PageSource};
use super::worker::{FetchEvent, FetchWorker, FetchWorkerConfig};
use crate::error::{GeoClusterError, Phase, Result};
use crate::storage::SharedDataStore;

/// Configuration for the fetch phase
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Upstream HTTP settings
    pub http: HttpSourceConfig,
    /// Entities to acquire; also the store size
    pub total_entities: usize,
    /// Records requested per page
    pub page_limit: usize,
    /// Number of concurrent fetch workers
    pub num_workers: usize,
    /// Attempts per page
    pub max_retries: u32,
    /// Global request pacing
    pub rate_limit: RateLimiterConfig,
    /// Extra delay added on throttling
    pub throttle_penalty: Duration,
    /// Delay worker `w` by `w * base_interval` before its first request
    pub stagger_start: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            http: HttpSourceConfig::default(),
            total_entities: 50,
            page_limit: 10,
            num_workers: parallelism.clamp(2, 4),
            max_retries: 4,
            rate_limit: RateLimiterConfig::default(),
            throttle_penalty: Duration::from_millis(1500),
            stagger_start: true,
        }
    }
}

/// Aggregate progress across all fetch workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FetchProgress {
    pub fetched: usize,
    pub total: usize,
}

/// Result of a completed fetch phase
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// One record per store index; unfetched positions hold placeholders
    pub records: Vec<CityRecord>,
    /// Records actually returned by the source
    pub fetched: usize,
    /// Pages given up after retry exhaustion, ascending
    pub abandoned_pages: Vec<usize>,
}

/// Coordinates the fetch worker pool
pub struct FetchOrchestrator {
    config: FetchConfig,
    source: Arc<dyn PageSource>,
    store: Arc<SharedDataStore>,
    progress: watch::Sender<FetchProgress>,
}

impl FetchOrchestrator {
    pub fn new(
        config: FetchConfig,
        source: Arc<dyn PageSource>,
        store: Arc<SharedDataStore>,
    ) -> Result<Self> {
        if config.num_workers == 0 || config.page_limit == 0 {
            return Err(GeoClusterError::InvalidConfig {
                reason: "fetch needs at least one worker and a non-zero page limit".into(),
            });
        }
        if store.len() != config.total_entities {
            return Err(GeoClusterError::StoreSizeMismatch {
                expected: config.total_entities,
                actual: store.len(),
            });
        }

        let (progress, _) = watch::channel(FetchProgress {
            fetched: 0,
            total: config.total_entities,
        });

        Ok(Self {
            config,
            source,
            store,
            progress,
        })
    }

    /// Watch aggregate progress
    pub fn subscribe_progress(&self) -> watch::Receiver<FetchProgress> {
        self.progress.subscribe()
    }

    /// Run the fetch phase to completion.
    ///
    /// Returns only after every worker has finished. A worker fault fails
    /// the phase, but siblings are left to finish their pages first.
    pub async fn run(&self) -> Result<FetchOutcome> {
        let num_workers = self.config.num_workers;
        let total = self.config.total_entities;

        let assigner = PageAssigner::new(total_pages(total, self.config.page_limit));
        let assignments = assigner.assign(num_workers);
        assigner.verify_cover(&assignments)?;

        info!(
            "Fetching {} entities over {} pages with {} workers",
            total,
            assigner.total_pages(),
            num_workers
        );

        let limiter = RateLimiter::new(self.config.rate_limit.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut handles = Vec::with_capacity(num_workers);
        for (worker_id, pages) in assignments.into_iter().enumerate() {
            let start_delay = if self.config.stagger_start {
                limiter.base_interval() * worker_id as u32
            } else {
                Duration::ZERO
            };
            let worker = FetchWorker::new(
                worker_id,
                pages,
                self.source.clone(),
                limiter.clone(),
                self.store.clone(),
                tx.clone(),
                FetchWorkerConfig {
                    page_limit: self.config.page_limit,
                    total_entities: total,
                    max_retries: self.config.max_retries,
                    throttle_penalty: self.config.throttle_penalty,
                    start_delay,
                },
            );
            handles.push(tokio::spawn(worker.run()));
        }
        drop(tx);

        let mut counts = vec![0usize; num_workers];
        let mut reported = vec![false; num_workers];
        let mut slots: Vec<Option<CityRecord>> = vec![None; total];
        let mut abandoned_pages = Vec::new();
        let mut faults: Vec<(usize, String)> = Vec::new();

        // Closes once every worker has dropped its sender
        while let Some(event) = rx.recv().await {
            match event {
                FetchEvent::Log { text, .. } => debug!("{}", text),
                FetchEvent::Progress { worker_id, count } => {
                    counts[worker_id] = count;
                    let fetched: usize = counts.iter().sum();
                    let percent = if total == 0 { 100 } else { fetched * 100 / total };
                    info!("Fetch progress: {}% ({}/{})", percent, fetched, total);
                    self.progress.send_replace(FetchProgress { fetched, total });
                }
                FetchEvent::Done {
                    worker_id,
                    records,
                    abandoned_pages: pages,
                } => {
                    reported[worker_id] = true;
                    for record in records {
                        let index = record.index;
                        if let Some(slot) = slots.get_mut(index) {
                            *slot = Some(record);
                        }
                    }
                    abandoned_pages.extend(pages);
                    debug!("Fetch worker {} done", worker_id);
                }
                FetchEvent::Error { worker_id, message } => {
                    reported[worker_id] = true;
                    error!("Fetch worker {} failed: {}", worker_id, message);
                    faults.push((worker_id, message));
                }
            }
        }

        for (worker_id, handle) in handles.into_iter().enumerate() {
            if let Err(e) = handle.await {
                error!("Fetch worker {} aborted: {}", worker_id, e);
                faults.push((worker_id, e.to_string()));
            } else if !reported[worker_id] {
                faults.push((worker_id, "exited without reporting".into()));
            }
        }

        if let Some((worker_id, message)) = faults.into_iter().next() {
            return Err(GeoClusterError::WorkerFault {
                phase: Phase::Fetch,
                worker_id,
                message,
            });
        }

        abandoned_pages.sort_unstable();
        if !abandoned_pages.is_empty() {
            warn!("Abandoned pages: {:?}", abandoned_pages);
        }

        let fetched = slots.iter().filter(|s| s.is_some()).count();
        let records = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| slot.unwrap_or_else(|| CityRecord::placeholder(index)))
            .collect();

        info!("Fetch complete: {}/{} entities", fetched, total);

        Ok(FetchOutcome {
            records,
            fetched,
            abandoned_pages,
        })
    }
}
