//! Fetch worker
//!
//! Walks its assigned pages in order. Every request first takes a slot
//! from the shared rate limiter; throttled and failed requests are retried
//! with backoff up to a bounded attempt count, after which the page is
//! abandoned and its store slots stay unpopulated.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{debug, warn};

use super::rate_limiter::RateLimiter;
use super::record::{CityRecord, RawCity};
use super::source::{PageResponse, PageSource};
use crate::error::Result;
use crate::metrics::standard;
use crate::storage::SharedDataStore;

/// Message from a fetch worker to its orchestrator
#[derive(Debug)]
pub enum FetchEvent {
    /// Free-form diagnostic line
    Log { worker_id: usize, text: String },
    /// Running count of records this worker has fetched
    Progress { worker_id: usize, count: usize },
    /// Sent once when the worker finishes its pages
    Done {
        worker_id: usize,
        records: Vec<CityRecord>,
        abandoned_pages: Vec<usize>,
    },
    /// Sent once, instead of `Done`, on an unrecoverable fault
    Error { worker_id: usize, message: String },
}

/// Per-worker fetch settings
#[derive(Debug, Clone)]
pub struct FetchWorkerConfig {
    /// Records per page
    pub page_limit: usize,
    /// Size of the shared store
    pub total_entities: usize,
    /// Attempts per page before it is abandoned
    pub max_retries: u32,
    /// Extra delay applied on throttling, locally and globally
    pub throttle_penalty: Duration,
    /// Delay before the first request
    pub start_delay: Duration,
}

/// How a page ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageOutcome {
    Completed,
    Abandoned,
}

/// One member of the fetch pool
pub struct FetchWorker {
    worker_id: usize,
    pages: Vec<usize>,
    source: Arc<dyn PageSource>,
    limiter: RateLimiter,
    store: Arc<SharedDataStore>,
    events: mpsc::UnboundedSender<FetchEvent>,
    config: FetchWorkerConfig,
}

impl FetchWorker {
    pub fn new(
        worker_id: usize,
        pages: Vec<usize>,
        source: Arc<dyn PageSource>,
        limiter: RateLimiter,
        store: Arc<SharedDataStore>,
        events: mpsc::UnboundedSender<FetchEvent>,
        config: FetchWorkerConfig,
    ) -> Self {
        Self {
            worker_id,
            pages,
            source,
            limiter,
            store,
            events,
            config,
        }
    }

    /// Walk every assigned page, then report `Done` or `Error` exactly once
    pub async fn run(self) {
        debug!(
            "Fetch worker {} starting with {} pages",
            self.worker_id,
            self.pages.len()
        );

        let event = match self.walk().await {
            Ok((records, abandoned_pages)) => FetchEvent::Done {
                worker_id: self.worker_id,
                records,
                abandoned_pages,
            },
            Err(e) => FetchEvent::Error {
                worker_id: self.worker_id,
                message: e.to_string(),
            },
        };
        self.emit(event);
    }

    async fn walk(&self) -> Result<(Vec<CityRecord>, Vec<usize>)> {
        if !self.config.start_delay.is_zero() {
            tokio::time::sleep(self.config.start_delay).await;
        }

        let mut records = Vec::new();
        let mut abandoned = Vec::new();

        for &page in &self.pages {
            let offset = page * self.config.page_limit;
            if offset >= self.config.total_entities {
                break;
            }

            match self.fetch_page_with_retry(page, offset, &mut records).await? {
                PageOutcome::Completed => {}
                PageOutcome::Abandoned => abandoned.push(page),
            }
        }

        Ok((records, abandoned))
    }

    async fn fetch_page_with_retry(
        &self,
        page: usize,
        offset: usize,
        records: &mut Vec<CityRecord>,
    ) -> Result<PageOutcome> {
        let limit = self.config.page_limit;
        let base_interval = self.limiter.base_interval();
        let penalty = self.config.throttle_penalty;
        let mut backoff = base_interval;
        let mut attempts = 0;

        while attempts < self.config.max_retries {
            self.limiter.acquire_slot().await;
            self.emit(FetchEvent::Log {
                worker_id: self.worker_id,
                text: format!(
                    "Worker {} -> {}",
                    self.worker_id,
                    self.source.describe(offset, limit)
                ),
            });

            let started = std::time::Instant::now();
            let response = self.source.fetch_page(offset, limit).await;
            standard::PAGE_FETCH_DURATION.observe_since(started);
            attempts += 1;

            match response {
                Ok(PageResponse::Items(items)) => {
                    self.store_items(offset, &items, records)?;
                    standard::PAGES_FETCHED.inc();
                    self.emit(FetchEvent::Progress {
                        worker_id: self.worker_id,
                        count: records.len(),
                    });
                    return Ok(PageOutcome::Completed);
                }
                Ok(PageResponse::Throttled) => {
                    standard::THROTTLED_RESPONSES.inc();
                    warn!(
                        "Throttled at offset {} (attempt {}/{}), waiting {:?}",
                        offset,
                        attempts,
                        self.config.max_retries,
                        backoff + penalty
                    );
                    self.limiter.extend_penalty(base_interval + penalty);
                    tokio::time::sleep(backoff + penalty).await;
                    backoff *= 2;
                }
                Ok(PageResponse::Failed { status }) => {
                    warn!(
                        "Page at offset {} failed with status {} (attempt {}/{})",
                        offset, status, attempts, self.config.max_retries
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!(
                        "Page at offset {} failed: {} (attempt {}/{})",
                        offset, e, attempts, self.config.max_retries
                    );
                    tokio::time::sleep(backoff).await;
                }
            }

            if attempts < self.config.max_retries {
                standard::FETCH_RETRIES.inc();
            }
        }

        warn!(
            "Worker {} abandoned page {} after {} attempts",
            self.worker_id, page, attempts
        );
        standard::PAGES_ABANDONED.inc();
        Ok(PageOutcome::Abandoned)
    }

    /// Write a page's items at their absolute indices.
    ///
    /// At most `page_limit` items are taken so a page never writes into the
    /// next page's index range.
    fn store_items(
        &self,
        offset: usize,
        items: &[RawCity],
        records: &mut Vec<CityRecord>,
    ) -> Result<()> {
        for (i, raw) in items.iter().take(self.config.page_limit).enumerate() {
            let index = offset + i;
            if index >= self.config.total_entities {
                break;
            }

            let record = raw.normalize(index);
            if raw.has_coordinates() {
                self.store.write(index, record.point())?;
                standard::ENTITIES_STORED.inc();
            } else {
                debug!("Entity {} has no coordinates, slot left empty", index);
            }
            records.push(record);
        }
        Ok(())
    }

    fn emit(&self, event: FetchEvent) {
        // A closed channel means the orchestrator is gone.
        let _ = self.events.send(event);
    }
}
