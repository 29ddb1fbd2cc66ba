//! Page assignment across fetch workers
//!
//! Round-robin stride: worker `w` of `W` walks pages `w, w+W, w+2W, ...`.
//! Each page maps to its own index range in the store, so the stride keeps
//! every worker's writes disjoint.

use tracing::debug;

use crate::error::{GeoClusterError, Result};

/// Number of pages needed to cover `total_entities` at `page_limit` per page
pub fn total_pages(total_entities: usize, page_limit: usize) -> usize {
    if page_limit == 0 {
        return 0;
    }
    total_entities.div_ceil(page_limit)
}

/// Deterministic stride page assigner
#[derive(Debug, Clone, Copy)]
pub struct PageAssigner {
    total_pages: usize,
}

impl PageAssigner {
    pub fn new(total_pages: usize) -> Self {
        Self { total_pages }
    }

    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    /// Pages owned by one worker, in walk order
    pub fn pages_for_worker(&self, worker_id: usize, num_workers: usize) -> Vec<usize> {
        if num_workers == 0 || worker_id >= num_workers {
            return Vec::new();
        }
        (worker_id..self.total_pages).step_by(num_workers).collect()
    }

    /// Page lists for every worker, indexed by worker id
    pub fn assign(&self, num_workers: usize) -> Vec<Vec<usize>> {
        let assignments: Vec<Vec<usize>> = (0..num_workers)
            .map(|w| self.pages_for_worker(w, num_workers))
            .collect();

        debug!(
            "Assigned {} pages to {} fetch workers",
            self.total_pages, num_workers
        );

        assignments
    }

    /// Check that `assignments` covers `[0, total_pages)` exactly once
    pub fn verify_cover(&self, assignments: &[Vec<usize>]) -> Result<()> {
        let mut owner: Vec<Option<usize>> = vec![None; self.total_pages];

        for (worker_id, pages) in assignments.iter().enumerate() {
            for &page in pages {
                let slot = owner.get_mut(page).ok_or_else(|| GeoClusterError::InvalidPartition {
                    reason: format!("page {} outside [0, {})", page, self.total_pages),
                })?;
                if let Some(previous) = slot.replace(worker_id) {
                    return Err(GeoClusterError::InvalidPartition {
                        reason: format!(
                            "page {} assigned to workers {} and {}",
                            page, previous, worker_id
                        ),
                    });
                }
            }
        }

        if let Some(missing) = owner.iter().position(Option::is_none) {
            return Err(GeoClusterError::InvalidPartition {
                reason: format!("page {} has no owner", missing),
            });
        }

        Ok(())
    }
}
