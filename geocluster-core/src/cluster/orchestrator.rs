//! K-means cluster orchestrator
//!
//! Drives `SEEDING -> MAP_ROUND -> REDUCE -> (CONVERGED | MAX_ITERATIONS) ->
//! DONE` over the shared store. Every round is a full barrier: all chunk
//! results are collected and reduced before the next round is dispatched.
//! The orchestrator never computes assignments itself; the pool does.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::centroid::{distance, Centroid, PartialAggregate};
use super::pool::{ClusterPool, PoolTask, TaskKind, TaskOutput};
use super::seeding::seed_centroids;
use super::worker::{ChunkAssignments, ChunkPartials};
use crate::error::{GeoClusterError, Phase, Result};
use crate::fetch::CityRecord;
use crate::metrics::standard;
use crate::storage::SharedDataStore;

/// Configuration for the clustering phase
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Number of clusters
    pub k: usize,
    /// Size of the worker pool
    pub num_workers: usize,
    /// Round cap
    pub max_iterations: u32,
    /// Stop when the summed centroid displacement drops below this
    pub convergence_threshold: f64,
    /// Fixed RNG seed for reproducible seeding
    pub seed: Option<u64>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            k: 3,
            num_workers: 4,
            max_iterations: 100,
            convergence_threshold: 1e-4,
            seed: None,
        }
    }
}

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterPhase {
    Seeding,
    MapRound,
    Reduce,
    Converged,
    MaxIterations,
    Done,
}

/// Per-round statistics
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RoundStats {
    pub iteration: u32,
    pub shift: f64,
    pub inertia: f64,
}

/// Result of one map + reduce round
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    /// Aggregates summed over all workers, one per centroid
    pub partials: Vec<PartialAggregate>,
    /// Centroids for the next round
    pub centroids: Vec<Centroid>,
    /// Sum of distances between old and new centroids
    pub shift: f64,
    /// Sum of squared distances to the assigned centroid
    pub inertia: f64,
    /// Centroids replaced because their cluster was empty
    pub reseeded: Vec<usize>,
}

/// Final clustering handed to the presentation layer
#[derive(Debug, Clone, Serialize)]
pub struct ClusterOutcome {
    /// Cluster of each store index, `None` for unpopulated slots
    pub assignments: Vec<Option<usize>>,
    pub centroids: Vec<Centroid>,
    pub iterations: u32,
    pub converged: bool,
    /// Inertia of the final assignment pass
    pub inertia: f64,
    pub history: Vec<RoundStats>,
}

impl ClusterOutcome {
    /// Number of entities in each cluster
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.centroids.len()];
        for cluster in self.assignments.iter().flatten() {
            sizes[*cluster] += 1;
        }
        sizes
    }

    /// Entity names grouped by cluster
    pub fn groups(&self, records: &[CityRecord]) -> Vec<Vec<String>> {
        let mut groups = vec![Vec::new(); self.centroids.len()];
        for (index, cluster) in self.assignments.iter().enumerate() {
            if let Some(cluster) = cluster {
                let name = records
                    .get(index)
                    .map(|r| r.name.clone())
                    .unwrap_or_else(|| format!("City #{}", index));
                groups[*cluster].push(name);
            }
        }
        groups
    }
}

/// Split `[0, total)` into exactly `parts` contiguous chunks; the last
/// chunk absorbs the remainder.
pub fn chunk_ranges(total: usize, parts: usize) -> Vec<Range<usize>> {
    if parts == 0 {
        return Vec::new();
    }
    let chunk = total / parts;
    (0..parts)
        .map(|i| {
            let start = i * chunk;
            let end = if i == parts - 1 { total } else { (i + 1) * chunk };
            start..end
        })
        .collect()
}

/// Iterative parallel k-means over a shared store
pub struct ClusterOrchestrator {
    config: ClusterConfig,
    store: Arc<SharedDataStore>,
    pool: ClusterPool,
    rng: StdRng,
    phase: ClusterPhase,
    rounds_dispatched: u32,
}

impl ClusterOrchestrator {
    pub fn new(config: ClusterConfig, store: Arc<SharedDataStore>) -> Result<Self> {
        if config.k == 0 {
            return Err(GeoClusterError::InvalidConfig {
                reason: "k must be at least 1".into(),
            });
        }

        let pool = ClusterPool::new(config.num_workers, store.clone())?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            config,
            store,
            pool,
            rng,
            phase: ClusterPhase::Seeding,
            rounds_dispatched: 0,
        })
    }

    pub fn phase(&self) -> ClusterPhase {
        self.phase
    }

    /// Initial centroids drawn from the populated entities
    pub fn seed_centroids(&mut self) -> Vec<Centroid> {
        let pool = self.store.populated_points();
        seed_centroids(&pool, self.config.k, &mut self.rng)
    }

    /// Seed, iterate to convergence or the round cap, then assign
    pub fn run(&mut self) -> Result<ClusterOutcome> {
        self.set_phase(ClusterPhase::Seeding);
        let initial = self.seed_centroids();
        self.run_with_centroids(initial)
    }

    /// Iterate from caller-provided initial centroids
    pub fn run_with_centroids(&mut self, initial: Vec<Centroid>) -> Result<ClusterOutcome> {
        if initial.len() != self.config.k {
            return Err(GeoClusterError::InvalidConfig {
                reason: format!("expected {} centroids, got {}", self.config.k, initial.len()),
            });
        }

        let mut centroids = initial;
        let mut history = Vec::new();
        let mut converged = false;
        let mut iteration = 0;

        while iteration < self.config.max_iterations {
            iteration += 1;
            let round = self.run_round(&centroids)?;

            debug!(
                "Round {}: shift={:.6} inertia={:.4}",
                iteration, round.shift, round.inertia
            );
            history.push(RoundStats {
                iteration,
                shift: round.shift,
                inertia: round.inertia,
            });
            centroids = round.centroids;

            if round.shift < self.config.convergence_threshold {
                converged = true;
                break;
            }
        }

        if converged {
            self.set_phase(ClusterPhase::Converged);
        } else {
            self.set_phase(ClusterPhase::MaxIterations);
        }

        let (assignments, inertia) = self.final_assignment(&centroids)?;
        standard::LAST_INERTIA.set(inertia);
        self.set_phase(ClusterPhase::Done);

        info!(
            "Clustering finished after {} rounds (converged: {}, inertia: {:.4})",
            iteration, converged, inertia
        );

        Ok(ClusterOutcome {
            assignments,
            centroids,
            iterations: iteration,
            converged,
            inertia,
            history,
        })
    }

    /// One parallel map step followed by the reduce step
    pub fn run_round(&mut self, centroids: &[Centroid]) -> Result<RoundOutcome> {
        self.set_phase(ClusterPhase::MapRound);
        let outputs = self.dispatch(TaskKind::Map, centroids)?;

        let chunks = outputs
            .into_iter()
            .map(|output| match output {
                TaskOutput::Partials(p) => Ok(p),
                TaskOutput::Assignments(_) => Err(GeoClusterError::Internal {
                    message: "map round returned assignment output".into(),
                }),
            })
            .collect::<Result<Vec<ChunkPartials>>>()?;

        self.set_phase(ClusterPhase::Reduce);
        standard::KMEANS_ROUNDS.inc();
        Ok(self.reduce(centroids, &chunks))
    }

    /// Combine chunk partials into the next centroid set.
    ///
    /// An empty cluster takes the next point of one fresh seed set drawn for
    /// this round, so `k` never shrinks.
    pub fn reduce(&mut self, previous: &[Centroid], chunks: &[ChunkPartials]) -> RoundOutcome {
        let k = previous.len();
        let mut totals = vec![PartialAggregate::default(); k];
        let mut inertia = 0.0;

        for chunk in chunks {
            for (total, partial) in totals.iter_mut().zip(&chunk.partials) {
                total.merge(partial);
            }
            inertia += chunk.inertia;
        }

        let mut reseed_pool: Option<Vec<Centroid>> = None;
        let mut reseeded = Vec::new();
        let mut centroids = Vec::with_capacity(k);

        for (idx, total) in totals.iter().enumerate() {
            let next = match total.mean() {
                Some(mean) => mean,
                None => {
                    let pool = reseed_pool.get_or_insert_with(|| self.seed_centroids());
                    let pick = pool[reseeded.len() % pool.len()];
                    reseeded.push(idx);
                    pick
                }
            };
            centroids.push(next);
        }

        if !reseeded.is_empty() {
            warn!("Reseeded empty clusters {:?}", reseeded);
        }

        let shift: f64 = previous
            .iter()
            .zip(&centroids)
            .map(|(old, new)| distance(old, new))
            .sum();

        RoundOutcome {
            partials: totals,
            centroids,
            shift,
            inertia,
            reseeded,
        }
    }

    /// Assign every populated entity to its nearest centroid
    pub fn final_assignment(&mut self, centroids: &[Centroid]) -> Result<(Vec<Option<usize>>, f64)> {
        let outputs = self.dispatch(TaskKind::Assign, centroids)?;

        let mut assignments = vec![None; self.store.len()];
        let mut inertia = 0.0;
        for output in outputs {
            if let TaskOutput::Assignments(ChunkAssignments {
                assignments: chunk,
                inertia: chunk_inertia,
            }) = output
            {
                for (index, cluster) in chunk {
                    assignments[index] = Some(cluster);
                }
                inertia += chunk_inertia;
            }
        }

        Ok((assignments, inertia))
    }

    /// Send one task per worker and wait for all of them.
    ///
    /// Outputs are returned in worker order so reductions sum in a fixed
    /// order. Every report is collected before a fault is surfaced.
    fn dispatch(&mut self, kind: TaskKind, centroids: &[Centroid]) -> Result<Vec<TaskOutput>> {
        self.rounds_dispatched += 1;
        let round = self.rounds_dispatched;
        let shared: Arc<[Centroid]> = Arc::from(centroids);
        let ranges = chunk_ranges(self.store.len(), self.pool.num_workers());

        for (worker_id, range) in ranges.into_iter().enumerate() {
            self.pool.submit(
                worker_id,
                PoolTask {
                    round,
                    range,
                    centroids: shared.clone(),
                    kind,
                },
            )?;
        }

        let mut outputs: Vec<Option<TaskOutput>> = vec![None; self.pool.num_workers()];
        let mut fault: Option<GeoClusterError> = None;

        for _ in 0..self.pool.num_workers() {
            let report = self.pool.recv()?;
            if report.round != round {
                return Err(GeoClusterError::Internal {
                    message: format!(
                        "worker {} answered round {} during round {}",
                        report.worker_id, report.round, round
                    ),
                });
            }
            match report.output {
                Ok(output) => outputs[report.worker_id] = Some(output),
                Err(message) => {
                    fault.get_or_insert(GeoClusterError::WorkerFault {
                        phase: Phase::Cluster,
                        worker_id: report.worker_id,
                        message,
                    });
                }
            }
        }

        if let Some(fault) = fault {
            return Err(fault);
        }

        outputs
            .into_iter()
            .enumerate()
            .map(|(worker_id, output)| {
                output.ok_or_else(|| GeoClusterError::Internal {
                    message: format!("no result from worker {}", worker_id),
                })
            })
            .collect()
    }

    fn set_phase(&mut self, phase: ClusterPhase) {
        if self.phase != phase {
            info!("Cluster phase {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }
}
