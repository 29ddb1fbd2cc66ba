//! Persistent k-means worker pool
//!
//! A fixed set of OS threads created once per clustering run. Each worker
//! owns a task channel so the orchestrator routes chunk `i` to worker `i`
//! every round; all results come back on one shared channel. Threads are
//! reused across rounds and joined on drop.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error};

use super::centroid::Centroid;
use super::worker::{assign_chunk, map_chunk, ChunkAssignments, ChunkPartials};
use crate::error::{GeoClusterError, Result};
use crate::storage::SharedDataStore;

/// Unit of work for one worker in one round
#[derive(Debug, Clone)]
pub struct PoolTask {
    pub round: u32,
    pub range: Range<usize>,
    pub centroids: Arc<[Centroid]>,
    pub kind: TaskKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Assignment plus partial sums
    Map,
    /// Final per-entity assignment
    Assign,
}

/// What a worker computed
#[derive(Debug, Clone)]
pub enum TaskOutput {
    Partials(ChunkPartials),
    Assignments(ChunkAssignments),
}

/// One result message per task
#[derive(Debug)]
pub struct WorkerReport {
    pub worker_id: usize,
    pub round: u32,
    /// `Err` carries the panic message of a faulted task
    pub output: std::result::Result<TaskOutput, String>,
}

/// Fixed-size pool of k-means worker threads
pub struct ClusterPool {
    workers: Vec<thread::JoinHandle<()>>,
    task_txs: Vec<Sender<PoolTask>>,
    output_rx: Receiver<WorkerReport>,
}

impl ClusterPool {
    /// Spawn `num_workers` threads with read access to `store`
    pub fn new(num_workers: usize, store: Arc<SharedDataStore>) -> Result<Self> {
        if num_workers == 0 {
            return Err(GeoClusterError::InvalidConfig {
                reason: "cluster pool needs at least one worker".into(),
            });
        }

        let (output_tx, output_rx) = bounded(num_workers);
        let mut workers = Vec::with_capacity(num_workers);
        let mut task_txs = Vec::with_capacity(num_workers);

        for worker_id in 0..num_workers {
            let (task_tx, task_rx) = bounded::<PoolTask>(1);
            let output_tx = output_tx.clone();
            let store = store.clone();

            let handle = thread::Builder::new()
                .name(format!("kmeans-worker-{}", worker_id))
                .spawn(move || worker_loop(worker_id, store, task_rx, output_tx))
                .map_err(|e| GeoClusterError::PoolUnavailable {
                    reason: format!("failed to spawn worker thread {}: {}", worker_id, e),
                })?;

            workers.push(handle);
            task_txs.push(task_tx);
        }

        debug!("Started k-means pool with {} workers", num_workers);

        Ok(Self {
            workers,
            task_txs,
            output_rx,
        })
    }

    pub fn num_workers(&self) -> usize {
        self.task_txs.len()
    }

    /// Route a task to a specific worker
    pub fn submit(&self, worker_id: usize, task: PoolTask) -> Result<()> {
        let tx = self
            .task_txs
            .get(worker_id)
            .ok_or_else(|| GeoClusterError::PoolUnavailable {
                reason: format!("no worker {}", worker_id),
            })?;
        tx.send(task).map_err(|_| GeoClusterError::PoolUnavailable {
            reason: format!("worker {} is gone", worker_id),
        })
    }

    /// Block until the next report arrives
    pub fn recv(&self) -> Result<WorkerReport> {
        self.output_rx
            .recv()
            .map_err(|_| GeoClusterError::PoolUnavailable {
                reason: "all workers exited".into(),
            })
    }
}

impl Drop for ClusterPool {
    fn drop(&mut self) {
        // Closing the task channels ends every worker loop
        self.task_txs.clear();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(
    worker_id: usize,
    store: Arc<SharedDataStore>,
    tasks: Receiver<PoolTask>,
    reports: Sender<WorkerReport>,
) {
    while let Ok(task) = tasks.recv() {
        let output = panic::catch_unwind(AssertUnwindSafe(|| execute(&store, &task)))
            .map_err(|payload| panic_message(payload.as_ref()));

        if let Err(message) = &output {
            error!("k-means worker {} faulted in round {}: {}", worker_id, task.round, message);
        }

        let report = WorkerReport {
            worker_id,
            round: task.round,
            output,
        };
        if reports.send(report).is_err() {
            break;
        }
    }
}

fn execute(store: &SharedDataStore, task: &PoolTask) -> TaskOutput {
    match task.kind {
        TaskKind::Map => TaskOutput::Partials(map_chunk(store, task.range.clone(), &task.centroids)),
        TaskKind::Assign => {
            TaskOutput::Assignments(assign_chunk(store, task.range.clone(), &task.centroids))
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
