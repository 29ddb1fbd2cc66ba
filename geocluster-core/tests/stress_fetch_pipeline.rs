//! Stress tests for the fetch phase and the full pipeline
//!
//! Run with: cargo test --release --test stress_fetch_pipeline -- --nocapture

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use geocluster_core::cluster::ClusterConfig;
use geocluster_core::error::Phase;
use geocluster_core::fetch::{
    FetchConfig, FetchOrchestrator, PageResponse, PageSource, RateLimiterConfig, RawCity,
};
use geocluster_core::runtime::RuntimeConfig;
use geocluster_core::{
    GeoClusterError, GeoPoint, Pipeline, PipelineConfig, PipelineRuntime, SharedDataStore,
};
use parking_lot::Mutex;
use serde_json::{json, Value};

/// What the scripted source does at a given offset
#[derive(Debug, Clone, Copy)]
enum Script {
    /// Answer 429 this many times, then serve the page
    ThrottleThenServe(u32),
    /// Always answer with this status
    AlwaysFail(u16),
    /// Serve an empty `data` array
    Empty,
    /// Panic inside the request
    Panic,
    /// Return an error that no retry can fix
    Broken,
}

/// In-memory paginated source of synthetic cities
struct ScriptedSource {
    cities: Vec<Value>,
    scripts: HashMap<usize, Script>,
    attempts: Mutex<HashMap<usize, u32>>,
}

impl ScriptedSource {
    fn new(cities: Vec<Value>) -> Self {
        Self {
            cities,
            scripts: HashMap::new(),
            attempts: Mutex::new(HashMap::new()),
        }
    }

    fn with_script(mut self, offset: usize, script: Script) -> Self {
        self.scripts.insert(offset, script);
        self
    }

    fn attempts_at(&self, offset: usize) -> u32 {
        self.attempts.lock().get(&offset).copied().unwrap_or(0)
    }

    fn serve(&self, offset: usize, limit: usize) -> Vec<RawCity> {
        self.cities
            .iter()
            .skip(offset)
            .take(limit)
            .map(|v| serde_json::from_value(v.clone()).unwrap())
            .collect()
    }
}

#[async_trait]
impl PageSource for ScriptedSource {
    async fn fetch_page(&self, offset: usize, limit: usize) -> geocluster_core::Result<PageResponse> {
        let attempt = {
            let mut attempts = self.attempts.lock();
            let entry = attempts.entry(offset).or_insert(0);
            *entry += 1;
            *entry
        };

        match self.scripts.get(&offset) {
            Some(Script::ThrottleThenServe(n)) if attempt <= *n => Ok(PageResponse::Throttled),
            Some(Script::AlwaysFail(status)) => Ok(PageResponse::Failed { status: *status }),
            Some(Script::Empty) => Ok(PageResponse::Items(Vec::new())),
            Some(Script::Panic) => panic!("scripted panic at offset {}", offset),
            Some(Script::Broken) => Err(GeoClusterError::Internal {
                message: format!("source broken at offset {}", offset),
            }),
            _ => Ok(PageResponse::Items(self.serve(offset, limit))),
        }
    }
}

/// City `i` sits at (i / 10, -i / 10) with population 1000 * (i + 1)
fn city(i: usize) -> Value {
    json!({
        "id": i,
        "city": format!("City{}", i),
        "countryCode": "XX",
        "latitude": i as f64 / 10.0,
        "longitude": -(i as f64) / 10.0,
        "population": 1000 * (i + 1),
    })
}

fn expected_point(i: usize) -> GeoPoint {
    GeoPoint::new(i as f64 / 10.0, -(i as f64) / 10.0, (1000 * (i + 1)) as f64)
}

fn fetch_config(total: usize, limit: usize, workers: usize) -> FetchConfig {
    FetchConfig {
        total_entities: total,
        page_limit: limit,
        num_workers: workers,
        max_retries: 4,
        rate_limit: RateLimiterConfig {
            base_interval: Duration::from_millis(1),
        },
        throttle_penalty: Duration::from_millis(1),
        stagger_start: false,
        ..Default::default()
    }
}

/// Three tight groups far apart
fn grouped_cities(per_group: usize) -> Vec<Value> {
    let centers = [(10.0, 10.0, 1e6), (-30.0, 60.0, 3e6), (50.0, -100.0, 5e5)];
    let mut cities = Vec::new();
    for (g, (lat, lon, pop)) in centers.iter().enumerate() {
        for j in 0..per_group {
            let jitter = j as f64 * 0.1;
            cities.push(json!({
                "city": format!("G{}-{}", g, j),
                "latitude": lat + jitter,
                "longitude": lon - jitter,
                "population": pop + 1000.0 * j as f64,
            }));
        }
    }
    cities
}

#[tokio::test]
async fn stress_multi_worker_fetch_fills_store() {
    let total = 200;
    let source = Arc::new(ScriptedSource::new((0..total).map(city).collect()));
    let store = Arc::new(SharedDataStore::new(total));

    let orchestrator =
        FetchOrchestrator::new(fetch_config(total, 10, 4), source.clone(), store.clone()).unwrap();
    let progress = orchestrator.subscribe_progress();

    let start = std::time::Instant::now();
    let outcome = orchestrator.run().await.unwrap();
    println!("Fetched {} entities in {:?}", outcome.fetched, start.elapsed());

    assert_eq!(store.populated_count(), total);
    assert_eq!(outcome.records.len(), total);
    assert!(outcome.abandoned_pages.is_empty());
    for i in 0..total {
        assert_eq!(store.read(i).unwrap(), Some(expected_point(i)));
        assert_eq!(outcome.records[i].index, i);
        assert_eq!(outcome.records[i].name, format!("City{}", i));
    }

    // Every page requested exactly once
    for page in 0..total / 10 {
        assert_eq!(source.attempts_at(page * 10), 1);
    }
    assert_eq!(progress.borrow().fetched, total);
}

#[tokio::test]
async fn stress_throttled_page_backs_off_then_succeeds() {
    let source = Arc::new(
        ScriptedSource::new((0..5).map(city).collect())
            .with_script(0, Script::ThrottleThenServe(3)),
    );
    let store = Arc::new(SharedDataStore::new(5));

    let config = FetchConfig {
        rate_limit: RateLimiterConfig {
            base_interval: Duration::from_millis(10),
        },
        throttle_penalty: Duration::from_millis(5),
        ..fetch_config(5, 5, 1)
    };
    let orchestrator = FetchOrchestrator::new(config, source.clone(), store.clone()).unwrap();

    let start = std::time::Instant::now();
    let outcome = orchestrator.run().await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(source.attempts_at(0), 4);
    assert!(elapsed >= Duration::from_millis(45), "elapsed {:?}", elapsed);
    assert!(outcome.abandoned_pages.is_empty());
    assert_eq!(store.populated_count(), 5);
}

#[tokio::test]
async fn stress_exhausted_retries_abandon_page() {
    let total = 40;
    let source = Arc::new(
        ScriptedSource::new((0..total).map(city).collect())
            .with_script(20, Script::AlwaysFail(500)),
    );
    let store = Arc::new(SharedDataStore::new(total));

    let config = FetchConfig {
        max_retries: 2,
        ..fetch_config(total, 10, 2)
    };
    let orchestrator = FetchOrchestrator::new(config, source.clone(), store.clone()).unwrap();
    let outcome = orchestrator.run().await.unwrap();

    assert_eq!(outcome.abandoned_pages, vec![2]);
    assert_eq!(source.attempts_at(20), 2);
    assert_eq!(store.populated_count(), 30);
    for i in 20..30 {
        assert!(!store.is_populated(i));
    }
    // Abandoned positions still get a record so indices line up
    assert_eq!(outcome.records.len(), total);
}

#[tokio::test]
async fn stress_empty_page_completes() {
    let total = 30;
    let source = Arc::new(
        ScriptedSource::new((0..total).map(city).collect()).with_script(10, Script::Empty),
    );
    let store = Arc::new(SharedDataStore::new(total));

    let orchestrator =
        FetchOrchestrator::new(fetch_config(total, 10, 3), source.clone(), store.clone()).unwrap();
    let outcome = orchestrator.run().await.unwrap();

    assert!(outcome.abandoned_pages.is_empty());
    assert_eq!(source.attempts_at(10), 1);
    assert_eq!(store.populated_count(), 20);
    assert!((10..20).all(|i| !store.is_populated(i)));
}

#[tokio::test]
async fn stress_items_without_coordinates_leave_slots_empty() {
    let mut cities: Vec<Value> = (0..10).map(city).collect();
    cities[3] = json!({ "city": "Nowhere", "population": 10 });
    let source = Arc::new(ScriptedSource::new(cities));
    let store = Arc::new(SharedDataStore::new(10));

    let orchestrator =
        FetchOrchestrator::new(fetch_config(10, 5, 2), source, store.clone()).unwrap();
    let outcome = orchestrator.run().await.unwrap();

    assert_eq!(store.populated_count(), 9);
    assert!(!store.is_populated(3));
    assert_eq!(outcome.records[3].name, "Nowhere");
}

#[tokio::test]
async fn stress_index_collision_is_a_worker_fault() {
    let total = 20;
    let source = Arc::new(ScriptedSource::new((0..total).map(city).collect()));
    let store = Arc::new(SharedDataStore::new(total));
    store.write(13, GeoPoint::default()).unwrap();

    let orchestrator =
        FetchOrchestrator::new(fetch_config(total, 10, 2), source, store.clone()).unwrap();
    let err = orchestrator.run().await.unwrap_err();

    assert!(matches!(
        err,
        GeoClusterError::WorkerFault {
            phase: Phase::Fetch,
            worker_id: 1,
            ..
        }
    ));
    // The sibling worker still finished its page
    assert!((0..10).all(|i| store.is_populated(i)));
}

#[tokio::test]
async fn stress_panicking_source_is_a_worker_fault() {
    let total = 30;
    let source = Arc::new(
        ScriptedSource::new((0..total).map(city).collect()).with_script(0, Script::Panic),
    );
    let store = Arc::new(SharedDataStore::new(total));

    let orchestrator =
        FetchOrchestrator::new(fetch_config(total, 10, 3), source, store.clone()).unwrap();
    let err = orchestrator.run().await.unwrap_err();

    assert!(matches!(
        err,
        GeoClusterError::WorkerFault {
            phase: Phase::Fetch,
            worker_id: 0,
            ..
        }
    ));
    assert_eq!(store.populated_count(), 20);
}

#[tokio::test]
async fn stress_non_retryable_source_error_is_a_worker_fault() {
    let total = 20;
    let source = Arc::new(
        ScriptedSource::new((0..total).map(city).collect()).with_script(10, Script::Broken),
    );
    let store = Arc::new(SharedDataStore::new(total));

    let orchestrator =
        FetchOrchestrator::new(fetch_config(total, 10, 2), source.clone(), store).unwrap();
    let err = orchestrator.run().await.unwrap_err();

    assert!(matches!(
        err,
        GeoClusterError::WorkerFault {
            phase: Phase::Fetch,
            worker_id: 1,
            ..
        }
    ));
    assert_eq!(source.attempts_at(10), 1);
}

#[test]
fn stress_store_size_must_match_target() {
    let source = Arc::new(ScriptedSource::new(Vec::new()));
    let store = Arc::new(SharedDataStore::new(7));
    let result = FetchOrchestrator::new(fetch_config(10, 5, 2), source, store);
    assert!(matches!(
        result,
        Err(GeoClusterError::StoreSizeMismatch { .. })
    ));
}

fn pipeline_config(total: usize) -> PipelineConfig {
    PipelineConfig {
        fetch: fetch_config(total, 10, 3),
        cluster: ClusterConfig {
            k: 3,
            num_workers: 4,
            seed: Some(42),
            ..Default::default()
        },
        runtime: RuntimeConfig {
            io_threads: 2,
            ..Default::default()
        },
        dataset: None,
    }
}

#[test]
fn stress_pipeline_fetch_then_cluster() {
    let cities = grouped_cities(20);
    let total = cities.len();
    let source = Arc::new(ScriptedSource::new(cities));

    let runtime = PipelineRuntime::new(RuntimeConfig {
        io_threads: 2,
        ..Default::default()
    })
    .unwrap();
    let pipeline = Pipeline::new(pipeline_config(total)).unwrap();

    let outcome = pipeline.run_api(&runtime, source).unwrap();

    assert_eq!(outcome.records.len(), total);
    assert_eq!(outcome.clustering.centroids.len(), 3);
    assert_eq!(outcome.clustering.assignments.len(), total);
    assert!(outcome.clustering.assignments.iter().all(Option::is_some));

    let sizes = outcome.clustering.cluster_sizes();
    assert_eq!(sizes.iter().sum::<usize>(), total);

    let names: usize = outcome.groups().iter().map(Vec::len).sum();
    assert_eq!(names, total);

    runtime.shutdown();
}

#[test]
fn stress_pipeline_local_dataset() {
    let mut cities = grouped_cities(10);
    // Dropped: no population
    cities.push(json!({ "city": "Ghost", "latitude": 1.0, "longitude": 1.0 }));
    // Kept but unpopulated in the store: no coordinates
    cities.push(json!({ "city": "Drifter", "population": 500 }));

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(serde_json::to_vec(&cities).unwrap().as_slice())
        .unwrap();

    let pipeline = Pipeline::new(PipelineConfig {
        dataset: Some(file.path().to_path_buf()),
        ..pipeline_config(1)
    })
    .unwrap();

    let outcome = pipeline.run_local(file.path()).unwrap();

    assert_eq!(outcome.records.len(), 31);
    assert!(outcome.abandoned_pages.is_empty());

    let assigned: HashSet<usize> = outcome
        .clustering
        .assignments
        .iter()
        .enumerate()
        .filter_map(|(i, c)| c.map(|_| i))
        .collect();
    assert_eq!(assigned.len(), 30);
    assert!(outcome.records.iter().all(|r| r.name != "Ghost"));
    let drifter = outcome.records.iter().find(|r| r.name == "Drifter").unwrap();
    assert!(!assigned.contains(&drifter.index));
}

#[test]
fn stress_pipeline_reports_missing_dataset() {
    let pipeline = Pipeline::new(pipeline_config(10)).unwrap();
    let err = pipeline
        .run_local(std::path::Path::new("/nonexistent/cities.json"))
        .unwrap_err();
    assert!(matches!(err, GeoClusterError::DatasetUnreadable { .. }));
}
